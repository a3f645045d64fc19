//! Memberlist stores
//!
//! A store is a thin I/O boundary over the persisted memberlist. It performs
//! no merging; every write is conditioned on the version the caller read.

pub mod codec;
mod kubernetes;
mod memory;

pub use kubernetes::CrMemberlistStore;
pub use memory::InMemoryMemberlistStore;

use async_trait::async_trait;
use crate::error::MemberlistError;
use crate::memberlist::{Memberlist, ResourceVersion};

#[async_trait]
pub trait MemberlistStore: Send + Sync {
    /// Current memberlist and its version.
    /// `NotFound` if the record does not exist, `TransientRead` on I/O trouble.
    async fn get_memberlist(&self) -> Result<(Memberlist, ResourceVersion), MemberlistError>;

    /// Replace the memberlist if `observed` is still the current version,
    /// otherwise fail with `Conflict`. Returns the new version.
    async fn update_memberlist(
        &self,
        memberlist: &Memberlist,
        observed: &ResourceVersion,
    ) -> Result<ResourceVersion, MemberlistError>;

    /// Create the record. `Conflict` if it already exists.
    async fn create_memberlist(&self, memberlist: &Memberlist) -> Result<ResourceVersion, MemberlistError>;
}
