pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod memberlist;
pub mod queue;
pub mod store;
pub mod watcher;

// Re-export common types
pub use config::Config;
pub use error::{MemberlistError, Result};
pub use manager::{ManagerState, MemberlistManager};
pub use memberlist::{Memberlist, NodeId, NodeStatus, ResourceVersion};
pub use queue::WorkQueue;
pub use store::{CrMemberlistStore, InMemoryMemberlistStore, MemberlistStore};
pub use watcher::{InMemoryNodeWatcher, KubernetesWatcher, NodeWatcher};
