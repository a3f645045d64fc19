use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use super::MemberlistStore;
use crate::error::MemberlistError;
use crate::memberlist::{Memberlist, ResourceVersion};

#[derive(Debug, Default)]
struct Record {
    members: Memberlist,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    record: Option<Record>,
    /// Last issued version, kept across deletes so versions never repeat
    counter: u64,
    read_failures: VecDeque<MemberlistError>,
    writes: usize,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

/// Versioned in-process memberlist
#[derive(Debug, Default)]
pub struct InMemoryMemberlistStore {
    inner: Mutex<Inner>,
}

impl InMemoryMemberlistStore {
    /// A store with no record yet
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose record already exists with `members`
    pub fn with_members(members: Memberlist) -> Self {
        let store = Self::new();
        store.overwrite(members);
        store
    }

    /// Unconditional write, as done by another writer. Returns the new version.
    pub fn overwrite(&self, members: Memberlist) -> ResourceVersion {
        let mut inner = self.inner.lock();
        let version = inner.bump();
        inner.record = Some(Record { members, version });
        ResourceVersion::new(version.to_string())
    }

    pub fn delete(&self) {
        self.inner.lock().record = None;
    }

    /// Fail the next read with `error`; queued failures apply in order
    pub fn fail_next_read(&self, error: MemberlistError) {
        self.inner.lock().read_failures.push_back(error);
    }

    /// Current members, `None` if the record does not exist
    pub fn members(&self) -> Option<Memberlist> {
        self.inner.lock().record.as_ref().map(|r| r.members.clone())
    }

    pub fn version(&self) -> Option<ResourceVersion> {
        self.inner
            .lock()
            .record
            .as_ref()
            .map(|r| ResourceVersion::new(r.version.to_string()))
    }

    /// Successful conditional writes and creates so far
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }
}

#[async_trait]
impl MemberlistStore for InMemoryMemberlistStore {
    async fn get_memberlist(&self) -> Result<(Memberlist, ResourceVersion), MemberlistError> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.read_failures.pop_front() {
            return Err(error);
        }
        match &inner.record {
            Some(record) => Ok((
                record.members.clone(),
                ResourceVersion::new(record.version.to_string()),
            )),
            None => Err(MemberlistError::NotFound("in-memory memberlist".to_string())),
        }
    }

    async fn update_memberlist(
        &self,
        memberlist: &Memberlist,
        observed: &ResourceVersion,
    ) -> Result<ResourceVersion, MemberlistError> {
        let mut inner = self.inner.lock();
        let current = match &inner.record {
            Some(record) => record.version,
            None => return Err(MemberlistError::NotFound("in-memory memberlist".to_string())),
        };
        if current.to_string() != observed.as_str() {
            return Err(MemberlistError::Conflict(format!(
                "observed version {} but current is {}",
                observed, current
            )));
        }
        let version = inner.bump();
        inner.record = Some(Record {
            members: memberlist.clone(),
            version,
        });
        inner.writes += 1;
        Ok(ResourceVersion::new(version.to_string()))
    }

    async fn create_memberlist(&self, memberlist: &Memberlist) -> Result<ResourceVersion, MemberlistError> {
        let mut inner = self.inner.lock();
        if inner.record.is_some() {
            return Err(MemberlistError::Conflict("in-memory memberlist already exists".to_string()));
        }
        let version = inner.bump();
        inner.record = Some(Record {
            members: memberlist.clone(),
            version,
        });
        inner.writes += 1;
        Ok(ResourceVersion::new(version.to_string()))
    }
}
