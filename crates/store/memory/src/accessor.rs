use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use cronlock_store::{LockError, LockRecord, StorageAccessor};

/// In-memory [`StorageAccessor`] backed by a [`DashMap`].
///
/// Each primitive runs under the map's per-shard lock, which makes it atomic
/// for a single name. Records are stamped with the caller's instants as
/// given. Clones share the same records, so several providers in
/// one process can stand in for separate nodes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageAccessor {
    records: Arc<DashMap<String, LockRecord>>,
}

impl MemoryStorageAccessor {
    /// Create an empty in-memory lock record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lock records ever created.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StorageAccessor for MemoryStorageAccessor {
    async fn insert_if_absent(
        &self,
        record: &LockRecord,
    ) -> Result<Option<DateTime<Utc>>, LockError> {
        match self.records.entry(record.name.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(vacant) => {
                vacant.insert(record.clone());
                Ok(Some(record.lock_until))
            }
        }
    }

    async fn update_if_expired(
        &self,
        record: &LockRecord,
    ) -> Result<Option<DateTime<Utc>>, LockError> {
        match self.records.get_mut(&record.name) {
            Some(mut existing) if existing.lock_until <= record.locked_at => {
                *existing = record.clone();
                Ok(Some(record.lock_until))
            }
            _ => Ok(None),
        }
    }

    async fn update_if_owned_and_unexpired(
        &self,
        name: &str,
        expected_lock_until: DateTime<Utc>,
        new_lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, LockError> {
        match self.records.get_mut(name) {
            Some(mut existing)
                if existing.lock_until == expected_lock_until && existing.lock_until > now =>
            {
                existing.lock_until = new_lock_until;
                Ok(Some(new_lock_until))
            }
            _ => Ok(None),
        }
    }

    async fn set_lock_until_floor(
        &self,
        name: &str,
        expected_lock_until: DateTime<Utc>,
        lock_until: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<(), LockError> {
        if let Some(mut existing) = self.records.get_mut(name)
            && existing.lock_until == expected_lock_until
        {
            existing.lock_until = lock_until;
        }
        Ok(())
    }

    async fn find(&self, name: &str) -> Result<Option<LockRecord>, LockError> {
        Ok(self.records.get(name).map(|r| r.value().clone()))
    }
}
