use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LockError;

/// The persisted lock record; one per lock name.
///
/// Created on the first acquisition of a name and updated in place ever
/// after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub name: String,
    /// Instant the current holder's exclusivity expires.
    pub lock_until: DateTime<Utc>,
    /// Instant the current holder acquired the lock.
    pub locked_at: DateTime<Utc>,
    /// Holder identifier, for diagnostics only.
    pub locked_by: String,
}

/// Atomic primitives a storage backend must provide.
///
/// Every method must be a single atomic operation evaluated by the store
/// itself. Read-then-write in the caller reintroduces the race these
/// primitives exist to prevent.
///
/// Methods that write a `lock_until` return the value actually stored. The
/// holder presents it as `expected_lock_until` on its next call. Backends
/// that stamp records with their own clock keep the offsets between the
/// caller's instants and `now` (or `record.locked_at`) and apply them to the
/// store's clock, so the stored value may differ from the one passed in.
#[async_trait]
pub trait StorageAccessor: Send + Sync {
    /// Insert `record` unless a record with the same name exists.
    ///
    /// Returns `None` when the name is already taken.
    async fn insert_if_absent(
        &self,
        record: &LockRecord,
    ) -> Result<Option<DateTime<Utc>>, LockError>;

    /// Overwrite the record named `record.name` only if its stored
    /// `lock_until <= record.locked_at`.
    ///
    /// Returns `None` when the lock is still held by someone else.
    async fn update_if_expired(
        &self,
        record: &LockRecord,
    ) -> Result<Option<DateTime<Utc>>, LockError>;

    /// Set `lock_until = new_lock_until` only if the stored `lock_until` still
    /// equals `expected_lock_until` and is after `now`.
    async fn update_if_owned_and_unexpired(
        &self,
        name: &str,
        expected_lock_until: DateTime<Utc>,
        new_lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, LockError>;

    /// Set `lock_until = lock_until` only if the stored `lock_until` still
    /// equals `expected_lock_until`. A record taken over by another holder is
    /// left untouched.
    async fn set_lock_until_floor(
        &self,
        name: &str,
        expected_lock_until: DateTime<Utc>,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), LockError>;

    /// Read the current record for `name`.
    async fn find(&self, name: &str) -> Result<Option<LockRecord>, LockError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_dyn_storage_accessor(_: &dyn StorageAccessor) {}
}
