use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use cronlock_core::{Clock, LockConfiguration, SystemClock};

use crate::accessor::{LockRecord, StorageAccessor};
use crate::error::LockError;
use crate::lock::{LockProvider, SimpleLock};

/// [`LockProvider`] driving a [`StorageAccessor`].
///
/// Acquisition tries to insert a fresh record; if the name already exists it
/// falls back to taking over the record when its `lock_until` has passed.
/// Names whose record is known to exist skip the insert attempt.
///
/// Staleness is judged against this process's [`Clock`], so clock skew
/// between nodes shifts when a lock is considered stale. Set
/// `lock_at_most_for` generously relative to expected skew.
pub struct StorageBasedLockProvider {
    accessor: Arc<dyn StorageAccessor>,
    clock: Arc<dyn Clock>,
    holder: String,
    known_records: DashSet<String>,
}

impl StorageBasedLockProvider {
    pub fn new(accessor: Arc<dyn StorageAccessor>) -> Self {
        Self {
            accessor,
            clock: Arc::new(SystemClock),
            holder: default_holder(),
            known_records: DashSet::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the `locked_by` value written to records.
    #[must_use]
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Forget which lock records are known to exist.
    ///
    /// Needed when records are deleted from the store behind the provider's
    /// back.
    pub fn clear_cache(&self) {
        self.known_records.clear();
    }

    /// Returns the stored `lock_until` when the lock was obtained.
    async fn do_lock(
        &self,
        config: &LockConfiguration,
    ) -> Result<Option<DateTime<Utc>>, LockError> {
        let record = LockRecord {
            name: config.name().to_owned(),
            lock_until: config.lock_at_most_until(),
            locked_at: self.clock.now(),
            locked_by: self.holder.clone(),
        };

        if !self.known_records.contains(config.name()) {
            let inserted = self.accessor.insert_if_absent(&record).await?;
            self.known_records.insert(record.name.clone());
            if inserted.is_some() {
                return Ok(inserted);
            }
        }

        self.accessor.update_if_expired(&record).await
    }
}

#[async_trait]
impl LockProvider for StorageBasedLockProvider {
    async fn try_lock(
        &self,
        config: &LockConfiguration,
    ) -> Result<Option<Box<dyn SimpleLock>>, LockError> {
        if let Some(held_until) = self.do_lock(config).await? {
            debug!(
                lock = config.name(),
                lock_until = %held_until,
                "lock acquired"
            );
            Ok(Some(Box::new(StorageLock::new(
                Arc::clone(&self.accessor),
                Arc::clone(&self.clock),
                config.clone(),
                held_until,
            ))))
        } else {
            debug!(lock = config.name(), "lock is held by another holder");
            Ok(None)
        }
    }
}

impl std::fmt::Debug for StorageBasedLockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBasedLockProvider")
            .field("holder", &self.holder)
            .field("known_records", &self.known_records.len())
            .finish_non_exhaustive()
    }
}

/// A lock held through a [`StorageBasedLockProvider`].
///
/// Ownership is checked by comparing the stored `lock_until` against the value
/// the store reported when this handle was created.
pub struct StorageLock {
    accessor: Arc<dyn StorageAccessor>,
    clock: Arc<dyn Clock>,
    config: LockConfiguration,
    held_until: DateTime<Utc>,
    active: Mutex<bool>,
}

impl StorageLock {
    fn new(
        accessor: Arc<dyn StorageAccessor>,
        clock: Arc<dyn Clock>,
        config: LockConfiguration,
        held_until: DateTime<Utc>,
    ) -> Self {
        Self {
            accessor,
            clock,
            config,
            held_until,
            active: Mutex::new(true),
        }
    }
}

#[async_trait]
impl SimpleLock for StorageLock {
    fn configuration(&self) -> &LockConfiguration {
        &self.config
    }

    async fn extend(
        &self,
        lock_at_most_for: Duration,
        lock_at_least_for: Duration,
    ) -> Result<Option<Box<dyn SimpleLock>>, LockError> {
        let mut active = self.active.lock().await;
        if !*active {
            return Err(LockError::Released(self.config.name().to_owned()));
        }

        let now = self.clock.now();
        let extended =
            LockConfiguration::new(now, self.config.name(), lock_at_most_for, lock_at_least_for)?;

        let updated = self
            .accessor
            .update_if_owned_and_unexpired(
                self.config.name(),
                self.held_until,
                extended.lock_at_most_until(),
                now,
            )
            .await?;

        let Some(held_until) = updated else {
            info!(
                lock = self.config.name(),
                "lock can not be extended, it was taken over or expired"
            );
            return Ok(None);
        };

        debug!(
            lock = self.config.name(),
            lock_until = %held_until,
            "lock extended"
        );
        *active = false;
        Ok(Some(Box::new(StorageLock::new(
            Arc::clone(&self.accessor),
            Arc::clone(&self.clock),
            extended,
            held_until,
        ))))
    }

    async fn unlock(&self) -> Result<(), LockError> {
        let mut active = self.active.lock().await;
        if !*active {
            return Ok(());
        }

        let now = self.clock.now();
        let keep_until = self.config.unlock_time(now);
        self.accessor
            .set_lock_until_floor(self.config.name(), self.held_until, keep_until, now)
            .await?;

        *active = false;
        debug!(lock = self.config.name(), lock_until = %keep_until, "lock released");
        Ok(())
    }
}

/// `<hostname>-<uuid>`, or `unknown-<uuid>` when the hostname is unavailable.
fn default_holder() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_owned());
    format!("{host}-{}", uuid::Uuid::new_v4())
}
