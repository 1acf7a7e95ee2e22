use std::time::Duration;

use async_trait::async_trait;

use cronlock_core::LockConfiguration;

use crate::error::LockError;

/// A held scheduler lock.
///
/// Dropping the handle without unlocking is allowed: the record then expires
/// at `lock_at_most_until`.
#[async_trait]
pub trait SimpleLock: Send + Sync {
    /// The configuration this handle currently holds the lock under.
    fn configuration(&self) -> &LockConfiguration;

    /// Push the expiry out to `now + lock_at_most_for`.
    ///
    /// Returns `None` when the lock was taken over in the meantime; the
    /// caller must stop treating itself as the owner. On success the returned
    /// handle replaces this one, which becomes inert.
    async fn extend(
        &self,
        lock_at_most_for: Duration,
        lock_at_least_for: Duration,
    ) -> Result<Option<Box<dyn SimpleLock>>, LockError>;

    /// Release the lock, but never before `lock_at_least_until`.
    ///
    /// Calling it again has no further effect.
    async fn unlock(&self) -> Result<(), LockError>;
}

/// Obtains scheduler locks.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to obtain the lock described by `config` without waiting.
    ///
    /// Returns `None` if the lock is currently held by someone else.
    async fn try_lock(
        &self,
        config: &LockConfiguration,
    ) -> Result<Option<Box<dyn SimpleLock>>, LockError>;
}
