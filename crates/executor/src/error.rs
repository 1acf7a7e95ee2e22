use thiserror::Error;

use cronlock_core::ConfigurationError;
use cronlock_store::LockError;

/// Errors that keep a scheduled task from running.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The task's lock intent is malformed; the task does not run.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The lock store failed and the policy is to skip the run.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
}
