use thiserror::Error;

use cronlock_core::ConfigurationError;

/// Errors from lock providers and store drivers.
///
/// Losing a race for a lock is not an error; providers report it as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid lock configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The handle was already unlocked or replaced by an extension.
    #[error("lock already released or extended: {0}")]
    Released(String),
}

impl LockError {
    /// Whether the shared store itself failed (unreachable or erroring), as
    /// opposed to a caller mistake.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Backend(_))
    }
}
