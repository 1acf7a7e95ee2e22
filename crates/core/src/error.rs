use std::time::Duration;

use thiserror::Error;

/// Errors raised while turning declared lock intent into a [`LockConfiguration`].
///
/// These are caller errors: a task whose intent fails to resolve must not run.
///
/// [`LockConfiguration`]: crate::LockConfiguration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The lock name resolved to an empty string.
    #[error("lock name can not be empty")]
    EmptyName,

    /// A textual duration could be parsed neither as milliseconds nor as an
    /// ISO-8601 duration.
    #[error("invalid {field} value \"{value}\" - cannot parse into long nor duration")]
    InvalidDuration { field: String, value: String },

    /// The minimum hold is longer than the staleness ceiling.
    #[error("lock_at_least_for ({at_least_for:?}) is longer than lock_at_most_for ({at_most_for:?}) for lock {name}")]
    AtLeastExceedsAtMost {
        name: String,
        at_least_for: Duration,
        at_most_for: Duration,
    },

    /// A duration does not fit into the instant arithmetic.
    #[error("{field} is out of range")]
    DurationOutOfRange { field: String },
}
