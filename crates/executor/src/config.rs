use serde::Deserialize;

/// What to do with a task when the lock store itself fails.
///
/// Losing the race for a lock always skips the run; this only covers an
/// unreachable or erroring store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Do not run the task and report the failure.
    #[default]
    Skip,
    /// Run the task without mutual exclusion.
    RunUnlocked,
}

/// Configuration for the [`ScheduledTaskRunner`](crate::ScheduledTaskRunner).
///
/// # Examples
///
/// ```
/// use cronlock_executor::{RunnerConfig, StoreFailurePolicy};
///
/// let config = RunnerConfig::default();
/// assert_eq!(config.on_store_failure, StoreFailurePolicy::Skip);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Policy applied when acquiring the lock fails with a store error.
    pub on_store_failure: StoreFailurePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_fails_safe() {
        assert_eq!(
            RunnerConfig::default().on_store_failure,
            StoreFailurePolicy::Skip
        );
    }
}
