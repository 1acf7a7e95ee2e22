use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use cronlock_core::LockConfiguration;
use cronlock_store::{LockError, LockProvider, SimpleLock};

/// Outcome of [`LockingTaskExecutor::execute_with_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult<T> {
    /// The lock was obtained and the task ran.
    Executed(T),
    /// The lock is held elsewhere; the task did not run.
    Skipped,
}

impl<T> TaskResult<T> {
    pub fn was_executed(&self) -> bool {
        matches!(self, Self::Executed(_))
    }

    pub fn into_output(self) -> Option<T> {
        match self {
            Self::Executed(output) => Some(output),
            Self::Skipped => None,
        }
    }
}

/// Runs a task body only while holding its lock.
#[derive(Clone)]
pub struct LockingTaskExecutor {
    provider: Arc<dyn LockProvider>,
}

impl LockingTaskExecutor {
    pub fn new(provider: Arc<dyn LockProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn LockProvider> {
        &self.provider
    }

    /// Try to lock `config` and run `task` if that succeeds.
    ///
    /// The lock is released once the task finishes, whatever it returns.
    /// Losing the race is reported as [`TaskResult::Skipped`], a store
    /// failure as an error.
    pub async fn execute_with_lock<F, Fut, T>(
        &self,
        config: &LockConfiguration,
        task: F,
    ) -> Result<TaskResult<T>, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.provider.try_lock(config).await? {
            Some(lock) => Ok(TaskResult::Executed(run_holding(lock, task).await)),
            None => {
                info!(lock = config.name(), "not executing, it is locked");
                Ok(TaskResult::Skipped)
            }
        }
    }
}

impl std::fmt::Debug for LockingTaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockingTaskExecutor").finish_non_exhaustive()
    }
}

/// Run `task` and release `lock` afterwards.
///
/// A failed release is logged, not returned: the task already ran and the
/// record expires at `lock_at_most_until` anyway.
pub(crate) async fn run_holding<F, Fut, T>(lock: Box<dyn SimpleLock>, task: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let name = lock.configuration().name().to_owned();
    debug!(lock = %name, "locked, executing task");
    let output = task().await;
    if let Err(e) = lock.unlock().await {
        warn!(lock = %name, error = %e, "failed to release lock, it expires at lock_at_most_until");
    }
    output
}
