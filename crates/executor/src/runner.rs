use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, warn};

use cronlock_core::{LockConfigurationExtractor, ScheduledTask};
use cronlock_store::{LockError, LockProvider};

use crate::config::{RunnerConfig, StoreFailurePolicy};
use crate::error::ExecutorError;
use crate::executor::run_holding;

/// Outcome of one scheduled trigger handled by [`ScheduledTaskRunner`].
#[derive(Debug)]
pub enum RunOutcome<T> {
    /// The task ran while holding its lock.
    Locked(T),
    /// The task declares no lock intent and ran unlocked.
    Unlocked(T),
    /// The lock store failed and the task ran unlocked per policy.
    UnlockedAfterStoreFailure { output: T, error: LockError },
    /// Another node holds the lock; this run was skipped.
    Skipped,
}

impl<T> RunOutcome<T> {
    pub fn was_executed(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Drives one scheduled trigger: extract the lock configuration, try the
/// lock, run the body, release.
pub struct ScheduledTaskRunner {
    extractor: Arc<dyn LockConfigurationExtractor>,
    provider: Arc<dyn LockProvider>,
    config: RunnerConfig,
}

impl ScheduledTaskRunner {
    pub fn new(
        extractor: Arc<dyn LockConfigurationExtractor>,
        provider: Arc<dyn LockProvider>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            extractor,
            provider,
            config,
        }
    }

    /// Handle one trigger of `task`.
    ///
    /// A malformed lock intent fails closed: the body does not run and the
    /// configuration error is returned. A store failure either skips the run
    /// (returned as an error) or runs the body unlocked, depending on
    /// [`StoreFailurePolicy`].
    pub async fn run<F, Fut, T>(
        &self,
        task: &ScheduledTask,
        body: F,
    ) -> Result<RunOutcome<T>, ExecutorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let config = match self.extractor.get_lock_configuration(task) {
            Ok(Some(config)) => config,
            Ok(None) => return Ok(RunOutcome::Unlocked(body().await)),
            Err(e) => {
                error!(task = %task, error = %e, "invalid lock configuration, not executing");
                return Err(e.into());
            }
        };

        match self.provider.try_lock(&config).await {
            Ok(Some(lock)) => Ok(RunOutcome::Locked(run_holding(lock, body).await)),
            Ok(None) => {
                info!(task = %task, lock = config.name(), "not executing, it is locked");
                Ok(RunOutcome::Skipped)
            }
            Err(e) if e.is_store_failure() => match self.config.on_store_failure {
                StoreFailurePolicy::Skip => {
                    warn!(task = %task, lock = config.name(), error = %e, "lock store failed, skipping run");
                    Err(e.into())
                }
                StoreFailurePolicy::RunUnlocked => {
                    warn!(task = %task, lock = config.name(), error = %e, "lock store failed, running unlocked");
                    Ok(RunOutcome::UnlockedAfterStoreFailure {
                        output: body().await,
                        error: e,
                    })
                }
            },
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for ScheduledTaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTaskRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeDelta;
    use cronlock_core::{
        Clock, ConfigurationError, Declaration, ExtractorDefaults, IntentConfigurationExtractor,
        LockConfiguration, ManualClock, MethodDescriptor, ScheduledMethod, SchedulerLock,
        TaskTarget, TypeDescriptor,
    };
    use cronlock_store::{SimpleLock, StorageAccessor, StorageBasedLockProvider};
    use cronlock_store_memory::MemoryStorageAccessor;

    use super::*;

    struct UnreachableStore;

    #[async_trait]
    impl LockProvider for UnreachableStore {
        async fn try_lock(
            &self,
            _config: &LockConfiguration,
        ) -> Result<Option<Box<dyn SimpleLock>>, LockError> {
            Err(LockError::Connection("connection refused".into()))
        }
    }

    fn report_job(lock: SchedulerLock) -> ScheduledTask {
        ScheduledTask::Method(ScheduledMethod {
            target: TaskTarget::Direct(Arc::new(TypeDescriptor::new("Jobs"))),
            method: MethodDescriptor::new("report")
                .with_declaration(Declaration::SchedulerLock(lock)),
        })
    }

    fn report_lock() -> SchedulerLock {
        SchedulerLock {
            lock_at_most_for: 60_000,
            lock_at_least_for: 5_000,
            ..SchedulerLock::named("reportJob")
        }
    }

    fn extractor(clock: &ManualClock) -> Arc<IntentConfigurationExtractor> {
        Arc::new(
            IntentConfigurationExtractor::new(ExtractorDefaults::default())
                .with_clock(Arc::new(clock.clone())),
        )
    }

    fn node(
        accessor: &MemoryStorageAccessor,
        clock: &ManualClock,
        policy: StoreFailurePolicy,
    ) -> ScheduledTaskRunner {
        ScheduledTaskRunner::new(
            extractor(clock),
            Arc::new(
                StorageBasedLockProvider::new(Arc::new(accessor.clone()))
                    .with_clock(Arc::new(clock.clone())),
            ),
            RunnerConfig {
                on_store_failure: policy,
            },
        )
    }

    #[tokio::test]
    async fn two_nodes_trigger_report_job() {
        let accessor = MemoryStorageAccessor::new();
        let clock = ManualClock::default();
        let started = clock.now();
        let a = node(&accessor, &clock, StoreFailurePolicy::Skip);
        let b = node(&accessor, &clock, StoreFailurePolicy::Skip);
        let runs = AtomicU32::new(0);
        let task = report_job(report_lock());

        // Node a holds the lock while node b triggers 10ms later.
        let outcome_a = a
            .run(&task, || async {
                clock.advance(TimeDelta::milliseconds(10));
                let outcome_b = b
                    .run(&task, || async {
                        runs.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
                assert!(matches!(outcome_b, RunOutcome::Skipped));

                let record = accessor.find("reportJob").await.unwrap().unwrap();
                assert_eq!(record.lock_until, started + TimeDelta::seconds(60));
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert!(matches!(outcome_a, RunOutcome::Locked(())));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Minimum hold keeps the record until started + 5s.
        let record = accessor.find("reportJob").await.unwrap().unwrap();
        assert_eq!(record.lock_until, started + TimeDelta::seconds(5));
    }

    #[tokio::test]
    async fn task_without_intent_runs_unlocked() {
        let accessor = MemoryStorageAccessor::new();
        let clock = ManualClock::default();
        let runner = node(&accessor, &clock, StoreFailurePolicy::Skip);
        let task = ScheduledTask::Opaque("adhoc".into());

        let outcome = runner.run(&task, || async { 1 }).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Unlocked(1)));
        assert!(accessor.is_empty());
    }

    #[tokio::test]
    async fn invalid_intent_fails_closed() {
        let accessor = MemoryStorageAccessor::new();
        let clock = ManualClock::default();
        let runner = node(&accessor, &clock, StoreFailurePolicy::RunUnlocked);
        let task = report_job(SchedulerLock {
            lock_at_most_for_string: "abc".into(),
            ..SchedulerLock::named("broken")
        });
        let runs = AtomicU32::new(0);

        let result = runner
            .run(&task, || async {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(matches!(
            result,
            Err(ExecutorError::Configuration(ConfigurationError::InvalidDuration { .. }))
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failure_skips_by_default() {
        let clock = ManualClock::default();
        let runner = ScheduledTaskRunner::new(
            extractor(&clock),
            Arc::new(UnreachableStore),
            RunnerConfig::default(),
        );
        let result = runner.run(&report_job(report_lock()), || async { 1 }).await;
        assert!(matches!(result, Err(ExecutorError::Lock(e)) if e.is_store_failure()));
    }

    #[tokio::test]
    async fn store_failure_can_run_unlocked() {
        let clock = ManualClock::default();
        let runner = ScheduledTaskRunner::new(
            extractor(&clock),
            Arc::new(UnreachableStore),
            RunnerConfig {
                on_store_failure: StoreFailurePolicy::RunUnlocked,
            },
        );
        let outcome = runner
            .run(&report_job(report_lock()), || async { 1 })
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::UnlockedAfterStoreFailure { output: 1, .. }
        ));
    }

    #[tokio::test]
    async fn next_trigger_after_expiry_runs_again() {
        let accessor = MemoryStorageAccessor::new();
        let clock = ManualClock::default();
        let a = node(&accessor, &clock, StoreFailurePolicy::Skip);
        let b = node(&accessor, &clock, StoreFailurePolicy::Skip);
        let task = report_job(report_lock());

        assert!(a.run(&task, || async {}).await.unwrap().was_executed());
        clock.advance(TimeDelta::seconds(1));
        assert!(!b.run(&task, || async {}).await.unwrap().was_executed());
        clock.advance(TimeDelta::from_std(Duration::from_secs(5)).unwrap());
        assert!(b.run(&task, || async {}).await.unwrap().was_executed());
    }
}
