//! Cron-driven job loops.
//!
//! Every job gets its own task that sleeps until the next cron occurrence and
//! then runs the job's command through the [`ScheduledTaskRunner`]. All nodes
//! run the same schedule; the scheduler lock decides which one executes.

use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use cronlock_core::ScheduledTask;
use cronlock_executor::{ExecutorError, RunOutcome, ScheduledTaskRunner};

use crate::config::JobConfig;
use crate::error::AgentError;

/// A job with its parsed schedule.
#[derive(Debug)]
pub struct Job {
    config: JobConfig,
    task: ScheduledTask,
    cron: croner::Cron,
    timezone: chrono_tz::Tz,
}

impl Job {
    /// Parse the job's cron expression and timezone.
    pub fn new(config: JobConfig) -> Result<Self, AgentError> {
        let cron = croner::Cron::new(&config.cron)
            .parse()
            .map_err(|e| AgentError::Cron {
                job: config.name.clone(),
                message: format!("invalid cron expression: {e}"),
            })?;
        let timezone = config
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| AgentError::Cron {
                job: config.name.clone(),
                message: format!("invalid timezone: {}", config.timezone),
            })?;
        let task = config.task();
        Ok(Self {
            config,
            task,
            cron,
            timezone,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn task(&self) -> &ScheduledTask {
        &self.task
    }

    /// Next trigger strictly after `after`, or `None` if the expression never
    /// fires again.
    pub fn next_occurrence(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let after_tz = after.with_timezone(&self.timezone);
        self.cron
            .find_next_occurrence(&after_tz, false)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    async fn spawn_command(&self) -> io::Result<ExitStatus> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .status()
            .await
    }
}

/// Run `job` once, now, under its scheduler lock.
///
/// The command's own exit status is part of the returned outcome; only
/// failures that keep the command from being considered at all are errors.
pub async fn run_once(
    job: &Job,
    runner: &ScheduledTaskRunner,
) -> Result<RunOutcome<io::Result<ExitStatus>>, ExecutorError> {
    let outcome = runner.run(job.task(), || job.spawn_command()).await?;
    match &outcome {
        RunOutcome::Locked(status)
        | RunOutcome::Unlocked(status)
        | RunOutcome::UnlockedAfterStoreFailure { output: status, .. } => {
            log_exit(job.name(), status);
        }
        RunOutcome::Skipped => debug!(job = job.name(), "run skipped"),
    }
    Ok(outcome)
}

fn log_exit(job: &str, status: &io::Result<ExitStatus>) {
    match status {
        Ok(status) if status.success() => info!(job, "job finished"),
        Ok(status) => warn!(job, status = %status, "job exited with failure"),
        Err(e) => error!(job, error = %e, "failed to start job command"),
    }
}

/// Owns the job loops of one agent process.
#[derive(Debug)]
pub struct Scheduler {
    jobs: Vec<Arc<Job>>,
    runner: Arc<ScheduledTaskRunner>,
}

impl Scheduler {
    pub fn new(jobs: Vec<Job>, runner: Arc<ScheduledTaskRunner>) -> Self {
        Self {
            jobs: jobs.into_iter().map(Arc::new).collect(),
            runner,
        }
    }

    /// Run every job loop until `shutdown` resolves.
    ///
    /// Runs already in progress finish before this returns; no new run starts
    /// after shutdown is requested.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handles: Vec<_> = self
            .jobs
            .iter()
            .map(|job| {
                tokio::spawn(job_loop(
                    Arc::clone(job),
                    Arc::clone(&self.runner),
                    stop_rx.clone(),
                ))
            })
            .collect();
        info!(jobs = handles.len(), "scheduler started");

        shutdown.await;
        info!("shutdown requested, waiting for running jobs");
        let _ = stop_tx.send(true);

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "job loop panicked");
            }
        }
        info!("scheduler stopped");
    }
}

async fn job_loop(job: Arc<Job>, runner: Arc<ScheduledTaskRunner>, mut stop: watch::Receiver<bool>) {
    loop {
        let now = Utc::now();
        let Some(next) = job.next_occurrence(&now) else {
            warn!(job = job.name(), "cron expression has no future occurrences");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(job = job.name(), next = %next, "waiting for next trigger");

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            _ = stop.changed() => return,
        }

        if let Err(e) = run_once(&job, &runner).await {
            match e {
                ExecutorError::Configuration(_) => {
                    error!(job = job.name(), error = %e, "job not run");
                }
                ExecutorError::Lock(_) => warn!(job = job.name(), error = %e, "job not run"),
            }
        }
    }
}
