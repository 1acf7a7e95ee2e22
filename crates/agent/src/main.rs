use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use cronlock_agent::config::AgentConfig;
use cronlock_agent::error::AgentError;
use cronlock_agent::scheduler::{Job, Scheduler};
use cronlock_agent::store_factory::create_accessor;
use cronlock_agent::telemetry::{self, LogFormat};
use cronlock_core::LockConfigurationExtractor;
use cronlock_executor::ScheduledTaskRunner;
use cronlock_store::StorageBasedLockProvider;

/// Cron agent running jobs under cluster-wide scheduler locks.
#[derive(Parser, Debug)]
#[command(
    name = "cronlock-agent",
    about = "Runs cron jobs on at most one node at a time"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "cronlock.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Schedule every job and run until interrupted (default).
    Run,
    /// Validate the configuration and print each job's lock configuration.
    Check,
    /// Create the lock table for SQL backends and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    let config = AgentConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await?,
        Commands::Check => check(&config)?,
        Commands::Migrate => migrate(&config).await?,
    }
    Ok(())
}

fn build_jobs(config: &AgentConfig) -> Result<Vec<Job>, AgentError> {
    config.jobs.iter().cloned().map(Job::new).collect()
}

async fn run(config: AgentConfig) -> Result<(), AgentError> {
    let jobs = build_jobs(&config)?;
    let extractor = config.extractor()?;

    // Refuse to start with a malformed lock declaration.
    for job in &jobs {
        extractor.get_lock_configuration(job.task())?;
    }

    let accessor = create_accessor(&config.store).await?;
    let mut provider = StorageBasedLockProvider::new(accessor);
    if let Some(holder) = &config.store.holder {
        provider = provider.with_holder(holder.clone());
    }
    info!(
        backend = %config.store.backend,
        holder = provider.holder(),
        "lock store initialized"
    );

    let runner = ScheduledTaskRunner::new(
        Arc::new(extractor),
        Arc::new(provider),
        config.runner_config(),
    );
    Scheduler::new(jobs, Arc::new(runner))
        .run(shutdown_signal())
        .await;
    Ok(())
}

fn check(config: &AgentConfig) -> Result<(), AgentError> {
    let jobs = build_jobs(config)?;
    let extractor = config.extractor()?;
    let now = Utc::now();

    for job in &jobs {
        let next = job
            .next_occurrence(&now)
            .map_or_else(|| "never".to_owned(), |t| t.to_rfc3339());
        match extractor.get_lock_configuration(job.task())? {
            Some(lock) => println!(
                "{}: lock {} at most {:?} at least {:?}, next run {next}",
                job.name(),
                lock.name(),
                lock.lock_at_most_for(),
                lock.lock_at_least_for(),
            ),
            None => println!("{}: unlocked, next run {next}", job.name()),
        }
    }
    println!("{} job(s) ok", jobs.len());
    Ok(())
}

async fn migrate(config: &AgentConfig) -> Result<(), AgentError> {
    if config.store.backend == "memory" {
        info!("memory backend needs no migration");
        return Ok(());
    }
    create_accessor(&config.store).await?;
    info!(backend = %config.store.backend, "lock table ready");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
