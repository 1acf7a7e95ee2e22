use thiserror::Error;

use cronlock_core::ConfigurationError;
use cronlock_executor::ExecutorError;

/// Errors that can occur when running the cronlock agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent configuration file is malformed or incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. reading the configuration file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A job run failed before its command could be started.
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// A job's cron expression or timezone is invalid.
    #[error("cron error for job {job}: {message}")]
    Cron { job: String, message: String },
}

impl From<ConfigurationError> for AgentError {
    fn from(e: ConfigurationError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<toml::de::Error> for AgentError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
