pub mod config;
pub mod error;
pub mod executor;
pub mod runner;

pub use config::{RunnerConfig, StoreFailurePolicy};
pub use error::ExecutorError;
pub use executor::{LockingTaskExecutor, TaskResult};
pub use runner::{RunOutcome, ScheduledTaskRunner};
