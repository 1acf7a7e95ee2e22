//! Cron agent for cronlock.
//!
//! Loads a TOML file of cron jobs, builds the configured lock store and runs
//! each job's command under its scheduler lock, so that a fleet of agents
//! with the same configuration runs every trigger on at most one node.

pub mod config;
pub mod error;
pub mod scheduler;
pub mod store_factory;
pub mod telemetry;
