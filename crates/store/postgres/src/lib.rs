mod accessor;
mod config;
mod migrations;

pub use accessor::PostgresStorageAccessor;
pub use config::PostgresConfig;
pub use migrations::run_migrations;
