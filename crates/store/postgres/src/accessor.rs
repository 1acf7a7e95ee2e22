use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use cronlock_store::{LockError, LockRecord, StorageAccessor};

use crate::config::PostgresConfig;
use crate::migrations;

/// `NOW()` shifted by a millisecond offset bound at `$n`.
fn db_time_plus(param: usize) -> String {
    format!("NOW() + ${param} * INTERVAL '1 millisecond'")
}

/// Offset of `to` from `from`, as bound into [`db_time_plus`].
fn offset_millis(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds()
}

/// Map a driver error onto a store failure.
fn store_error(e: sqlx::Error) -> LockError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => LockError::Connection(e.to_string()),
        other => LockError::Backend(other.to_string()),
    }
}

/// PostgreSQL-backed implementation of [`StorageAccessor`].
///
/// Each primitive is a single statement on the `{prefix}locks` table; the
/// conditional ones report the stored `lock_until` through `RETURNING`.
///
/// Lock times come from the caller's clock unless
/// [`PostgresConfig::use_db_time`] is set, in which case every instant is
/// `NOW()` plus the caller's requested offset.
pub struct PostgresStorageAccessor {
    pool: PgPool,
    config: Arc<PostgresConfig>,
}

impl PostgresStorageAccessor {
    /// Create a new `PostgresStorageAccessor` from the provided configuration.
    ///
    /// Connects to `PostgreSQL`, creates the connection pool, and runs
    /// migrations to ensure the lock table exists.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Connection`] if the URL is invalid or pool creation
    /// fails, or [`LockError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, LockError> {
        let connect_options: sqlx::postgres::PgConnectOptions = config
            .url
            .parse()
            .map_err(|e: sqlx::Error| LockError::Connection(e.to_string()))?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(connect_options)
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create a `PostgresStorageAccessor` from an existing pool and config.
    ///
    /// Runs migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, LockError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }
}

#[async_trait]
impl StorageAccessor for PostgresStorageAccessor {
    async fn insert_if_absent(
        &self,
        record: &LockRecord,
    ) -> Result<Option<DateTime<Utc>>, LockError> {
        let table = self.config.locks_table();
        let row: Option<(DateTime<Utc>,)> = if self.config.use_db_time {
            let query = format!(
                "INSERT INTO {table} (name, lock_until, locked_at, locked_by) \
                 VALUES ($1, {lock_until}, NOW(), $3) \
                 ON CONFLICT (name) DO NOTHING \
                 RETURNING lock_until",
                lock_until = db_time_plus(2),
            );
            sqlx::query_as(&query)
                .bind(&record.name)
                .bind(offset_millis(record.locked_at, record.lock_until))
                .bind(&record.locked_by)
                .fetch_optional(&self.pool)
                .await
        } else {
            let query = format!(
                "INSERT INTO {table} (name, lock_until, locked_at, locked_by) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (name) DO NOTHING \
                 RETURNING lock_until"
            );
            sqlx::query_as(&query)
                .bind(&record.name)
                .bind(record.lock_until)
                .bind(record.locked_at)
                .bind(&record.locked_by)
                .fetch_optional(&self.pool)
                .await
        }
        .map_err(|e| {
            warn!(lock = %record.name, error = %e, "lock record insert failed");
            store_error(e)
        })?;

        Ok(row.map(|(lock_until,)| lock_until))
    }

    async fn update_if_expired(
        &self,
        record: &LockRecord,
    ) -> Result<Option<DateTime<Utc>>, LockError> {
        let table = self.config.locks_table();
        let row: Option<(DateTime<Utc>,)> = if self.config.use_db_time {
            let query = format!(
                "UPDATE {table} \
                 SET lock_until = {lock_until}, locked_at = NOW(), locked_by = $2 \
                 WHERE name = $3 AND lock_until <= NOW() \
                 RETURNING lock_until",
                lock_until = db_time_plus(1),
            );
            sqlx::query_as(&query)
                .bind(offset_millis(record.locked_at, record.lock_until))
                .bind(&record.locked_by)
                .bind(&record.name)
                .fetch_optional(&self.pool)
                .await
        } else {
            let query = format!(
                "UPDATE {table} \
                 SET lock_until = $1, locked_at = $2, locked_by = $3 \
                 WHERE name = $4 AND lock_until <= $2 \
                 RETURNING lock_until"
            );
            sqlx::query_as(&query)
                .bind(record.lock_until)
                .bind(record.locked_at)
                .bind(&record.locked_by)
                .bind(&record.name)
                .fetch_optional(&self.pool)
                .await
        }
        .map_err(|e| {
            warn!(lock = %record.name, error = %e, "lock record update failed");
            store_error(e)
        })?;

        Ok(row.map(|(lock_until,)| lock_until))
    }

    async fn update_if_owned_and_unexpired(
        &self,
        name: &str,
        expected_lock_until: DateTime<Utc>,
        new_lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, LockError> {
        let table = self.config.locks_table();
        let row: Option<(DateTime<Utc>,)> = if self.config.use_db_time {
            let query = format!(
                "UPDATE {table} \
                 SET lock_until = {lock_until} \
                 WHERE name = $2 AND lock_until = $3 AND lock_until > NOW() \
                 RETURNING lock_until",
                lock_until = db_time_plus(1),
            );
            sqlx::query_as(&query)
                .bind(offset_millis(now, new_lock_until))
                .bind(name)
                .bind(expected_lock_until)
                .fetch_optional(&self.pool)
                .await
        } else {
            let query = format!(
                "UPDATE {table} \
                 SET lock_until = $1 \
                 WHERE name = $2 AND lock_until = $3 AND lock_until > $4 \
                 RETURNING lock_until"
            );
            sqlx::query_as(&query)
                .bind(new_lock_until)
                .bind(name)
                .bind(expected_lock_until)
                .bind(now)
                .fetch_optional(&self.pool)
                .await
        }
        .map_err(store_error)?;

        Ok(row.map(|(lock_until,)| lock_until))
    }

    async fn set_lock_until_floor(
        &self,
        name: &str,
        expected_lock_until: DateTime<Utc>,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), LockError> {
        let table = self.config.locks_table();
        let result = if self.config.use_db_time {
            let query = format!(
                "UPDATE {table} \
                 SET lock_until = {lock_until} \
                 WHERE name = $2 AND lock_until = $3",
                lock_until = db_time_plus(1),
            );
            sqlx::query(&query)
                .bind(offset_millis(now, lock_until))
                .bind(name)
                .bind(expected_lock_until)
                .execute(&self.pool)
                .await
        } else {
            let query = format!(
                "UPDATE {table} \
                 SET lock_until = $1 \
                 WHERE name = $2 AND lock_until = $3"
            );
            sqlx::query(&query)
                .bind(lock_until)
                .bind(name)
                .bind(expected_lock_until)
                .execute(&self.pool)
                .await
        };
        result.map_err(store_error)?;

        Ok(())
    }

    async fn find(&self, name: &str) -> Result<Option<LockRecord>, LockError> {
        let table = self.config.locks_table();
        let query = format!(
            "SELECT name, lock_until, locked_at, locked_by FROM {table} WHERE name = $1"
        );

        let row: Option<(String, DateTime<Utc>, DateTime<Utc>, String)> =
            sqlx::query_as(&query)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

        Ok(row.map(|(name, lock_until, locked_at, locked_by)| LockRecord {
            name,
            lock_until,
            locked_at,
            locked_by,
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[tokio::test]
    async fn bad_url_is_a_connection_failure() {
        let config = PostgresConfig {
            url: "not a url".into(),
            ..PostgresConfig::default()
        };
        let err = PostgresStorageAccessor::new(config)
            .await
            .err()
            .expect("invalid url must be rejected");
        assert!(matches!(err, LockError::Connection(_)));
    }

    #[test]
    fn pool_errors_are_connection_failures() {
        assert!(matches!(
            store_error(sqlx::Error::PoolTimedOut),
            LockError::Connection(_)
        ));
        assert!(matches!(
            store_error(sqlx::Error::RowNotFound),
            LockError::Backend(_)
        ));
    }

    #[test]
    fn db_time_offsets_are_relative_to_the_caller_instant() {
        let now = Utc::now();
        assert_eq!(offset_millis(now, now + TimeDelta::seconds(30)), 30_000);
        assert_eq!(offset_millis(now, now), 0);
        assert_eq!(db_time_plus(2), "NOW() + $2 * INTERVAL '1 millisecond'");
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use std::time::Duration;

    use chrono::TimeDelta;
    use cronlock_core::{Clock, LockConfiguration, ManualClock};
    use cronlock_store::testing::{
        run_provider_conformance_tests, run_wall_clock_conformance_tests,
    };
    use cronlock_store::{LockProvider, StorageBasedLockProvider};

    use super::*;

    fn test_config() -> PostgresConfig {
        PostgresConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/cronlock_test".to_string()),
            table_prefix: format!("test_{}_", uuid::Uuid::new_v4().simple()),
            ..PostgresConfig::default()
        }
    }

    fn db_time_config() -> PostgresConfig {
        PostgresConfig {
            use_db_time: true,
            ..test_config()
        }
    }

    #[tokio::test]
    async fn lock_conformance() {
        let accessor = PostgresStorageAccessor::new(test_config())
            .await
            .expect("pool creation should succeed");
        run_provider_conformance_tests(Arc::new(accessor))
            .await
            .expect("lock conformance tests should pass");
    }

    #[tokio::test]
    async fn wall_clock_conformance() {
        let accessor = PostgresStorageAccessor::new(test_config())
            .await
            .expect("pool creation should succeed");
        run_wall_clock_conformance_tests(Arc::new(accessor))
            .await
            .expect("wall-clock conformance tests should pass");
    }

    #[tokio::test]
    async fn db_time_conformance() {
        let accessor = PostgresStorageAccessor::new(db_time_config())
            .await
            .expect("pool creation should succeed");
        run_wall_clock_conformance_tests(Arc::new(accessor))
            .await
            .expect("wall-clock conformance tests should pass");
    }

    #[tokio::test]
    async fn db_time_ignores_caller_clock_skew() {
        let accessor: Arc<dyn StorageAccessor> = Arc::new(
            PostgresStorageAccessor::new(db_time_config())
                .await
                .expect("pool creation should succeed"),
        );
        // Node a runs an hour behind, node b an hour ahead.
        let behind = ManualClock::new(Utc::now() - TimeDelta::hours(1));
        let ahead = ManualClock::new(Utc::now() + TimeDelta::hours(1));
        let a = StorageBasedLockProvider::new(Arc::clone(&accessor))
            .with_clock(Arc::new(behind.clone()))
            .with_holder("node-a");
        let b = StorageBasedLockProvider::new(Arc::clone(&accessor))
            .with_clock(Arc::new(ahead.clone()))
            .with_holder("node-b");
        let name = format!("skew-{}", uuid::Uuid::new_v4().simple());
        let cfg = |clock: &ManualClock| {
            LockConfiguration::new(clock.now(), &name, Duration::from_secs(60), Duration::ZERO)
                .unwrap()
        };

        let lock = a.try_lock(&cfg(&behind)).await.unwrap().expect("should acquire");
        let record = accessor.find(&name).await.unwrap().unwrap();
        assert_eq!(record.lock_until - record.locked_at, TimeDelta::seconds(60));
        assert!(record.locked_at > behind.now() + TimeDelta::minutes(30));

        assert!(
            b.try_lock(&cfg(&ahead)).await.unwrap().is_none(),
            "a caller clock running ahead must not see the lock as stale"
        );

        lock.unlock().await.unwrap();
        assert!(b.try_lock(&cfg(&ahead)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn long_names_and_holders_are_stored() {
        let accessor: Arc<dyn StorageAccessor> = Arc::new(
            PostgresStorageAccessor::new(test_config())
                .await
                .expect("pool creation should succeed"),
        );
        let clock = ManualClock::default();
        let holder = "h".repeat(512);
        let provider = StorageBasedLockProvider::new(Arc::clone(&accessor))
            .with_clock(Arc::new(clock.clone()))
            .with_holder(holder.clone());
        let name = format!("{}-{}", "n".repeat(300), uuid::Uuid::new_v4().simple());
        let cfg =
            LockConfiguration::new(clock.now(), &name, Duration::from_secs(10), Duration::ZERO)
                .unwrap();

        assert!(provider.try_lock(&cfg).await.unwrap().is_some());
        let record = accessor.find(&name).await.unwrap().unwrap();
        assert_eq!(record.locked_by, holder);
    }
}
