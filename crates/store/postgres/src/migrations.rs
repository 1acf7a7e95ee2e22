use sqlx::PgPool;

use crate::config::PostgresConfig;

/// DDL for the lock table.
///
/// The primary key on `name` is the uniqueness constraint that makes two
/// concurrent first acquisitions of the same name impossible. Names and
/// holders are unbounded `TEXT`.
fn create_locks_table(config: &PostgresConfig) -> String {
    let locks_table = config.locks_table();
    format!(
        "CREATE TABLE IF NOT EXISTS {locks_table} (
            name TEXT PRIMARY KEY,
            lock_until TIMESTAMPTZ NOT NULL,
            locked_at TIMESTAMPTZ NOT NULL,
            locked_by TEXT NOT NULL
        )"
    )
}

/// Run database migrations, creating the lock table if it does not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    sqlx::query(&create_locks_table(config)).execute(pool).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_table_has_unbounded_text_columns() {
        let ddl = create_locks_table(&PostgresConfig::default());
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS public.cronlock_locks"));
        assert!(ddl.contains("name TEXT PRIMARY KEY"));
        assert!(ddl.contains("locked_by TEXT NOT NULL"));
        assert!(!ddl.contains("VARCHAR"));
    }
}
