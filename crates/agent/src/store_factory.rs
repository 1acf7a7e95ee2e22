use std::sync::Arc;

use cronlock_store::StorageAccessor;
use cronlock_store_memory::MemoryStorageAccessor;
#[cfg(feature = "postgres")]
use cronlock_store_postgres::{PostgresConfig, PostgresStorageAccessor};

use crate::config::StoreConfig;
use crate::error::AgentError;

/// Construct the lock record store from configuration.
///
/// SQL backends create their lock table on connect.
pub async fn create_accessor(config: &StoreConfig) -> Result<Arc<dyn StorageAccessor>, AgentError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStorageAccessor::new())),
        #[cfg(feature = "postgres")]
        "postgres" => create_postgres(config).await,
        other => Err(AgentError::Config(format!(
            "unsupported store backend: {other} (is the feature enabled?)"
        ))),
    }
}

#[cfg(feature = "postgres")]
async fn create_postgres(config: &StoreConfig) -> Result<Arc<dyn StorageAccessor>, AgentError> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| AgentError::Config("postgres backend requires 'url' in [store]".into()))?;
    let pg_config = PostgresConfig {
        url: url.to_owned(),
        table_prefix: config
            .table_prefix
            .clone()
            .unwrap_or_else(|| "cronlock_".to_owned()),
        use_db_time: config.use_db_time,
        ..PostgresConfig::default()
    };
    let accessor = PostgresStorageAccessor::new(pg_config)
        .await
        .map_err(|e| AgentError::Config(format!("postgres store: {e}")))?;
    Ok(Arc::new(accessor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_memory_backend() {
        let accessor = create_accessor(&StoreConfig::default()).await.unwrap();
        assert!(accessor.find("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_unknown_backend() {
        let config = StoreConfig {
            backend: "zookeeper".into(),
            ..StoreConfig::default()
        };
        let err = create_accessor(&config).await.err().unwrap();
        assert!(err.to_string().contains("unsupported store backend: zookeeper"));
    }
}
