//! One-shot backend selection at process start.

use std::sync::Arc;

use configs::{AppConfig, DatabaseConfig, StorageKind};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::storage::{DocumentBackend, JsonSnapshotStore, PgDocumentStore};
use crate::store::Store;

/// Build the process-wide store from configuration.
pub async fn build_store(cfg: &AppConfig) -> Arc<Store> {
    let backend = select_backend(&cfg.database).await;
    info!(mode = %backend.mode(), prefix = %cfg.bot.prefix, "record store ready");
    Arc::new(Store::new(backend, cfg.bot.prefix.clone()))
}

/// Postgres when configured and reachable, otherwise the JSON file.
/// Never fails: every remote problem is logged and answered with the file backend.
pub async fn select_backend(cfg: &DatabaseConfig) -> Arc<dyn DocumentBackend> {
    if cfg.kind == StorageKind::Json {
        info!(path = %cfg.path, "using JSON file storage");
        return open_file(cfg).await;
    }
    match connect_remote(cfg).await {
        Ok(db) => {
            info!("connected to Postgres");
            Arc::new(PgDocumentStore::new(db))
        }
        Err(e) => {
            warn!(error = %e, path = %cfg.path, "remote storage unavailable; falling back to JSON file");
            open_file(cfg).await
        }
    }
}

/// Connect and migrate within `connect_timeout`.
pub async fn connect_remote(cfg: &DatabaseConfig) -> Result<DatabaseConnection, StoreError> {
    if !cfg.has_remote_url() {
        return Err(StoreError::Configuration("database.url is missing or not a postgres:// URL".into()));
    }
    let attempt = async {
        let db = models::db::connect_with_config(cfg)
            .await
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;
        Migrator::up(&db, None).await.map_err(|e| StoreError::Connectivity(format!("migration failed: {e}")))?;
        Ok::<_, StoreError>(db)
    };
    match tokio::time::timeout(cfg.connect_timeout(), attempt).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Connectivity(format!(
            "no answer within {}s",
            cfg.connect_timeout_secs
        ))),
    }
}

async fn open_file(cfg: &DatabaseConfig) -> Arc<dyn DocumentBackend> {
    if let Err(e) = common::env::ensure_data_dir(&cfg.path).await {
        warn!(error = %e, "data directory unavailable; reads will return empty data");
    }
    JsonSnapshotStore::new(&cfg.path, cfg.cache_ttl()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BackendMode;

    #[tokio::test]
    async fn missing_url_is_a_configuration_error() {
        let cfg = DatabaseConfig::default();
        assert!(matches!(connect_remote(&cfg).await, Err(StoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn file_kind_never_dials() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join(format!("bootstrap_{}", uuid::Uuid::new_v4()));
        let cfg = DatabaseConfig {
            kind: StorageKind::Json,
            url: "postgres://127.0.0.1:1/never".into(),
            path: dir.join("db.json").to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        };
        let backend = select_backend(&cfg).await;
        assert_eq!(backend.mode(), BackendMode::File);
        assert!(tokio::fs::metadata(dir.join("db.json")).await.is_ok());
        let _ = tokio::fs::remove_dir_all(&dir).await;
        Ok(())
    }
}
