pub mod app_config;
pub mod database;
pub mod memory;
pub mod redis_repo;

pub use database::DbClient;
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;

use std::sync::Arc;

use app_config::{StorageBackend, StorageConfig};
use spacesync_core::Store;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("storage.database_url is required for the postgres backend")]
    MissingUrl,
    #[error("database connection failed: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Builds the configured store, running migrations for PostgreSQL.
pub async fn connect(cfg: &StorageConfig) -> Result<Arc<dyn Store>, ConnectError> {
    match cfg.backend {
        StorageBackend::Postgres => {
            let url = cfg.database_url.as_deref().ok_or(ConnectError::MissingUrl)?;
            let db = DbClient::new(url, cfg.max_connections).await?;
            db.migrate().await?;
            Ok(Arc::new(db))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
