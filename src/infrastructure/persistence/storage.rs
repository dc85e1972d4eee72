//! Backend selection.

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::repositories::UrlStorage;
use crate::error::AppError;

use super::{FileStorage, MemoryStorage, PgSettings, PgUrlStorage};

/// Which storage backend to run with, chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    File(PathBuf),
    Postgres { dsn: String },
}

impl StorageKind {
    /// Picks the backend from the configured locations.
    ///
    /// A DSN wins over a file path, and a file path wins over memory. Empty
    /// strings count as unset.
    pub fn select(dsn: Option<&str>, file_path: Option<&str>) -> Self {
        if let Some(dsn) = dsn.filter(|s| !s.is_empty()) {
            return Self::Postgres {
                dsn: dsn.to_string(),
            };
        }

        if let Some(path) = file_path.filter(|s| !s.is_empty()) {
            return Self::File(PathBuf::from(path));
        }

        Self::Memory
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
            Self::Postgres { .. } => "postgres",
        }
    }

    /// Builds the backend. A database that is unreachable or fails to migrate
    /// is fatal here.
    pub async fn open(
        self,
        base_url: &str,
        pg: &PgSettings,
    ) -> Result<Arc<dyn UrlStorage>, AppError> {
        let storage: Arc<dyn UrlStorage> = match self {
            Self::Memory => Arc::new(MemoryStorage::new()),
            Self::File(path) => Arc::new(FileStorage::open(path, base_url).await?),
            Self::Postgres { dsn } => Arc::new(PgUrlStorage::connect(&dsn, pg).await?),
        };

        tracing::info!(backend = storage.backend_name(), "Storage ready");
        Ok(storage)
    }
}
