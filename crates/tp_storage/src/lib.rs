use clap::ValueEnum;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tp_core::{Result, Storage};

pub mod backends;

pub use backends::*;

pub trait StorageBackend: Send + Sync {
    /// Hint shown to the operator when the backend cannot be opened.
    fn get_error_message() -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    #[default]
    Memory,
    Sqlite,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Memory => write!(f, "memory"),
            StorageKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Open the selected backend. `db_path` is only used by SQLite.
pub async fn create_storage(kind: StorageKind, db_path: &Path) -> Result<Arc<dyn Storage>> {
    match kind {
        StorageKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        #[cfg(feature = "sqlite")]
        StorageKind::Sqlite => {
            let storage = SqliteStorage::new_with_path(db_path).await.map_err(|e| {
                tracing::error!("{}", SqliteStorage::get_error_message());
                e
            })?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageKind::Sqlite => {
            let _ = db_path;
            Err(tp_core::Error::Storage(
                "SQLite support not compiled in; rebuild with the `sqlite` feature".to_string(),
            ))
        }
    }
}
