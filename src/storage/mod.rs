//! Storage layer
//!
//! SQLite holds filters, consequence state and the abuse log; variable dumps
//! go to content-addressed blob files next to the database.

pub mod blob;
pub mod database;
pub mod sqlite;

use crate::config::Config;
use crate::error::Result;
use crate::stores::Services;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use blob::BlobStore;
pub use database::{Database, DbPool};
pub use sqlite::{GroupChange, SqliteStore};

const DB_FILE: &str = "abusefilter.db";

/// Opens the database and blob store under one data directory
pub struct StorageManager {
    pub store: Arc<SqliteStore>,
    pub blobs: Arc<BlobStore>,
    base_path: PathBuf,
}

impl StorageManager {
    pub fn new(base_path: PathBuf, compression_threshold: usize) -> Result<Self> {
        std::fs::create_dir_all(&base_path).map_err(|e| crate::error::AbuseFilterError::Io {
            source: e,
            context: format!("Failed to create data directory: {}", base_path.display()),
        })?;

        let database = Database::new(&base_path.join(DB_FILE))?;
        let blobs = BlobStore::new(base_path.clone(), compression_threshold)?;
        tracing::debug!("Opened storage at {}", base_path.display());

        Ok(Self {
            store: Arc::new(SqliteStore::new(database)),
            blobs: Arc::new(blobs),
            base_path,
        })
    }

    /// Open the storage configured in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.resolved_data_dir()?,
            config.storage.compression_threshold,
        )
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Collaborators for the engine, all backed by this storage
    pub fn services(&self) -> Services {
        Services::from_backend(self.store.clone(), self.blobs.clone())
    }
}
