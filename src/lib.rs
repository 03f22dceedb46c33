pub mod admin;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod progress;
pub mod scoring;
pub mod services;
pub mod storage;
pub mod validation;

pub use error::{Error, Result};

use std::sync::Arc;

use config::{Config, StorageConfig};
use services::AuthService;
use storage::{FileStore, MemoryStore, Storage, StorageError};

pub struct AppState {
    pub config: Config,
    pub storage: Storage,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(config: Config, storage: Storage) -> Self {
        let auth = AuthService::for_backend(storage.clone(), config.mock.auth_delay());
        Self {
            config,
            storage,
            auth,
        }
    }
}

/// Open the configured file store, or a throwaway in-memory one
pub fn open_storage(config: &StorageConfig, ephemeral: bool) -> Result<Storage, StorageError> {
    if ephemeral {
        tracing::info!("Using in-memory storage; nothing will be persisted");
        return Ok(Storage::new(Arc::new(MemoryStore::new(config.max_value_bytes))));
    }
    let store = FileStore::open(&config.data_dir, config.max_value_bytes)?;
    Ok(Storage::new(Arc::new(store)))
}
