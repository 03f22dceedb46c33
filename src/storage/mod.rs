//! Key-value persistence for everything the app keeps between runs.
//!
//! Values are stored as JSON text under a fixed, namespaced key space.
//! Each `set` is a single atomic write of one key. Callers that read a value,
//! change it and write it back hold [`Storage::lock`] for the whole cycle so
//! concurrent handlers sharing one `Storage` do not overwrite each other.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use parking_lot::{Mutex, MutexGuard};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const NAMESPACE: &str = "bandwise";

/// Keys of the persistent key space
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Progress record of one user
    Progress(String),
    Events,
    Registrations,
    Users,
    DatabaseConfig,
    AuthToken,
    CurrentUser,
    /// Token hash to user id map kept by the mock backend
    Sessions,
}

impl StorageKey {
    pub fn as_string(&self) -> String {
        match self {
            StorageKey::Progress(user_id) => {
                format!("{NAMESPACE}.progress.{}", key_segment(user_id))
            }
            StorageKey::Events => format!("{NAMESPACE}.events"),
            StorageKey::Registrations => format!("{NAMESPACE}.registrations"),
            StorageKey::Users => format!("{NAMESPACE}.users"),
            StorageKey::DatabaseConfig => format!("{NAMESPACE}.database_config"),
            StorageKey::AuthToken => format!("{NAMESPACE}.auth_token"),
            StorageKey::CurrentUser => format!("{NAMESPACE}.current_user"),
            StorageKey::Sessions => format!("{NAMESPACE}.sessions"),
        }
    }
}

/// Escape a free-form id so every backend accepts it: ASCII letters, digits
/// and `-` pass through, every other byte becomes `_xx` (lowercase hex)
fn key_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "_{byte:02x}");
        }
    }
    out
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Stored value for '{key}' is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize value for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage quota exceeded for '{key}': {size} bytes (limit {limit})")]
    QuotaExceeded { key: String, size: usize, limit: usize },

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw string storage backend
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed JSON facade over a shared backend.
///
/// Cloning is cheap; all clones see the same backend and share one update lock.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KeyValueStore>,
    update_lock: Arc<Mutex<()>>,
}

impl Storage {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            update_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Serialize read-modify-write cycles across all clones.
    ///
    /// Not reentrant. Never hold the guard across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.update_lock.lock()
    }

    /// Storage backed by a fresh in-memory map
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &StorageKey) -> Result<Option<T>, StorageError> {
        let name = key.as_string();
        let Some(raw) = self.backend.read(&name)? else {
            debug!(key = %name, "Storage miss");
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Corrupt { key: name, source })
    }

    pub fn get_or_default<T: DeserializeOwned + Default>(
        &self,
        key: &StorageKey,
    ) -> Result<T, StorageError> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &StorageKey, value: &T) -> Result<(), StorageError> {
        let name = key.as_string();
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
            key: name.clone(),
            source,
        })?;
        debug!(key = %name, bytes = raw.len(), "Storage write");
        self.backend.write(&name, &raw)
    }

    pub fn remove(&self, key: &StorageKey) -> Result<(), StorageError> {
        self.backend.remove(&key.as_string())
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

fn check_quota(key: &str, value: &str, limit: usize) -> Result<(), StorageError> {
    if value.len() > limit {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            size: value.len(),
            limit,
        });
    }
    Ok(())
}
