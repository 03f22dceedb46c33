use parking_lot::Mutex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

use super::{check_quota, KeyValueStore, StorageError};

/// Directory-backed store, one `<key>.json` file per key.
///
/// Writes go to a temp file in the same directory and are renamed into
/// place, so readers see either the old value or the new one.
pub struct FileStore {
    dir: PathBuf,
    max_value_bytes: usize,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>, max_value_bytes: usize) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("Opened file store at {}", dir.display());
        Ok(Self {
            dir,
            max_value_bytes,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        check_quota(key, value, self.max_value_bytes)?;

        let _guard = self.write_lock.lock();
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_remove() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path().join("data"), 1024).unwrap();

        assert_eq!(store.read("bandwise.events").unwrap(), None);
        store.write("bandwise.events", "[]").unwrap();
        assert_eq!(store.read("bandwise.events").unwrap().as_deref(), Some("[]"));
        assert!(temp_dir.path().join("data/bandwise.events.json").exists());

        store.remove("bandwise.events").unwrap();
        assert_eq!(store.read("bandwise.events").unwrap(), None);
        store.remove("bandwise.events").unwrap();
    }

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(temp_dir.path(), 1024).unwrap();
            store.write("bandwise.auth_token", "\"t0k\"").unwrap();
        }
        let store = FileStore::open(temp_dir.path(), 1024).unwrap();
        assert_eq!(
            store.read("bandwise.auth_token").unwrap().as_deref(),
            Some("\"t0k\"")
        );
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path(), 1024).unwrap();

        for key in ["../escape", "a/b", "", ".hidden"] {
            assert!(matches!(
                store.write(key, "1"),
                Err(StorageError::InvalidKey(_))
            ));
        }
    }

    #[test]
    fn test_quota_keeps_previous_value() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path(), 4).unwrap();
        store.write("k", "1234").unwrap();

        assert!(matches!(
            store.write("k", "12345"),
            Err(StorageError::QuotaExceeded { size: 5, .. })
        ));
        assert_eq!(store.read("k").unwrap().as_deref(), Some("1234"));
    }
}
