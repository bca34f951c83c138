//! JSON-file-backed durable storage.
//!
//! Persists the key/value map as a single JSON document, rewritten on every
//! mutation. The payloads here are a session token and a cached identity,
//! so whole-document writes are far below any throughput concern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::{DurableStorage, StorageError};

/// Durable storage backed by a JSON file on disk.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create) the storage document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the file exists but cannot
    /// be read, or [`StorageError::Corrupt`] if it cannot be parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
                key: path.display().to_string(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StorageError::Unavailable(e.to_string())),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        }

        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_doc() -> PathBuf {
        std::env::temp_dir().join(format!("eshop-storage-{}.json", Uuid::new_v4()))
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let path = temp_doc();
        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set("eshop.session_id", "token-1").unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get("eshop.session_id").unwrap().as_deref(),
            Some("token-1")
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_remove_persists() {
        let path = temp_doc();
        let storage = FileStorage::open(&path).unwrap();
        storage.set("k", "v").unwrap();
        storage.remove("k").unwrap();

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap(), None);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let path = temp_doc();
        std::fs::write(&path, "not json").unwrap();

        let err = FileStorage::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));

        std::fs::remove_file(&path).unwrap();
    }
}
