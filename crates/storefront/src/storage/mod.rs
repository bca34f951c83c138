//! Durable client storage.
//!
//! The browser-profile analogue of `localStorage`: a small synchronous
//! key/value store holding the anonymous session token and the optimistic
//! auth identity cache. Storage being unavailable is a degraded mode
//! (process-lifetime persistence only), never a fatal error.

mod file;

pub use file::FileStorage;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Well-known storage keys.
pub mod keys {
    /// Key for the durable anonymous session token.
    pub const SESSION_ID: &str = "eshop.session_id";

    /// Key for the optimistically cached auth identity.
    pub const AUTH_IDENTITY: &str = "eshop.auth_identity";
}

/// Errors raised by durable storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing medium cannot be read or written.
    #[error("durable storage unavailable: {0}")]
    Unavailable(String),

    /// A stored value exists but cannot be decoded.
    #[error("stored value for {key} is corrupt: {message}")]
    Corrupt { key: String, message: String },
}

/// Durable key/value storage contract.
///
/// Synchronous by design: callers are on the UI's single logical thread and
/// the payloads are tiny. Implementations must be safe to share across
/// tasks.
pub trait DurableStorage: Send + Sync {
    /// Read a value, returning `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] when the medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] when the medium cannot be
    /// written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] when the medium cannot be
    /// written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-lifetime storage.
///
/// Used when no storage path is configured and as the degraded fallback:
/// everything is lost when the process exits, which callers must tolerate.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("missing").unwrap(), None);

        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));

        storage.set("k", "v2").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v2"));

        storage.remove("k").unwrap();
        assert_eq!(storage.get("k").unwrap(), None);
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let storage = MemoryStorage::new();
        storage.remove("never-set").unwrap();
    }
}
