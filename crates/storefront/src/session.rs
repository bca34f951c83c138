//! Anonymous session identity.
//!
//! The session token anchors cart ownership before login: it is generated
//! once per profile, persisted in durable storage, and never regenerated
//! while that storage is readable. The same token is deliberately reused
//! after logout so an anonymous cart key remains stable across auth
//! transitions.

use eshop_core::SessionId;

use crate::storage::{DurableStorage, keys};

/// The durable anonymous identity for this profile.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    id: SessionId,
    ephemeral: bool,
}

impl SessionIdentity {
    /// Establish the session identity.
    ///
    /// Returns the persisted token when one exists, otherwise generates a
    /// fresh one and persists it. When durable storage is unavailable this
    /// degrades to a process-lifetime token: carts will not survive a
    /// reload, which is reported (once, as a warning) rather than fatal.
    pub fn establish(storage: &dyn DurableStorage) -> Self {
        match storage.get(keys::SESSION_ID) {
            Ok(Some(raw)) => Self {
                id: SessionId::new(raw),
                ephemeral: false,
            },
            Ok(None) => {
                let id = SessionId::generate();
                match storage.set(keys::SESSION_ID, id.as_str()) {
                    Ok(()) => {
                        tracing::debug!(session_id = %id, "minted new session identity");
                        Self {
                            id,
                            ephemeral: false,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "could not persist session token; cart will not survive reloads"
                        );
                        Self {
                            id,
                            ephemeral: true,
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "durable storage unavailable; using process-lifetime session token"
                );
                Self {
                    id: SessionId::generate(),
                    ephemeral: true,
                }
            }
        }
    }

    /// The opaque session token. Immutable once established.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Whether the token could not be persisted (degraded mode).
    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageError};

    struct BrokenStorage;

    impl DurableStorage for BrokenStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("medium offline".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("medium offline".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("medium offline".to_string()))
        }
    }

    #[test]
    fn test_establish_persists_and_reuses_token() {
        let storage = MemoryStorage::new();

        let first = SessionIdentity::establish(&storage);
        assert!(!first.is_ephemeral());

        let second = SessionIdentity::establish(&storage);
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn test_broken_storage_degrades_to_ephemeral_token() {
        let identity = SessionIdentity::establish(&BrokenStorage);
        assert!(identity.is_ephemeral());

        // Still produces a usable token.
        assert!(!identity.id().as_str().is_empty());
    }

    #[test]
    fn test_existing_token_is_returned_unchanged() {
        let storage = MemoryStorage::new();
        storage.set(keys::SESSION_ID, "preexisting-token").unwrap();

        let identity = SessionIdentity::establish(&storage);
        assert_eq!(identity.id().as_str(), "preexisting-token");
        assert!(!identity.is_ephemeral());
    }
}
