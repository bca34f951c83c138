//! Authentication state.
//!
//! Process-wide identity container. Credentials are verified by an
//! external collaborator; this service only consumes the username it
//! produces, persists the identity optimistically so reloads restore it
//! without a network round trip, and hands out explicit
//! [`AuthTransition`] events for the identity reconciler.
//!
//! Subscribers are notified through a `watch` channel, but only after the
//! reconciler has processed the transition: `login`/`logout` return the
//! transition instead of notifying, and the state container calls
//! [`AuthState::publish`] once the cart has been re-keyed. No observer
//! ever sees an authenticated identity paired with a stale anonymous cart.

mod error;

pub use error::AuthError;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::storage::{DurableStorage, keys};

/// The current authentication identity.
///
/// The "username is present iff authenticated" invariant is carried by the
/// shape of the enum rather than a pair of nullable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthIdentity {
    /// No shopper is signed in.
    Anonymous,
    /// A shopper is signed in.
    Authenticated { username: String },
}

impl AuthIdentity {
    /// Whether a shopper is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// The signed-in username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { username } => Some(username),
        }
    }
}

/// How the current identity was obtained.
///
/// A restored identity is trusted for UI purposes only; wiring to a real
/// backend must not conflate it with one the auth collaborator verified in
/// this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Optimistically restored from the durable cache, not re-verified.
    Restored,
    /// Produced by an explicit login this process.
    Verified,
}

/// An identity transition to be dispatched to the cart reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthTransition {
    /// anonymous -> authenticated(username)
    LoggedIn { username: String },
    /// authenticated -> anonymous (existing session token is reused)
    LoggedOut,
}

/// Durable cache payload for the optimistic identity restore.
#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    username: String,
    saved_at: DateTime<Utc>,
}

struct AuthInner {
    identity: AuthIdentity,
    source: IdentitySource,
}

/// Process-wide authentication state.
pub struct AuthState {
    inner: Mutex<AuthInner>,
    tx: watch::Sender<AuthIdentity>,
    storage: Arc<dyn DurableStorage>,
    persist_warned: AtomicBool,
}

impl AuthState {
    /// Restore the last known identity from durable storage.
    ///
    /// The restore is optimistic: no round trip confirms the identity is
    /// still valid remotely. A later rejection surfaces through the auth
    /// collaborator's own error channel, not here. Corrupt or unreadable
    /// cache entries degrade to anonymous with a warning.
    #[must_use]
    pub fn restore(storage: Arc<dyn DurableStorage>) -> Self {
        let identity = match storage.get(keys::AUTH_IDENTITY) {
            Ok(Some(raw)) => match serde_json::from_str::<StoredIdentity>(&raw) {
                Ok(stored) => {
                    tracing::debug!(username = %stored.username, "restored identity from cache");
                    AuthIdentity::Authenticated {
                        username: stored.username,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cached identity is corrupt; starting anonymous");
                    AuthIdentity::Anonymous
                }
            },
            Ok(None) => AuthIdentity::Anonymous,
            Err(e) => {
                tracing::warn!(error = %e, "identity cache unavailable; starting anonymous");
                AuthIdentity::Anonymous
            }
        };

        let (tx, _rx) = watch::channel(identity.clone());

        Self {
            inner: Mutex::new(AuthInner {
                identity,
                source: IdentitySource::Restored,
            }),
            tx,
            storage,
            persist_warned: AtomicBool::new(false),
        }
    }

    /// The current identity.
    #[must_use]
    pub fn current(&self) -> AuthIdentity {
        self.lock().identity.clone()
    }

    /// How the current identity was obtained.
    #[must_use]
    pub fn source(&self) -> IdentitySource {
        self.lock().source
    }

    /// Subscribe to identity changes.
    ///
    /// The receiver observes the value current at subscription time and
    /// every published change after it.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthIdentity> {
        self.tx.subscribe()
    }

    /// Record a successful login for `username`.
    ///
    /// Persists the identity and returns the transition for the
    /// reconciler. Subscribers are NOT notified yet; call
    /// [`Self::publish`] after the cart has been reconciled.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EmptyUsername`] for a blank username and
    /// [`AuthError::AlreadyAuthenticated`] when a shopper is signed in.
    pub fn login(&self, username: &str) -> Result<AuthTransition, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::EmptyUsername);
        }

        let mut inner = self.lock();
        if let AuthIdentity::Authenticated { username: current } = &inner.identity {
            return Err(AuthError::AlreadyAuthenticated(current.clone()));
        }

        inner.identity = AuthIdentity::Authenticated {
            username: username.to_string(),
        };
        inner.source = IdentitySource::Verified;
        drop(inner);

        self.persist_identity(Some(username));
        tracing::info!(username, "logged in");

        Ok(AuthTransition::LoggedIn {
            username: username.to_string(),
        })
    }

    /// Clear the identity.
    ///
    /// Returns `None` when nobody was signed in (a no-op). Subscribers are
    /// notified via [`Self::publish`] after reconciliation, as with login.
    pub fn logout(&self) -> Option<AuthTransition> {
        let mut inner = self.lock();
        if !inner.identity.is_authenticated() {
            return None;
        }

        inner.identity = AuthIdentity::Anonymous;
        inner.source = IdentitySource::Verified;
        drop(inner);

        self.persist_identity(None);
        tracing::info!("logged out");

        Some(AuthTransition::LoggedOut)
    }

    /// Notify subscribers of the current identity.
    pub fn publish(&self) {
        self.tx.send_replace(self.current());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuthInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_identity(&self, username: Option<&str>) {
        let result = match username {
            Some(username) => {
                let stored = StoredIdentity {
                    username: username.to_string(),
                    saved_at: Utc::now(),
                };
                match serde_json::to_string(&stored) {
                    Ok(raw) => self.storage.set(keys::AUTH_IDENTITY, &raw),
                    Err(e) => {
                        tracing::error!(error = %e, "could not encode identity cache");
                        return;
                    }
                }
            }
            None => self.storage.remove(keys::AUTH_IDENTITY),
        };

        if let Err(e) = result {
            // Degraded mode: identity lives for this process only. Warn once.
            if !self.persist_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    error = %e,
                    "could not persist identity; login will not survive reloads"
                );
            }
        }
    }
}
