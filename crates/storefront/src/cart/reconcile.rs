//! Cart reconciliation across auth transitions.
//!
//! Login folds the anonymous cart into the user's stored cart; logout
//! restores the anonymous session cart. When the user cart cannot be
//! fetched during login, authentication still succeeds and the merge is
//! parked for a later retry rather than blocking the shopper.

use std::sync::{Mutex, PoisonError};

use eshop_core::{CartKey, SessionId};
use tracing::instrument;

use super::store::CartStore;
use super::{Cart, CartError};
use crate::remote::{CartBackend, with_retry};
use crate::services::auth::AuthTransition;

/// Applies auth transitions to the cart store.
pub struct IdentityReconciler<B: CartBackend> {
    store: CartStore<B>,
    session_id: SessionId,
    /// Username whose login merge is parked after a failed user-cart fetch.
    pending_merge: Mutex<Option<String>>,
}

impl<B: CartBackend> IdentityReconciler<B> {
    #[must_use]
    pub fn new(store: CartStore<B>, session_id: SessionId) -> Self {
        Self {
            store,
            session_id,
            pending_merge: Mutex::new(None),
        }
    }

    /// Reconcile the cart with an auth transition.
    ///
    /// # Errors
    ///
    /// Login returns [`CartError::IdentityConflict`] when the user cart
    /// could not be fetched; the merge is parked and the shopper keeps the
    /// cart they had. Logout returns [`CartError::Transient`] when the
    /// session cart could not be reloaded.
    #[instrument(skip(self))]
    pub async fn apply(&self, transition: &AuthTransition) -> Result<(), CartError> {
        match transition {
            AuthTransition::LoggedIn { username } => self.merge_on_login(username).await,
            AuthTransition::LoggedOut => self.restore_on_logout().await,
        }
    }

    /// Whether a login merge is parked awaiting retry.
    #[must_use]
    pub fn has_pending_merge(&self) -> bool {
        self.lock_pending().is_some()
    }

    /// Retry a parked login merge. Returns `Ok(false)` when none is
    /// parked.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::IdentityConflict`] when the user cart is still
    /// unreachable; the merge stays parked.
    pub async fn retry_pending(&self) -> Result<bool, CartError> {
        let username = self.lock_pending().clone();
        match username {
            None => Ok(false),
            Some(username) => self.merge_on_login(&username).await.map(|()| true),
        }
    }

    async fn merge_on_login(&self, username: &str) -> Result<(), CartError> {
        let user_key = CartKey::user(username);
        let session_key = CartKey::session(self.session_id.clone());
        let observed_epoch = self.store.snapshot().epoch;

        let user_cart = match with_retry(self.store.backoff(), || {
            self.store.backend().fetch_cart(&user_key)
        })
        .await
        {
            Ok(cart) => cart,
            Err(source) => {
                *self.lock_pending() = Some(username.to_string());
                return Err(CartError::IdentityConflict {
                    username: username.to_string(),
                    source,
                });
            }
        };

        // The in-memory anonymous cart is read under the store's lock at
        // install time, so mutations that raced the fetch above are folded
        // in rather than lost.
        let Some(snapshot) = self.store.merge_install(observed_epoch, user_key, user_cart) else {
            // A newer identity transition (e.g. a logout) overtook this
            // login's fetch; its outcome stands and the merge is dropped.
            tracing::debug!(username, "login merge superseded; discarding fetched user cart");
            *self.lock_pending() = None;
            return Ok(());
        };
        self.store.persist_now(&snapshot).await;

        // The merged lines now live under the user key; clear the remote
        // anonymous copy so the same items are not held twice when this
        // session browses anonymously again.
        let empty_cart = Cart::default();
        if let Err(e) = with_retry(self.store.backoff(), || {
            self.store.backend().save_cart(&session_key, &empty_cart)
        })
        .await
        {
            tracing::warn!(error = %e, "failed to clear anonymous cart after login merge");
        }

        *self.lock_pending() = None;
        Ok(())
    }

    async fn restore_on_logout(&self) -> Result<(), CartError> {
        // A parked merge is moot once the user has logged out.
        *self.lock_pending() = None;

        // The session id survives logout, so this restores whatever cart
        // the session held before authenticating (usually empty after a
        // login merge cleared it).
        self.store
            .load(CartKey::session(self.session_id.clone()))
            .await
            .map(|_| ())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.pending_merge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
