//! Composition root for the storefront state layer.
//!
//! [`AppState`] wires the durable session identity, the auth state, the
//! cart store, and the identity reconciler together and is the only
//! surface the presentational layer talks to. It owns the ordering
//! guarantee across components: an auth transition is published to
//! subscribers only after the cart has been re-keyed, so no observer ever
//! renders an authenticated header next to a stale anonymous cart.

use std::sync::Arc;
use std::time::Duration;

use eshop_core::{CartKey, ProductId, SessionId};
use tokio::sync::watch;
use tracing::instrument;

use crate::cart::{CartError, CartLineItem, CartSnapshot, CartStore, IdentityReconciler};
use crate::config::StorefrontConfig;
use crate::notify::{ToastReceiver, ToastSender, toast_channel};
use crate::observe::{CartBadge, CartPanel};
use crate::remote::{CartBackend, HttpCartBackend};
use crate::services::auth::{AuthIdentity, AuthState};
use crate::session::SessionIdentity;
use crate::storage::{DurableStorage, FileStorage, MemoryStorage};
use crate::{Result, StorefrontError};

struct AppStateInner<B: CartBackend> {
    session: SessionIdentity,
    auth: AuthState,
    cart: CartStore<B>,
    reconciler: IdentityReconciler<B>,
    toasts: ToastSender,
}

/// The storefront state container.
///
/// Cheaply cloneable; all clones share the same state.
pub struct AppState<B: CartBackend> {
    inner: Arc<AppStateInner<B>>,
}

impl<B: CartBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl AppState<HttpCartBackend> {
    /// Build the state container from environment configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when configuration is missing or invalid, or when
    /// the configured storage file exists but cannot be parsed.
    pub fn from_env() -> Result<(Self, ToastReceiver)> {
        let config = StorefrontConfig::from_env().map_err(StorefrontError::Config)?;

        let storage: Arc<dyn DurableStorage> = match &config.storage_path {
            Some(path) => {
                Arc::new(FileStorage::open(path.clone()).map_err(StorefrontError::Storage)?)
            }
            None => {
                tracing::info!("no storage path configured; state will not survive restarts");
                Arc::new(MemoryStorage::new())
            }
        };

        let backend = HttpCartBackend::new(&config.cart_api);
        Ok(Self::new(storage, backend, config.retry_backoff))
    }
}

impl<B: CartBackend> AppState<B> {
    /// Wire up the state container.
    ///
    /// Establishes the session identity and optimistically restores the
    /// auth identity from `storage`; the cart starts empty under the key
    /// those imply until [`Self::init`] loads it. Returns the receiving
    /// end of the toast channel alongside the state.
    #[must_use]
    pub fn new(
        storage: Arc<dyn DurableStorage>,
        backend: B,
        retry_backoff: Duration,
    ) -> (Self, ToastReceiver) {
        let session = SessionIdentity::establish(storage.as_ref());
        let auth = AuthState::restore(storage);
        let (toasts, toast_rx) = toast_channel();

        let initial_key = match auth.current() {
            AuthIdentity::Authenticated { username } => CartKey::user(username),
            AuthIdentity::Anonymous => CartKey::session(session.id().clone()),
        };

        let cart = CartStore::new(backend, initial_key, toasts.clone(), retry_backoff);
        let reconciler = IdentityReconciler::new(cart.clone(), session.id().clone());

        (
            Self {
                inner: Arc::new(AppStateInner {
                    session,
                    auth,
                    cart,
                    reconciler,
                    toasts,
                }),
            },
            toast_rx,
        )
    }

    /// Load the cart for the active identity. Called once on startup.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Transient`] when the remote fetch fails even
    /// after the retry; the store then presents an empty cart and stays
    /// usable.
    pub async fn init(&self) -> Result<CartSnapshot> {
        let key = self.inner.cart.active_key();
        self.inner.cart.load(key).await.map_err(StorefrontError::Cart)
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// The durable anonymous session token.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        self.inner.session.id()
    }

    /// The current auth identity.
    #[must_use]
    pub fn auth_identity(&self) -> AuthIdentity {
        self.inner.auth.current()
    }

    /// Subscribe to published auth identity changes.
    #[must_use]
    pub fn subscribe_auth(&self) -> watch::Receiver<AuthIdentity> {
        self.inner.auth.subscribe()
    }

    /// Sign `username` in and fold the anonymous cart into their stored
    /// cart.
    ///
    /// The identity change is published only after the cart has been
    /// reconciled. When the user's stored cart is unreachable the login
    /// still succeeds: the merge is parked for [`Self::retry_pending_merge`]
    /// and the shopper keeps the cart they were building.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`](crate::AuthError) variants for a blank
    /// username or an already signed-in shopper.
    #[instrument(skip(self))]
    pub async fn login(&self, username: &str) -> Result<()> {
        let transition = self
            .inner
            .auth
            .login(username)
            .map_err(StorefrontError::Auth)?;

        let reconciled = self.inner.reconciler.apply(&transition).await;
        // Published regardless of the merge outcome: the shopper is
        // signed in either way.
        self.inner.auth.publish();

        match reconciled {
            Ok(()) => {}
            Err(CartError::IdentityConflict { .. }) => {
                self.inner
                    .toasts
                    .warning("We couldn't fetch your saved cart. Your current cart is safe.");
            }
            Err(e) => {
                tracing::warn!(error = %e, "cart reconciliation failed after login");
            }
        }
        Ok(())
    }

    /// Sign the shopper out and restore the anonymous session cart.
    ///
    /// A no-op when nobody is signed in. The session token is reused, not
    /// regenerated, so the anonymous cart key is stable across logins.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let Some(transition) = self.inner.auth.logout() else {
            return;
        };

        let reconciled = self.inner.reconciler.apply(&transition).await;
        self.inner.auth.publish();

        if let Err(e) = reconciled {
            // The store already fell back to an empty cart and warned.
            tracing::warn!(error = %e, "session cart restore failed after logout");
        }
        self.inner.toasts.success("Logged out successfully!");
    }

    /// Retry a login merge that was parked because the user cart was
    /// unreachable. Returns `Ok(false)` when none is parked.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::IdentityConflict`] when the user cart is still
    /// unreachable.
    pub async fn retry_pending_merge(&self) -> Result<bool> {
        self.inner
            .reconciler
            .retry_pending()
            .await
            .map_err(StorefrontError::Cart)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Current cart snapshot.
    #[must_use]
    pub fn cart_snapshot(&self) -> CartSnapshot {
        self.inner.cart.snapshot()
    }

    /// Subscribe to cart snapshot changes.
    #[must_use]
    pub fn subscribe_cart(&self) -> watch::Receiver<CartSnapshot> {
        self.inner.cart.subscribe()
    }

    /// Header badge derived from the current snapshot.
    #[must_use]
    pub fn badge(&self) -> CartBadge {
        CartBadge::from_snapshot(&self.cart_snapshot())
    }

    /// Cart panel derived from the current snapshot.
    #[must_use]
    pub fn panel(&self) -> CartPanel {
        CartPanel::from_snapshot(&self.cart_snapshot())
    }

    /// Add an item to the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Validation`] for invalid input.
    pub async fn add_to_cart(&self, item: CartLineItem) -> Result<CartSnapshot> {
        self.inner
            .cart
            .add_item(item)
            .await
            .map_err(StorefrontError::Cart)
    }

    /// Remove a line item from the cart. Idempotent.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; kept fallible for parity with the
    /// other mutations.
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> Result<CartSnapshot> {
        self.inner
            .cart
            .remove_item(product_id)
            .await
            .map_err(StorefrontError::Cart)
    }

    /// Set a line item's quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Validation`] for a quantity below 1 or an
    /// absent product.
    pub async fn update_quantity(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot> {
        self.inner
            .cart
            .update_quantity(product_id, quantity)
            .await
            .map_err(StorefrontError::Cart)
    }
}
