//! The authoritative cart store.
//!
//! `CartStore` owns the single in-memory cart for the currently active
//! [`CartKey`]. All mutations are applied synchronously, in arrival order,
//! against the latest in-memory state; suspension happens only at the
//! remote I/O boundary. Every successful mutation is written through to
//! the remote backend, but the in-memory cart is always the presented
//! truth: the remote copy is an eventually-consistent cache.
//!
//! Key switches bump an internal epoch. A `load` whose response arrives
//! after the epoch moved on is discarded (cancel-on-supersede), and a
//! persist for a state that a newer write already covered is skipped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use eshop_core::{CartKey, ProductId};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::instrument;

use super::{Cart, CartError, CartLineItem};
use crate::notify::ToastSender;
use crate::remote::{CartBackend, with_retry};

/// Immutable view of the cart for observers.
///
/// Derived values are computed at capture time from the line items, never
/// cached independently of them.
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    /// The key the cart was captured under.
    pub key: CartKey,
    /// Line items in insertion order.
    pub items: Vec<CartLineItem>,
    /// Sum of `unit_price x quantity` over `items`.
    pub subtotal: Decimal,
    /// Number of distinct line items.
    pub item_count: usize,
    /// Cart revision at capture time.
    pub revision: u64,
    /// Key-switch epoch at capture time, used to detect superseded work.
    pub(crate) epoch: u64,
}

impl CartSnapshot {
    fn capture(state: &ActiveCart) -> Self {
        Self {
            key: state.key.clone(),
            items: state.cart.items.clone(),
            subtotal: state.cart.subtotal(),
            item_count: state.cart.item_count(),
            revision: state.cart.revision,
            epoch: state.epoch,
        }
    }

    /// Whether the captured cart had no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

struct ActiveCart {
    key: CartKey,
    cart: Cart,
    epoch: u64,
}

/// Highest (epoch, revision) known to have reached the remote backend.
struct PersistMark {
    epoch: u64,
    revision: u64,
}

struct CartStoreInner<B> {
    backend: B,
    state: Mutex<ActiveCart>,
    /// Serializes write-through saves so they leave in revision order.
    persist_lock: AsyncMutex<()>,
    persisted: Mutex<PersistMark>,
    tx: watch::Sender<CartSnapshot>,
    toasts: ToastSender,
    backoff: Duration,
}

/// The authoritative cart for the active identity.
///
/// Cheaply cloneable; all clones share the same state.
pub struct CartStore<B: CartBackend> {
    inner: Arc<CartStoreInner<B>>,
}

impl<B: CartBackend> Clone for CartStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: CartBackend> CartStore<B> {
    /// Create a store with an empty cart under `initial_key`.
    #[must_use]
    pub fn new(backend: B, initial_key: CartKey, toasts: ToastSender, backoff: Duration) -> Self {
        let state = ActiveCart {
            key: initial_key,
            cart: Cart::default(),
            epoch: 0,
        };
        let (tx, _rx) = watch::channel(CartSnapshot::capture(&state));

        Self {
            inner: Arc::new(CartStoreInner {
                backend,
                state: Mutex::new(state),
                persist_lock: AsyncMutex::new(()),
                persisted: Mutex::new(PersistMark {
                    epoch: 0,
                    revision: 0,
                }),
                tx,
                toasts,
                backoff,
            }),
        }
    }

    /// Current immutable view. Never triggers a remote fetch.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot::capture(&self.lock_state())
    }

    /// Subscribe to snapshot changes. One snapshot is published per
    /// successful mutation or key transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.inner.tx.subscribe()
    }

    /// The currently active ownership key.
    #[must_use]
    pub fn active_key(&self) -> CartKey {
        self.lock_state().key.clone()
    }

    pub(crate) fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub(crate) fn backoff(&self) -> Duration {
        self.inner.backoff
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add an item to the cart.
    ///
    /// An existing line for the same product gains the requested quantity
    /// and refreshes its name, image, and price; otherwise the line is
    /// appended, preserving insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Validation`] for an empty product id, a zero
    /// quantity, or a negative price. Local state is unchanged on error.
    #[instrument(skip(self, item), fields(product_id = %item.product_id))]
    pub async fn add_item(&self, item: CartLineItem) -> Result<CartSnapshot, CartError> {
        validate_item(&item)?;

        let (snapshot, _) = self.mutate(|cart| {
            cart.upsert(item);
            true
        });
        self.persist_now(&snapshot).await;
        Ok(snapshot)
    }

    /// Remove a line item. Idempotent: removing an absent product is a
    /// no-op, not an error, and does not bump the revision.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_item(&self, product_id: &ProductId) -> Result<CartSnapshot, CartError> {
        let (snapshot, changed) = self.mutate(|cart| cart.remove(product_id));
        if changed {
            self.persist_now(&snapshot).await;
        }
        Ok(snapshot)
    }

    /// Replace a line's quantity in place, preserving its position.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Validation`] when `quantity` is below 1
    /// (removal is an explicit operation, never an implied side effect of
    /// a quantity change) or when no line exists for `product_id`.
    #[instrument(skip(self), fields(product_id = %product_id, quantity))]
    pub async fn update_quantity(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot, CartError> {
        if quantity < 1 {
            return Err(CartError::Validation(
                "quantity must be at least 1; use remove_item to delete the line".to_string(),
            ));
        }

        let (snapshot, changed) = self.mutate(|cart| cart.set_quantity(product_id, quantity));
        if !changed {
            return Err(CartError::Validation(format!(
                "no line item for product {product_id}"
            )));
        }

        self.persist_now(&snapshot).await;
        Ok(snapshot)
    }

    // =========================================================================
    // Remote synchronization
    // =========================================================================

    /// Fetch the remote cart for `key` and make it the active cart.
    ///
    /// Called on initial mount and whenever the active key changes.
    /// Issuing a load supersedes any load still in flight; a superseded
    /// load's result is discarded on arrival, never installed over newer
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Transient`] when the fetch fails even after
    /// the retry. The store then presents an empty cart for the new key
    /// (showing another identity's items would be worse) and surfaces a
    /// warning toast.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn load(&self, key: CartKey) -> Result<CartSnapshot, CartError> {
        let epoch = {
            let mut state = self.lock_state();
            state.epoch += 1;
            state.epoch
        };

        match with_retry(self.inner.backoff, || self.inner.backend.fetch_cart(&key)).await {
            Ok(cart) => match self.install_if_current(epoch, key, cart) {
                Some(snapshot) => Ok(snapshot),
                None => {
                    tracing::debug!("discarding superseded load result");
                    Ok(self.snapshot())
                }
            },
            Err(e) => {
                if self
                    .install_if_current(epoch, key, Cart::default())
                    .is_some()
                {
                    self.inner
                        .toasts
                        .warning("We couldn't load your cart. Starting with an empty one.");
                }
                Err(CartError::Transient(e))
            }
        }
    }

    /// Atomically merge the in-memory cart into `remote_user_cart` and
    /// install the result under `key`.
    ///
    /// `observed_epoch` is the epoch captured before the user cart was
    /// fetched; if another key transition happened in between (e.g. a
    /// logout overtaking a slow login) the merge is refused and `None`
    /// returned, so a stale fetch can never overwrite the newer identity's
    /// cart.
    ///
    /// The anonymous cart is read at install time, under the state lock,
    /// so mutations racing the login fetch are folded in rather than
    /// lost. Exactly one snapshot is published: observers see either the
    /// pre-transition cart or the fully merged one, never an empty
    /// interim.
    pub(crate) fn merge_install(
        &self,
        observed_epoch: u64,
        key: CartKey,
        remote_user_cart: Cart,
    ) -> Option<CartSnapshot> {
        let mut state = self.lock_state();
        if state.epoch != observed_epoch {
            return None;
        }
        state.epoch += 1;
        let anonymous = std::mem::take(&mut state.cart);
        state.key = key;
        state.cart = remote_user_cart.merged_with(anonymous);

        let snapshot = CartSnapshot::capture(&state);
        {
            let mut mark = self.lock_mark();
            // The merged cart has not been written anywhere yet.
            *mark = PersistMark {
                epoch: state.epoch,
                revision: 0,
            };
        }
        self.inner.tx.send_replace(snapshot.clone());
        drop(state);

        Some(snapshot)
    }

    /// Write `snapshot` through to the remote backend.
    ///
    /// Saves are serialized and leave in revision order; a save whose
    /// state a newer write already covers, or whose key has been
    /// superseded, is skipped rather than sent. Failure after the retry
    /// keeps local state authoritative and surfaces a warning toast.
    pub(crate) async fn persist_now(&self, snapshot: &CartSnapshot) {
        let _guard = self.inner.persist_lock.lock().await;

        {
            let mark = self.lock_mark();
            if mark.epoch == snapshot.epoch && mark.revision >= snapshot.revision {
                tracing::debug!(
                    revision = snapshot.revision,
                    "skipping persist; newer revision already written"
                );
                return;
            }
        }
        if self.lock_state().epoch != snapshot.epoch {
            tracing::debug!("skipping persist; cart key superseded");
            return;
        }

        let payload = Cart {
            items: snapshot.items.clone(),
            revision: snapshot.revision,
        };

        match with_retry(self.inner.backoff, || {
            self.inner.backend.save_cart(&snapshot.key, &payload)
        })
        .await
        {
            Ok(()) => {
                let mut mark = self.lock_mark();
                if mark.epoch == snapshot.epoch && mark.revision < snapshot.revision {
                    mark.revision = snapshot.revision;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %snapshot.key, "cart write-through failed");
                self.inner
                    .toasts
                    .warning("We couldn't sync your cart. Your changes are saved locally.");
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Apply a synchronous mutation against the latest in-memory state.
    ///
    /// The revision bump and the snapshot publish happen under the state
    /// lock, so snapshots are published in mutation order.
    fn mutate<F>(&self, f: F) -> (CartSnapshot, bool)
    where
        F: FnOnce(&mut Cart) -> bool,
    {
        let mut state = self.lock_state();
        let changed = f(&mut state.cart);
        if changed {
            state.cart.revision = state.cart.revision.saturating_add(1);
        }
        let snapshot = CartSnapshot::capture(&state);
        if changed {
            self.inner.tx.send_replace(snapshot.clone());
        }
        (snapshot, changed)
    }

    /// Install `cart` under `key` if `epoch` is still current.
    ///
    /// The installed cart came from (or stands in for) the remote side, so
    /// the persist mark advances with it; nothing older needs saving.
    fn install_if_current(&self, epoch: u64, key: CartKey, cart: Cart) -> Option<CartSnapshot> {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            return None;
        }
        state.key = key;
        state.cart = cart;

        let snapshot = CartSnapshot::capture(&state);
        {
            let mut mark = self.lock_mark();
            *mark = PersistMark {
                epoch,
                revision: snapshot.revision,
            };
        }
        self.inner.tx.send_replace(snapshot.clone());
        drop(state);

        Some(snapshot)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ActiveCart> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mark(&self) -> std::sync::MutexGuard<'_, PersistMark> {
        self.inner
            .persisted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_item(item: &CartLineItem) -> Result<(), CartError> {
    if item.product_id.as_str().is_empty() {
        return Err(CartError::Validation(
            "product id must not be empty".to_string(),
        ));
    }
    if item.quantity < 1 {
        return Err(CartError::Validation(
            "quantity must be at least 1".to_string(),
        ));
    }
    if !item.unit_price.is_valid() {
        return Err(CartError::Validation(
            "unit price must not be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notify::{Toast, toast_channel};
    use crate::remote::MemoryBackend;
    use eshop_core::{CurrencyCode, Price, SessionId};

    const BACKOFF: Duration = Duration::from_millis(1);

    fn item(id: &str, cents: i64, quantity: u32) -> CartLineItem {
        CartLineItem {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            image_url: format!("/images/{id}.png"),
            unit_price: Price::from_minor_units(cents, CurrencyCode::USD),
            quantity,
        }
    }

    fn store_with_backend() -> (CartStore<MemoryBackend>, MemoryBackend, crate::notify::ToastReceiver)
    {
        let backend = MemoryBackend::new();
        let (toasts, rx) = toast_channel();
        let key = CartKey::session(SessionId::new("s1"));
        let store = CartStore::new(backend.clone(), key, toasts, BACKOFF);
        (store, backend, rx)
    }

    #[tokio::test]
    async fn test_add_item_writes_through() {
        let (store, backend, _rx) = store_with_backend();
        let key = store.active_key();

        store.add_item(item("a", 1000, 1)).await.unwrap();

        let remote = backend.stored(&key).unwrap();
        assert_eq!(remote.items.len(), 1);
        assert_eq!(remote.revision, 1);
    }

    #[tokio::test]
    async fn test_add_same_product_merges_quantities() {
        let (store, _backend, _rx) = store_with_backend();

        store.add_item(item("a", 1000, 2)).await.unwrap();
        let snap = store.add_item(item("a", 1000, 3)).await.unwrap();

        assert_eq!(snap.item_count, 1);
        assert_eq!(snap.items.first().unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_remove_item_is_idempotent() {
        let (store, _backend, _rx) = store_with_backend();
        let id = ProductId::new("a");

        store.add_item(item("a", 1000, 1)).await.unwrap();
        let first = store.remove_item(&id).await.unwrap();
        let second = store.remove_item(&id).await.unwrap();

        assert!(first.is_empty());
        assert!(second.is_empty());
        // The no-op removal does not bump the revision.
        assert_eq!(first.revision, second.revision);
    }

    #[tokio::test]
    async fn test_update_quantity_below_one_rejected() {
        let (store, _backend, _rx) = store_with_backend();
        let id = ProductId::new("a");

        store.add_item(item("a", 1000, 2)).await.unwrap();

        assert!(matches!(
            store.update_quantity(&id, 0).await,
            Err(CartError::Validation(_))
        ));

        // Line unchanged.
        let snap = store.snapshot();
        assert_eq!(snap.items.first().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_rapid_updates_apply_in_order() {
        let (store, _backend, _rx) = store_with_backend();
        let id = ProductId::new("a");

        store.add_item(item("a", 1000, 1)).await.unwrap();
        store.update_quantity(&id, 2).await.unwrap();
        let snap = store.update_quantity(&id, 3).await.unwrap();

        assert_eq!(snap.items.first().unwrap().quantity, 3);
        assert_eq!(snap.revision, 3);
    }

    #[tokio::test]
    async fn test_subtotal_matches_lines_after_any_sequence() {
        let (store, _backend, _rx) = store_with_backend();

        store.add_item(item("a", 1050, 2)).await.unwrap();
        store.add_item(item("b", 499, 1)).await.unwrap();
        store.update_quantity(&ProductId::new("a"), 1).await.unwrap();
        let snap = store.remove_item(&ProductId::new("b")).await.unwrap();

        let expected: Decimal = snap.items.iter().map(CartLineItem::line_total).sum();
        assert_eq!(snap.subtotal, expected);
        assert_eq!(snap.subtotal, Decimal::new(1050, 2));
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_local_state() {
        let (store, backend, mut rx) = store_with_backend();
        // Both the attempt and its retry fail.
        backend.fail_next(2);

        let snap = store.add_item(item("a", 1000, 1)).await.unwrap();
        assert_eq!(snap.item_count, 1);

        // The failure surfaced as a recoverable warning.
        assert!(matches!(rx.try_recv().unwrap(), Toast::Warning(_)));

        // The next mutation re-sends the full cart and heals the remote.
        let key = store.active_key();
        store.add_item(item("b", 500, 1)).await.unwrap();
        assert_eq!(backend.stored(&key).unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_load_replaces_active_cart() {
        let (store, backend, _rx) = store_with_backend();
        let user_key = CartKey::user("ada");

        let mut remote = Cart::default();
        remote.upsert(item("x", 2500, 1));
        remote.revision = 9;
        backend.seed(&user_key, remote);

        let snap = store.load(user_key.clone()).await.unwrap();
        assert_eq!(snap.key, user_key);
        assert_eq!(snap.item_count, 1);
        assert_eq!(snap.revision, 9);
    }

    #[tokio::test]
    async fn test_load_failure_presents_empty_cart() {
        let (store, backend, mut rx) = store_with_backend();
        store.add_item(item("a", 1000, 1)).await.unwrap();

        backend.fail_next(2);
        let result = store.load(CartKey::user("ada")).await;

        assert!(matches!(result, Err(CartError::Transient(_))));
        assert!(store.snapshot().is_empty());
        // Warning toast for the failed load (the earlier add may have
        // queued none, so scan for it).
        let mut saw_warning = false;
        while let Ok(toast) = rx.try_recv() {
            saw_warning |= matches!(toast, Toast::Warning(_));
        }
        assert!(saw_warning);
    }

    #[tokio::test]
    async fn test_superseded_load_is_discarded() {
        let (store, backend, _rx) = store_with_backend();
        let slow_key = CartKey::user("ada");
        let fast_key = CartKey::user("grace");

        let mut slow_cart = Cart::default();
        slow_cart.upsert(item("old", 100, 1));
        backend.seed(&slow_key, slow_cart);

        backend.set_latency(Some(Duration::from_millis(50)));
        let slow_store = store.clone();
        let slow = tokio::spawn(async move { slow_store.load(slow_key).await });

        // Give the slow load a head start, then supersede it.
        tokio::time::sleep(Duration::from_millis(5)).await;
        backend.set_latency(None);
        store.load(fast_key.clone()).await.unwrap();

        slow.await.unwrap().unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.key, fast_key);
        assert!(snap.is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_published_per_mutation() {
        let (store, _backend, _rx) = store_with_backend();
        let mut sub = store.subscribe();

        assert!(sub.borrow().is_empty());

        store.add_item(item("a", 1000, 1)).await.unwrap();
        sub.changed().await.unwrap();
        assert_eq!(sub.borrow_and_update().item_count, 1);
    }
}
