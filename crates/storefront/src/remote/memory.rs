//! In-process cart backend.
//!
//! Serves local development without a remote cart API and doubles as the
//! scenario-test backend: latency and failures can be injected to exercise
//! retry, cancel-on-supersede, and deferred-merge paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use eshop_core::CartKey;

use super::{BackendError, CartBackend};
use crate::cart::Cart;

#[derive(Default)]
struct MemoryBackendInner {
    carts: Mutex<HashMap<String, Cart>>,
    latency: Mutex<Option<Duration>>,
    fail_remaining: AtomicU32,
    saves: AtomicU64,
}

/// Cart backend holding everything in process memory.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryBackendInner>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the cart stored under `key`.
    pub fn seed(&self, key: &CartKey, cart: Cart) {
        let mut carts = self
            .inner
            .carts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        carts.insert(key.storage_key(), cart);
    }

    /// The cart currently stored under `key`, if any.
    #[must_use]
    pub fn stored(&self, key: &CartKey) -> Option<Cart> {
        let carts = self
            .inner
            .carts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        carts.get(&key.storage_key()).cloned()
    }

    /// Delay every request by `latency` (`None` to clear).
    pub fn set_latency(&self, latency: Option<Duration>) {
        let mut slot = self
            .inner
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = latency;
    }

    /// Make the next `count` requests fail with a transport error.
    pub fn fail_next(&self, count: u32) {
        self.inner.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of saves that reached the backend.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.inner.saves.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), BackendError> {
        let latency = {
            let slot = self
                .inner
                .latency
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *slot
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let remaining = &self.inner.fail_remaining;
        let mut current = remaining.load(Ordering::SeqCst);
        while current > 0 {
            match remaining.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Err(BackendError::Transport(
                        "injected backend failure".to_string(),
                    ));
                }
                Err(observed) => current = observed,
            }
        }

        Ok(())
    }
}

impl CartBackend for MemoryBackend {
    async fn fetch_cart(&self, key: &CartKey) -> Result<Cart, BackendError> {
        self.simulate().await?;
        Ok(self.stored(key).unwrap_or_default())
    }

    async fn save_cart(&self, key: &CartKey, cart: &Cart) -> Result<(), BackendError> {
        self.simulate().await?;
        self.seed(key, cart.clone());
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
