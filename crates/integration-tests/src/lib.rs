//! Integration tests for the Eshop session & cart subsystem.
//!
//! Scenarios run against the real [`AppState`] wiring with an in-process
//! cart backend ([`MemoryBackend`]) and in-process durable storage
//! ([`MemoryStorage`]); latency and failure injection on the backend
//! exercise the retry, cancel-on-supersede, and deferred-merge paths.
//!
//! # Test Categories
//!
//! - `cart_mutations` - Mutation ordering, validation, derived values
//! - `auth_reconciliation` - Login/logout cart merges and restores
//! - `remote_sync` - Write-through, retry, and superseded-load handling

use std::sync::Arc;
use std::time::Duration;

use eshop_core::{CurrencyCode, Price, ProductId};
use eshop_storefront::{
    AppState, CartLineItem, DurableStorage, MemoryBackend, MemoryStorage, ToastReceiver,
};

/// Retry backoff for scenario tests; short so failure paths stay fast.
pub const TEST_BACKOFF: Duration = Duration::from_millis(1);

/// A fully wired state container over in-process collaborators.
pub struct TestContext {
    pub state: AppState<MemoryBackend>,
    pub backend: MemoryBackend,
    pub storage: Arc<MemoryStorage>,
    pub toasts: ToastReceiver,
}

impl TestContext {
    /// Fresh context with empty storage and an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    /// Context over pre-existing storage, simulating a restarted profile.
    #[must_use]
    pub fn with_storage(storage: Arc<MemoryStorage>) -> Self {
        let backend = MemoryBackend::new();
        Self::with_parts(storage, backend)
    }

    /// Context over pre-existing storage and backend.
    #[must_use]
    pub fn with_parts(storage: Arc<MemoryStorage>, backend: MemoryBackend) -> Self {
        let (state, toasts) = AppState::new(
            Arc::clone(&storage) as Arc<dyn DurableStorage>,
            backend.clone(),
            TEST_BACKOFF,
        );
        Self {
            state,
            backend,
            storage,
            toasts,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A line item with deterministic catalog fields derived from `id`.
#[must_use]
pub fn line_item(id: &str, cents: i64, quantity: u32) -> CartLineItem {
    CartLineItem {
        product_id: ProductId::new(id),
        name: format!("Product {id}"),
        image_url: format!("/images/{id}.png"),
        unit_price: Price::from_minor_units(cents, CurrencyCode::USD),
        quantity,
    }
}
