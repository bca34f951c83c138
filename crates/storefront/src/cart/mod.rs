//! Cart data model and state management.
//!
//! The [`Cart`] is an order-preserving sequence of line items keyed by a
//! [`CartKey`](eshop_core::CartKey). Derived values (subtotal, item count)
//! are always recomputed from the lines so they can never drift from them.

pub mod reconcile;
pub mod store;

pub use reconcile::IdentityReconciler;
pub use store::{CartSnapshot, CartStore};

use eshop_core::{Price, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::BackendError;

/// Errors raised by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The operation was rejected synchronously; local state is unchanged.
    #[error("validation error: {0}")]
    Validation(String),

    /// The remote cart API failed even after the retry. Local state stays
    /// authoritative and usable.
    #[error("remote cart sync failed: {0}")]
    Transient(#[source] BackendError),

    /// The user cart was unreachable during login. Authentication
    /// succeeded; the merge is parked and can be retried.
    #[error("user cart for {username} unreachable; merge deferred")]
    IdentityConflict {
        username: String,
        #[source]
        source: BackendError,
    },
}

/// A single cart line.
///
/// At most one line exists per `product_id`; re-adding a product merges
/// into the existing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Catalog product id. Unique within a cart.
    pub product_id: ProductId,
    /// Display name, refreshed from the catalog on re-add.
    pub name: String,
    /// Product image reference.
    pub image_url: String,
    /// Current unit price. Refreshed on re-add so a stale price is never
    /// shown for a product whose catalog price changed.
    pub unit_price: Price,
    /// Quantity, always >= 1. Dropping to zero is an explicit removal.
    pub quantity: u32,
}

impl CartLineItem {
    /// Price of this line (unit price x quantity).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.amount * Decimal::from(self.quantity)
    }
}

/// An ordered cart with a monotonically increasing revision counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Line items in insertion order.
    pub items: Vec<CartLineItem>,
    /// Bumped on every successful mutation.
    pub revision: u64,
}

impl Cart {
    /// Sum of `unit_price x quantity` over the current lines.
    ///
    /// Recomputed on every call; the subtotal is never cached separately
    /// from the items.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartLineItem::line_total).sum()
    }

    /// Number of distinct line items (not summed quantities).
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a line by product id.
    #[must_use]
    pub fn find(&self, product_id: &ProductId) -> Option<&CartLineItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    fn find_mut(&mut self, product_id: &ProductId) -> Option<&mut CartLineItem> {
        self.items
            .iter_mut()
            .find(|item| &item.product_id == product_id)
    }

    /// Merge `incoming` into the cart: an existing line for the same
    /// product gains the incoming quantity and refreshes name, image, and
    /// price; otherwise the line is appended, preserving insertion order.
    pub(crate) fn upsert(&mut self, incoming: CartLineItem) {
        match self.find_mut(&incoming.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(incoming.quantity);
                existing.name = incoming.name;
                existing.image_url = incoming.image_url;
                existing.unit_price = incoming.unit_price;
            }
            None => self.items.push(incoming),
        }
    }

    /// Remove a line. Returns whether anything was removed.
    pub(crate) fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| &item.product_id != product_id);
        self.items.len() != before
    }

    /// Replace a line's quantity in place, preserving its position.
    /// Returns whether the line was present.
    pub(crate) fn set_quantity(&mut self, product_id: &ProductId, quantity: u32) -> bool {
        match self.find_mut(product_id) {
            Some(item) => {
                item.quantity = quantity;
                true
            }
            None => false,
        }
    }

    /// Merge an anonymous cart into this (user) cart on login.
    ///
    /// For each anonymous line: a matching user line has the quantities
    /// summed and its name/image/price refreshed to the anonymous values
    /// (the more recently observed catalog data); anonymous-only lines are
    /// appended after the user cart's existing order. Losing no items
    /// matters more here than any particular ordering.
    #[must_use]
    pub(crate) fn merged_with(mut self, anonymous: Self) -> Self {
        let merged_revision = self.revision.max(anonymous.revision).saturating_add(1);
        for line in anonymous.items {
            self.upsert(line);
        }
        self.revision = merged_revision;
        self
    }
}
