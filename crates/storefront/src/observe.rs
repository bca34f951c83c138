//! Derived cart views.
//!
//! Observers never hold their own copy of cart state; every view is
//! computed from a [`CartSnapshot`], so all surfaces rendered from the
//! same snapshot agree by construction.

use eshop_core::{CurrencyCode, Price};
use rust_decimal::Decimal;

use crate::cart::CartSnapshot;

/// Header badge summarizing the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartBadge {
    /// Number of distinct line items (not summed quantities).
    pub count: usize,
    /// Whether the badge should be rendered at all.
    pub visible: bool,
}

impl CartBadge {
    /// Derive the badge from a snapshot. The badge is hidden, not shown
    /// as zero, when the cart is empty.
    #[must_use]
    pub fn from_snapshot(snapshot: &CartSnapshot) -> Self {
        Self {
            count: snapshot.item_count,
            visible: snapshot.item_count > 0,
        }
    }
}

/// One rendered row of the cart panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartPanelRow {
    pub product_id: String,
    pub name: String,
    pub image_url: String,
    pub quantity: u32,
    /// Unit price formatted for display, e.g. `$19.99`.
    pub unit_price: String,
    /// Line total (unit price x quantity) formatted for display.
    pub line_total: String,
}

/// Full cart panel: one row per line item plus the subtotal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartPanel {
    /// Rows in the cart's insertion order.
    pub rows: Vec<CartPanelRow>,
    /// Subtotal formatted for display.
    pub subtotal: String,
    /// Whether the cart has no lines (render the empty state instead of
    /// rows).
    pub is_empty: bool,
}

impl CartPanel {
    /// Derive the panel from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &CartSnapshot) -> Self {
        let currency = snapshot
            .items
            .first()
            .map_or(CurrencyCode::USD, |item| item.unit_price.currency_code);

        let rows = snapshot
            .items
            .iter()
            .map(|item| CartPanelRow {
                product_id: item.product_id.to_string(),
                name: item.name.clone(),
                image_url: item.image_url.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price.display(),
                line_total: format_amount(item.line_total(), item.unit_price.currency_code),
            })
            .collect();

        Self {
            rows,
            subtotal: format_amount(snapshot.subtotal, currency),
            is_empty: snapshot.items.is_empty(),
        }
    }
}

fn format_amount(amount: Decimal, currency: CurrencyCode) -> String {
    Price::new(amount, currency).display()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::CartLineItem;
    use crate::cart::store::CartStore;
    use crate::notify::toast_channel;
    use crate::remote::MemoryBackend;
    use eshop_core::{CartKey, ProductId, SessionId};
    use std::time::Duration;

    async fn snapshot_with(items: &[(&str, i64, u32)]) -> CartSnapshot {
        let (toasts, _rx) = toast_channel();
        let store = CartStore::new(
            MemoryBackend::new(),
            CartKey::session(SessionId::new("s1")),
            toasts,
            Duration::from_millis(1),
        );
        for (id, cents, quantity) in items {
            store
                .add_item(CartLineItem {
                    product_id: ProductId::new(*id),
                    name: format!("Product {id}"),
                    image_url: format!("/images/{id}.png"),
                    unit_price: Price::from_minor_units(*cents, CurrencyCode::USD),
                    quantity: *quantity,
                })
                .await
                .unwrap();
        }
        store.snapshot()
    }

    #[tokio::test]
    async fn test_badge_hidden_when_cart_empty() {
        let snapshot = snapshot_with(&[]).await;
        let badge = CartBadge::from_snapshot(&snapshot);

        assert_eq!(badge.count, 0);
        assert!(!badge.visible);
    }

    #[tokio::test]
    async fn test_badge_counts_distinct_lines_not_quantities() {
        let snapshot = snapshot_with(&[("a", 1000, 5), ("b", 200, 1)]).await;
        let badge = CartBadge::from_snapshot(&snapshot);

        assert_eq!(badge.count, 2);
        assert!(badge.visible);
    }

    #[tokio::test]
    async fn test_panel_formats_prices_and_subtotal() {
        let snapshot = snapshot_with(&[("a", 1050, 2), ("b", 499, 1)]).await;
        let panel = CartPanel::from_snapshot(&snapshot);

        assert!(!panel.is_empty);
        assert_eq!(panel.rows.len(), 2);
        assert_eq!(panel.rows[0].unit_price, "$10.50");
        assert_eq!(panel.rows[0].line_total, "$21.00");
        assert_eq!(panel.subtotal, "$25.99");
    }

    #[tokio::test]
    async fn test_panel_empty_state() {
        let snapshot = snapshot_with(&[]).await;
        let panel = CartPanel::from_snapshot(&snapshot);

        assert!(panel.is_empty);
        assert!(panel.rows.is_empty());
        assert_eq!(panel.subtotal, "$0.00");
    }

    #[tokio::test]
    async fn test_views_from_same_snapshot_agree() {
        let snapshot = snapshot_with(&[("a", 100, 1), ("b", 200, 2), ("c", 300, 3)]).await;
        let badge = CartBadge::from_snapshot(&snapshot);
        let panel = CartPanel::from_snapshot(&snapshot);

        assert_eq!(badge.count, panel.rows.len());
    }
}
