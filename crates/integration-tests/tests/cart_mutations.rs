//! Integration tests for cart mutations through the state container.
//!
//! Covers mutation ordering, validation, idempotency, and the invariant
//! that every derived value (subtotal, badge count, panel rows) is
//! computed from the line items of the same snapshot.

use eshop_integration_tests::{TestContext, line_item};
use eshop_storefront::CartLineItem;
use eshop_core::ProductId;
use rust_decimal::Decimal;

// =============================================================================
// Derived Value Invariants
// =============================================================================

#[tokio::test]
async fn test_subtotal_equals_sum_of_lines_after_any_sequence() {
    let ctx = TestContext::new();
    let state = &ctx.state;

    state.add_to_cart(line_item("a", 1050, 2)).await.unwrap();
    state.add_to_cart(line_item("b", 499, 1)).await.unwrap();
    state.add_to_cart(line_item("c", 25, 10)).await.unwrap();
    state
        .update_quantity(&ProductId::new("a"), 1)
        .await
        .unwrap();
    state.remove_from_cart(&ProductId::new("b")).await.unwrap();

    let snap = state.cart_snapshot();
    let expected: Decimal = snap.items.iter().map(CartLineItem::line_total).sum();
    assert_eq!(snap.subtotal, expected);
    // 10.50 + 10 x 0.25
    assert_eq!(snap.subtotal, Decimal::new(1300, 2));
}

#[tokio::test]
async fn test_badge_counts_distinct_lines() {
    let ctx = TestContext::new();
    let state = &ctx.state;

    assert!(!state.badge().visible);

    state.add_to_cart(line_item("a", 100, 7)).await.unwrap();
    state.add_to_cart(line_item("b", 100, 1)).await.unwrap();
    state.add_to_cart(line_item("a", 100, 1)).await.unwrap();

    let badge = state.badge();
    assert!(badge.visible);
    // Two distinct products, regardless of quantities.
    assert_eq!(badge.count, 2);
}

#[tokio::test]
async fn test_panel_rows_match_snapshot_order() {
    let ctx = TestContext::new();
    let state = &ctx.state;

    state.add_to_cart(line_item("first", 100, 1)).await.unwrap();
    state.add_to_cart(line_item("second", 200, 1)).await.unwrap();
    state.add_to_cart(line_item("first", 100, 1)).await.unwrap(); // merges

    let panel = state.panel();
    let names: Vec<&str> = panel.rows.iter().map(|r| r.product_id.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(panel.rows[0].quantity, 2);
}

// =============================================================================
// Mutation Semantics
// =============================================================================

#[tokio::test]
async fn test_re_adding_a_product_sums_quantities() {
    let ctx = TestContext::new();
    let state = &ctx.state;

    state.add_to_cart(line_item("a", 100, 2)).await.unwrap();
    let snap = state.add_to_cart(line_item("a", 100, 3)).await.unwrap();

    assert_eq!(snap.item_count, 1);
    assert_eq!(snap.items[0].quantity, 5);
}

#[tokio::test]
async fn test_removal_is_idempotent() {
    let ctx = TestContext::new();
    let state = &ctx.state;
    let id = ProductId::new("a");

    state.add_to_cart(line_item("a", 100, 1)).await.unwrap();
    let after_first = state.remove_from_cart(&id).await.unwrap();
    let after_second = state.remove_from_cart(&id).await.unwrap();

    assert!(after_first.is_empty());
    assert_eq!(after_first.revision, after_second.revision);
}

#[tokio::test]
async fn test_quantity_below_one_is_rejected() {
    let ctx = TestContext::new();
    let state = &ctx.state;
    let id = ProductId::new("a");

    state.add_to_cart(line_item("a", 100, 3)).await.unwrap();
    assert!(state.update_quantity(&id, 0).await.is_err());

    // The line is untouched; removal stays an explicit operation.
    assert_eq!(state.cart_snapshot().items[0].quantity, 3);
}

#[tokio::test]
async fn test_updating_absent_product_is_rejected() {
    let ctx = TestContext::new();
    assert!(
        ctx.state
            .update_quantity(&ProductId::new("ghost"), 2)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_rapid_sequential_updates_land_in_order() {
    let ctx = TestContext::new();
    let state = &ctx.state;
    let id = ProductId::new("a");

    state.add_to_cart(line_item("a", 100, 1)).await.unwrap();
    for quantity in 2..=6 {
        state.update_quantity(&id, quantity).await.unwrap();
    }

    let snap = state.cart_snapshot();
    assert_eq!(snap.items[0].quantity, 6);
    // One revision per applied mutation.
    assert_eq!(snap.revision, 6);
}

// =============================================================================
// Observer Notification
// =============================================================================

#[tokio::test]
async fn test_subscribers_receive_each_published_snapshot() {
    let ctx = TestContext::new();
    let state = &ctx.state;
    let mut rx = state.subscribe_cart();

    state.add_to_cart(line_item("a", 100, 1)).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().item_count, 1);

    state.remove_from_cart(&ProductId::new("a")).await.unwrap();
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().is_empty());
}
