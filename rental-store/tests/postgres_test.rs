//! Runs against a real database: `DATABASE_URL=postgres://... cargo test -- --ignored`.

use chrono::{Duration, DurationRound, Utc};
use rental_catalog::{PeriodUnit, Product};
use rental_core::identity::{Profile, Role, User};
use rental_core::lifecycle::{CreateOrderRequest, OrderLifecycle, OrderLineRequest};
use rental_core::repository::{OrderChange, ReservationChange};
use rental_core::settings::RentalRules;
use rental_core::CoreError;
use rental_order::{Coupon, DiscountKind, OrderStatus, SaleOrder};
use rental_store::{postgres_stores, LogMailer};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

fn request(product_id: Uuid, quantity: i32, coupon: Option<&str>) -> CreateOrderRequest {
    let start = Utc::now().duration_trunc(Duration::days(1)).unwrap() + Duration::days(1);
    CreateOrderRequest {
        start_date: start,
        end_date: start + Duration::days(2),
        lines: vec![OrderLineRequest {
            product_id,
            variant_id: None,
            quantity,
        }],
        coupon_code: coupon.map(str::to_string),
    }
}

fn confirm(order: &SaleOrder, coupon_use: Option<&str>) -> OrderChange {
    let mut next = order.clone();
    next.status = OrderStatus::Confirmed;
    OrderChange {
        order: next,
        expected_status: OrderStatus::Quotation,
        reservations: ReservationChange::Create(order.reservation_requests()),
        invoice: None,
        coupon_use: coupon_use.map(str::to_string),
    }
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "needs DATABASE_URL"]
async fn test_commit_transition_is_atomic(pool: PgPool) {
    let stores = postgres_stores(pool);
    let vendor = User::new("vendor@example.com", "x".into(), "Vendor", Role::Vendor);
    let customer = User::new("customer@example.com", "x".into(), "Customer", Role::Customer);
    stores.users.create_user(&vendor, &Profile::None).await.unwrap();
    stores.users.create_user(&customer, &Profile::None).await.unwrap();

    let product = Product::new(vendor.id, "Camping tent", 2).with_tier(PeriodUnit::Day, 1_000);
    stores.products.create_product(&product).await.unwrap();

    let mut coupon = Coupon::new("once", DiscountKind::Percent, 10);
    coupon.max_uses = Some(1);
    stores.coupons.create_coupon(&coupon).await.unwrap();

    let lifecycle = OrderLifecycle::new(stores.clone(), Arc::new(LogMailer), RentalRules::default());
    let customer = customer.actor();
    let first = lifecycle
        .create_quotation(&customer, request(product.id, 1, Some("ONCE")))
        .await
        .unwrap();
    let second = lifecycle
        .create_quotation(&customer, request(product.id, 1, Some("ONCE")))
        .await
        .unwrap();
    let greedy = lifecycle
        .create_quotation(&customer, request(product.id, 2, None))
        .await
        .unwrap();

    let confirmed = stores
        .orders
        .commit_transition(confirm(&first, Some("ONCE")))
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
    let stored = stores.orders.get_order(first.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(stored.lines[0].inventory_snapshot, Some(2));
    assert_eq!(stores.orders.reservations_for_order(first.id).await.unwrap().len(), 1);
    let used = stores.coupons.find_by_code("ONCE").await.unwrap().unwrap();
    assert_eq!(used.used_count, 1);

    // Exhausted coupon rolls back the reservation taken in the same commit.
    let err = stores
        .orders
        .commit_transition(confirm(&second, Some("ONCE")))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert!(stores.orders.reservations_for_order(second.id).await.unwrap().is_empty());
    let stored = stores.orders.get_order(second.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Quotation);

    let err = stores
        .orders
        .commit_transition(confirm(&greedy, None))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert!(stores.orders.reservations_for_order(greedy.id).await.unwrap().is_empty());

    // Stale expected status
    let err = stores
        .orders
        .commit_transition(confirm(&first, None))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(stores.orders.reservations_for_order(first.id).await.unwrap().len(), 1);
}
