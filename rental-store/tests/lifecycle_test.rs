use chrono::{Duration, DurationRound, Utc};
use rental_catalog::{PeriodUnit, Product};
use rental_core::billing::{Billing, PaymentRequest};
use rental_core::identity::{Actor, Profile, Role, User};
use rental_core::lifecycle::{CreateOrderRequest, OrderLifecycle, OrderLineRequest};
use rental_core::repository::{OrderChange, ReservationChange, Stores};
use rental_core::settings::RentalRules;
use rental_core::CoreError;
use rental_order::{Coupon, DiscountKind, InvoiceStatus, OrderStatus, PaymentMethod};
use rental_store::{memory_stores, LogMailer};
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    stores: Stores,
    lifecycle: OrderLifecycle,
    vendor: Actor,
    customer: Actor,
    product_id: Uuid,
}

async fn fixture(stock: i32) -> Fixture {
    let stores = memory_stores();
    let vendor = User::new("vendor@example.com", "x".into(), "Vendor", Role::Vendor);
    let customer = User::new("customer@example.com", "x".into(), "Customer", Role::Customer);
    stores.users.create_user(&vendor, &Profile::None).await.unwrap();
    stores.users.create_user(&customer, &Profile::None).await.unwrap();

    let product = Product::new(vendor.id, "Camping tent", stock)
        .with_tier(PeriodUnit::Day, 1_000)
        .with_tier(PeriodUnit::Week, 5_000);
    stores.products.create_product(&product).await.unwrap();

    let lifecycle = OrderLifecycle::new(stores.clone(), Arc::new(LogMailer), RentalRules::default());
    Fixture {
        stores,
        lifecycle,
        vendor: vendor.actor(),
        customer: customer.actor(),
        product_id: product.id,
    }
}

fn request(product_id: Uuid, quantity: i32, start_in_days: i64, days: i64) -> CreateOrderRequest {
    let start = Utc::now().duration_trunc(Duration::days(1)).unwrap() + Duration::days(start_in_days);
    CreateOrderRequest {
        start_date: start,
        end_date: start + Duration::days(days),
        lines: vec![OrderLineRequest {
            product_id,
            variant_id: None,
            quantity,
        }],
        coupon_code: None,
    }
}

#[tokio::test]
async fn test_full_rental_lifecycle() {
    let f = fixture(2).await;
    let order = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 2, 1, 3))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Quotation);
    assert_eq!(order.total_amount_cents, 6_000);

    f.lifecycle.send(&f.vendor, order.id).await.unwrap();
    let confirmed = f.lifecycle.confirm(&f.customer, order.id).await.unwrap().order;
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
    assert_eq!(confirmed.lines[0].inventory_snapshot, Some(2));

    let held = f.stores.orders.reservations_for_order(order.id).await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].quantity, 2);

    let picked_at = confirmed.start_date;
    f.lifecycle.pick_up(&f.vendor, order.id, picked_at).await.unwrap();

    // 26 hours late with a 2 hour grace period: two started days at 10%
    let returned_at = confirmed.end_date + Duration::hours(26);
    let returned = f
        .lifecycle
        .mark_returned(&f.vendor, order.id, returned_at)
        .await
        .unwrap()
        .order;
    assert_eq!(returned.status, OrderStatus::Returned);
    assert_eq!(returned.late_fee_cents, 1_200);
    assert!(f.stores.orders.reservations_for_order(order.id).await.unwrap().is_empty());

    let outcome = f.lifecycle.invoice(&f.vendor, order.id).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatus::Invoiced);
    let invoice = outcome.invoice.unwrap();
    assert_eq!(invoice.untaxed_cents, 7_200);
    assert_eq!(invoice.gst_cents, 1_296);
    assert_eq!(invoice.total_cents, 8_496);
    assert_eq!(invoice.platform_fee_cents, 720);
    assert_eq!(invoice.vendor_payout_cents, 6_480);

    let billing = Billing::new(f.stores.clone());
    let pay = |amount_cents| PaymentRequest {
        amount_cents,
        method: PaymentMethod::Upi,
        reference: None,
    };
    let (partial, _) = billing.record_payment(&f.customer, invoice.id, pay(4_000)).await.unwrap();
    assert_eq!(partial.status, InvoiceStatus::PartiallyPaid);
    assert!(matches!(
        billing.record_payment(&f.customer, invoice.id, pay(10_000)).await,
        Err(CoreError::Validation(_))
    ));
    let (paid, _) = billing.record_payment(&f.customer, invoice.id, pay(4_496)).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(billing.list_payments(&f.vendor, invoice.id).await.unwrap().len(), 2);

    let earnings = billing.vendor_earnings(&f.vendor).await.unwrap();
    assert_eq!(earnings.net_payout_cents, 6_480);
    assert_eq!(earnings.paid_invoice_count, 1);

    let audit = f.stores.audit.list_recent(20).await.unwrap();
    assert_eq!(audit[0].action, "invoice.payment");
    assert!(audit.iter().any(|e| e.action == "order.confirm"));
}

#[tokio::test]
async fn test_overlapping_confirmation_conflicts_until_cancelled() {
    let f = fixture(1).await;
    let first = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 1, 1, 2))
        .await
        .unwrap();
    let second = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 1, 2, 2))
        .await
        .unwrap();

    f.lifecycle.confirm(&f.customer, first.id).await.unwrap();
    let err = f.lifecycle.confirm(&f.customer, second.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    let unchanged = f.lifecycle.get_order(&f.customer, second.id).await.unwrap();
    assert_eq!(unchanged.status, OrderStatus::Quotation);

    // quotations also refuse stock that is already held
    let err = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 1, 2, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    f.lifecycle.cancel(&f.customer, first.id).await.unwrap();
    assert!(f.stores.orders.reservations_for_order(first.id).await.unwrap().is_empty());
    let confirmed = f.lifecycle.confirm(&f.customer, second.id).await.unwrap();
    assert_eq!(confirmed.order.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_back_to_back_rentals_do_not_overlap() {
    let f = fixture(1).await;
    let first = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 1, 1, 2))
        .await
        .unwrap();
    let second = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 1, 3, 2))
        .await
        .unwrap();
    assert_eq!(first.end_date, second.start_date);

    f.lifecycle.confirm(&f.customer, first.id).await.unwrap();
    f.lifecycle.confirm(&f.customer, second.id).await.unwrap();
}

#[tokio::test]
async fn test_permissions_and_invalid_transitions() {
    let f = fixture(3).await;
    let order = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 1, 1, 1))
        .await
        .unwrap();

    let err = f.lifecycle.send(&f.customer, order.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let stranger = Actor::new(Uuid::new_v4(), Role::Vendor);
    let err = f.lifecycle.cancel(&stranger, order.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = f
        .lifecycle
        .pick_up(&f.vendor, order.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    f.lifecycle.cancel(&f.vendor, order.id).await.unwrap();
    let err = f.lifecycle.confirm(&f.customer, order.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = f
        .lifecycle
        .create_quotation(&f.vendor, request(f.product_id, 1, 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
}

#[tokio::test]
async fn test_stale_status_is_rejected() {
    let f = fixture(3).await;
    let order = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 1, 1, 1))
        .await
        .unwrap();
    f.lifecycle.send(&f.vendor, order.id).await.unwrap();

    let mut stale = order.clone();
    stale.status = OrderStatus::Cancelled;
    let err = f
        .stores
        .orders
        .commit_transition(OrderChange {
            order: stale,
            expected_status: OrderStatus::Quotation,
            reservations: ReservationChange::None,
            invoice: None,
            coupon_use: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn test_coupon_applied_and_counted_on_confirm() {
    let f = fixture(5).await;
    let mut coupon = Coupon::new("once", DiscountKind::Percent, 10);
    coupon.max_uses = Some(1);
    f.stores.coupons.create_coupon(&coupon).await.unwrap();

    let mut with_coupon = request(f.product_id, 1, 1, 2);
    with_coupon.coupon_code = Some("ONCE".into());
    let first = f.lifecycle.create_quotation(&f.customer, with_coupon.clone()).await.unwrap();
    assert_eq!(first.discount_cents, 200);
    assert_eq!(first.total_amount_cents, 1_800);

    let second = f.lifecycle.create_quotation(&f.customer, with_coupon.clone()).await.unwrap();

    f.lifecycle.confirm(&f.customer, first.id).await.unwrap();
    let stored = f.stores.coupons.find_by_code("once").await.unwrap().unwrap();
    assert_eq!(stored.used_count, 1);

    let err = f.lifecycle.confirm(&f.customer, second.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(f.stores.orders.reservations_for_order(second.id).await.unwrap().is_empty());

    let err = f.lifecycle.create_quotation(&f.customer, with_coupon).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn test_one_vendor_per_order() {
    let f = fixture(3).await;
    let other_vendor = User::new("other@example.com", "x".into(), "Other", Role::Vendor);
    let other = Product::new(other_vendor.id, "Kayak", 1).with_tier(PeriodUnit::Day, 3_000);
    f.stores.products.create_product(&other).await.unwrap();

    let mut mixed = request(f.product_id, 1, 1, 1);
    mixed.lines.push(OrderLineRequest {
        product_id: other.id,
        variant_id: None,
        quantity: 1,
    });
    let err = f.lifecycle.create_quotation(&f.customer, mixed).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn test_expiry_notice_claimed_once() {
    let f = fixture(1).await;
    let order = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 1, 1, 1))
        .await
        .unwrap();

    let now = Utc::now();
    assert!(f.stores.orders.mark_expiry_notified(order.id, now).await.unwrap());
    assert!(!f.stores.orders.mark_expiry_notified(order.id, now).await.unwrap());

    // later transitions keep the notice timestamp
    f.lifecycle.send(&f.vendor, order.id).await.unwrap();
    let stored = f.stores.orders.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.expiry_notified_at, Some(now));
}

#[tokio::test]
async fn test_disabled_period_is_not_priced() {
    let f = fixture(1).await;
    f.stores
        .settings
        .upsert_setting("rental_periods", &serde_json::json!({"value": ["DAY"]}))
        .await
        .unwrap();

    // a 7 day rental would be cheaper weekly, but weeks are disabled
    let order = f
        .lifecycle
        .create_quotation(&f.customer, request(f.product_id, 1, 1, 7))
        .await
        .unwrap();
    assert_eq!(order.lines[0].unit, PeriodUnit::Day);
    assert_eq!(order.total_amount_cents, 7_000);
}
