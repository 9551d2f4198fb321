use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rental_catalog::{Product, Reservation, ReservationRequest};
use rental_order::{Coupon, Invoice, OrderStatus, Payment, SaleOrder};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::identity::{CustomerProfile, Profile, Role, User, VendorProfile};
use crate::CoreResult;

/// Which orders or invoices a caller may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    All,
    Customer(Uuid),
    Vendor(Uuid),
}

impl OrderScope {
    pub fn admits(&self, customer_id: Uuid, vendor_id: Uuid) -> bool {
        match self {
            OrderScope::All => true,
            OrderScope::Customer(id) => *id == customer_id,
            OrderScope::Vendor(id) => *id == vendor_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub vendor_id: Option<Uuid>,
    /// Case-insensitive match on name or description.
    pub query: Option<String>,
    pub category: Option<String>,
    pub published_only: bool,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if self.published_only && !product.is_published {
            return false;
        }
        if self.vendor_id.is_some_and(|v| v != product.vendor_id) {
            return false;
        }
        if let Some(category) = &self.category {
            if !product
                .category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(category))
            {
                return false;
            }
        }
        if let Some(query) = &self.query {
            let needle = query.to_lowercase();
            let in_name = product.name.to_lowercase().contains(&needle);
            let in_description = product
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        true
    }
}

/// Stock effect committed together with a status change
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationChange {
    None,
    /// Check availability over the order window and hold the quantities.
    Create(Vec<ReservationRequest>),
    Release,
}

/// Everything a lifecycle transition writes, applied atomically.
///
/// The write only succeeds while the stored status still equals
/// `expected_status`; otherwise the store answers `CoreError::Conflict`.
#[derive(Debug, Clone)]
pub struct OrderChange {
    pub order: SaleOrder,
    pub expected_status: OrderStatus,
    pub reservations: ReservationChange,
    pub invoice: Option<Invoice>,
    /// Coupon whose usage counter is incremented (fails once exhausted).
    pub coupon_use: Option<String>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: &User, profile: &Profile) -> CoreResult<()>;

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>>;

    async fn find_by_verification_token(&self, token: &str) -> CoreResult<Option<User>>;

    async fn update_user(&self, user: &User) -> CoreResult<()>;

    async fn list_users(&self, role: Option<Role>) -> CoreResult<Vec<User>>;

    async fn get_vendor_profile(&self, user_id: Uuid) -> CoreResult<Option<VendorProfile>>;

    async fn upsert_vendor_profile(&self, profile: &VendorProfile) -> CoreResult<()>;

    async fn get_customer_profile(&self, user_id: Uuid) -> CoreResult<Option<CustomerProfile>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create_product(&self, product: &Product) -> CoreResult<()>;

    async fn get_product(&self, id: Uuid) -> CoreResult<Option<Product>>;

    async fn list_products(&self, filter: &ProductFilter) -> CoreResult<Vec<Product>>;

    async fn update_product(&self, product: &Product) -> CoreResult<()>;

    /// Fails with `Conflict` while orders still reference the product.
    async fn delete_product(&self, id: Uuid) -> CoreResult<()>;

    async fn reservations_for_product(&self, product_id: Uuid) -> CoreResult<Vec<Reservation>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: &SaleOrder) -> CoreResult<()>;

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<SaleOrder>>;

    async fn list_orders(&self, scope: OrderScope) -> CoreResult<Vec<SaleOrder>>;

    /// Returns the order as stored, including inventory snapshots taken on confirm.
    async fn commit_transition(&self, change: OrderChange) -> CoreResult<SaleOrder>;

    async fn reservations_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Reservation>>;

    /// Picked-up orders not yet notified whose end date falls in `[from, to]`.
    async fn due_for_expiry_notice(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<SaleOrder>>;

    /// Sets `expiry_notified_at` only if unset. `false` means another claimer won.
    async fn mark_expiry_notified(&self, order_id: Uuid, at: DateTime<Utc>) -> CoreResult<bool>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn get_invoice(&self, id: Uuid) -> CoreResult<Option<Invoice>>;

    async fn get_invoice_for_order(&self, order_id: Uuid) -> CoreResult<Option<Invoice>>;

    async fn list_invoices(&self, scope: OrderScope) -> CoreResult<Vec<Invoice>>;

    /// Stores the payment and the updated invoice if the stored paid amount
    /// still equals `previous_paid_cents`.
    async fn record_payment(
        &self,
        invoice: &Invoice,
        previous_paid_cents: i64,
        payment: &Payment,
    ) -> CoreResult<()>;

    async fn list_payments(&self, invoice_id: Uuid) -> CoreResult<Vec<Payment>>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Fails with `Conflict` when the code exists.
    async fn create_coupon(&self, coupon: &Coupon) -> CoreResult<()>;

    async fn get_coupon(&self, id: Uuid) -> CoreResult<Option<Coupon>>;

    async fn find_by_code(&self, code: &str) -> CoreResult<Option<Coupon>>;

    async fn list_coupons(&self) -> CoreResult<Vec<Coupon>>;

    async fn set_active(&self, id: Uuid, active: bool) -> CoreResult<Option<Coupon>>;
}

/// A stored settings override
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSetting {
    pub key: String,
    pub value: serde_json::Value,
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn list_settings(&self) -> CoreResult<Vec<SystemSetting>>;

    async fn upsert_setting(&self, key: &str, value: &serde_json::Value) -> CoreResult<()>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> CoreResult<()>;

    /// Newest first.
    async fn list_recent(&self, limit: usize) -> CoreResult<Vec<AuditEntry>>;
}

/// All repositories of one backend
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub audit: Arc<dyn AuditRepository>,
}

impl Stores {
    /// Bundle a backend that implements every repository.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserRepository
            + ProductRepository
            + OrderRepository
            + InvoiceRepository
            + CouponRepository
            + SettingsRepository
            + AuditRepository
            + 'static,
    {
        Self {
            users: backend.clone(),
            products: backend.clone(),
            orders: backend.clone(),
            invoices: backend.clone(),
            coupons: backend.clone(),
            settings: backend.clone(),
            audit: backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rental_catalog::PeriodUnit;

    #[test]
    fn test_product_filter() {
        let vendor = Uuid::new_v4();
        let mut product = Product::new(vendor, "Canon EOS R6", 2).with_tier(PeriodUnit::Day, 2_000);
        product.category = Some("Cameras".into());
        product.description = Some("Full frame mirrorless body".into());
        product.is_published = false;

        let filter = ProductFilter {
            published_only: true,
            ..Default::default()
        };
        assert!(!filter.matches(&product));

        product.is_published = true;
        let filter = ProductFilter {
            vendor_id: Some(vendor),
            query: Some("MIRRORLESS".into()),
            category: Some("cameras".into()),
            published_only: true,
        };
        assert!(filter.matches(&product));

        let filter = ProductFilter {
            category: Some("Tents".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&product));
    }

    #[test]
    fn test_order_scope() {
        let (customer, vendor) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(OrderScope::All.admits(customer, vendor));
        assert!(OrderScope::Vendor(vendor).admits(customer, vendor));
        assert!(!OrderScope::Customer(vendor).admits(customer, vendor));
    }
}
