use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rental_catalog::{InventoryManager, Product, Reservation};
use rental_core::audit::AuditEntry;
use rental_core::identity::{CustomerProfile, Profile, Role, User, VendorProfile};
use rental_core::repository::{
    AuditRepository, CouponRepository, InvoiceRepository, OrderChange, OrderRepository,
    OrderScope, ProductFilter, ProductRepository, ReservationChange, SettingsRepository,
    SystemSetting, UserRepository,
};
use rental_core::{CoreError, CoreResult};
use rental_order::{Coupon, Invoice, OrderStatus, Payment, SaleOrder};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    vendor_profiles: HashMap<Uuid, VendorProfile>,
    customer_profiles: HashMap<Uuid, CustomerProfile>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, SaleOrder>,
    inventory: InventoryManager,
    invoices: HashMap<Uuid, Invoice>,
    payments: Vec<Payment>,
    coupons: HashMap<Uuid, Coupon>,
    settings: BTreeMap<String, Value>,
    audit: Vec<AuditEntry>,
}

/// In-process backend. Every operation takes the one lock, so a transition
/// observes and writes a consistent state.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: &User, profile: &Profile) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(CoreError::Conflict("email already registered".to_string()));
        }
        state.users.insert(user.id, user.clone());
        match profile {
            Profile::Vendor(p) => {
                state.vendor_profiles.insert(user.id, p.clone());
            }
            Profile::Customer(p) => {
                state.customer_profiles.insert(user.id, p.clone());
            }
            Profile::None => {}
        }
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_verification_token(&self, token: &str) -> CoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> CoreResult<()> {
        let mut state = self.state.write().await;
        match state.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("user {}", user.id))),
        }
    }

    async fn list_users(&self, role: Option<Role>) -> CoreResult<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| role.is_none_or(|r| u.role == r))
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn get_vendor_profile(&self, user_id: Uuid) -> CoreResult<Option<VendorProfile>> {
        Ok(self.state.read().await.vendor_profiles.get(&user_id).cloned())
    }

    async fn upsert_vendor_profile(&self, profile: &VendorProfile) -> CoreResult<()> {
        let mut state = self.state.write().await;
        state.vendor_profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn get_customer_profile(&self, user_id: Uuid) -> CoreResult<Option<CustomerProfile>> {
        Ok(self.state.read().await.customer_profiles.get(&user_id).cloned())
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn create_product(&self, product: &Product) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.products.contains_key(&product.id) {
            return Err(CoreError::Conflict(format!("product {} exists", product.id)));
        }
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> CoreResult<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> CoreResult<Vec<Product>> {
        let state = self.state.read().await;
        let products = state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        Ok(newest_first(products, |p| p.created_at))
    }

    async fn update_product(&self, product: &Product) -> CoreResult<()> {
        let mut state = self.state.write().await;
        match state.products.get_mut(&product.id) {
            Some(stored) => {
                *stored = product.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("product {}", product.id))),
        }
    }

    async fn delete_product(&self, id: Uuid) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(&id) {
            return Err(CoreError::NotFound(format!("product {}", id)));
        }
        let referenced = state
            .orders
            .values()
            .any(|o| o.lines.iter().any(|l| l.product_id == id));
        if referenced {
            return Err(CoreError::Conflict("product is referenced by orders".to_string()));
        }
        state.products.remove(&id);
        Ok(())
    }

    async fn reservations_for_product(&self, product_id: Uuid) -> CoreResult<Vec<Reservation>> {
        Ok(self.state.read().await.inventory.for_product(&product_id))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create_order(&self, order: &SaleOrder) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Err(CoreError::Conflict(format!("order {} exists", order.number)));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<SaleOrder>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, scope: OrderScope) -> CoreResult<Vec<SaleOrder>> {
        let state = self.state.read().await;
        let orders = state
            .orders
            .values()
            .filter(|o| scope.admits(o.customer_id, o.vendor_id))
            .cloned()
            .collect();
        Ok(newest_first(orders, |o| o.created_at))
    }

    async fn commit_transition(&self, change: OrderChange) -> CoreResult<SaleOrder> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut order = change.order;

        let current = state
            .orders
            .get(&order.id)
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order.id)))?;
        if current.status != change.expected_status {
            return Err(CoreError::Conflict(format!(
                "order {} changed concurrently (now {})",
                order.number, current.status
            )));
        }

        // checks that can fail run before anything is written
        let coupon_id = match &change.coupon_use {
            Some(code) => {
                let coupon = state
                    .coupons
                    .values()
                    .find(|c| &c.code == code)
                    .filter(|c| c.is_active && c.max_uses.is_none_or(|max| c.used_count < max))
                    .ok_or_else(|| {
                        CoreError::Conflict(format!("coupon {} is no longer available", code))
                    })?;
                Some(coupon.id)
            }
            None => None,
        };
        if let Some(invoice) = &change.invoice {
            if state.invoices.values().any(|i| i.order_id == invoice.order_id) {
                return Err(CoreError::Conflict("order is already invoiced".to_string()));
            }
        }

        match &change.reservations {
            ReservationChange::Create(requests) => {
                let window = order.window()?;
                let products = &state.products;
                state.inventory.reserve(order.id, window, requests, |id| {
                    products.get(id).map(|p| p.quantity_on_hand)
                })?;
                for line in order.lines.iter_mut() {
                    line.inventory_snapshot = products.get(&line.product_id).map(|p| p.quantity_on_hand);
                }
            }
            ReservationChange::Release => {
                state.inventory.release_order(&order.id);
            }
            ReservationChange::None => {}
        }

        if let Some(coupon) = coupon_id.and_then(|id| state.coupons.get_mut(&id)) {
            coupon.used_count += 1;
        }
        if let Some(invoice) = change.invoice {
            state.invoices.insert(invoice.id, invoice);
        }

        order.expiry_notified_at = current_notified(state, &order);
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn reservations_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Reservation>> {
        Ok(self.state.read().await.inventory.for_order(&order_id))
    }

    async fn due_for_expiry_notice(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<SaleOrder>> {
        let state = self.state.read().await;
        let mut due: Vec<SaleOrder> = state
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::PickedUp
                    && o.expiry_notified_at.is_none()
                    && o.end_date >= from
                    && o.end_date <= to
            })
            .cloned()
            .collect();
        due.sort_by_key(|o| o.end_date);
        Ok(due)
    }

    async fn mark_expiry_notified(&self, order_id: Uuid, at: DateTime<Utc>) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        match state.orders.get_mut(&order_id) {
            Some(order) if order.expiry_notified_at.is_none() => {
                order.expiry_notified_at = Some(at);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::NotFound(format!("order {}", order_id))),
        }
    }
}

/// The notifier owns `expiry_notified_at`; transitions never overwrite it.
fn current_notified(state: &MemoryState, order: &SaleOrder) -> Option<DateTime<Utc>> {
    state
        .orders
        .get(&order.id)
        .and_then(|o| o.expiry_notified_at)
}

#[async_trait]
impl InvoiceRepository for MemoryStore {
    async fn get_invoice(&self, id: Uuid) -> CoreResult<Option<Invoice>> {
        Ok(self.state.read().await.invoices.get(&id).cloned())
    }

    async fn get_invoice_for_order(&self, order_id: Uuid) -> CoreResult<Option<Invoice>> {
        let state = self.state.read().await;
        Ok(state.invoices.values().find(|i| i.order_id == order_id).cloned())
    }

    async fn list_invoices(&self, scope: OrderScope) -> CoreResult<Vec<Invoice>> {
        let state = self.state.read().await;
        let invoices = state
            .invoices
            .values()
            .filter(|i| scope.admits(i.customer_id, i.vendor_id))
            .cloned()
            .collect();
        Ok(newest_first(invoices, |i| i.issued_at))
    }

    async fn record_payment(
        &self,
        invoice: &Invoice,
        previous_paid_cents: i64,
        payment: &Payment,
    ) -> CoreResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .invoices
            .get_mut(&invoice.id)
            .ok_or_else(|| CoreError::NotFound(format!("invoice {}", invoice.id)))?;
        if stored.amount_paid_cents != previous_paid_cents {
            return Err(CoreError::Conflict(format!(
                "invoice {} was paid concurrently",
                invoice.number
            )));
        }
        stored.amount_paid_cents = invoice.amount_paid_cents;
        stored.status = invoice.status;
        state.payments.push(payment.clone());
        Ok(())
    }

    async fn list_payments(&self, invoice_id: Uuid) -> CoreResult<Vec<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CouponRepository for MemoryStore {
    async fn create_coupon(&self, coupon: &Coupon) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if state.coupons.values().any(|c| c.code == coupon.code) {
            return Err(CoreError::Conflict(format!("coupon {} already exists", coupon.code)));
        }
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn get_coupon(&self, id: Uuid) -> CoreResult<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> CoreResult<Option<Coupon>> {
        let code = Coupon::normalize(code);
        let state = self.state.read().await;
        Ok(state.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn list_coupons(&self) -> CoreResult<Vec<Coupon>> {
        let state = self.state.read().await;
        Ok(newest_first(state.coupons.values().cloned().collect(), |c| c.created_at))
    }

    async fn set_active(&self, id: Uuid, active: bool) -> CoreResult<Option<Coupon>> {
        let mut state = self.state.write().await;
        Ok(state.coupons.get_mut(&id).map(|c| {
            c.is_active = active;
            c.clone()
        }))
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn list_settings(&self) -> CoreResult<Vec<SystemSetting>> {
        let state = self.state.read().await;
        Ok(state
            .settings
            .iter()
            .map(|(key, value)| SystemSetting {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn upsert_setting(&self, key: &str, value: &Value) -> CoreResult<()> {
        let mut state = self.state.write().await;
        state.settings.insert(key.to_string(), value.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn append(&self, entry: &AuditEntry) -> CoreResult<()> {
        self.state.write().await.audit.push(entry.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> CoreResult<Vec<AuditEntry>> {
        let state = self.state.read().await;
        Ok(state.audit.iter().rev().take(limit).cloned().collect())
    }
}
