use chrono::{DateTime, Utc};
use rental_catalog::{
    available_in_window, inventory::merge_requests, DateWindow, InventoryError, PricingEngine,
    Product,
};
use rental_order::{
    Coupon, CouponError, FinancialManager, Invoice, OrderAction, OrderManager, OrderStatus,
    ReservationEffect, SaleOrder,
};
use rental_shared::models::events::OrderTransitionedEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::identity::{Actor, Role};
use crate::notify::{self, Mailer};
use crate::repository::{OrderChange, OrderScope, ReservationChange, Stores};
use crate::settings::{effective_rules, RentalRules};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub lines: Vec<OrderLineRequest>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub order: SaleOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Invoice>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LateFeePreview {
    pub order_id: Uuid,
    pub end_date: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
    pub grace_period_hours: i64,
    pub days_late: i64,
    pub late_fee_cents: i64,
}

/// Who may drive an order: admins always, the order's vendor for every
/// step, the ordering customer only to confirm or cancel.
pub fn can_perform(actor: &Actor, order: &SaleOrder, action: &OrderAction) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Vendor => actor.id == order.vendor_id,
        Role::Customer => {
            actor.id == order.customer_id
                && matches!(action, OrderAction::Confirm | OrderAction::Cancel)
        }
    }
}

pub fn scope_for(actor: &Actor) -> OrderScope {
    match actor.role {
        Role::Admin => OrderScope::All,
        Role::Vendor => OrderScope::Vendor(actor.id),
        Role::Customer => OrderScope::Customer(actor.id),
    }
}

/// Orchestrates quotations and status transitions over the repositories.
#[derive(Clone)]
pub struct OrderLifecycle {
    stores: Stores,
    mailer: Arc<dyn Mailer>,
    defaults: RentalRules,
    pricing: PricingEngine,
    finance: FinancialManager,
}

impl OrderLifecycle {
    pub fn new(stores: Stores, mailer: Arc<dyn Mailer>, defaults: RentalRules) -> Self {
        Self {
            stores,
            mailer,
            defaults,
            pricing: PricingEngine::new(),
            finance: FinancialManager::new(),
        }
    }

    pub async fn rules(&self) -> CoreResult<RentalRules> {
        effective_rules(self.stores.settings.as_ref(), &self.defaults).await
    }

    /// Price a customer's request into a new `QUOTATION`. Holds no stock.
    pub async fn create_quotation(
        &self,
        actor: &Actor,
        request: CreateOrderRequest,
    ) -> CoreResult<SaleOrder> {
        if actor.role != Role::Customer {
            return Err(CoreError::Forbidden(
                "only customers can request quotations".to_string(),
            ));
        }
        let window = DateWindow::new(request.start_date, request.end_date)?;
        if request.lines.is_empty() {
            return Err(CoreError::Validation("an order needs at least one line".to_string()));
        }

        let rules = self.rules().await?;
        let mut products: HashMap<Uuid, Product> = HashMap::new();
        let mut vendor_id: Option<Uuid> = None;
        let mut priced = Vec::with_capacity(request.lines.len());

        for line in &request.lines {
            let product = match products.get(&line.product_id) {
                Some(p) => p.clone(),
                None => self.load_rentable(line.product_id, &rules).await?,
            };

            match vendor_id {
                Some(v) if v != product.vendor_id => {
                    return Err(CoreError::Validation(
                        "an order can only contain products of one vendor".to_string(),
                    ));
                }
                _ => vendor_id = Some(product.vendor_id),
            }

            let quote = self
                .pricing
                .quote(&product, line.variant_id, &window, line.quantity)?;
            priced.push((product.name.clone(), quote));
            products.insert(product.id, product);
        }

        let Some(vendor_id) = vendor_id else {
            return Err(CoreError::Validation("an order needs at least one line".to_string()));
        };
        let mut order = SaleOrder::new(actor.id, vendor_id, window);
        for (name, quote) in priced {
            order.add_line(name, quote)?;
        }

        for (product_id, requested) in merge_requests(&order.reservation_requests())? {
            let total = products
                .get(&product_id)
                .map(|p| p.quantity_on_hand)
                .unwrap_or_default();
            let reservations = self.stores.products.reservations_for_product(product_id).await?;
            let available = available_in_window(total, &reservations, product_id, &window);
            if requested > available {
                return Err(InventoryError::InsufficientInventory {
                    product_id,
                    requested,
                    available,
                }
                .into());
            }
        }

        if let Some(code) = request.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let coupon = self.find_coupon(code).await?;
            let discount = coupon.discount_for(order.subtotal_cents, Utc::now())?;
            order.apply_discount(coupon.code, discount);
        }

        self.stores.orders.create_order(&order).await?;
        self.audit(
            Some(actor.id),
            "order.created",
            order.id,
            serde_json::json!({
                "number": order.number,
                "total_amount_cents": order.total_amount_cents,
            }),
        )
        .await;

        info!(
            "Quotation {} created for vendor {} ({} lines, total {})",
            order.number,
            order.vendor_id,
            order.lines.len(),
            order.total_amount_cents
        );
        Ok(order)
    }

    /// A published product with its pricing cut down to the enabled rental periods.
    pub async fn load_rentable(&self, product_id: Uuid, rules: &RentalRules) -> CoreResult<Product> {
        let mut product = self
            .stores
            .products
            .get_product(product_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("product {}", product_id)))?;

        if !product.is_published {
            return Err(CoreError::Validation(format!(
                "product {} is not available for rent",
                product.name
            )));
        }

        product
            .pricing
            .retain(|tier| rules.rental_periods.contains(&tier.unit));
        if product.pricing.is_empty() {
            return Err(CoreError::Validation(format!(
                "product {} has no price for an enabled rental period",
                product.name
            )));
        }
        Ok(product)
    }

    async fn find_coupon(&self, code: &str) -> CoreResult<Coupon> {
        let code = Coupon::normalize(code);
        self.stores
            .coupons
            .find_by_code(&code)
            .await?
            .ok_or_else(|| CouponError::NotFound(code).into())
    }

    /// Load an order the actor is allowed to see.
    pub async fn get_order(&self, actor: &Actor, order_id: Uuid) -> CoreResult<SaleOrder> {
        let order = self
            .stores
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))?;

        if !scope_for(actor).admits(order.customer_id, order.vendor_id) {
            return Err(CoreError::Forbidden("not a participant of this order".to_string()));
        }
        Ok(order)
    }

    pub async fn list_orders(&self, actor: &Actor) -> CoreResult<Vec<SaleOrder>> {
        self.stores.orders.list_orders(scope_for(actor)).await
    }

    pub async fn send(&self, actor: &Actor, order_id: Uuid) -> CoreResult<TransitionOutcome> {
        self.transition(actor, order_id, OrderAction::Send).await
    }

    pub async fn confirm(&self, actor: &Actor, order_id: Uuid) -> CoreResult<TransitionOutcome> {
        self.transition(actor, order_id, OrderAction::Confirm).await
    }

    pub async fn pick_up(
        &self,
        actor: &Actor,
        order_id: Uuid,
        at: DateTime<Utc>,
    ) -> CoreResult<TransitionOutcome> {
        self.transition(actor, order_id, OrderAction::PickUp { at }).await
    }

    pub async fn mark_returned(
        &self,
        actor: &Actor,
        order_id: Uuid,
        at: DateTime<Utc>,
    ) -> CoreResult<TransitionOutcome> {
        self.transition(actor, order_id, OrderAction::Return { at }).await
    }

    pub async fn invoice(&self, actor: &Actor, order_id: Uuid) -> CoreResult<TransitionOutcome> {
        self.transition(actor, order_id, OrderAction::Invoice).await
    }

    pub async fn cancel(&self, actor: &Actor, order_id: Uuid) -> CoreResult<TransitionOutcome> {
        self.transition(actor, order_id, OrderAction::Cancel).await
    }

    /// Validate and commit one step of the state machine.
    pub async fn transition(
        &self,
        actor: &Actor,
        order_id: Uuid,
        action: OrderAction,
    ) -> CoreResult<TransitionOutcome> {
        let mut order = self.get_order(actor, order_id).await?;
        if !can_perform(actor, &order, &action) {
            return Err(CoreError::Forbidden(format!(
                "{} may not {} this order",
                actor.role,
                action.name()
            )));
        }

        let rules = self.rules().await?;
        let now = Utc::now();
        let expected_status = order.status;
        let manager = OrderManager::new(rules.late_fee_policy());
        let effect = manager.apply(&mut order, action)?;

        let mut coupon_use = None;
        if action == OrderAction::Confirm {
            if let Some(code) = order.coupon_code.clone() {
                let coupon = self.find_coupon(&code).await?;
                let discount = coupon.discount_for(order.subtotal_cents, now)?;
                order.apply_discount(coupon.code.clone(), discount);
                coupon_use = Some(coupon.code);
            }
        }

        let reservations = match effect {
            ReservationEffect::Create => ReservationChange::Create(order.reservation_requests()),
            ReservationEffect::Release => ReservationChange::Release,
            ReservationEffect::None => ReservationChange::None,
        };
        let released = match reservations {
            ReservationChange::Release => {
                self.stores.orders.reservations_for_order(order_id).await?.len()
            }
            _ => 0,
        };

        let invoice = match action {
            OrderAction::Invoice => {
                Some(self.finance.build_invoice(&order, &rules.invoice_rates(), now))
            }
            _ => None,
        };

        let stored = self
            .stores
            .orders
            .commit_transition(OrderChange {
                order,
                expected_status,
                reservations,
                invoice: invoice.clone(),
                coupon_use,
            })
            .await?;

        let created = match effect {
            ReservationEffect::Create => {
                self.stores.orders.reservations_for_order(stored.id).await?.len()
            }
            _ => 0,
        };
        let event = OrderTransitionedEvent {
            order_id: stored.id,
            order_number: stored.number.clone(),
            from_status: expected_status.to_string(),
            to_status: stored.status.to_string(),
            actor_id: Some(actor.id),
            reservations_created: created,
            reservations_released: released,
            timestamp: now,
        };
        info!(
            "Order {} moved {} -> {} by {}",
            stored.number, event.from_status, event.to_status, actor.id
        );
        self.audit(
            Some(actor.id),
            format!("order.{}", action.name()),
            stored.id,
            serde_json::to_value(&event).unwrap_or_default(),
        )
        .await;

        if stored.status == OrderStatus::Confirmed {
            self.notify_confirmed(&stored).await;
        }

        Ok(TransitionOutcome {
            order: stored,
            invoice,
        })
    }

    /// Late fee the order would owe if returned at `at`.
    pub async fn late_fee_preview(
        &self,
        actor: &Actor,
        order_id: Uuid,
        at: DateTime<Utc>,
    ) -> CoreResult<LateFeePreview> {
        let order = self.get_order(actor, order_id).await?;
        let policy = self.rules().await?.late_fee_policy();

        Ok(LateFeePreview {
            order_id: order.id,
            end_date: order.end_date,
            evaluated_at: at,
            grace_period_hours: policy.grace_period_hours,
            days_late: policy.days_late(order.end_date, at),
            late_fee_cents: policy.late_fee(order.total_amount_cents, order.end_date, at),
        })
    }

    async fn notify_confirmed(&self, order: &SaleOrder) {
        match self.stores.users.get_user(order.customer_id).await {
            Ok(Some(customer)) => {
                let message = notify::order_confirmed_email(order, &customer);
                notify::deliver(self.mailer.as_ref(), &message).await;
            }
            Ok(None) => warn!("Customer {} of order {} not found", order.customer_id, order.number),
            Err(e) => warn!("Could not load customer of order {}: {}", order.number, e),
        }
    }

    async fn audit(
        &self,
        actor_id: Option<Uuid>,
        action: impl Into<String>,
        order_id: Uuid,
        detail: serde_json::Value,
    ) {
        let entry = AuditEntry::new(actor_id, action, "order", order_id, detail);
        if let Err(e) = self.stores.audit.append(&entry).await {
            warn!("Failed to write audit entry {}: {}", entry.action, e);
        }
    }
}
