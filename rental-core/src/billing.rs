use chrono::Utc;
use rental_order::{EarningsSummary, FinancialManager, Invoice, Payment, PaymentMethod};
use rental_shared::models::events::PaymentRecordedEvent;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::identity::{Actor, Role};
use crate::lifecycle::scope_for;
use crate::repository::{OrderScope, Stores};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

/// Invoice lookups and payment recording
#[derive(Clone)]
pub struct Billing {
    stores: Stores,
    finance: FinancialManager,
}

impl Billing {
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            finance: FinancialManager::new(),
        }
    }

    pub async fn get_invoice(&self, actor: &Actor, invoice_id: Uuid) -> CoreResult<Invoice> {
        let invoice = self
            .stores
            .invoices
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("invoice {}", invoice_id)))?;

        if !scope_for(actor).admits(invoice.customer_id, invoice.vendor_id) {
            return Err(CoreError::Forbidden("not a participant of this invoice".to_string()));
        }
        Ok(invoice)
    }

    pub async fn list_invoices(&self, actor: &Actor) -> CoreResult<Vec<Invoice>> {
        self.stores.invoices.list_invoices(scope_for(actor)).await
    }

    pub async fn list_payments(&self, actor: &Actor, invoice_id: Uuid) -> CoreResult<Vec<Payment>> {
        let invoice = self.get_invoice(actor, invoice_id).await?;
        self.stores.invoices.list_payments(invoice.id).await
    }

    /// Record a payment made outside the platform.
    pub async fn record_payment(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        request: PaymentRequest,
    ) -> CoreResult<(Invoice, Payment)> {
        let mut invoice = self.get_invoice(actor, invoice_id).await?;
        let previous_paid = invoice.amount_paid_cents;
        self.finance.apply_payment(&mut invoice, request.amount_cents)?;

        let payment = Payment {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            amount_cents: request.amount_cents,
            method: request.method,
            reference: request.reference.filter(|r| !r.trim().is_empty()),
            paid_at: Utc::now(),
        };
        self.stores
            .invoices
            .record_payment(&invoice, previous_paid, &payment)
            .await?;

        let event = PaymentRecordedEvent {
            invoice_id: invoice.id,
            payment_id: payment.id,
            amount_cents: payment.amount_cents,
            method: payment.method.as_str().to_string(),
            timestamp: payment.paid_at,
        };
        info!(
            "Payment of {} recorded on invoice {} ({})",
            payment.amount_cents,
            invoice.number,
            invoice.status.as_str()
        );
        let entry = AuditEntry::new(
            Some(actor.id),
            "invoice.payment",
            "invoice",
            invoice.id,
            serde_json::to_value(&event).unwrap_or_default(),
        );
        if let Err(e) = self.stores.audit.append(&entry).await {
            warn!("Failed to write audit entry {}: {}", entry.action, e);
        }

        Ok((invoice, payment))
    }

    pub async fn vendor_earnings(&self, actor: &Actor) -> CoreResult<EarningsSummary> {
        if actor.role != Role::Vendor {
            return Err(CoreError::Forbidden("earnings are only kept for vendors".to_string()));
        }
        let invoices = self
            .stores
            .invoices
            .list_invoices(OrderScope::Vendor(actor.id))
            .await?;
        Ok(self.finance.vendor_earnings(actor.id, &invoices))
    }
}
