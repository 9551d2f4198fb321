use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Emitted after an order moved to a new status. Stored as the detail of the
/// matching audit entry.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderTransitionedEvent {
    pub order_id: Uuid,
    pub order_number: String,
    pub from_status: String,
    pub to_status: String,
    pub actor_id: Option<Uuid>,
    pub reservations_created: usize,
    pub reservations_released: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ExpiryNoticeSentEvent {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub end_date: DateTime<Utc>,
    pub delivered: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentRecordedEvent {
    pub invoice_id: Uuid,
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub method: String,
    pub timestamp: DateTime<Utc>,
}
