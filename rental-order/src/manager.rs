use crate::finance::LateFeePolicy;
use crate::models::{OrderStatus, SaleOrder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A requested lifecycle step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderAction {
    Send,
    Confirm,
    PickUp { at: DateTime<Utc> },
    Return { at: DateTime<Utc> },
    Invoice,
    Cancel,
}

impl OrderAction {
    pub fn name(&self) -> &'static str {
        match self {
            OrderAction::Send => "send",
            OrderAction::Confirm => "confirm",
            OrderAction::PickUp { .. } => "pickup",
            OrderAction::Return { .. } => "return",
            OrderAction::Invoice => "invoice",
            OrderAction::Cancel => "cancel",
        }
    }

    /// The status this action leads to when allowed.
    pub fn target(&self) -> OrderStatus {
        match self {
            OrderAction::Send => OrderStatus::Sent,
            OrderAction::Confirm => OrderStatus::Confirmed,
            OrderAction::PickUp { .. } => OrderStatus::PickedUp,
            OrderAction::Return { .. } => OrderStatus::Returned,
            OrderAction::Invoice => OrderStatus::Invoiced,
            OrderAction::Cancel => OrderStatus::Cancelled,
        }
    }
}

/// What a transition does to the order's stock holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationEffect {
    None,
    Create,
    Release,
}

/// Drives order state transitions.
///
/// The manager only mutates the order value it is given; persisting the
/// result and applying the [`ReservationEffect`] is left to the caller.
#[derive(Debug, Clone, Default)]
pub struct OrderManager {
    late_fees: LateFeePolicy,
}

impl OrderManager {
    pub fn new(late_fees: LateFeePolicy) -> Self {
        Self { late_fees }
    }

    /// Resolve the next status for `action`, rejecting disallowed pairs.
    pub fn next_status(from: OrderStatus, action: &OrderAction) -> Result<OrderStatus, OrderError> {
        use OrderStatus::*;

        let allowed = match action {
            OrderAction::Send => from == Quotation,
            OrderAction::Confirm => matches!(from, Quotation | Sent),
            OrderAction::PickUp { .. } => from == Confirmed,
            OrderAction::Return { .. } => from == PickedUp,
            OrderAction::Invoice => from == Returned,
            OrderAction::Cancel => matches!(from, Quotation | Sent | Confirmed),
        };

        if allowed {
            Ok(action.target())
        } else {
            Err(OrderError::InvalidTransition {
                from: from.to_string(),
                to: action.target().to_string(),
            })
        }
    }

    pub fn reservation_effect(from: OrderStatus, action: &OrderAction) -> ReservationEffect {
        match action {
            OrderAction::Confirm => ReservationEffect::Create,
            OrderAction::Return { .. } => ReservationEffect::Release,
            OrderAction::Cancel if from.holds_stock() => ReservationEffect::Release,
            _ => ReservationEffect::None,
        }
    }

    /// Apply `action` to `order`. On error the order is left untouched.
    pub fn apply(
        &self,
        order: &mut SaleOrder,
        action: OrderAction,
    ) -> Result<ReservationEffect, OrderError> {
        let from = order.status;
        let to = Self::next_status(from, &action)?;

        match action {
            OrderAction::Confirm => {
                if order.lines.is_empty() {
                    return Err(OrderError::Validation(
                        "cannot confirm an order without lines".to_string(),
                    ));
                }
            }
            OrderAction::PickUp { at } => {
                order.pickup_date = Some(at);
            }
            OrderAction::Return { at } => {
                if let Some(picked) = order.pickup_date {
                    if at < picked {
                        return Err(OrderError::Validation(
                            "return date is before pickup date".to_string(),
                        ));
                    }
                }
                order.return_date = Some(at);
                order.late_fee_cents =
                    self.late_fees
                        .late_fee(order.total_amount_cents, order.end_date, at);
            }
            _ => {}
        }

        order.status = to;
        order.updated_at = Utc::now();
        Ok(Self::reservation_effect(from, &action))
    }

    pub fn late_fees(&self) -> &LateFeePolicy {
        &self.late_fees
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid order: {0}")]
    Validation(String),
}
