use crate::manager::OrderError;
use chrono::{DateTime, Utc};
use rental_catalog::{DateWindow, InventoryError, PeriodUnit, RentalQuote, ReservationRequest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order status in the rental lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Quotation,
    Sent,
    Confirmed,
    PickedUp,
    Returned,
    Invoiced,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Quotation,
        OrderStatus::Sent,
        OrderStatus::Confirmed,
        OrderStatus::PickedUp,
        OrderStatus::Returned,
        OrderStatus::Invoiced,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Quotation => "QUOTATION",
            OrderStatus::Sent => "SENT",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::Invoiced => "INVOICED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Statuses during which the order holds reservations.
    pub fn holds_stock(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::PickedUp)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invoiced | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// A customer's rental of one vendor's products over a single window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleOrder {
    pub id: Uuid,
    pub number: String,
    pub customer_id: Uuid,
    pub vendor_id: Uuid,
    pub status: OrderStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub pickup_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub lines: Vec<SaleOrderLine>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_amount_cents: i64,
    pub late_fee_cents: i64,
    pub coupon_code: Option<String>,
    pub expiry_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SaleOrder {
    pub fn new(customer_id: Uuid, vendor_id: Uuid, window: DateWindow) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            number: order_number(&id),
            customer_id,
            vendor_id,
            status: OrderStatus::Quotation,
            start_date: window.start,
            end_date: window.end,
            pickup_date: None,
            return_date: None,
            lines: Vec::new(),
            subtotal_cents: 0,
            discount_cents: 0,
            total_amount_cents: 0,
            late_fee_cents: 0,
            coupon_code: None,
            expiry_notified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn window(&self) -> Result<DateWindow, InventoryError> {
        DateWindow::new(self.start_date, self.end_date)
    }

    /// Add a priced line and refresh the totals.
    /// Fails when the line would push the subtotal past what an amount can hold.
    pub fn add_line(
        &mut self,
        product_name: impl Into<String>,
        quote: RentalQuote,
    ) -> Result<(), OrderError> {
        self.subtotal_cents
            .checked_add(quote.line_total_cents)
            .ok_or_else(|| OrderError::Validation("order total is too large".to_string()))?;
        let line = SaleOrderLine {
            id: Uuid::new_v4(),
            order_id: self.id,
            product_id: quote.product_id,
            variant_id: quote.variant_id,
            product_name: product_name.into(),
            quantity: quote.quantity,
            unit: quote.unit,
            units: quote.units,
            unit_price_cents: quote.unit_price_cents,
            line_total_cents: quote.line_total_cents,
            inventory_snapshot: None,
        };
        self.lines.push(line);
        self.recalculate();
        Ok(())
    }

    pub fn apply_discount(&mut self, code: impl Into<String>, discount_cents: i64) {
        self.coupon_code = Some(code.into());
        self.discount_cents = discount_cents.clamp(0, self.subtotal_cents);
        self.recalculate();
    }

    pub fn recalculate(&mut self) {
        self.subtotal_cents = self
            .lines
            .iter()
            .fold(0i64, |acc, l| acc.saturating_add(l.line_total_cents));
        self.discount_cents = self.discount_cents.clamp(0, self.subtotal_cents);
        self.total_amount_cents = self.subtotal_cents - self.discount_cents;
        self.updated_at = Utc::now();
    }

    /// What the order needs to hold once confirmed.
    pub fn reservation_requests(&self) -> Vec<ReservationRequest> {
        self.lines
            .iter()
            .map(|line| ReservationRequest {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect()
    }

    pub fn involves(&self, user_id: &Uuid) -> bool {
        &self.customer_id == user_id || &self.vendor_id == user_id
    }
}

/// One product line of an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleOrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub unit: PeriodUnit,
    pub units: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    /// Stock the vendor had when the order was confirmed.
    pub inventory_snapshot: Option<i32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Posted,
    PartiallyPaid,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Posted => "POSTED",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Paid => "PAID",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POSTED" => Ok(InvoiceStatus::Posted),
            "PARTIALLY_PAID" => Ok(InvoiceStatus::PartiallyPaid),
            "PAID" => Ok(InvoiceStatus::Paid),
            other => Err(format!("unknown invoice status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub vendor_id: Uuid,
    pub status: InvoiceStatus,
    pub lines: Vec<InvoiceLine>,
    pub untaxed_cents: i64,
    pub gst_cents: i64,
    pub total_cents: i64,
    pub platform_fee_cents: i64,
    pub vendor_payout_cents: i64,
    pub amount_paid_cents: i64,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

impl Invoice {
    pub fn balance_cents(&self) -> i64 {
        (self.total_cents - self.amount_paid_cents).max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Upi,
    Cash,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Cash => "CASH",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentMethod::Card),
            "UPI" => Ok(PaymentMethod::Upi),
            "CASH" => Ok(PaymentMethod::Cash),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

/// A payment recorded against an invoice. Money is never moved by this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

pub fn order_number(id: &Uuid) -> String {
    format!("SO-{}", &id.simple().to_string()[..8].to_uppercase())
}

pub fn invoice_number(id: &Uuid, issued_at: DateTime<Utc>) -> String {
    format!(
        "INV/{}/{}",
        issued_at.format("%Y"),
        &id.simple().to_string()[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quote(product_id: Uuid, total: i64, quantity: i32) -> RentalQuote {
        RentalQuote {
            product_id,
            variant_id: None,
            unit: PeriodUnit::Day,
            units: 2,
            unit_price_cents: total / 2 / quantity as i64,
            quantity,
            line_total_cents: total,
        }
    }

    #[test]
    fn test_totals_follow_lines_and_discount() {
        let start = Utc::now();
        let window = DateWindow::new(start, start + Duration::days(2)).unwrap();
        let mut order = SaleOrder::new(Uuid::new_v4(), Uuid::new_v4(), window);
        order.add_line("Tent", quote(Uuid::new_v4(), 4_000, 1)).unwrap();
        order.add_line("Stove", quote(Uuid::new_v4(), 1_000, 1)).unwrap();
        assert_eq!(order.subtotal_cents, 5_000);

        order.apply_discount("SPRING", 9_999);
        assert_eq!(order.discount_cents, 5_000);
        assert_eq!(order.total_amount_cents, 0);

        order.apply_discount("SPRING", 500);
        assert_eq!(order.total_amount_cents, 4_500);
        assert!(order.number.starts_with("SO-"));
    }

    #[test]
    fn test_subtotal_overflow_is_rejected() {
        let start = Utc::now();
        let window = DateWindow::new(start, start + Duration::days(2)).unwrap();
        let mut order = SaleOrder::new(Uuid::new_v4(), Uuid::new_v4(), window);
        order.add_line("Crane", quote(Uuid::new_v4(), i64::MAX - 10, 1)).unwrap();

        let err = order.add_line("Barge", quote(Uuid::new_v4(), 100, 1));
        assert!(matches!(err, Err(OrderError::Validation(_))));
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.subtotal_cents, i64::MAX - 10);
    }

    #[test]
    fn test_status_round_trip_names() {
        assert_eq!("picked_up".parse::<OrderStatus>().unwrap(), OrderStatus::PickedUp);
        assert_eq!(OrderStatus::PickedUp.to_string(), "PICKED_UP");
        assert!(OrderStatus::Confirmed.holds_stock());
        assert!(!OrderStatus::Returned.holds_stock());
    }
}
