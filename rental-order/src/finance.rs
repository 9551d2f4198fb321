use crate::manager::OrderError;
use crate::models::{invoice_number, Invoice, InvoiceLine, InvoiceStatus, SaleOrder};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PAYMENT_TERM_DAYS: i64 = 7;

/// Charges for a return past the agreed end date.
///
/// `daily_rate` is a fraction of the order amount per started day late
/// (0.1 charges 10% per day).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LateFeePolicy {
    pub daily_rate: f64,
    pub grace_period_hours: i64,
}

impl Default for LateFeePolicy {
    fn default() -> Self {
        Self {
            daily_rate: 0.1,
            grace_period_hours: 2,
        }
    }
}

impl LateFeePolicy {
    pub fn new(daily_rate: f64, grace_period_hours: i64) -> Self {
        Self {
            daily_rate,
            grace_period_hours,
        }
    }

    /// Days are counted from `end_date`, not from the end of the grace period.
    pub fn late_fee(
        &self,
        order_amount_cents: i64,
        end_date: DateTime<Utc>,
        returned_at: DateTime<Utc>,
    ) -> i64 {
        // A grace period reaching past the calendar never ends.
        let Some(deadline) = Duration::try_hours(self.grace_period_hours.max(0))
            .and_then(|grace| end_date.checked_add_signed(grace))
        else {
            return 0;
        };
        if returned_at <= deadline {
            return 0;
        }

        let days_late = self.days_late(end_date, returned_at);
        let fee = days_late as f64 * self.daily_rate * order_amount_cents as f64;
        fee.round().max(0.0) as i64
    }

    pub fn days_late(&self, end_date: DateTime<Utc>, returned_at: DateTime<Utc>) -> i64 {
        let late = (returned_at - end_date).num_seconds();
        if late <= 0 {
            return 0;
        }
        (late as f64 / 86_400.0).ceil() as i64
    }
}

/// Percentages applied when an order is invoiced
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRates {
    pub gst_percent: f64,
    pub platform_fee_percent: f64,
}

fn percent_of(amount_cents: i64, percent: f64) -> i64 {
    (amount_cents as f64 * percent / 100.0).round() as i64
}

/// Vendor earnings rollup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarningsSummary {
    pub vendor_id: Uuid,
    pub gross_cents: i64,
    pub platform_fees_cents: i64,
    pub net_payout_cents: i64,
    pub outstanding_cents: i64,
    pub invoice_count: usize,
    pub paid_invoice_count: usize,
}

/// Handles financial operations for orders
#[derive(Debug, Clone, Default)]
pub struct FinancialManager;

impl FinancialManager {
    pub fn new() -> Self {
        Self
    }

    /// Build the invoice of a returned order.
    pub fn build_invoice(
        &self,
        order: &SaleOrder,
        rates: &InvoiceRates,
        now: DateTime<Utc>,
    ) -> Invoice {
        let mut lines: Vec<InvoiceLine> = order
            .lines
            .iter()
            .map(|line| InvoiceLine {
                description: format!(
                    "{} x{} ({} {})",
                    line.product_name,
                    line.quantity,
                    line.units,
                    line.unit.as_str().to_lowercase()
                ),
                quantity: line.units * line.quantity as i64,
                unit_price_cents: line.unit_price_cents,
                amount_cents: line.line_total_cents,
            })
            .collect();

        if order.discount_cents > 0 {
            lines.push(InvoiceLine {
                description: format!(
                    "Discount ({})",
                    order.coupon_code.as_deref().unwrap_or("coupon")
                ),
                quantity: 1,
                unit_price_cents: -order.discount_cents,
                amount_cents: -order.discount_cents,
            });
        }

        if order.late_fee_cents > 0 {
            lines.push(InvoiceLine {
                description: "Late return fee".to_string(),
                quantity: 1,
                unit_price_cents: order.late_fee_cents,
                amount_cents: order.late_fee_cents,
            });
        }

        let untaxed = order.total_amount_cents.saturating_add(order.late_fee_cents);
        let gst = percent_of(untaxed, rates.gst_percent);
        let total = untaxed.saturating_add(gst);
        let platform_fee = percent_of(untaxed, rates.platform_fee_percent);
        let id = Uuid::new_v4();

        Invoice {
            id,
            number: invoice_number(&id, now),
            order_id: order.id,
            customer_id: order.customer_id,
            vendor_id: order.vendor_id,
            status: if total == 0 {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::Posted
            },
            lines,
            untaxed_cents: untaxed,
            gst_cents: gst,
            total_cents: total,
            platform_fee_cents: platform_fee,
            vendor_payout_cents: untaxed - platform_fee,
            amount_paid_cents: 0,
            issued_at: now,
            due_at: now + Duration::days(PAYMENT_TERM_DAYS),
        }
    }

    /// Record `amount_cents` against the outstanding balance.
    pub fn apply_payment(&self, invoice: &mut Invoice, amount_cents: i64) -> Result<(), OrderError> {
        if amount_cents <= 0 {
            return Err(OrderError::Validation(
                "payment amount must be positive".to_string(),
            ));
        }
        let balance = invoice.balance_cents();
        if amount_cents > balance {
            return Err(OrderError::Validation(format!(
                "payment of {} exceeds outstanding balance {}",
                amount_cents, balance
            )));
        }

        invoice.amount_paid_cents += amount_cents;
        invoice.status = if invoice.amount_paid_cents >= invoice.total_cents {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::PartiallyPaid
        };
        Ok(())
    }

    pub fn vendor_earnings(&self, vendor_id: Uuid, invoices: &[Invoice]) -> EarningsSummary {
        let mut summary = EarningsSummary {
            vendor_id,
            ..Default::default()
        };

        for invoice in invoices.iter().filter(|i| i.vendor_id == vendor_id) {
            summary.invoice_count += 1;
            summary.gross_cents += invoice.untaxed_cents;
            summary.platform_fees_cents += invoice.platform_fee_cents;
            summary.net_payout_cents += invoice.vendor_payout_cents;
            summary.outstanding_cents += invoice.balance_cents();
            if invoice.status == InvoiceStatus::Paid {
                summary.paid_invoice_count += 1;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rental_catalog::{DateWindow, PeriodUnit, RentalQuote};

    fn returned_order(total: i64) -> SaleOrder {
        let start = Utc::now() - Duration::days(5);
        let window = DateWindow::new(start, start + Duration::days(2)).unwrap();
        let mut order = SaleOrder::new(Uuid::new_v4(), Uuid::new_v4(), window);
        order.add_line(
            "Camera",
            RentalQuote {
                product_id: Uuid::new_v4(),
                variant_id: None,
                unit: PeriodUnit::Day,
                units: 2,
                unit_price_cents: total / 2,
                quantity: 1,
                line_total_cents: total,
            },
        )
        .unwrap();
        order
    }

    #[test]
    fn test_late_fee_inside_grace_is_zero() {
        let policy = LateFeePolicy::new(0.1, 2);
        let end = Utc::now();
        assert_eq!(policy.late_fee(10_000, end, end - Duration::hours(5)), 0);
        assert_eq!(policy.late_fee(10_000, end, end + Duration::hours(2)), 0);
    }

    #[test]
    fn test_late_fee_counts_started_days_from_end_date() {
        let policy = LateFeePolicy::new(0.1, 2);
        let end = Utc::now();
        // 3 hours late: one started day
        assert_eq!(policy.late_fee(10_000, end, end + Duration::hours(3)), 1_000);
        // 25 hours late: two started days
        assert_eq!(policy.late_fee(10_000, end, end + Duration::hours(25)), 2_000);
        assert_eq!(policy.late_fee(10_000, end, end + Duration::days(3)), 3_000);
    }

    #[test]
    fn test_huge_grace_period_does_not_panic() {
        let end = Utc::now();
        let returned = end + Duration::days(3);
        assert_eq!(LateFeePolicy::new(0.1, i64::MAX).late_fee(10_000, end, returned), 0);
        assert_eq!(
            LateFeePolicy::new(0.1, 2).late_fee(10_000, DateTime::<Utc>::MAX_UTC, returned),
            0
        );
    }

    #[test]
    fn test_invoice_saturates_on_extreme_late_fee() {
        let mut order = returned_order(10_000);
        order.late_fee_cents = LateFeePolicy::new(1e300, 0).late_fee(
            order.total_amount_cents,
            order.end_date,
            order.end_date + Duration::days(2),
        );
        assert_eq!(order.late_fee_cents, i64::MAX);

        let rates = InvoiceRates {
            gst_percent: 18.0,
            platform_fee_percent: 10.0,
        };
        let invoice = FinancialManager::new().build_invoice(&order, &rates, Utc::now());
        assert_eq!(invoice.untaxed_cents, i64::MAX);
        assert_eq!(invoice.total_cents, i64::MAX);
    }

    #[test]
    fn test_late_fee_rounds_to_cent() {
        let policy = LateFeePolicy::new(0.125, 0);
        let end = Utc::now();
        // 1 day * 0.125 * 333 = 41.625
        assert_eq!(policy.late_fee(333, end, end + Duration::minutes(1)), 42);
    }

    #[test]
    fn test_invoice_totals() {
        let mut order = returned_order(10_000);
        order.apply_discount("TENOFF", 1_000);
        order.late_fee_cents = 900;

        let rates = InvoiceRates {
            gst_percent: 18.0,
            platform_fee_percent: 10.0,
        };
        let now = Utc::now();
        let invoice = FinancialManager::new().build_invoice(&order, &rates, now);

        assert_eq!(invoice.untaxed_cents, 9_900);
        assert_eq!(invoice.gst_cents, 1_782);
        assert_eq!(invoice.total_cents, 11_682);
        assert_eq!(invoice.platform_fee_cents, 990);
        assert_eq!(invoice.vendor_payout_cents, 8_910);
        assert_eq!(invoice.lines.len(), 3);
        assert_eq!(invoice.status, InvoiceStatus::Posted);
        assert_eq!(invoice.due_at, now + Duration::days(7));
        assert!(invoice.number.starts_with("INV/"));
    }

    #[test]
    fn test_payments_update_status_and_reject_overpayment() {
        let finance = FinancialManager::new();
        let rates = InvoiceRates {
            gst_percent: 0.0,
            platform_fee_percent: 5.0,
        };
        let mut invoice = finance.build_invoice(&returned_order(5_000), &rates, Utc::now());

        finance.apply_payment(&mut invoice, 2_000).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.balance_cents(), 3_000);

        assert!(finance.apply_payment(&mut invoice, 3_001).is_err());
        assert!(finance.apply_payment(&mut invoice, 0).is_err());

        finance.apply_payment(&mut invoice, 3_000).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[test]
    fn test_vendor_earnings() {
        let finance = FinancialManager::new();
        let rates = InvoiceRates {
            gst_percent: 0.0,
            platform_fee_percent: 10.0,
        };
        let order = returned_order(4_000);
        let vendor_id = order.vendor_id;
        let mut paid = finance.build_invoice(&order, &rates, Utc::now());
        finance.apply_payment(&mut paid, 4_000).unwrap();
        let open = finance.build_invoice(&order, &rates, Utc::now());
        let other = finance.build_invoice(&returned_order(1_000), &rates, Utc::now());

        let summary = finance.vendor_earnings(vendor_id, &[paid, open, other]);
        assert_eq!(summary.invoice_count, 2);
        assert_eq!(summary.gross_cents, 8_000);
        assert_eq!(summary.platform_fees_cents, 800);
        assert_eq!(summary.net_payout_cents, 7_200);
        assert_eq!(summary.outstanding_cents, 4_000);
        assert_eq!(summary.paid_invoice_count, 1);
    }
}
