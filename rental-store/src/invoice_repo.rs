use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rental_core::repository::{InvoiceRepository, OrderScope};
use rental_core::{CoreError, CoreResult};
use rental_order::{Invoice, InvoiceLine, InvoiceStatus, Payment, PaymentMethod};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::database::{parse_column, storage_error};

pub struct PgInvoiceRepository {
    pool: PgPool,
}

impl PgInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    number: String,
    order_id: Uuid,
    customer_id: Uuid,
    vendor_id: Uuid,
    status: String,
    lines: Json<Vec<InvoiceLine>>,
    untaxed_cents: i64,
    gst_cents: i64,
    total_cents: i64,
    platform_fee_cents: i64,
    vendor_payout_cents: i64,
    amount_paid_cents: i64,
    issued_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = CoreError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: row.id,
            number: row.number,
            order_id: row.order_id,
            customer_id: row.customer_id,
            vendor_id: row.vendor_id,
            status: parse_column::<InvoiceStatus>("status", &row.status)?,
            lines: row.lines.0,
            untaxed_cents: row.untaxed_cents,
            gst_cents: row.gst_cents,
            total_cents: row.total_cents,
            platform_fee_cents: row.platform_fee_cents,
            vendor_payout_cents: row.vendor_payout_cents,
            amount_paid_cents: row.amount_paid_cents,
            issued_at: row.issued_at,
            due_at: row.due_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    invoice_id: Uuid,
    amount_cents: i64,
    method: String,
    reference: Option<String>,
    paid_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            invoice_id: row.invoice_id,
            amount_cents: row.amount_cents,
            method: parse_column::<PaymentMethod>("method", &row.method)?,
            reference: row.reference,
            paid_at: row.paid_at,
        })
    }
}

const INVOICE_COLUMNS: &str = "id, number, order_id, customer_id, vendor_id, status, lines, untaxed_cents, gst_cents, total_cents, platform_fee_cents, vendor_payout_cents, amount_paid_cents, issued_at, due_at";

/// Insert inside the caller's transaction; the order transition owns it.
pub(crate) async fn insert_invoice(conn: &mut PgConnection, invoice: &Invoice) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoices (id, number, order_id, customer_id, vendor_id, status, lines, untaxed_cents, gst_cents,
            total_cents, platform_fee_cents, vendor_payout_cents, amount_paid_cents, issued_at, due_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(invoice.id)
    .bind(&invoice.number)
    .bind(invoice.order_id)
    .bind(invoice.customer_id)
    .bind(invoice.vendor_id)
    .bind(invoice.status.as_str())
    .bind(Json(&invoice.lines))
    .bind(invoice.untaxed_cents)
    .bind(invoice.gst_cents)
    .bind(invoice.total_cents)
    .bind(invoice.platform_fee_cents)
    .bind(invoice.vendor_payout_cents)
    .bind(invoice.amount_paid_cents)
    .bind(invoice.issued_at)
    .bind(invoice.due_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match storage_error(e) {
        CoreError::Conflict(_) => CoreError::Conflict("order is already invoiced".to_string()),
        other => other,
    })?;
    Ok(())
}

impl PgInvoiceRepository {
    async fn fetch_one_by(&self, column: &str, id: Uuid) -> CoreResult<Option<Invoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE {} = $1", INVOICE_COLUMNS, column);
        sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Invoice::try_from)
            .transpose()
    }
}

#[async_trait]
impl InvoiceRepository for PgInvoiceRepository {
    async fn get_invoice(&self, id: Uuid) -> CoreResult<Option<Invoice>> {
        self.fetch_one_by("id", id).await
    }

    async fn get_invoice_for_order(&self, order_id: Uuid) -> CoreResult<Option<Invoice>> {
        self.fetch_one_by("order_id", order_id).await
    }

    async fn list_invoices(&self, scope: OrderScope) -> CoreResult<Vec<Invoice>> {
        let (clause, id) = match scope {
            OrderScope::All => ("$1::UUID IS NULL", None),
            OrderScope::Customer(id) => ("customer_id = $1", Some(id)),
            OrderScope::Vendor(id) => ("vendor_id = $1", Some(id)),
        };
        let sql = format!(
            "SELECT {} FROM invoices WHERE {} ORDER BY issued_at DESC",
            INVOICE_COLUMNS, clause
        );
        sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(Invoice::try_from)
            .collect()
    }

    async fn record_payment(
        &self,
        invoice: &Invoice,
        previous_paid_cents: i64,
        payment: &Payment,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let result = sqlx::query(
            "UPDATE invoices SET amount_paid_cents = $2, status = $3 WHERE id = $1 AND amount_paid_cents = $4",
        )
        .bind(invoice.id)
        .bind(invoice.amount_paid_cents)
        .bind(invoice.status.as_str())
        .bind(previous_paid_cents)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::Conflict(format!(
                "invoice {} was paid concurrently",
                invoice.number
            )));
        }

        sqlx::query(
            "INSERT INTO payments (id, invoice_id, amount_cents, method, reference, paid_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(payment.id)
        .bind(payment.invoice_id)
        .bind(payment.amount_cents)
        .bind(payment.method.as_str())
        .bind(&payment.reference)
        .bind(payment.paid_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn list_payments(&self, invoice_id: Uuid) -> CoreResult<Vec<Payment>> {
        sqlx::query_as::<_, PaymentRow>(
            "SELECT id, invoice_id, amount_cents, method, reference, paid_at FROM payments WHERE invoice_id = $1 ORDER BY paid_at",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }
}
