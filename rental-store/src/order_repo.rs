use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rental_catalog::inventory::merge_requests;
use rental_catalog::{InventoryError, PeriodUnit, Reservation};
use rental_core::repository::{OrderChange, OrderRepository, OrderScope, ReservationChange};
use rental_core::{CoreError, CoreResult};
use rental_order::{OrderStatus, SaleOrder, SaleOrderLine};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::{parse_column, storage_error};
use crate::invoice_repo::insert_invoice;
use crate::product_repo::{ReservationRow, RESERVATION_COLUMNS};

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    number: String,
    customer_id: Uuid,
    vendor_id: Uuid,
    status: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    pickup_date: Option<DateTime<Utc>>,
    return_date: Option<DateTime<Utc>>,
    subtotal_cents: i64,
    discount_cents: i64,
    total_amount_cents: i64,
    late_fee_cents: i64,
    coupon_code: Option<String>,
    expiry_notified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    product_name: String,
    quantity: i32,
    unit: String,
    units: i64,
    unit_price_cents: i64,
    line_total_cents: i64,
    inventory_snapshot: Option<i32>,
}

impl TryFrom<OrderLineRow> for SaleOrderLine {
    type Error = CoreError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        Ok(SaleOrderLine {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            product_name: row.product_name,
            quantity: row.quantity,
            unit: parse_column::<PeriodUnit>("unit", &row.unit)?,
            units: row.units,
            unit_price_cents: row.unit_price_cents,
            line_total_cents: row.line_total_cents,
            inventory_snapshot: row.inventory_snapshot,
        })
    }
}

fn into_order(row: OrderRow, lines: Vec<SaleOrderLine>) -> CoreResult<SaleOrder> {
    Ok(SaleOrder {
        id: row.id,
        number: row.number,
        customer_id: row.customer_id,
        vendor_id: row.vendor_id,
        status: parse_column::<OrderStatus>("status", &row.status)?,
        start_date: row.start_date,
        end_date: row.end_date,
        pickup_date: row.pickup_date,
        return_date: row.return_date,
        lines,
        subtotal_cents: row.subtotal_cents,
        discount_cents: row.discount_cents,
        total_amount_cents: row.total_amount_cents,
        late_fee_cents: row.late_fee_cents,
        coupon_code: row.coupon_code,
        expiry_notified_at: row.expiry_notified_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

const ORDER_COLUMNS: &str = "id, number, customer_id, vendor_id, status, start_date, end_date, pickup_date, return_date, subtotal_cents, discount_cents, total_amount_cents, late_fee_cents, coupon_code, expiry_notified_at, created_at, updated_at";

const LINE_COLUMNS: &str = "id, order_id, product_id, variant_id, product_name, quantity, unit, units, unit_price_cents, line_total_cents, inventory_snapshot";

impl PgOrderRepository {
    /// Attach lines to a batch of order rows with one query.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> CoreResult<Vec<SaleOrder>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let sql = format!(
            "SELECT {} FROM sale_order_lines WHERE order_id = ANY($1) ORDER BY order_id, position",
            LINE_COLUMNS
        );
        let line_rows = sqlx::query_as::<_, OrderLineRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        let mut lines: HashMap<Uuid, Vec<SaleOrderLine>> = HashMap::new();
        for row in line_rows {
            let line = SaleOrderLine::try_from(row)?;
            lines.entry(line.order_id).or_default().push(line);
        }

        rows.into_iter()
            .map(|row| {
                let order_lines = lines.remove(&row.id).unwrap_or_default();
                into_order(row, order_lines)
            })
            .collect()
    }
}

/// Check and hold stock for every product of the order. Products are locked
/// in id order so concurrent confirmations cannot deadlock.
async fn create_reservations(
    conn: &mut PgConnection,
    order: &mut SaleOrder,
    requests: &[rental_catalog::ReservationRequest],
) -> CoreResult<()> {
    let window = order.window()?;

    for (product_id, requested) in merge_requests(requests)? {
        let on_hand: Option<(i32,)> =
            sqlx::query_as("SELECT quantity_on_hand FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(storage_error)?;
        let Some((on_hand,)) = on_hand else {
            return Err(CoreError::NotFound(format!("product {}", product_id)));
        };

        let (reserved,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM reservations
            WHERE product_id = $1 AND start_date < $3 AND $2 < end_date
            "#,
        )
        .bind(product_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_one(&mut *conn)
        .await
        .map_err(storage_error)?;

        let available = (on_hand as i64 - reserved).max(0) as i32;
        if requested > available {
            return Err(InventoryError::InsufficientInventory {
                product_id,
                requested,
                available,
            }
            .into());
        }

        let reservation = Reservation::new(order.id, product_id, requested, window);
        sqlx::query(
            "INSERT INTO reservations (id, order_id, product_id, quantity, start_date, end_date) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(reservation.id)
        .bind(reservation.order_id)
        .bind(reservation.product_id)
        .bind(reservation.quantity)
        .bind(reservation.start)
        .bind(reservation.end)
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;

        for line in order.lines.iter_mut().filter(|l| l.product_id == product_id) {
            line.inventory_snapshot = Some(on_hand);
        }
    }

    Ok(())
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_order(&self, order: &SaleOrder) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO sale_orders (id, number, customer_id, vendor_id, status, start_date, end_date, pickup_date, return_date,
                subtotal_cents, discount_cents, total_amount_cents, late_fee_cents, coupon_code, expiry_notified_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(order.id)
        .bind(&order.number)
        .bind(order.customer_id)
        .bind(order.vendor_id)
        .bind(order.status.as_str())
        .bind(order.start_date)
        .bind(order.end_date)
        .bind(order.pickup_date)
        .bind(order.return_date)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.total_amount_cents)
        .bind(order.late_fee_cents)
        .bind(&order.coupon_code)
        .bind(order.expiry_notified_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_order_lines (id, order_id, position, product_id, variant_id, product_name, quantity, unit, units,
                    unit_price_cents, line_total_cents, inventory_snapshot)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(line.id)
            .bind(order.id)
            .bind(position as i32)
            .bind(line.product_id)
            .bind(line.variant_id)
            .bind(&line.product_name)
            .bind(line.quantity)
            .bind(line.unit.as_str())
            .bind(line.units)
            .bind(line.unit_price_cents)
            .bind(line.line_total_cents)
            .bind(line.inventory_snapshot)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<SaleOrder>> {
        let sql = format!("SELECT {} FROM sale_orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(self.hydrate(row.into_iter().collect()).await?.into_iter().next())
    }

    async fn list_orders(&self, scope: OrderScope) -> CoreResult<Vec<SaleOrder>> {
        let (clause, id) = match scope {
            OrderScope::All => ("$1::UUID IS NULL", None),
            OrderScope::Customer(id) => ("customer_id = $1", Some(id)),
            OrderScope::Vendor(id) => ("vendor_id = $1", Some(id)),
        };
        let sql = format!(
            "SELECT {} FROM sale_orders WHERE {} ORDER BY created_at DESC",
            ORDER_COLUMNS, clause
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        self.hydrate(rows).await
    }

    async fn commit_transition(&self, change: OrderChange) -> CoreResult<SaleOrder> {
        let OrderChange {
            mut order,
            expected_status,
            reservations,
            invoice,
            coupon_use,
        } = change;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM sale_orders WHERE id = $1 FOR UPDATE")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;
        match current {
            None => return Err(CoreError::NotFound(format!("order {}", order.id))),
            Some((status,)) if status != expected_status.as_str() => {
                return Err(CoreError::Conflict(format!(
                    "order {} changed concurrently (now {})",
                    order.number, status
                )));
            }
            Some(_) => {}
        }

        match &reservations {
            ReservationChange::Create(requests) => {
                create_reservations(&mut tx, &mut order, requests).await?;
            }
            ReservationChange::Release => {
                sqlx::query("DELETE FROM reservations WHERE order_id = $1")
                    .bind(order.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_error)?;
            }
            ReservationChange::None => {}
        }

        if let Some(code) = &coupon_use {
            let result = sqlx::query(
                r#"
                UPDATE coupons SET used_count = used_count + 1
                WHERE code = $1 AND is_active AND (max_uses IS NULL OR used_count < max_uses)
                "#,
            )
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
            if result.rows_affected() == 0 {
                return Err(CoreError::Conflict(format!("coupon {} is no longer available", code)));
            }
        }

        sqlx::query(
            r#"
            UPDATE sale_orders
            SET status = $2, pickup_date = $3, return_date = $4, subtotal_cents = $5, discount_cents = $6,
                total_amount_cents = $7, late_fee_cents = $8, coupon_code = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.pickup_date)
        .bind(order.return_date)
        .bind(order.subtotal_cents)
        .bind(order.discount_cents)
        .bind(order.total_amount_cents)
        .bind(order.late_fee_cents)
        .bind(&order.coupon_code)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if matches!(reservations, ReservationChange::Create(_)) {
            for line in &order.lines {
                sqlx::query("UPDATE sale_order_lines SET inventory_snapshot = $2 WHERE id = $1")
                    .bind(line.id)
                    .bind(line.inventory_snapshot)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_error)?;
            }
        }

        if let Some(invoice) = &invoice {
            insert_invoice(&mut tx, invoice).await?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(order)
    }

    async fn reservations_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE order_id = $1 ORDER BY product_id",
            RESERVATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(Reservation::from).collect())
    }

    async fn due_for_expiry_notice(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<SaleOrder>> {
        let sql = format!(
            r#"
            SELECT {} FROM sale_orders
            WHERE status = 'PICKED_UP' AND expiry_notified_at IS NULL AND end_date BETWEEN $1 AND $2
            ORDER BY end_date
            "#,
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        self.hydrate(rows).await
    }

    async fn mark_expiry_notified(&self, order_id: Uuid, at: DateTime<Utc>) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE sale_orders SET expiry_notified_at = $2 WHERE id = $1 AND expiry_notified_at IS NULL",
        )
        .bind(order_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected() == 1)
    }
}
