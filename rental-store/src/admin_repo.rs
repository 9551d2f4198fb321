use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rental_core::audit::AuditEntry;
use rental_core::repository::{AuditRepository, CouponRepository, SettingsRepository, SystemSetting};
use rental_core::{CoreError, CoreResult};
use rental_order::{Coupon, DiscountKind};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{parse_column, storage_error};

pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    kind: String,
    value: i64,
    min_order_cents: i64,
    max_uses: Option<i32>,
    used_count: i32,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = CoreError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        Ok(Coupon {
            id: row.id,
            code: row.code,
            kind: parse_column::<DiscountKind>("kind", &row.kind)?,
            value: row.value,
            min_order_cents: row.min_order_cents,
            max_uses: row.max_uses,
            used_count: row.used_count,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

const COUPON_COLUMNS: &str = "id, code, kind, value, min_order_cents, max_uses, used_count, valid_from, valid_until, is_active, created_at";

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn create_coupon(&self, coupon: &Coupon) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, kind, value, min_order_cents, max_uses, used_count, valid_from, valid_until, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(coupon.id)
        .bind(&coupon.code)
        .bind(coupon.kind.as_str())
        .bind(coupon.value)
        .bind(coupon.min_order_cents)
        .bind(coupon.max_uses)
        .bind(coupon.used_count)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match storage_error(e) {
            CoreError::Conflict(_) => {
                CoreError::Conflict(format!("coupon {} already exists", coupon.code))
            }
            other => other,
        })?;
        Ok(())
    }

    async fn get_coupon(&self, id: Uuid) -> CoreResult<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE id = $1", COUPON_COLUMNS);
        sqlx::query_as::<_, CouponRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn find_by_code(&self, code: &str) -> CoreResult<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE code = $1", COUPON_COLUMNS);
        sqlx::query_as::<_, CouponRow>(&sql)
            .bind(Coupon::normalize(code))
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn list_coupons(&self) -> CoreResult<Vec<Coupon>> {
        let sql = format!("SELECT {} FROM coupons ORDER BY created_at DESC", COUPON_COLUMNS);
        sqlx::query_as::<_, CouponRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(Coupon::try_from)
            .collect()
    }

    async fn set_active(&self, id: Uuid, active: bool) -> CoreResult<Option<Coupon>> {
        let sql = format!(
            "UPDATE coupons SET is_active = $2 WHERE id = $1 RETURNING {}",
            COUPON_COLUMNS
        );
        sqlx::query_as::<_, CouponRow>(&sql)
            .bind(id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Coupon::try_from)
            .transpose()
    }
}

pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    async fn list_settings(&self) -> CoreResult<Vec<SystemSetting>> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT key, value FROM system_settings ORDER BY key")
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;

        Ok(rows
            .into_iter()
            .map(|(key, value)| SystemSetting { key, value })
            .collect())
    }

    async fn upsert_setting(&self, key: &str, value: &Value) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value, updated_at) VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

pub struct PgAuditRepository {
    pool: PgPool,
}

impl PgAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor_id: Option<Uuid>,
    action: String,
    entity: String,
    entity_id: Uuid,
    detail: Value,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, actor_id, action, entity, entity_id, detail, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.entity)
        .bind(entry.entity_id)
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> CoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, actor_id, action, entity, entity_id, detail, created_at FROM audit_logs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows
            .into_iter()
            .map(|r| AuditEntry {
                id: r.id,
                actor_id: r.actor_id,
                action: r.action,
                entity: r.entity,
                entity_id: r.entity_id,
                detail: r.detail,
                created_at: r.created_at,
            })
            .collect())
    }
}
