use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rental_catalog::{PricingTier, Product, ProductVariant, Reservation};
use rental_core::repository::{ProductFilter, ProductRepository};
use rental_core::{CoreError, CoreResult};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::storage_error;

pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    vendor_id: Uuid,
    name: String,
    description: Option<String>,
    category: Option<String>,
    quantity_on_hand: i32,
    pricing: Json<Vec<PricingTier>>,
    variants: Json<Vec<ProductVariant>>,
    is_published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            vendor_id: row.vendor_id,
            name: row.name,
            description: row.description,
            category: row.category,
            quantity_on_hand: row.quantity_on_hand,
            pricing: row.pricing.0,
            variants: row.variants.0,
            is_published: row.is_published,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ReservationRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Reservation {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            start: row.start_date,
            end: row.end_date,
        }
    }
}

pub(crate) const RESERVATION_COLUMNS: &str = "id, order_id, product_id, quantity, start_date, end_date";

const PRODUCT_COLUMNS: &str = "id, vendor_id, name, description, category, quantity_on_hand, pricing, variants, is_published, created_at, updated_at";

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn create_product(&self, product: &Product) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, vendor_id, name, description, category, quantity_on_hand, pricing, variants, is_published, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(product.id)
        .bind(product.vendor_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.quantity_on_hand)
        .bind(Json(&product.pricing))
        .bind(Json(&product.variants))
        .bind(product.is_published)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> CoreResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.map(Product::from))
    }

    async fn list_products(&self, filter: &ProductFilter) -> CoreResult<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {} FROM products
            WHERE ($1::UUID IS NULL OR vendor_id = $1)
              AND ($2::TEXT IS NULL OR LOWER(category) = LOWER($2))
              AND ($3::TEXT IS NULL OR name ILIKE '%' || $3 || '%' OR description ILIKE '%' || $3 || '%')
              AND (NOT $4 OR is_published)
            ORDER BY created_at DESC
            "#,
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(filter.vendor_id)
            .bind(&filter.category)
            .bind(&filter.query)
            .bind(filter.published_only)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn update_product(&self, product: &Product) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, category = $4, quantity_on_hand = $5,
                pricing = $6, variants = $7, is_published = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.quantity_on_hand)
        .bind(Json(&product.pricing))
        .bind(Json(&product.variants))
        .bind(product.is_published)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("product {}", product.id)));
        }
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match storage_error(e) {
                CoreError::Conflict(_) => {
                    CoreError::Conflict("product is referenced by orders".to_string())
                }
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("product {}", id)));
        }
        Ok(())
    }

    async fn reservations_for_product(&self, product_id: Uuid) -> CoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE product_id = $1 ORDER BY start_date",
            RESERVATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(Reservation::from).collect())
    }
}
