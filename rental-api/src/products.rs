use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rental_catalog::{
    available_in_window, reserved_in_window, DateWindow, PricingEngine, PricingTier, Product,
    ProductVariant, RentalQuote,
};
use rental_core::audit::AuditEntry;
use rental_core::identity::Role;
use rental_core::repository::ProductFilter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{require_role, Claims};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub vendor_id: Option<Uuid>,
    pub q: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub quantity: Option<i32>,
    pub variant_id: Option<Uuid>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AvailabilityResponse {
    pub product_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub quantity_on_hand: i32,
    pub reserved: i32,
    pub available: i32,
}

#[derive(Debug, Deserialize)]
pub struct VariantInput {
    pub name: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub extra_price_cents: i64,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl VariantInput {
    fn into_variant(self) -> ProductVariant {
        ProductVariant {
            id: Uuid::new_v4(),
            name: self.name,
            sku: self.sku,
            extra_price_cents: self.extra_price_cents,
            attributes: self.attributes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub quantity_on_hand: i32,
    pub pricing: Vec<PricingTier>,
    #[serde(default)]
    pub variants: Vec<VariantInput>,
    pub is_published: Option<bool>,
}

/// Omitted fields keep their current value. `variants` replaces the whole list.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub quantity_on_hand: Option<i32>,
    pub pricing: Option<Vec<PricingTier>>,
    pub variants: Option<Vec<VariantInput>>,
    pub is_published: Option<bool>,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/{id}", get(get_product))
        .route("/products/{id}/availability", get(availability))
        .route("/products/{id}/quote", get(quote))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/{id}", put(update_product).delete(delete_product))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/products
/// Published products only
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    let filter = ProductFilter {
        vendor_id: query.vendor_id,
        query: query.q.filter(|q| !q.trim().is_empty()),
        category: query.category.filter(|c| !c.trim().is_empty()),
        published_only: true,
    };
    Ok(Json(state.stores.products.list_products(&filter).await?))
}

/// GET /api/products/:id
async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(load_product(&state, product_id).await?))
}

/// GET /api/products/:id/availability?start=&end=
async fn availability(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let product = load_product(&state, product_id).await?;
    let window = DateWindow::new(query.start, query.end)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    let reservations = state
        .stores
        .products
        .reservations_for_product(product.id)
        .await?;

    Ok(Json(AvailabilityResponse {
        product_id: product.id,
        start: window.start,
        end: window.end,
        quantity_on_hand: product.quantity_on_hand,
        reserved: reserved_in_window(&reservations, product.id, &window),
        available: available_in_window(
            product.quantity_on_hand,
            &reservations,
            product.id,
            &window,
        ),
    }))
}

/// GET /api/products/:id/quote?start=&end=&quantity=&variant_id=
async fn quote(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<RentalQuote>, AppError> {
    let window = DateWindow::new(query.start, query.end)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    let rules = state.effective_rules().await?;
    let product = state.lifecycle.load_rentable(product_id, &rules).await?;

    let quote = PricingEngine::new()
        .quote(&product, query.variant_id, &window, query.quantity.unwrap_or(1))
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    Ok(Json(quote))
}

/// POST /api/products
async fn create_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    require_role(&claims, &[Role::Vendor])?;

    let mut product = Product::new(claims.sub, req.name.trim(), req.quantity_on_hand);
    product.description = req.description;
    product.category = req.category;
    product.pricing = req.pricing;
    product.variants = req.variants.into_iter().map(VariantInput::into_variant).collect();
    product.is_published = req.is_published.unwrap_or(true);

    let rules = state.effective_rules().await?;
    product
        .validate(&rules.rental_periods)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state.stores.products.create_product(&product).await?;
    tracing::info!("Vendor {} created product {}", claims.sub, product.id);
    audit(&state, &claims, "product.created", product.id).await;

    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/products/:id
async fn update_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Product>, AppError> {
    let mut product = load_product(&state, product_id).await?;
    ensure_owner(&claims, &product)?;

    if let Some(name) = req.name {
        product.name = name.trim().to_string();
    }
    if let Some(description) = req.description {
        product.description = Some(description);
    }
    if let Some(category) = req.category {
        product.category = Some(category);
    }
    if let Some(quantity) = req.quantity_on_hand {
        product.quantity_on_hand = quantity;
    }
    if let Some(pricing) = req.pricing {
        product.pricing = pricing;
    }
    if let Some(variants) = req.variants {
        product.variants = variants.into_iter().map(VariantInput::into_variant).collect();
    }
    if let Some(published) = req.is_published {
        product.is_published = published;
    }
    product.updated_at = Utc::now();

    let rules = state.effective_rules().await?;
    product
        .validate(&rules.rental_periods)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state.stores.products.update_product(&product).await?;
    audit(&state, &claims, "product.updated", product.id).await;

    Ok(Json(product))
}

/// DELETE /api/products/:id
async fn delete_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let product = load_product(&state, product_id).await?;
    ensure_owner(&claims, &product)?;

    state.stores.products.delete_product(product.id).await?;
    tracing::info!("Product {} deleted by {}", product.id, claims.sub);
    audit(&state, &claims, "product.deleted", product.id).await;

    Ok(StatusCode::NO_CONTENT)
}

async fn load_product(state: &AppState, product_id: Uuid) -> Result<Product, AppError> {
    state
        .stores
        .products
        .get_product(product_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("product {}", product_id)))
}

fn ensure_owner(claims: &Claims, product: &Product) -> Result<(), AppError> {
    match claims.role {
        Role::Admin => Ok(()),
        Role::Vendor if product.vendor_id == claims.sub => Ok(()),
        _ => Err(AppError::AuthorizationError(
            "only the owning vendor can change this product".to_string(),
        )),
    }
}

async fn audit(state: &AppState, claims: &Claims, action: &str, product_id: Uuid) {
    let entry = AuditEntry::new(
        Some(claims.sub),
        action,
        "product",
        product_id,
        json!({ "role": claims.role }),
    );
    if let Err(e) = state.stores.audit.append(&entry).await {
        tracing::warn!("Failed to write audit entry {}: {}", entry.action, e);
    }
}
