use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rental_core::audit::AuditEntry;
use rental_core::identity::{Role, User};
use rental_core::reports::{build_summary, PlatformSummary};
use rental_core::repository::{OrderScope, ProductFilter};
use rental_core::settings::update_settings;
use rental_core::CoreError;
use rental_order::{Coupon, DiscountKind};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{require_role, Claims};
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub kind: DiscountKind,
    pub value: i64,
    #[serde(default)]
    pub min_order_cents: i64,
    pub max_uses: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/coupons", get(list_coupons).post(create_coupon))
        .route("/admin/coupons/{id}/deactivate", post(deactivate_coupon))
        .route("/admin/settings", get(get_settings).put(put_settings))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}/activate", post(activate_user))
        .route("/admin/users/{id}/deactivate", post(deactivate_user))
        .route("/admin/reports/summary", get(summary))
        .route("/admin/audit-logs", get(audit_logs))
}

// ============================================================================
// Coupons
// ============================================================================

/// GET /api/admin/coupons
async fn list_coupons(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Coupon>>, AppError> {
    require_role(&claims, &[Role::Admin])?;
    Ok(Json(state.stores.coupons.list_coupons().await?))
}

/// POST /api/admin/coupons
async fn create_coupon(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), AppError> {
    require_role(&claims, &[Role::Admin])?;

    let mut coupon = Coupon::new(&req.code, req.kind, req.value);
    coupon.min_order_cents = req.min_order_cents;
    coupon.max_uses = req.max_uses;
    coupon.valid_from = req.valid_from;
    coupon.valid_until = req.valid_until;
    coupon.validate().map_err(CoreError::from)?;

    if state.stores.coupons.find_by_code(&coupon.code).await?.is_some() {
        return Err(AppError::ConflictError(format!(
            "coupon {} already exists",
            coupon.code
        )));
    }
    state.stores.coupons.create_coupon(&coupon).await?;
    audit(&state, &claims, "coupon.created", "coupon", coupon.id, json!({ "code": coupon.code })).await;

    Ok((StatusCode::CREATED, Json(coupon)))
}

/// POST /api/admin/coupons/:id/deactivate
async fn deactivate_coupon(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(coupon_id): Path<Uuid>,
) -> Result<Json<Coupon>, AppError> {
    require_role(&claims, &[Role::Admin])?;
    let coupon = state
        .stores
        .coupons
        .set_active(coupon_id, false)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("coupon {}", coupon_id)))?;
    audit(&state, &claims, "coupon.deactivated", "coupon", coupon.id, json!({ "code": coupon.code })).await;
    Ok(Json(coupon))
}

// ============================================================================
// Settings
// ============================================================================

/// GET /api/admin/settings
/// Effective values: config defaults with stored overrides applied.
async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    require_role(&claims, &[Role::Admin])?;
    Ok(Json(state.effective_rules().await?.to_json()))
}

/// PUT /api/admin/settings
/// Body is a flat object of keys to override. Nothing is stored unless every key is valid.
async fn put_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(changes): Json<Map<String, Value>>,
) -> Result<Json<Value>, AppError> {
    require_role(&claims, &[Role::Admin])?;
    let rules = update_settings(state.stores.settings.as_ref(), &state.rules, &changes).await?;

    tracing::info!(
        "Settings {:?} updated by {}",
        changes.keys().collect::<Vec<_>>(),
        claims.sub
    );
    audit(&state, &claims, "settings.updated", "settings", Uuid::nil(), Value::Object(changes)).await;

    Ok(Json(rules.to_json()))
}

// ============================================================================
// Users
// ============================================================================

/// GET /api/admin/users?role=
async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    require_role(&claims, &[Role::Admin])?;
    Ok(Json(state.stores.users.list_users(query.role).await?))
}

/// POST /api/admin/users/:id/activate
async fn activate_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    set_user_active(&state, &claims, user_id, true).await
}

/// POST /api/admin/users/:id/deactivate
async fn deactivate_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    set_user_active(&state, &claims, user_id, false).await
}

async fn set_user_active(
    state: &AppState,
    claims: &Claims,
    user_id: Uuid,
    active: bool,
) -> Result<Json<User>, AppError> {
    require_role(claims, &[Role::Admin])?;
    if !active && user_id == claims.sub {
        return Err(AppError::ValidationError(
            "admins cannot deactivate their own account".to_string(),
        ));
    }

    let mut user = state
        .stores
        .users
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("user {}", user_id)))?;
    user.is_active = active;
    state.stores.users.update_user(&user).await?;

    let action = if active { "user.activated" } else { "user.deactivated" };
    tracing::info!("{} {} by {}", action, user.masked_email(), claims.sub);
    audit(state, claims, action, "user", user.id, json!({ "is_active": active })).await;

    Ok(Json(user))
}

// ============================================================================
// Reports
// ============================================================================

/// GET /api/admin/reports/summary
async fn summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PlatformSummary>, AppError> {
    require_role(&claims, &[Role::Admin])?;

    let users = state.stores.users.list_users(None).await?;
    let products = state
        .stores
        .products
        .list_products(&ProductFilter::default())
        .await?;
    let orders = state.stores.orders.list_orders(OrderScope::All).await?;
    let invoices = state.stores.invoices.list_invoices(OrderScope::All).await?;

    Ok(Json(build_summary(&users, &products, &orders, &invoices)))
}

/// GET /api/admin/audit-logs?limit=
async fn audit_logs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    require_role(&claims, &[Role::Admin])?;
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT);
    Ok(Json(state.stores.audit.list_recent(limit).await?))
}

async fn audit(
    state: &AppState,
    claims: &Claims,
    action: &str,
    entity: &str,
    entity_id: Uuid,
    detail: Value,
) {
    let entry = AuditEntry::new(Some(claims.sub), action, entity, entity_id, detail);
    if let Err(e) = state.stores.audit.append(&entry).await {
        tracing::warn!("Failed to write audit entry {}: {}", entry.action, e);
    }
}
