use axum::{extract::State, routing::get, Extension, Json, Router};
use rental_core::identity::{Role, VendorProfile};
use rental_order::EarningsSummary;
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::auth::{require_role, Claims};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateVendorProfileRequest {
    pub business_name: String,
    pub gstin: Option<String>,
    pub phone: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/vendor/earnings", get(earnings))
        .route("/vendor/profile", get(get_profile).put(update_profile))
}

/// GET /api/vendor/earnings
async fn earnings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<EarningsSummary>, AppError> {
    Ok(Json(state.billing.vendor_earnings(&claims.actor()).await?))
}

/// GET /api/vendor/profile
async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<VendorProfile>, AppError> {
    require_role(&claims, &[Role::Vendor])?;
    let profile = state
        .stores
        .users
        .get_vendor_profile(claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFoundError("vendor profile".to_string()))?;
    Ok(Json(profile))
}

/// PUT /api/vendor/profile
async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateVendorProfileRequest>,
) -> Result<Json<VendorProfile>, AppError> {
    require_role(&claims, &[Role::Vendor])?;
    let business_name = req.business_name.trim();
    if business_name.is_empty() {
        return Err(AppError::ValidationError("business_name must not be empty".to_string()));
    }

    let profile = VendorProfile {
        user_id: claims.sub,
        business_name: business_name.to_string(),
        gstin: req.gstin.filter(|g| !g.trim().is_empty()),
        phone: req.phone.filter(|p| !p.trim().is_empty()),
    };
    state.stores.users.upsert_vendor_profile(&profile).await?;
    Ok(Json(profile))
}
