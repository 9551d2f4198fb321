use axum::{extract::State, routing::post, Extension, Json, Router};
use chrono::Utc;
use rental_core::CoreError;
use rental_order::{Coupon, CouponError};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::auth::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct CouponCheck {
    pub code: String,
    pub discount_cents: i64,
    pub total_after_discount_cents: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/coupons/validate", post(validate_coupon))
}

/// POST /api/coupons/validate
/// Dry run: usage is only counted when an order carrying the code is confirmed.
async fn validate_coupon(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<ValidateCouponRequest>,
) -> Result<Json<CouponCheck>, AppError> {
    if req.amount_cents < 0 {
        return Err(AppError::ValidationError("amount_cents must not be negative".to_string()));
    }
    let code = Coupon::normalize(&req.code);
    let coupon = state
        .stores
        .coupons
        .find_by_code(&code)
        .await?
        .ok_or_else(|| CoreError::from(CouponError::NotFound(code)))?;

    let discount = coupon
        .discount_for(req.amount_cents, Utc::now())
        .map_err(CoreError::from)?;

    Ok(Json(CouponCheck {
        code: coupon.code,
        discount_cents: discount,
        total_after_discount_cents: req.amount_cents - discount,
    }))
}
