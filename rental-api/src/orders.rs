use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rental_core::lifecycle::{CreateOrderRequest, LateFeePreview, TransitionOutcome};
use rental_order::{OrderAction, SaleOrder};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::Claims;
use crate::state::AppState;

/// Optional moment for pickup, return and late-fee preview. Defaults to now.
#[derive(Debug, Deserialize)]
pub struct AtQuery {
    pub at: Option<DateTime<Utc>>,
}

impl AtQuery {
    fn resolve(&self) -> DateTime<Utc> {
        self.at.unwrap_or_else(Utc::now)
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/send", post(send_order))
        .route("/orders/{id}/confirm", post(confirm_order))
        .route("/orders/{id}/pickup", post(pick_up_order))
        .route("/orders/{id}/return", post(return_order))
        .route("/orders/{id}/invoice", post(invoice_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/orders/{id}/late-fee", get(late_fee))
}

/// POST /api/orders
/// Creates a quotation; no stock is held until it is confirmed.
async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<SaleOrder>), AppError> {
    let order = state
        .lifecycle
        .create_quotation(&claims.actor(), req)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders
async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SaleOrder>>, AppError> {
    Ok(Json(state.lifecycle.list_orders(&claims.actor()).await?))
}

/// GET /api/orders/:id
async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<SaleOrder>, AppError> {
    Ok(Json(state.lifecycle.get_order(&claims.actor(), order_id).await?))
}

async fn transition(
    state: &AppState,
    claims: &Claims,
    order_id: Uuid,
    action: OrderAction,
) -> Result<Json<TransitionOutcome>, AppError> {
    let outcome = state
        .lifecycle
        .transition(&claims.actor(), order_id, action)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/orders/:id/send
async fn send_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<TransitionOutcome>, AppError> {
    transition(&state, &claims, order_id, OrderAction::Send).await
}

/// POST /api/orders/:id/confirm
async fn confirm_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<TransitionOutcome>, AppError> {
    transition(&state, &claims, order_id, OrderAction::Confirm).await
}

/// POST /api/orders/:id/pickup?at=
async fn pick_up_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<AtQuery>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let action = OrderAction::PickUp { at: query.resolve() };
    transition(&state, &claims, order_id, action).await
}

/// POST /api/orders/:id/return?at=
async fn return_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<AtQuery>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let action = OrderAction::Return { at: query.resolve() };
    transition(&state, &claims, order_id, action).await
}

/// POST /api/orders/:id/invoice
async fn invoice_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<TransitionOutcome>, AppError> {
    transition(&state, &claims, order_id, OrderAction::Invoice).await
}

/// POST /api/orders/:id/cancel
async fn cancel_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<TransitionOutcome>, AppError> {
    transition(&state, &claims, order_id, OrderAction::Cancel).await
}

/// GET /api/orders/:id/late-fee?at=
async fn late_fee(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<AtQuery>,
) -> Result<Json<LateFeePreview>, AppError> {
    let preview = state
        .lifecycle
        .late_fee_preview(&claims.actor(), order_id, query.resolve())
        .await?;
    Ok(Json(preview))
}
