use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use rental_core::billing::PaymentRequest;
use rental_order::{Invoice, Payment};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::Claims;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub invoice: Invoice,
    pub payment: Payment,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/invoices", get(list_invoices))
        .route("/invoices/{id}", get(get_invoice))
        .route("/invoices/{id}/pdf", get(invoice_pdf))
        .route(
            "/invoices/{id}/payments",
            get(list_payments).post(record_payment),
        )
}

/// GET /api/invoices
async fn list_invoices(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    Ok(Json(state.billing.list_invoices(&claims.actor()).await?))
}

/// GET /api/invoices/:id
async fn get_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.billing.get_invoice(&claims.actor(), invoice_id).await?))
}

/// GET /api/invoices/:id/pdf
/// Access is checked so that strangers still get 403/404 rather than 501.
async fn invoice_pdf(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state.billing.get_invoice(&claims.actor(), invoice_id).await?;
    Err(AppError::NotImplemented(format!(
        "PDF rendering is not available for invoice {}",
        invoice.number
    )))
}

/// GET /api/invoices/:id/payments
async fn list_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(
        state.billing.list_payments(&claims.actor(), invoice_id).await?,
    ))
}

/// POST /api/invoices/:id/payments
/// Records money received outside the platform. Nothing is charged.
async fn record_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    let (invoice, payment) = state
        .billing
        .record_payment(&claims.actor(), invoice_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(PaymentResponse { invoice, payment })))
}
