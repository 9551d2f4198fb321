use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use rental_core::audit::AuditEntry;
use rental_core::identity::{
    normalize_email, CustomerProfile, Profile, Role, User, VendorProfile,
};
use rental_core::notify;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::middleware::auth::{issue_token, Claims};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    /// `CUSTOMER` when omitted. Admin accounts are never self-registered.
    pub role: Option<Role>,
    pub business_name: Option<String>,
    pub gstin: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify", get(verify_email))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(me))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let email = normalize_email(&req.email);
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(AppError::ValidationError("a valid email is required".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::ValidationError(format!(
            "password must have at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if req.name.trim().is_empty() {
        return Err(AppError::ValidationError("name must not be empty".to_string()));
    }

    let role = req.role.unwrap_or(Role::Customer);
    if role == Role::Admin {
        return Err(AppError::AuthorizationError(
            "admin accounts cannot be registered".to_string(),
        ));
    }

    if state.stores.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::ConflictError("email is already registered".to_string()));
    }

    let password_hash = hash_password(req.password, state.auth.bcrypt_cost).await?;
    let user = User::new(&email, password_hash, req.name.trim(), role);
    let profile = match role {
        Role::Vendor => {
            let business_name = req
                .business_name
                .filter(|b| !b.trim().is_empty())
                .ok_or_else(|| {
                    AppError::ValidationError("vendors must provide a business_name".to_string())
                })?;
            Profile::Vendor(VendorProfile {
                user_id: user.id,
                business_name,
                gstin: req.gstin,
                phone: req.phone,
            })
        }
        Role::Customer => Profile::Customer(CustomerProfile {
            user_id: user.id,
            phone: req.phone,
            address: req.address,
        }),
        Role::Admin => Profile::None,
    };

    state.stores.users.create_user(&user, &profile).await?;
    tracing::info!("Registered {} account {}", user.role, user.masked_email());

    let verify_url = format!("{}/api/auth/verify", state.public_url.trim_end_matches('/'));
    let message = notify::verification_email(&user, &verify_url);
    notify::deliver(state.mailer.as_ref(), &message).await;

    let entry = AuditEntry::new(
        Some(user.id),
        "user.registered",
        "user",
        user.id,
        json!({ "role": user.role }),
    );
    if let Err(e) = state.stores.audit.append(&entry).await {
        tracing::warn!("Failed to write audit entry {}: {}", entry.action, e);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": user,
            "verification_sent": true,
        })),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let invalid = || AppError::AuthenticationError("invalid email or password".to_string());

    let user = state
        .stores
        .users
        .find_by_email(&normalize_email(&req.email))
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(req.password, user.password_hash.clone()).await? {
        tracing::warn!("Failed login for {}", user.masked_email());
        return Err(invalid());
    }
    if !user.is_active {
        return Err(AppError::AuthorizationError("account is deactivated".to_string()));
    }

    let token = issue_token(&state.auth, &user)?;
    Ok(Json(AuthResponse { token, user }))
}

/// GET /api/auth/verify?token=
async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<Value>, AppError> {
    let mut user = state
        .stores
        .users
        .find_by_verification_token(query.token.trim())
        .await?
        .ok_or_else(|| AppError::NotFoundError("unknown verification token".to_string()))?;

    user.email_verified = true;
    user.verification_token = None;
    state.stores.users.update_user(&user).await?;
    tracing::info!("Verified email of {}", user.masked_email());

    notify::deliver(state.mailer.as_ref(), &notify::welcome_email(&user)).await;

    Ok(Json(json!({ "verified": true, "user": user })))
}

/// GET /api/auth/me
async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .stores
        .users
        .get_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("user {}", claims.sub)))?;

    let profile = match user.role {
        Role::Vendor => {
            let profile = state.stores.users.get_vendor_profile(user.id).await?;
            json!(profile)
        }
        Role::Customer => {
            let profile = state.stores.users.get_customer_profile(user.id).await?;
            json!(profile)
        }
        Role::Admin => Value::Null,
    };

    Ok(Json(json!({ "user": user, "profile": profile })))
}

// bcrypt is CPU bound; keep it off the async workers.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::InternalServerError(format!("hashing task failed: {}", e)))?
        .map_err(|e| AppError::InternalServerError(format!("password hashing failed: {}", e)))
}

async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::InternalServerError(format!("hashing task failed: {}", e)))?
        .map_err(|e| AppError::InternalServerError(format!("password check failed: {}", e)))
}
