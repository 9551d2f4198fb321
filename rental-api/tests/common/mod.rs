#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rental_api::state::{AppState, AuthConfig};
use rental_core::identity::{Profile, Role, User};
use rental_core::settings::RentalRules;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let state = AppState::new(
            rental_store::memory_stores(),
            Arc::new(rental_store::LogMailer),
            AuthConfig {
                secret: "integration-secret".to_string(),
                expiration: 3600,
                bcrypt_cost: 4,
            },
            RentalRules::default(),
            "http://localhost:3000",
        );
        Self {
            router: rental_api::app(state.clone()),
            state,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn register_customer(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({ "email": email, "password": PASSWORD, "name": "Customer" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        self.login(email).await
    }

    pub async fn register_vendor(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "email": email,
                    "password": PASSWORD,
                    "name": "Vendor",
                    "role": "VENDOR",
                    "business_name": "Gear Hire"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        self.login(email).await
    }

    /// Admins cannot self-register, so they go straight into the store.
    pub async fn admin(&self) -> String {
        let email = "admin@rentals.test";
        let hash = bcrypt::hash(PASSWORD, 4).unwrap();
        let user = User::new(email, hash, "Admin", Role::Admin);
        self.state
            .stores
            .users
            .create_user(&user, &Profile::None)
            .await
            .unwrap();
        self.login(email).await
    }

    /// A published product with DAY 1000 and WEEK 5000 tiers.
    pub async fn product(&self, vendor_token: &str, quantity: i32) -> String {
        let (status, body) = self
            .post(
                "/api/products",
                Some(vendor_token),
                json!({
                    "name": "Camping Tent",
                    "category": "Outdoors",
                    "quantity_on_hand": quantity,
                    "pricing": [
                        { "unit": "DAY", "price_cents": 1000 },
                        { "unit": "WEEK", "price_cents": 5000 }
                    ]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create product failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }
}
