pub mod audit;
pub mod billing;
pub mod identity;
pub mod lifecycle;
pub mod notify;
pub mod reports;
pub mod repository;
pub mod settings;

use rental_catalog::{InventoryError, PricingError, ProductError};
use rental_order::{CouponError, OrderError};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(_) => CoreError::NotFound(err.to_string()),
            InventoryError::InsufficientInventory { .. } => CoreError::Conflict(err.to_string()),
            _ => CoreError::Validation(err.to_string()),
        }
    }
}

impl From<PricingError> for CoreError {
    fn from(err: PricingError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

impl From<ProductError> for CoreError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::NotFound(_) => CoreError::NotFound(err.to_string()),
            ProductError::NotAvailable(_) => CoreError::Conflict(err.to_string()),
            _ => CoreError::Validation(err.to_string()),
        }
    }
}

impl From<OrderError> for CoreError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(_) => CoreError::NotFound(err.to_string()),
            _ => CoreError::Validation(err.to_string()),
        }
    }
}

impl From<CouponError> for CoreError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::NotFound(_) => CoreError::NotFound(err.to_string()),
            _ => CoreError::Validation(err.to_string()),
        }
    }
}
