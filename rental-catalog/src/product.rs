use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::period::PeriodUnit;

/// Price of renting one item for one unit of time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingTier {
    pub unit: PeriodUnit,
    pub price_cents: i64,
}

/// A rentable variation of a product (size, colour, bundle). The extra price is
/// added to the tier price for every billed unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductVariant {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    #[serde(default)]
    pub extra_price_cents: i64,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

/// Core product structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Units the vendor owns. Reservations are counted against this number.
    pub quantity_on_hand: i32,
    pub pricing: Vec<PricingTier>,
    pub variants: Vec<ProductVariant>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(vendor_id: Uuid, name: impl Into<String>, quantity_on_hand: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vendor_id,
            name: name.into(),
            description: None,
            category: None,
            quantity_on_hand,
            pricing: Vec::new(),
            variants: Vec::new(),
            is_published: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tier(mut self, unit: PeriodUnit, price_cents: i64) -> Self {
        self.pricing.push(PricingTier { unit, price_cents });
        self
    }

    pub fn variant(&self, variant_id: &Uuid) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| &v.id == variant_id)
    }

    /// Checks the product against the rental periods the platform currently offers.
    pub fn validate(&self, enabled_units: &[PeriodUnit]) -> Result<(), ProductError> {
        if self.name.trim().is_empty() {
            return Err(ProductError::Invalid("name must not be empty".to_string()));
        }
        if self.quantity_on_hand < 0 {
            return Err(ProductError::Invalid(
                "quantity_on_hand must not be negative".to_string(),
            ));
        }
        if self.pricing.is_empty() {
            return Err(ProductError::Invalid(
                "at least one pricing tier is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for tier in &self.pricing {
            if tier.price_cents <= 0 {
                return Err(ProductError::Invalid(format!(
                    "price for {} must be positive",
                    tier.unit
                )));
            }
            if !seen.insert(tier.unit) {
                return Err(ProductError::Invalid(format!(
                    "duplicate pricing tier for {}",
                    tier.unit
                )));
            }
            if !enabled_units.contains(&tier.unit) {
                return Err(ProductError::PeriodDisabled(tier.unit));
            }
        }

        for variant in &self.variants {
            if variant.name.trim().is_empty() {
                return Err(ProductError::Invalid("variant name must not be empty".to_string()));
            }
            if variant.extra_price_cents < 0 {
                return Err(ProductError::Invalid(
                    "variant extra price must not be negative".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Product-related errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProductError {
    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Product not available: {0}")]
    NotAvailable(String),

    #[error("Invalid product: {0}")]
    Invalid(String),

    #[error("Rental period {0} is not enabled on this marketplace")]
    PeriodDisabled(PeriodUnit),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Product {
        Product::new(Uuid::new_v4(), "Mirrorless Camera", 3)
            .with_tier(PeriodUnit::Day, 1_500)
            .with_tier(PeriodUnit::Week, 8_000)
    }

    #[test]
    fn test_valid_product() {
        assert!(camera().validate(&PeriodUnit::ALL).is_ok());
    }

    #[test]
    fn test_rejects_duplicate_and_disabled_tiers() {
        let dup = camera().with_tier(PeriodUnit::Day, 1_200);
        assert!(matches!(dup.validate(&PeriodUnit::ALL), Err(ProductError::Invalid(_))));

        let result = camera().validate(&[PeriodUnit::Day]);
        assert_eq!(result, Err(ProductError::PeriodDisabled(PeriodUnit::Week)));
    }

    #[test]
    fn test_rejects_empty_pricing() {
        let product = Product::new(Uuid::new_v4(), "Tent", 1);
        assert!(product.validate(&PeriodUnit::ALL).is_err());
    }
}
