use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inventory::DateWindow;
use crate::period::PeriodUnit;
use crate::product::Product;

/// Price of one order line over a rental window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RentalQuote {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub unit: PeriodUnit,
    /// Billed units per item.
    pub units: i64,
    /// Price of one unit including the variant surcharge.
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub line_total_cents: i64,
}

/// Picks the cheapest pricing tier for a window.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine;

impl PricingEngine {
    pub fn new() -> Self {
        Self
    }

    /// Every tier is priced as `ceil(duration / unit) * price`; the cheapest wins and
    /// a tie goes to the longer unit.
    pub fn quote(
        &self,
        product: &Product,
        variant_id: Option<Uuid>,
        window: &DateWindow,
        quantity: i32,
    ) -> Result<RentalQuote, PricingError> {
        if quantity <= 0 {
            return Err(PricingError::InvalidQuantity(quantity));
        }

        let extra = match variant_id {
            Some(id) => {
                product
                    .variant(&id)
                    .ok_or(PricingError::UnknownVariant(id))?
                    .extra_price_cents
            }
            None => 0,
        };

        if product.pricing.is_empty() {
            return Err(PricingError::NoPricing(product.id));
        }

        let span = window.duration();
        let mut best: Option<(PeriodUnit, i64, i64, i64)> = None;
        for tier in &product.pricing {
            let units = tier.unit.units_to_cover(span);
            let unit_price = tier
                .price_cents
                .checked_add(extra)
                .ok_or(PricingError::AmountTooLarge)?;
            let per_item = units
                .checked_mul(unit_price)
                .ok_or(PricingError::AmountTooLarge)?;
            let better = match best {
                None => true,
                Some((u, _, _, p)) => per_item < p || (per_item == p && tier.unit > u),
            };
            if better {
                best = Some((tier.unit, units, unit_price, per_item));
            }
        }
        let (unit, units, unit_price_cents, per_item) =
            best.ok_or(PricingError::NoPricing(product.id))?;

        let line_total_cents = per_item
            .checked_mul(i64::from(quantity))
            .ok_or(PricingError::AmountTooLarge)?;
        Ok(RentalQuote {
            product_id: product.id,
            variant_id,
            unit,
            units,
            unit_price_cents,
            quantity,
            line_total_cents,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("Product {0} has no pricing tiers")]
    NoPricing(Uuid),

    #[error("Unknown variant {0}")]
    UnknownVariant(Uuid),

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error("Rental price is too large")]
    AmountTooLarge,
}
