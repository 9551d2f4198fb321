use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    Percent,
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percent => "PERCENT",
            DiscountKind::Fixed => "FIXED",
        }
    }
}

impl FromStr for DiscountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PERCENT" => Ok(DiscountKind::Percent),
            "FIXED" => Ok(DiscountKind::Fixed),
            other => Err(format!("unknown discount kind: {}", other)),
        }
    }
}

/// Discount code. `value` is a percentage for `Percent` and cents for `Fixed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub kind: DiscountKind,
    pub value: i64,
    pub min_order_cents: i64,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn new(code: &str, kind: DiscountKind, value: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: Self::normalize(code),
            kind,
            value,
            min_order_cents: 0,
            max_uses: None,
            used_count: 0,
            valid_from: None,
            valid_until: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn normalize(code: &str) -> String {
        code.trim().to_ascii_uppercase()
    }

    pub fn validate(&self) -> Result<(), CouponError> {
        if self.code.is_empty() {
            return Err(CouponError::Invalid("code is required".to_string()));
        }
        match self.kind {
            DiscountKind::Percent if !(1..=100).contains(&self.value) => Err(CouponError::Invalid(
                "percent value must be between 1 and 100".to_string(),
            )),
            DiscountKind::Fixed if self.value <= 0 => Err(CouponError::Invalid(
                "fixed value must be positive".to_string(),
            )),
            _ if self.min_order_cents < 0 => Err(CouponError::Invalid(
                "minimum order cannot be negative".to_string(),
            )),
            _ => match (self.valid_from, self.valid_until) {
                (Some(from), Some(until)) if from >= until => Err(CouponError::Invalid(
                    "validity window is empty".to_string(),
                )),
                _ => Ok(()),
            },
        }
    }

    /// Checks every usage condition before computing the discount.
    pub fn discount_for(&self, subtotal_cents: i64, now: DateTime<Utc>) -> Result<i64, CouponError> {
        if !self.is_active {
            return Err(CouponError::Inactive(self.code.clone()));
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return Err(CouponError::NotYetValid(self.code.clone()));
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return Err(CouponError::Expired(self.code.clone()));
        }
        if self.max_uses.is_some_and(|max| self.used_count >= max) {
            return Err(CouponError::UsageExhausted(self.code.clone()));
        }
        if subtotal_cents < self.min_order_cents {
            return Err(CouponError::BelowMinimum {
                code: self.code.clone(),
                minimum: self.min_order_cents,
            });
        }

        let discount = match self.kind {
            DiscountKind::Percent => {
                (subtotal_cents as f64 * self.value as f64 / 100.0).round() as i64
            }
            DiscountKind::Fixed => self.value,
        };
        Ok(discount.clamp(0, subtotal_cents.max(0)))
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CouponError {
    #[error("Coupon not found: {0}")]
    NotFound(String),

    #[error("Coupon {0} is inactive")]
    Inactive(String),

    #[error("Coupon {0} is not valid yet")]
    NotYetValid(String),

    #[error("Coupon {0} has expired")]
    Expired(String),

    #[error("Coupon {0} has reached its usage limit")]
    UsageExhausted(String),

    #[error("Coupon {code} requires an order of at least {minimum} cents")]
    BelowMinimum { code: String, minimum: i64 },

    #[error("Invalid coupon: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_percent_and_fixed_discounts() {
        let now = Utc::now();
        let percent = Coupon::new(" spring10 ", DiscountKind::Percent, 10);
        assert_eq!(percent.code, "SPRING10");
        assert_eq!(percent.discount_for(12_345, now).unwrap(), 1_235);

        let fixed = Coupon::new("FLAT", DiscountKind::Fixed, 5_000);
        assert_eq!(fixed.discount_for(20_000, now).unwrap(), 5_000);
        // never above the subtotal
        assert_eq!(fixed.discount_for(3_000, now).unwrap(), 3_000);
    }

    #[test]
    fn test_usage_conditions() {
        let now = Utc::now();
        let mut coupon = Coupon::new("LIMITED", DiscountKind::Fixed, 100);
        coupon.min_order_cents = 1_000;
        assert!(matches!(
            coupon.discount_for(999, now),
            Err(CouponError::BelowMinimum { minimum: 1_000, .. })
        ));

        coupon.max_uses = Some(1);
        coupon.used_count = 1;
        assert_eq!(
            coupon.discount_for(5_000, now),
            Err(CouponError::UsageExhausted("LIMITED".to_string()))
        );

        coupon.used_count = 0;
        coupon.valid_until = Some(now - Duration::hours(1));
        assert!(matches!(coupon.discount_for(5_000, now), Err(CouponError::Expired(_))));

        coupon.valid_until = None;
        coupon.valid_from = Some(now + Duration::hours(1));
        assert!(matches!(coupon.discount_for(5_000, now), Err(CouponError::NotYetValid(_))));

        coupon.valid_from = None;
        coupon.is_active = false;
        assert!(matches!(coupon.discount_for(5_000, now), Err(CouponError::Inactive(_))));
    }

    #[test]
    fn test_validate() {
        assert!(Coupon::new("BIG", DiscountKind::Percent, 150).validate().is_err());
        assert!(Coupon::new("", DiscountKind::Fixed, 10).validate().is_err());
        assert!(Coupon::new("OK", DiscountKind::Percent, 15).validate().is_ok());
    }
}
