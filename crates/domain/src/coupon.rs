//! Coupons and the rules deciding whether (and how much) they discount.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// How a coupon's `discount_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `discount_value` is a percent of the subtotal.
    Percentage,
    /// `discount_value` is a flat amount in major units.
    Fixed,
}

/// Server-side usage window and limits of a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageConstraints {
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_uses: Option<u32>,
    pub used_count: u32,
}

impl Default for UsageConstraints {
    fn default() -> Self {
        Self {
            active: true,
            starts_at: None,
            ends_at: None,
            max_uses: None,
            used_count: 0,
        }
    }
}

impl UsageConstraints {
    /// Checks activity, the validity window and the usage limit at `now`.
    pub fn check_at(&self, now: DateTime<Utc>) -> Result<(), UsageViolation> {
        if !self.active {
            return Err(UsageViolation::Inactive);
        }
        if self.starts_at.is_some_and(|starts| now < starts) {
            return Err(UsageViolation::NotYetValid);
        }
        if self.ends_at.is_some_and(|ends| now > ends) {
            return Err(UsageViolation::Expired);
        }
        if self.max_uses.is_some_and(|max| self.used_count >= max) {
            return Err(UsageViolation::LimitReached);
        }
        Ok(())
    }
}

/// Why a coupon's usage constraints reject a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageViolation {
    #[error("Coupon not available or inactive")]
    Inactive,
    #[error("Coupon not valid yet")]
    NotYetValid,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit reached")]
    LimitReached,
}

/// A discount code as known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    #[serde(with = "rust_decimal::serde::str")]
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_order_amount: Money,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub usage: UsageConstraints,
}

impl Coupon {
    /// Creates an unrestricted coupon. The code is normalized.
    pub fn new(code: &str, discount_type: DiscountType, discount_value: Decimal) -> Self {
        Self {
            code: normalize_code(code),
            discount_type,
            discount_value,
            min_order_amount: Money::zero(),
            description: None,
            usage: UsageConstraints::default(),
        }
    }

    /// Percentage coupon.
    pub fn percentage(code: &str, percent: u32) -> Self {
        Self::new(code, DiscountType::Percentage, Decimal::from(percent))
    }

    /// Fixed-amount coupon; `amount` is converted to major units.
    pub fn fixed(code: &str, amount: Money) -> Self {
        Self::new(code, DiscountType::Fixed, amount.to_decimal())
    }

    pub fn with_min_order(mut self, minimum: Money) -> Self {
        self.min_order_amount = minimum;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_usage(mut self, usage: UsageConstraints) -> Self {
        self.usage = usage;
        self
    }

    /// Returns true if `subtotal` meets the minimum order amount.
    pub fn is_eligible(&self, subtotal: Money) -> bool {
        subtotal >= self.min_order_amount
    }

    /// Discount this coupon grants on `subtotal`.
    ///
    /// Zero below the minimum order amount; never negative and never more
    /// than the subtotal.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        if !self.is_eligible(subtotal) {
            return Money::zero();
        }
        let raw = match self.discount_type {
            DiscountType::Percentage => subtotal.percentage(self.discount_value),
            DiscountType::Fixed => Money::from_decimal(self.discount_value),
        };
        raw.non_negative().min(subtotal.non_negative())
    }

    /// Checks the minimum-order rule for `subtotal`.
    pub fn check_minimum(&self, subtotal: Money) -> Result<(), CouponRejection> {
        if self.is_eligible(subtotal) {
            Ok(())
        } else {
            Err(CouponRejection::BelowMinimum {
                minimum: self.min_order_amount,
                subtotal,
            })
        }
    }
}

/// A coupon the backend accepted, with the subtotal it was validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    coupon: Coupon,
    validated_subtotal: Money,
}

impl AppliedCoupon {
    /// Pairs a coupon with the subtotal it was validated for, re-checking
    /// the minimum locally.
    pub fn new(coupon: Coupon, subtotal: Money) -> Result<Self, CouponRejection> {
        coupon.check_minimum(subtotal)?;
        Ok(Self {
            coupon,
            validated_subtotal: subtotal,
        })
    }

    pub fn coupon(&self) -> &Coupon {
        &self.coupon
    }

    pub fn code(&self) -> &str {
        &self.coupon.code
    }

    pub fn validated_subtotal(&self) -> Money {
        self.validated_subtotal
    }

    /// Returns true if the coupon still applies to `subtotal`.
    pub fn still_valid_for(&self, subtotal: Money) -> bool {
        self.coupon.is_eligible(subtotal)
    }

    /// Re-validates against a new subtotal, updating the recorded subtotal.
    pub fn revalidate(&mut self, subtotal: Money) -> Result<(), CouponRejection> {
        self.coupon.check_minimum(subtotal)?;
        self.validated_subtotal = subtotal;
        Ok(())
    }
}

/// Why a coupon could not be applied (or stopped applying).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    /// The code was empty after trimming.
    #[error("Please enter a coupon code")]
    EmptyCode,
    /// The subtotal is under the coupon's minimum.
    #[error("Order total below minimum required amount: {minimum}")]
    BelowMinimum { minimum: Money, subtotal: Money },
    /// The backend refused the code; the message is passed through.
    #[error("{0}")]
    Remote(String),
}

/// Trims and uppercases a user-entered code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
