//! Monetary amounts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Money amount represented in minor units (cents/paise) to avoid floating
/// point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (e.g., 1000 = 10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from minor units.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole number of major units.
    pub const fn from_major(units: i64) -> Self {
        Self { cents: units * 100 }
    }

    /// Creates a Money amount from a decimal amount in major units.
    ///
    /// Rounds half away from zero to the nearest minor unit.
    pub fn from_decimal(amount: Decimal) -> Self {
        Self {
            cents: round_to_cents(amount * Decimal::ONE_HUNDRED),
        }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the amount as a decimal in major units.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.cents, 2)
    }

    /// Returns the major-unit portion (whole number).
    pub fn major(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the minor-unit portion (remainder after major units).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    /// Returns `percent`% of this amount, rounded half away from zero.
    pub fn percentage(&self, percent: Decimal) -> Money {
        let exact = Decimal::from(self.cents) * percent / Decimal::ONE_HUNDRED;
        Money {
            cents: round_to_cents(exact),
        }
    }

    /// Returns the amount, or zero if it is negative.
    pub fn non_negative(self) -> Money {
        self.max(Money::zero())
    }
}

fn round_to_cents(amount: Decimal) -> i64 {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.major().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.major(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.major(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_from_major() {
        assert_eq!(Money::from_major(50).cents(), 5000);
    }

    #[test]
    fn test_money_from_decimal_rounds_half_away_from_zero() {
        assert_eq!(Money::from_decimal(dec("9.99")).cents(), 999);
        assert_eq!(Money::from_decimal(dec("0.005")).cents(), 1);
        assert_eq!(Money::from_decimal(dec("0.004")).cents(), 0);
        assert_eq!(Money::from_decimal(dec("-0.005")).cents(), -1);
    }

    #[test]
    fn test_money_to_decimal() {
        assert_eq!(Money::from_cents(999).to_decimal(), dec("9.99"));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!(a.multiply(3).cents(), 3000);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(Money::from_major(2000).percentage(dec("10")), Money::from_major(200));
        // 12.5% of 0.99 = 0.12375 -> 0.12
        assert_eq!(Money::from_cents(99).percentage(dec("12.5")).cents(), 12);
        // 50% of 0.01 = 0.005 -> 0.01
        assert_eq!(Money::from_cents(1).percentage(dec("50")).cents(), 1);
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(Money::from_cents(-5).non_negative(), Money::zero());
        assert_eq!(Money::from_cents(5).non_negative(), Money::from_cents(5));
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 50].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 400);
    }
}
