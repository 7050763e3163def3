//! Order totals.

use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::coupon::Coupon;
use crate::money::Money;

/// How the order reaches the shopper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMode {
    #[default]
    Delivery,
    Pickup,
}

impl ShippingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMode::Delivery => "delivery",
            ShippingMode::Pickup => "pickup",
        }
    }
}

impl std::fmt::Display for ShippingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shipping fee per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRates {
    pub delivery: Money,
    pub pickup: Money,
}

impl ShippingRates {
    pub const DEFAULT_DELIVERY: Money = Money::from_cents(999);

    pub fn new(delivery: Money, pickup: Money) -> Self {
        Self { delivery, pickup }
    }

    /// Fee for `mode`, never negative.
    pub fn cost(&self, mode: ShippingMode) -> Money {
        match mode {
            ShippingMode::Delivery => self.delivery,
            ShippingMode::Pickup => self.pickup,
        }
        .non_negative()
    }
}

impl Default for ShippingRates {
    fn default() -> Self {
        Self {
            delivery: Self::DEFAULT_DELIVERY,
            pickup: Money::zero(),
        }
    }
}

/// Computed amounts for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping_cost: Money,
    pub total: Money,
}

/// Computes subtotal, discount, shipping and total.
///
/// Pure: the same inputs always give the same totals. The discount only
/// applies when the subtotal meets the coupon minimum and is capped at the
/// subtotal; the total is floored at zero.
pub fn compute_totals<'a>(
    lines: impl IntoIterator<Item = &'a CartLine>,
    coupon: Option<&Coupon>,
    mode: ShippingMode,
    rates: &ShippingRates,
) -> Totals {
    let subtotal = lines
        .into_iter()
        .map(CartLine::line_total)
        .sum::<Money>()
        .non_negative();
    let discount = coupon.map_or(Money::zero(), |coupon| coupon.discount_for(subtotal));
    let shipping_cost = rates.cost(mode);
    let total = (subtotal + shipping_cost - discount).non_negative();

    Totals {
        subtotal,
        discount,
        shipping_cost,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::ProductSnapshot;
    use common::ItemId;

    fn line(price_cents: i64, quantity: u32) -> CartLine {
        let product = ProductSnapshot::item(ItemId::new(1), "Widget", Money::from_cents(price_cents));
        CartLine::from_product(&product, quantity).unwrap()
    }

    fn rates(delivery_cents: i64) -> ShippingRates {
        ShippingRates::new(Money::from_cents(delivery_cents), Money::zero())
    }

    #[test]
    fn test_totals_without_coupon() {
        let lines = [line(1000, 2), line(250, 1)];
        let totals = compute_totals(&lines, None, ShippingMode::Delivery, &rates(99));
        assert_eq!(totals.subtotal.cents(), 2250);
        assert_eq!(totals.discount.cents(), 0);
        assert_eq!(totals.shipping_cost.cents(), 99);
        assert_eq!(totals.total.cents(), 2349);
    }

    #[test]
    fn test_percentage_coupon_over_minimum() {
        let lines = [line(1000, 2)];
        let coupon = Coupon::percentage("save10", 10).with_min_order(Money::from_cents(1000));
        let totals = compute_totals(&lines, Some(&coupon), ShippingMode::Delivery, &rates(99));
        assert_eq!(totals.subtotal.cents(), 2000);
        assert_eq!(totals.discount.cents(), 200);
        assert_eq!(totals.total.cents(), 1899);
    }

    #[test]
    fn test_coupon_below_minimum_grants_nothing() {
        let lines = [line(400, 1)];
        let coupon = Coupon::percentage("save10", 10).with_min_order(Money::from_cents(500));
        let totals = compute_totals(&lines, Some(&coupon), ShippingMode::Pickup, &rates(99));
        assert_eq!(totals.discount, Money::zero());
        assert_eq!(totals.total.cents(), 400);
    }

    #[test]
    fn test_fixed_coupon_capped_and_total_never_negative() {
        let lines = [line(50, 1)];
        let coupon = Coupon::fixed("flat", Money::from_cents(100));
        let totals = compute_totals(&lines, Some(&coupon), ShippingMode::Pickup, &rates(99));
        assert_eq!(totals.discount.cents(), 50);
        assert_eq!(totals.total.cents(), 0);
    }

    #[test]
    fn test_pickup_is_free_by_default() {
        let lines = [line(1000, 1)];
        let defaults = ShippingRates::default();
        let pickup = compute_totals(&lines, None, ShippingMode::Pickup, &defaults);
        let delivery = compute_totals(&lines, None, ShippingMode::Delivery, &defaults);
        assert_eq!(pickup.shipping_cost, Money::zero());
        assert_eq!(delivery.shipping_cost.cents(), 999);
    }

    #[test]
    fn test_empty_cart() {
        let totals = compute_totals(&[], None, ShippingMode::Delivery, &rates(99));
        assert_eq!(totals.subtotal, Money::zero());
        assert_eq!(totals.total.cents(), 99);
    }

    #[test]
    fn test_invariants_over_grid() {
        let coupons = [
            None,
            Some(Coupon::percentage("p", 15).with_min_order(Money::from_cents(700))),
            Some(Coupon::percentage("all", 100)),
            Some(Coupon::fixed("f", Money::from_cents(1234))),
        ];
        for price in [0, 1, 99, 333, 1000] {
            for quantity in 1..=4 {
                let lines = [line(price, quantity)];
                for coupon in &coupons {
                    for mode in [ShippingMode::Delivery, ShippingMode::Pickup] {
                        let totals = compute_totals(&lines, coupon.as_ref(), mode, &rates(499));
                        assert!(totals.discount >= Money::zero());
                        assert!(totals.discount <= totals.subtotal);
                        assert!(totals.total >= Money::zero());
                        assert_eq!(
                            totals.total,
                            totals.subtotal + totals.shipping_cost - totals.discount
                        );
                    }
                }
            }
        }
    }
}
