//! End-to-end flow over the pure domain: build a cart, price it, walk the
//! checkout steps and produce an order submission.

use common::{ItemId, VariantId};
use domain::{
    AppliedCoupon, Cart, CartLine, CartMode, CheckoutError, CheckoutField, CheckoutState,
    CheckoutStep, Coupon, Money, OrderSubmission, PaymentMethod, ProductSnapshot,
    ShippingAddress, ShippingMode, ShippingRates, compute_totals, merge_carts,
};

fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ravi Kumar".to_string(),
        phone: "98765 43210".to_string(),
        address_line1: "4 Lake View".to_string(),
        address_line2: Some("Flat 2B".to_string()),
        city: "Bengaluru".to_string(),
        state: "KA".to_string(),
        postal_code: "560001".to_string(),
        country: "India".to_string(),
        is_default: true,
    }
}

fn shirt() -> ProductSnapshot {
    ProductSnapshot::item(ItemId::new(1), "Shirt", Money::from_cents(800))
        .with_variant(VariantId::new(2), Some(Money::from_cents(1000)))
        .with_stock(5)
}

#[test]
fn test_guest_cart_through_checkout() {
    let mut guest = Cart::new(CartMode::Guest);
    guest.upsert(CartLine::from_product(&shirt(), 2).unwrap());

    let server = Cart::new(CartMode::Synced);
    let cart = merge_carts(&server, &guest);
    assert_eq!(cart.subtotal().cents(), 2000);

    let rates = ShippingRates::new(Money::from_cents(99), Money::zero());
    let coupon = Coupon::percentage("save10", 10).with_min_order(Money::from_cents(1000));
    let applied = AppliedCoupon::new(coupon, cart.subtotal()).unwrap();

    let totals = compute_totals(
        cart.lines(),
        Some(applied.coupon()),
        ShippingMode::Delivery,
        &rates,
    );
    assert_eq!(totals.discount.cents(), 200);
    assert_eq!(totals.total.cents(), 1899);

    let mut checkout = CheckoutState::new();
    checkout.set_shipping_address(address(), true).unwrap();
    assert_eq!(checkout.advance().unwrap(), CheckoutStep::Review);
    assert_eq!(checkout.advance().unwrap(), CheckoutStep::Payment);
    checkout.set_payment_method(PaymentMethod::Upi).unwrap();
    checkout.confirm_payment().unwrap();
    checkout.ready_to_submit().unwrap();

    let submission = OrderSubmission::new(
        cart.lines(),
        checkout.shipping_address().clone(),
        checkout.shipping_mode(),
        Some(applied.code().to_string()),
        totals.shipping_cost,
    )
    .unwrap();
    assert_eq!(submission.subtotal(), totals.subtotal);
    assert_eq!(submission.coupon_code(), Some("SAVE10"));

    checkout.mark_submitted().unwrap();
    assert!(checkout.step().is_terminal());
}

#[test]
fn test_coupon_drops_when_subtotal_shrinks() {
    let mut cart = Cart::new(CartMode::Synced);
    let line = CartLine::from_product(&shirt(), 2).unwrap();
    let key = line.key();
    cart.upsert(line);

    let coupon = Coupon::percentage("min15", 10).with_min_order(Money::from_cents(1500));
    let mut applied = AppliedCoupon::new(coupon, cart.subtotal()).unwrap();

    let reduced = cart.get(&key).unwrap().with_quantity(1);
    cart.upsert(reduced);
    assert!(!applied.still_valid_for(cart.subtotal()));
    assert!(applied.revalidate(cart.subtotal()).is_err());

    let totals = compute_totals(cart.lines(), None, ShippingMode::Pickup, &ShippingRates::default());
    assert_eq!(totals.total.cents(), 1000);
}

#[test]
fn test_invalid_phone_blocks_shipping_step() {
    let mut checkout = CheckoutState::new();
    let mut bad = address();
    bad.phone = "12345".to_string();
    checkout.set_shipping_address(bad, false).unwrap();

    let err = checkout.advance().unwrap_err();
    match err {
        CheckoutError::Validation(errors) => {
            assert_eq!(errors.fields().collect::<Vec<_>>(), vec![CheckoutField::Phone]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(checkout.step(), CheckoutStep::Shipping);
}
