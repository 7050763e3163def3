//! Storefront domain model.
//!
//! Pure types and rules for the shopper's cart, coupons, pricing and the
//! checkout flow. Nothing in this crate performs I/O.

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod coupon;
pub mod error;
pub mod money;
pub mod order;
pub mod pricing;

pub use auth::{Credential, UserProfile};
pub use cart::{Cart, CartLine, CartMode, ProductSnapshot, clamp_quantity, merge_carts};
pub use checkout::{
    CheckoutField, CheckoutState, CheckoutStep, FieldErrors, PaymentMethod, SavedAddress,
    ShippingAddress,
};
pub use coupon::{AppliedCoupon, Coupon, CouponRejection, DiscountType, UsageConstraints};
pub use error::{CartError, CheckoutError};
pub use money::Money;
pub use order::{OrderConfirmation, OrderLine, OrderSubmission};
pub use pricing::{ShippingMode, ShippingRates, Totals, compute_totals};
