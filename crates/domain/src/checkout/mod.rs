//! Checkout flow: address forms, payment selection and the step machine.

mod address;
mod state;

pub use address::{
    CheckoutField, FieldErrors, SavedAddress, ShippingAddress, is_valid_phone,
    is_valid_postal_code, preselect, validate_shipping,
};
pub use state::{CheckoutState, CheckoutStep, PaymentMethod, validate_payment};
