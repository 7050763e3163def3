//! Domain error types.

use common::LineKey;
use thiserror::Error;

use crate::checkout::{CheckoutStep, FieldErrors};

/// Errors raised when building or mutating cart lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Cart lines must hold at least one unit.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Unit prices cannot be negative.
    #[error("Invalid unit price: {cents} (must not be negative)")]
    NegativePrice { cents: i64 },

    /// The line is not in the cart.
    #[error("Cart line not found: {0}")]
    LineNotFound(LineKey),
}

/// Errors raised by the checkout state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// The current step's form did not validate.
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// The requested transition is not allowed from the current step.
    #[error("Invalid checkout transition: cannot {action} from {from} step")]
    InvalidTransition {
        from: CheckoutStep,
        action: &'static str,
    },

    /// There is nothing to order.
    #[error("Cart is empty")]
    EmptyCart,
}

impl CheckoutError {
    /// Returns the field errors if this is a validation failure.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            CheckoutError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
