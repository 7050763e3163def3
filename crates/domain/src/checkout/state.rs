//! Checkout step machine.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::address::{CheckoutField, FieldErrors, ShippingAddress, validate_shipping};
use crate::error::CheckoutError;
use crate::pricing::ShippingMode;

/// Step of the checkout flow.
///
/// Transitions:
/// ```text
/// Shipping ──► Review ──► Payment ──(submit ok)──► Submitted
///     ◄──────────┘ ◄─────────┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum CheckoutStep {
    #[default]
    Shipping,
    Review,
    Payment,
    /// Terminal.
    Submitted,
}

impl CheckoutStep {
    /// Step reached by a successful `advance`, if any.
    pub fn next(&self) -> Option<CheckoutStep> {
        match self {
            CheckoutStep::Shipping => Some(CheckoutStep::Review),
            CheckoutStep::Review => Some(CheckoutStep::Payment),
            CheckoutStep::Payment | CheckoutStep::Submitted => None,
        }
    }

    /// Step reached by `back`, if any.
    pub fn previous(&self) -> Option<CheckoutStep> {
        match self {
            CheckoutStep::Review => Some(CheckoutStep::Shipping),
            CheckoutStep::Payment => Some(CheckoutStep::Review),
            CheckoutStep::Shipping | CheckoutStep::Submitted => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutStep::Submitted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStep::Shipping => "Shipping",
            CheckoutStep::Review => "Review",
            CheckoutStep::Payment => "Payment",
            CheckoutStep::Submitted => "Submitted",
        }
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment method chosen on the payment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    None,
    /// Cash on delivery.
    Cod,
    /// Requires the shopper to confirm the transfer before submitting.
    Upi,
}

impl PaymentMethod {
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, PaymentMethod::Upi)
    }
}

/// Validates the payment step.
pub fn validate_payment(method: PaymentMethod, confirmed: bool) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    match method {
        PaymentMethod::None => {
            errors.insert(CheckoutField::PaymentMethod, "Please select a payment method");
        }
        PaymentMethod::Upi if !confirmed => {
            errors.insert(
                CheckoutField::PaymentConfirmation,
                "Please confirm that you have completed the UPI payment",
            );
        }
        _ => {}
    }
    errors.into_result()
}

/// Form state of an in-progress checkout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckoutState {
    step: CheckoutStep,
    completed_steps: BTreeSet<CheckoutStep>,
    shipping_address: ShippingAddress,
    shipping_mode: ShippingMode,
    payment_method: PaymentMethod,
    payment_confirmed: bool,
    selected_address_id: Option<u64>,
    save_address: bool,
}

impl CheckoutState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> CheckoutStep {
        self.step
    }

    pub fn completed_steps(&self) -> &BTreeSet<CheckoutStep> {
        &self.completed_steps
    }

    pub fn is_completed(&self, step: CheckoutStep) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn shipping_mode(&self) -> ShippingMode {
        self.shipping_mode
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn payment_confirmed(&self) -> bool {
        self.payment_confirmed
    }

    pub fn selected_address_id(&self) -> Option<u64> {
        self.selected_address_id
    }

    /// True when the shopper entered a new address to be saved after the order.
    pub fn save_address(&self) -> bool {
        self.save_address
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), CheckoutError> {
        if self.step.is_terminal() {
            return Err(CheckoutError::InvalidTransition {
                from: self.step,
                action,
            });
        }
        Ok(())
    }

    /// Replaces the shipping address with a newly entered one.
    pub fn set_shipping_address(
        &mut self,
        address: ShippingAddress,
        save: bool,
    ) -> Result<(), CheckoutError> {
        self.ensure_open("edit address")?;
        self.shipping_address = address;
        self.selected_address_id = None;
        self.save_address = save;
        Ok(())
    }

    /// Uses one of the shopper's saved addresses.
    pub fn select_saved_address(
        &mut self,
        id: u64,
        address: ShippingAddress,
    ) -> Result<(), CheckoutError> {
        self.ensure_open("select address")?;
        self.shipping_address = address;
        self.selected_address_id = Some(id);
        self.save_address = false;
        Ok(())
    }

    pub fn set_shipping_mode(&mut self, mode: ShippingMode) -> Result<(), CheckoutError> {
        self.ensure_open("change shipping mode")?;
        self.shipping_mode = mode;
        Ok(())
    }

    /// Selects a payment method. Changing it clears any UPI confirmation.
    pub fn set_payment_method(&mut self, method: PaymentMethod) -> Result<(), CheckoutError> {
        self.ensure_open("change payment method")?;
        if method != self.payment_method {
            self.payment_confirmed = false;
        }
        self.payment_method = method;
        Ok(())
    }

    /// Records that the shopper confirmed the UPI transfer.
    pub fn confirm_payment(&mut self) -> Result<(), CheckoutError> {
        self.ensure_open("confirm payment")?;
        self.payment_confirmed = true;
        Ok(())
    }

    /// Validates the form of the current step.
    pub fn validate_current(&self) -> Result<(), FieldErrors> {
        match self.step {
            CheckoutStep::Shipping => validate_shipping(&self.shipping_address),
            CheckoutStep::Payment => validate_payment(self.payment_method, self.payment_confirmed),
            CheckoutStep::Review | CheckoutStep::Submitted => Ok(()),
        }
    }

    /// Moves forward one step after validating the current one.
    ///
    /// Payment is left only through a successful submission.
    pub fn advance(&mut self) -> Result<CheckoutStep, CheckoutError> {
        let next = self.step.next().ok_or(CheckoutError::InvalidTransition {
            from: self.step,
            action: "advance",
        })?;
        self.validate_current().map_err(CheckoutError::Validation)?;
        self.completed_steps.insert(self.step);
        self.step = next;
        Ok(next)
    }

    /// Moves back one step without validating.
    pub fn back(&mut self) -> Result<CheckoutStep, CheckoutError> {
        let previous = self.step.previous().ok_or(CheckoutError::InvalidTransition {
            from: self.step,
            action: "go back",
        })?;
        self.step = previous;
        Ok(previous)
    }

    /// Checks that an order may be submitted from the current state.
    pub fn ready_to_submit(&self) -> Result<(), CheckoutError> {
        if self.step != CheckoutStep::Payment {
            return Err(CheckoutError::InvalidTransition {
                from: self.step,
                action: "submit",
            });
        }
        validate_shipping(&self.shipping_address).map_err(CheckoutError::Validation)?;
        self.validate_current().map_err(CheckoutError::Validation)
    }

    /// Enters the terminal step after the order was accepted.
    pub fn mark_submitted(&mut self) -> Result<(), CheckoutError> {
        if self.step != CheckoutStep::Payment {
            return Err(CheckoutError::InvalidTransition {
                from: self.step,
                action: "submit",
            });
        }
        self.completed_steps.insert(CheckoutStep::Payment);
        self.step = CheckoutStep::Submitted;
        Ok(())
    }
}
