//! Order submission payloads.

use common::{ItemId, SubmissionId, VariantId};
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::checkout::ShippingAddress;
use crate::error::CheckoutError;
use crate::money::Money;
use crate::pricing::ShippingMode;

/// A line of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: ItemId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            item_id: line.item_id(),
            variant_id: line.variant_id(),
            quantity: line.quantity(),
            unit_price: line.unit_price(),
        }
    }
}

/// Immutable snapshot sent to create an order.
///
/// Each submission attempt carries its own id so the backend can drop
/// duplicates of the same attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmission {
    submission_id: SubmissionId,
    lines: Vec<OrderLine>,
    shipping_address: ShippingAddress,
    shipping_mode: ShippingMode,
    coupon_code: Option<String>,
    shipping_charge: Money,
}

impl OrderSubmission {
    /// Builds a submission. An empty cart cannot be ordered.
    pub fn new<'a>(
        lines: impl IntoIterator<Item = &'a CartLine>,
        shipping_address: ShippingAddress,
        shipping_mode: ShippingMode,
        coupon_code: Option<String>,
        shipping_charge: Money,
    ) -> Result<Self, CheckoutError> {
        let lines: Vec<OrderLine> = lines.into_iter().map(OrderLine::from).collect();
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        Ok(Self {
            submission_id: SubmissionId::new(),
            lines,
            shipping_address,
            shipping_mode,
            coupon_code,
            shipping_charge,
        })
    }

    pub fn submission_id(&self) -> SubmissionId {
        self.submission_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn shipping_mode(&self) -> ShippingMode {
        self.shipping_mode
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn shipping_charge(&self) -> Money {
        self.shipping_charge
    }

    /// Sum of line totals.
    pub fn subtotal(&self) -> Money {
        self.lines
            .iter()
            .map(|line| line.unit_price.multiply(line.quantity))
            .sum()
    }
}

/// The backend's acknowledgement of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub confirmation: String,
}
