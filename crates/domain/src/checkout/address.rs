//! Shipping addresses and their form validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Address the order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

impl ShippingAddress {
    /// Phone number with every non-digit removed.
    pub fn phone_digits(&self) -> String {
        self.phone.chars().filter(char::is_ascii_digit).collect()
    }
}

/// An address stored on the shopper's account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAddress {
    pub id: u64,
    #[serde(flatten)]
    pub address: ShippingAddress,
}

/// Picks the address to preselect: the default one, else the first.
pub fn preselect(addresses: &[SavedAddress]) -> Option<&SavedAddress> {
    addresses
        .iter()
        .find(|saved| saved.address.is_default)
        .or_else(|| addresses.first())
}

/// Checkout form fields that can carry a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutField {
    FullName,
    Phone,
    AddressLine1,
    City,
    State,
    PostalCode,
    Country,
    PaymentMethod,
    PaymentConfirmation,
}

impl CheckoutField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutField::FullName => "full_name",
            CheckoutField::Phone => "phone",
            CheckoutField::AddressLine1 => "address_line1",
            CheckoutField::City => "city",
            CheckoutField::State => "state",
            CheckoutField::PostalCode => "postal_code",
            CheckoutField::Country => "country",
            CheckoutField::PaymentMethod => "payment_method",
            CheckoutField::PaymentConfirmation => "payment_confirmation",
        }
    }
}

impl std::fmt::Display for CheckoutField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation messages keyed by field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldErrors(BTreeMap<CheckoutField, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: CheckoutField, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: CheckoutField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: CheckoutField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = CheckoutField> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// Postal codes are 3 to 10 letters, digits, spaces or dashes.
pub fn is_valid_postal_code(code: &str) -> bool {
    let code = code.trim();
    let len = code.chars().count();
    (3..=10).contains(&len)
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || c == '-')
}

/// Phones must have exactly ten digits once formatting is stripped.
pub fn is_valid_phone(phone: &str) -> bool {
    phone.chars().filter(char::is_ascii_digit).count() == 10
}

/// Validates the shipping form.
pub fn validate_shipping(address: &ShippingAddress) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    let required = [
        (CheckoutField::FullName, &address.full_name, "Please enter your full name"),
        (CheckoutField::AddressLine1, &address.address_line1, "Please enter your street address"),
        (CheckoutField::City, &address.city, "Please enter your city"),
        (CheckoutField::State, &address.state, "Please enter your state"),
        (CheckoutField::Country, &address.country, "Please enter your country"),
    ];
    for (field, value, message) in required {
        if value.trim().is_empty() {
            errors.insert(field, message);
        }
    }
    if !is_valid_postal_code(&address.postal_code) {
        errors.insert(CheckoutField::PostalCode, "Please enter a valid postal code");
    }
    if !is_valid_phone(&address.phone) {
        errors.insert(CheckoutField::Phone, "Please enter a valid 10-digit phone number");
    }
    errors.into_result()
}
