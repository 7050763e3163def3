//! Cart lines, the cart itself, and the login merge.

use std::collections::HashMap;

use common::{ItemId, LineKey, VariantId};
use serde::{Deserialize, Serialize};

use crate::error::CartError;
use crate::money::Money;

/// Catalog data for an item (and optionally one of its variants) at the
/// moment it is put in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub item_id: ItemId,
    pub variant_id: Option<VariantId>,
    pub title: String,
    /// Base price of the item.
    pub item_price: Money,
    /// Variant-specific price, if the variant overrides the item price.
    pub variant_price: Option<Money>,
    /// Units available, if known.
    pub stock: Option<u32>,
}

impl ProductSnapshot {
    /// Creates a snapshot for an item without variant.
    pub fn item(item_id: ItemId, title: impl Into<String>, price: Money) -> Self {
        Self {
            item_id,
            variant_id: None,
            title: title.into(),
            item_price: price,
            variant_price: None,
            stock: None,
        }
    }

    /// Selects a variant, optionally overriding the price.
    pub fn with_variant(mut self, variant_id: VariantId, price: Option<Money>) -> Self {
        self.variant_id = Some(variant_id);
        self.variant_price = price;
        self
    }

    /// Sets the known stock.
    pub fn with_stock(mut self, stock: u32) -> Self {
        self.stock = Some(stock);
        self
    }

    /// Key of the line this product occupies.
    pub fn line_key(&self) -> LineKey {
        LineKey::new(self.item_id, self.variant_id)
    }

    /// Effective unit price: a positive variant price wins over the item price.
    pub fn unit_price(&self) -> Money {
        match self.variant_price {
            Some(price) if price.is_positive() => price,
            _ => self.item_price,
        }
    }
}

/// Clamps a requested quantity into `[1, stock]`.
///
/// Unknown stock, or a stock of zero, only enforces the lower bound.
pub fn clamp_quantity(requested: u32, stock: Option<u32>) -> u32 {
    let quantity = requested.max(1);
    match stock {
        Some(stock) if stock > 0 => quantity.min(stock),
        _ => quantity,
    }
}

/// One entry of the cart.
///
/// Decoding goes through [`CartLine::new`], so a stored or server-sent line
/// with a zero quantity or a negative price is rejected and a quantity above
/// the stock is clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CartLineRecord")]
pub struct CartLine {
    key: LineKey,
    title: String,
    quantity: u32,
    unit_price: Money,
    stock: Option<u32>,
}

impl CartLine {
    /// Creates a line, enforcing the line invariants.
    ///
    /// A zero quantity or a negative price is rejected; a quantity above a
    /// known positive stock is clamped down to the stock.
    pub fn new(
        key: LineKey,
        title: impl Into<String>,
        quantity: u32,
        unit_price: Money,
        stock: Option<u32>,
    ) -> Result<Self, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        if unit_price.is_negative() {
            return Err(CartError::NegativePrice {
                cents: unit_price.cents(),
            });
        }
        Ok(Self {
            key,
            title: title.into(),
            quantity: clamp_quantity(quantity, stock),
            unit_price,
            stock,
        })
    }

    /// Creates a line for `product`, clamping `requested` into `[1, stock]`.
    pub fn from_product(product: &ProductSnapshot, requested: u32) -> Result<Self, CartError> {
        Self::new(
            product.line_key(),
            product.title.clone(),
            clamp_quantity(requested, product.stock),
            product.unit_price(),
            product.stock,
        )
    }

    /// Returns a copy holding `requested` units, clamped into `[1, stock]`.
    pub fn with_quantity(&self, requested: u32) -> CartLine {
        CartLine {
            quantity: clamp_quantity(requested, self.stock),
            ..self.clone()
        }
    }

    pub fn key(&self) -> LineKey {
        self.key
    }

    pub fn item_id(&self) -> ItemId {
        self.key.item_id()
    }

    pub fn variant_id(&self) -> Option<VariantId> {
        self.key.variant_id()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn stock(&self) -> Option<u32> {
        self.stock
    }

    /// Returns unit price times quantity.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Wire form of a [`CartLine`] before validation.
#[derive(Deserialize)]
struct CartLineRecord {
    key: LineKey,
    title: String,
    quantity: u32,
    unit_price: Money,
    #[serde(default)]
    stock: Option<u32>,
}

impl TryFrom<CartLineRecord> for CartLine {
    type Error = CartError;

    fn try_from(record: CartLineRecord) -> Result<Self, Self::Error> {
        CartLine::new(
            record.key,
            record.title,
            record.quantity,
            record.unit_price,
            record.stock,
        )
    }
}

/// Where the cart's source of truth lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CartMode {
    /// Local only, not associated with an account.
    #[default]
    Guest,
    /// Mirrors the server-side cart of the signed-in user.
    Synced,
}

/// The shopping cart: line key to line, plus the mode flag.
///
/// Decoded lines are re-keyed by their own line key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "CartRecord")]
pub struct Cart {
    mode: CartMode,
    lines: HashMap<LineKey, CartLine>,
}

#[derive(Deserialize)]
struct CartRecord {
    #[serde(default)]
    mode: CartMode,
    #[serde(default)]
    lines: HashMap<LineKey, CartLine>,
}

impl From<CartRecord> for Cart {
    fn from(record: CartRecord) -> Self {
        Cart::from_lines(record.mode, record.lines.into_values())
    }
}

impl Cart {
    /// Creates an empty cart.
    pub fn new(mode: CartMode) -> Self {
        Self {
            mode,
            lines: HashMap::new(),
        }
    }

    /// Creates a cart from lines. Later lines with a repeated key win.
    pub fn from_lines(mode: CartMode, lines: impl IntoIterator<Item = CartLine>) -> Self {
        Self {
            mode,
            lines: lines.into_iter().map(|line| (line.key, line)).collect(),
        }
    }

    pub fn mode(&self) -> CartMode {
        self.mode
    }

    /// Returns the same lines under another mode.
    pub fn with_mode(mut self, mode: CartMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn get(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.get(key)
    }

    pub fn contains(&self, key: &LineKey) -> bool {
        self.lines.contains_key(key)
    }

    /// Iterates over lines in no particular order.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    /// Returns the lines sorted by key.
    pub fn sorted_lines(&self) -> Vec<CartLine> {
        let mut lines: Vec<CartLine> = self.lines.values().cloned().collect();
        lines.sort_by_key(|line| line.key);
        lines
    }

    /// Number of distinct lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of quantities over all lines.
    pub fn total_quantity(&self) -> u32 {
        self.lines.values().map(CartLine::quantity).sum()
    }

    /// Sum of line totals, floored at zero.
    pub fn subtotal(&self) -> Money {
        self.lines
            .values()
            .map(CartLine::line_total)
            .sum::<Money>()
            .non_negative()
    }

    /// Inserts or replaces a line.
    pub fn upsert(&mut self, line: CartLine) {
        self.lines.insert(line.key, line);
    }

    /// Removes a line, returning it if it was present.
    pub fn remove(&mut self, key: &LineKey) -> Option<CartLine> {
        self.lines.remove(key)
    }

    /// Removes every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Merges a guest cart into the server cart of a freshly signed-in user.
///
/// For every guest line, the quantity is added to the server line with the
/// same key, or the guest line is inserted as-is. Summed quantities are
/// clamped to the server line's stock. The result is a synced cart.
pub fn merge_carts(server: &Cart, guest: &Cart) -> Cart {
    let mut merged = server.clone().with_mode(CartMode::Synced);
    for guest_line in guest.lines() {
        let line = match merged.get(&guest_line.key) {
            Some(existing) => {
                existing.with_quantity(existing.quantity.saturating_add(guest_line.quantity))
            }
            None => guest_line.clone(),
        };
        merged.upsert(line);
    }
    merged
}
