use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw identifier.
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw identifier.
            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Catalog item identifier.
    ItemId
);

numeric_id!(
    /// Identifier of a purchasable variant (size/colour) of an item.
    VariantId
);

numeric_id!(
    /// Identifier of an authenticated account.
    UserId
);

/// Unique key of a cart line, derived from item and optional variant identity.
///
/// Rendered as `"<item>"` or `"<item>:<variant>"`, which is also its
/// serialized form so it can key JSON objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct LineKey {
    item_id: ItemId,
    variant_id: Option<VariantId>,
}

impl LineKey {
    /// Derives the key for an item and optional variant.
    pub fn new(item_id: ItemId, variant_id: Option<VariantId>) -> Self {
        Self {
            item_id,
            variant_id,
        }
    }

    /// Returns the item part of the key.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Returns the variant part of the key, if any.
    pub fn variant_id(&self) -> Option<VariantId> {
        self.variant_id
    }
}

impl std::fmt::Display for LineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.variant_id {
            Some(variant) => write!(f, "{}:{}", self.item_id, variant),
            None => write!(f, "{}", self.item_id),
        }
    }
}

/// Error returned when a string is not a valid line key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid line key: {0:?}")]
pub struct ParseLineKeyError(String);

impl std::str::FromStr for LineKey {
    type Err = ParseLineKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseLineKeyError(s.to_string());
        let (item, variant) = match s.split_once(':') {
            Some((item, variant)) => (item, Some(variant)),
            None => (s, None),
        };
        let item_id = item.parse::<u64>().map_err(|_| invalid())?;
        let variant_id = variant
            .map(|v| v.parse::<u64>().map_err(|_| invalid()))
            .transpose()?;
        Ok(Self::new(
            ItemId::new(item_id),
            variant_id.map(VariantId::new),
        ))
    }
}

impl From<LineKey> for String {
    fn from(key: LineKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for LineKey {
    type Error = ParseLineKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Idempotency key attached to a single order submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    /// Creates a new random submission ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SubmissionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn line_key_display_without_variant() {
        let key = LineKey::new(ItemId::new(12), None);
        assert_eq!(key.to_string(), "12");
    }

    #[test]
    fn line_key_display_with_variant() {
        let key = LineKey::new(ItemId::new(12), Some(VariantId::new(5)));
        assert_eq!(key.to_string(), "12:5");
    }

    #[test]
    fn line_key_distinguishes_variants() {
        let plain = LineKey::new(ItemId::new(1), None);
        let red = LineKey::new(ItemId::new(1), Some(VariantId::new(2)));
        let blue = LineKey::new(ItemId::new(1), Some(VariantId::new(3)));
        assert_ne!(plain, red);
        assert_ne!(red, blue);
    }

    #[test]
    fn line_key_parse_rejects_garbage() {
        assert!("".parse::<LineKey>().is_err());
        assert!("abc".parse::<LineKey>().is_err());
        assert!("1:".parse::<LineKey>().is_err());
        assert!("1:x".parse::<LineKey>().is_err());
    }

    #[test]
    fn line_key_parse_error_is_a_std_error() {
        let err: Box<dyn std::error::Error> = Box::new("1:x".parse::<LineKey>().unwrap_err());
        assert_eq!(err.to_string(), r#"invalid line key: "1:x""#);
    }

    #[test]
    fn line_key_serializes_as_json_object_key() {
        let mut map = HashMap::new();
        map.insert(LineKey::new(ItemId::new(7), Some(VariantId::new(9))), 2u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"7:9":2}"#);

        let back: HashMap<LineKey, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn submission_id_new_creates_unique_ids() {
        assert_ne!(SubmissionId::new(), SubmissionId::new());
    }
}
