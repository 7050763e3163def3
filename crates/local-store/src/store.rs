use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Result;

/// Fixed key names used by the storefront client.
pub mod keys {
    /// Guest cart snapshot.
    pub const CART: &str = "cart";
    /// Current access token.
    pub const ACCESS_TOKEN: &str = "access_token";
    /// Current refresh token.
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Cached user profile.
    pub const USER: &str = "user";
}

/// Core trait for local state backends.
///
/// Values are JSON documents. Every write replaces the whole value stored
/// under a key; implementations must never expose a partially written value.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Writes several keys in one step.
    ///
    /// Either all entries become visible or none do.
    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Removes every key.
    async fn clear(&self) -> Result<()>;
}

/// Typed helpers on top of [`LocalStore`].
#[async_trait]
pub trait LocalStoreExt: LocalStore {
    /// Reads and decodes the value under `key`.
    ///
    /// A value that no longer decodes into `T` is treated as absent, so a
    /// corrupted entry never blocks start-up.
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let Some(value) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable local value");
                Ok(None)
            }
        }
    }

    /// Encodes and stores `value` under `key`.
    async fn set_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        self.set(key, value).await
    }
}

impl<S: LocalStore + ?Sized> LocalStoreExt for S {}
