//! Server-side cart trait and in-memory implementation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::LineKey;
use domain::{Cart, CartLine, CartMode};

use super::{authorize, read, write};
use crate::error::ServiceError;

/// Trait for the account cart backend.
///
/// Every mutating call answers with the full cart as now stored, which the
/// client adopts wholesale.
#[async_trait]
pub trait CartService: Send + Sync {
    /// Returns the account's cart, empty if it has none.
    async fn get_cart(&self, token: &str) -> Result<Cart, ServiceError>;

    /// Replaces the account's cart.
    async fn replace_cart(&self, token: &str, cart: &Cart) -> Result<Cart, ServiceError>;

    /// Inserts or replaces one line.
    async fn add_item(&self, token: &str, line: &CartLine) -> Result<Cart, ServiceError>;

    /// Removes one line; removing an absent line is not an error.
    async fn remove_item(&self, token: &str, key: LineKey) -> Result<Cart, ServiceError>;

    /// Empties the account's cart.
    async fn clear_cart(&self, token: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    cart: Cart,
    get_delay: Duration,
    fail_on_get: bool,
    fail_on_replace: bool,
    fail_on_clear: bool,
    reject_auth: u32,
    get_calls: u32,
    replace_calls: u32,
}

/// In-memory cart backend holding a single account's cart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartService {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartService {
    /// Creates a new in-memory cart service with an empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the stored cart.
    pub fn seed(&self, lines: impl IntoIterator<Item = CartLine>) {
        write(&self.state).cart = Cart::from_lines(CartMode::Synced, lines);
    }

    /// Returns the stored cart.
    pub fn stored(&self) -> Cart {
        read(&self.state).cart.clone()
    }

    /// Delays every `get_cart` response.
    pub fn set_get_delay(&self, delay: Duration) {
        write(&self.state).get_delay = delay;
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        write(&self.state).fail_on_get = fail;
    }

    /// Configures `replace_cart` to fail, as in a failed merge write.
    pub fn set_fail_on_replace(&self, fail: bool) {
        write(&self.state).fail_on_replace = fail;
    }

    pub fn set_fail_on_clear(&self, fail: bool) {
        write(&self.state).fail_on_clear = fail;
    }

    /// Makes the next `count` calls answer `Unauthorized`.
    pub fn reject_next_auth(&self, count: u32) {
        write(&self.state).reject_auth = count;
    }

    pub fn get_calls(&self) -> u32 {
        read(&self.state).get_calls
    }

    pub fn replace_calls(&self) -> u32 {
        read(&self.state).replace_calls
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn get_cart(&self, token: &str) -> Result<Cart, ServiceError> {
        let (delay, cart) = {
            let mut state = write(&self.state);
            state.get_calls += 1;
            authorize(token, &mut state.reject_auth)?;
            if state.fail_on_get {
                return Err(ServiceError::Network("connection reset".to_string()));
            }
            (state.get_delay, state.cart.clone())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(cart)
    }

    async fn replace_cart(&self, token: &str, cart: &Cart) -> Result<Cart, ServiceError> {
        let mut state = write(&self.state);
        state.replace_calls += 1;
        authorize(token, &mut state.reject_auth)?;
        if state.fail_on_replace {
            return Err(ServiceError::Server("Failed to save cart".to_string()));
        }
        state.cart = cart.clone().with_mode(CartMode::Synced);
        Ok(state.cart.clone())
    }

    async fn add_item(&self, token: &str, line: &CartLine) -> Result<Cart, ServiceError> {
        let mut state = write(&self.state);
        authorize(token, &mut state.reject_auth)?;
        state.cart.upsert(line.clone());
        Ok(state.cart.clone())
    }

    async fn remove_item(&self, token: &str, key: LineKey) -> Result<Cart, ServiceError> {
        let mut state = write(&self.state);
        authorize(token, &mut state.reject_auth)?;
        state.cart.remove(&key);
        Ok(state.cart.clone())
    }

    async fn clear_cart(&self, token: &str) -> Result<(), ServiceError> {
        let mut state = write(&self.state);
        authorize(token, &mut state.reject_auth)?;
        if state.fail_on_clear {
            return Err(ServiceError::Server("Failed to clear cart".to_string()));
        }
        state.cart.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use common::ItemId;
    use domain::auth::mint_unsigned_token;
    use domain::{Money, ProductSnapshot};

    fn token() -> String {
        mint_unsigned_token("1", Utc::now() + ChronoDuration::minutes(5))
    }

    fn line(item: u64, quantity: u32) -> CartLine {
        let product = ProductSnapshot::item(ItemId::new(item), "Mug", Money::from_cents(450));
        CartLine::from_product(&product, quantity).unwrap()
    }

    #[tokio::test]
    async fn test_add_remove_and_clear() {
        let service = InMemoryCartService::new();
        let token = token();

        let cart = service.add_item(&token, &line(1, 2)).await.unwrap();
        assert_eq!(cart.total_quantity(), 2);
        let cart = service.add_item(&token, &line(2, 1)).await.unwrap();
        assert_eq!(cart.len(), 2);

        let cart = service.remove_item(&token, line(1, 1).key()).await.unwrap();
        assert_eq!(cart.len(), 1);

        service.clear_cart(&token).await.unwrap();
        assert!(service.stored().is_empty());
    }

    #[tokio::test]
    async fn test_replace_failure_keeps_stored_cart() {
        let service = InMemoryCartService::new();
        service.seed([line(1, 1)]);
        service.set_fail_on_replace(true);

        let replacement = Cart::from_lines(CartMode::Synced, [line(2, 5)]);
        let result = service.replace_cart(&token(), &replacement).await;
        assert!(matches!(result, Err(ServiceError::Server(_))));
        assert_eq!(service.stored().total_quantity(), 1);
        assert_eq!(service.replace_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejects_expired_and_forced_auth() {
        let service = InMemoryCartService::new();
        let expired = mint_unsigned_token("1", Utc::now() - ChronoDuration::minutes(1));
        assert_eq!(service.get_cart(&expired).await, Err(ServiceError::Unauthorized));

        service.reject_next_auth(1);
        assert_eq!(service.get_cart(&token()).await, Err(ServiceError::Unauthorized));
        assert!(service.get_cart(&token()).await.is_ok());
    }
}
