//! Order creation trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::SubmissionId;
use domain::{OrderConfirmation, OrderSubmission};

use super::{authorize, read, write};
use crate::error::ServiceError;

/// Trait for the order backend.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Creates an order. A repeated submission id returns the order created
    /// for it the first time.
    async fn create(
        &self,
        token: &str,
        submission: &OrderSubmission,
    ) -> Result<OrderConfirmation, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<SubmissionId, (OrderSubmission, OrderConfirmation)>,
    next_id: u32,
    create_delay: Duration,
    fail_on_create: bool,
    reject_auth: u32,
    create_calls: u32,
}

/// In-memory order backend for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderService {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderService {
    /// Creates a new in-memory order service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on create calls.
    pub fn set_fail_on_create(&self, fail: bool) {
        write(&self.state).fail_on_create = fail;
    }

    /// Delays every create response.
    pub fn set_create_delay(&self, delay: Duration) {
        write(&self.state).create_delay = delay;
    }

    /// Makes the next `count` calls answer `Unauthorized`.
    pub fn reject_next_auth(&self, count: u32) {
        write(&self.state).reject_auth = count;
    }

    /// Returns the number of orders created.
    pub fn order_count(&self) -> usize {
        read(&self.state).orders.len()
    }

    /// Returns the number of create calls received.
    pub fn create_calls(&self) -> u32 {
        read(&self.state).create_calls
    }

    /// Returns the submission an order was created from.
    pub fn submission(&self, order_id: &str) -> Option<OrderSubmission> {
        read(&self.state)
            .orders
            .values()
            .find(|(_, confirmation)| confirmation.order_id == order_id)
            .map(|(submission, _)| submission.clone())
    }
}

#[async_trait]
impl OrderService for InMemoryOrderService {
    async fn create(
        &self,
        token: &str,
        submission: &OrderSubmission,
    ) -> Result<OrderConfirmation, ServiceError> {
        let delay = {
            let mut state = write(&self.state);
            state.create_calls += 1;
            state.create_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = write(&self.state);
        authorize(token, &mut state.reject_auth)?;
        if state.fail_on_create {
            return Err(ServiceError::Server("Order service unavailable".to_string()));
        }

        if let Some((_, confirmation)) = state.orders.get(&submission.submission_id()) {
            return Ok(confirmation.clone());
        }

        state.next_id += 1;
        let confirmation = OrderConfirmation {
            order_id: format!("ORD-{:04}", state.next_id),
            confirmation: format!("CONF-{:04}", state.next_id),
        };
        state.orders.insert(
            submission.submission_id(),
            (submission.clone(), confirmation.clone()),
        );
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use common::ItemId;
    use domain::auth::mint_unsigned_token;
    use domain::{CartLine, Money, ProductSnapshot, ShippingAddress, ShippingMode};

    fn token() -> String {
        mint_unsigned_token("1", Utc::now() + ChronoDuration::minutes(5))
    }

    fn submission() -> OrderSubmission {
        let product = ProductSnapshot::item(ItemId::new(1), "Tea", Money::from_cents(300));
        let lines = [CartLine::from_product(&product, 1).unwrap()];
        OrderSubmission::new(
            &lines,
            ShippingAddress::default(),
            ShippingMode::Pickup,
            None,
            Money::zero(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sequential_order_ids() {
        let service = InMemoryOrderService::new();
        let first = service.create(&token(), &submission()).await.unwrap();
        let second = service.create(&token(), &submission()).await.unwrap();
        assert_eq!(first.order_id, "ORD-0001");
        assert_eq!(second.order_id, "ORD-0002");
        assert_eq!(service.order_count(), 2);
    }

    #[tokio::test]
    async fn test_repeated_submission_is_deduplicated() {
        let service = InMemoryOrderService::new();
        let submission = submission();
        let first = service.create(&token(), &submission).await.unwrap();
        let again = service.create(&token(), &submission).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(service.order_count(), 1);
        assert_eq!(service.create_calls(), 2);
        assert!(service.submission(&first.order_id).is_some());
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let service = InMemoryOrderService::new();
        service.set_fail_on_create(true);
        assert!(service.create(&token(), &submission()).await.is_err());
        assert_eq!(service.order_count(), 0);
    }
}
