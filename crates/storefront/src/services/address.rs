//! Saved address trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{SavedAddress, ShippingAddress};

use super::{authorize, read, write};
use crate::error::ServiceError;

/// Trait for the shopper's address book.
#[async_trait]
pub trait AddressService: Send + Sync {
    async fn list(&self, token: &str) -> Result<Vec<SavedAddress>, ServiceError>;

    async fn create(
        &self,
        token: &str,
        address: &ShippingAddress,
    ) -> Result<SavedAddress, ServiceError>;

    async fn update(
        &self,
        token: &str,
        id: u64,
        address: &ShippingAddress,
    ) -> Result<SavedAddress, ServiceError>;

    async fn delete(&self, token: &str, id: u64) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryAddressState {
    addresses: Vec<SavedAddress>,
    next_id: u64,
    fail_on_create: bool,
    reject_auth: u32,
}

impl InMemoryAddressState {
    /// Only one address may be the default.
    fn clear_default_except(&mut self, id: u64) {
        for saved in &mut self.addresses {
            if saved.id != id {
                saved.address.is_default = false;
            }
        }
    }
}

/// In-memory address book for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAddressService {
    state: Arc<RwLock<InMemoryAddressState>>,
}

impl InMemoryAddressService {
    /// Creates a new, empty address book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an address directly, returning its id.
    pub fn seed(&self, address: ShippingAddress) -> u64 {
        let mut state = write(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        let is_default = address.is_default;
        state.addresses.push(SavedAddress { id, address });
        if is_default {
            state.clear_default_except(id);
        }
        id
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        write(&self.state).fail_on_create = fail;
    }

    /// Makes the next `count` calls answer `Unauthorized`.
    pub fn reject_next_auth(&self, count: u32) {
        write(&self.state).reject_auth = count;
    }

    pub fn address_count(&self) -> usize {
        read(&self.state).addresses.len()
    }
}

#[async_trait]
impl AddressService for InMemoryAddressService {
    async fn list(&self, token: &str) -> Result<Vec<SavedAddress>, ServiceError> {
        let mut state = write(&self.state);
        authorize(token, &mut state.reject_auth)?;
        Ok(state.addresses.clone())
    }

    async fn create(
        &self,
        token: &str,
        address: &ShippingAddress,
    ) -> Result<SavedAddress, ServiceError> {
        {
            let mut state = write(&self.state);
            authorize(token, &mut state.reject_auth)?;
            if state.fail_on_create {
                return Err(ServiceError::Server("Failed to save address".to_string()));
            }
        }
        let id = self.seed(address.clone());
        Ok(SavedAddress {
            id,
            address: address.clone(),
        })
    }

    async fn update(
        &self,
        token: &str,
        id: u64,
        address: &ShippingAddress,
    ) -> Result<SavedAddress, ServiceError> {
        let mut state = write(&self.state);
        authorize(token, &mut state.reject_auth)?;
        let saved = state
            .addresses
            .iter_mut()
            .find(|saved| saved.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("Address {id} not found")))?;
        saved.address = address.clone();
        let updated = saved.clone();
        if updated.address.is_default {
            state.clear_default_except(id);
        }
        Ok(updated)
    }

    async fn delete(&self, token: &str, id: u64) -> Result<(), ServiceError> {
        let mut state = write(&self.state);
        authorize(token, &mut state.reject_auth)?;
        let before = state.addresses.len();
        state.addresses.retain(|saved| saved.id != id);
        if state.addresses.len() == before {
            return Err(ServiceError::NotFound(format!("Address {id} not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domain::auth::mint_unsigned_token;

    fn token() -> String {
        mint_unsigned_token("1", Utc::now() + Duration::minutes(5))
    }

    fn address(name: &str, is_default: bool) -> ShippingAddress {
        ShippingAddress {
            full_name: name.to_string(),
            is_default,
            ..ShippingAddress::default()
        }
    }

    #[tokio::test]
    async fn test_crud() {
        let service = InMemoryAddressService::new();
        let token = token();

        let home = service.create(&token, &address("Home", true)).await.unwrap();
        let office = service.create(&token, &address("Office", false)).await.unwrap();
        assert_eq!(service.list(&token).await.unwrap().len(), 2);

        let updated = service
            .update(&token, office.id, &address("Office", true))
            .await
            .unwrap();
        assert!(updated.address.is_default);
        let listed = service.list(&token).await.unwrap();
        assert!(!listed.iter().find(|a| a.id == home.id).unwrap().address.is_default);

        service.delete(&token, home.id).await.unwrap();
        assert_eq!(service.address_count(), 1);
        assert!(matches!(
            service.delete(&token, home.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let service = InMemoryAddressService::new();
        service.set_fail_on_create(true);
        assert!(service.create(&token(), &address("Home", false)).await.is_err());
        assert_eq!(service.address_count(), 0);
    }
}
