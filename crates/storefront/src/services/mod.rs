//! Remote collaborator traits and in-memory implementations.
//!
//! Every call that needs an account takes the caller's access token. The
//! in-memory implementations refuse expired tokens with
//! [`ServiceError::Unauthorized`], like a real backend would.

pub mod address;
pub mod auth;
pub mod cart;
pub mod coupon;
pub mod notification;
pub mod order;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ServiceError;

pub use address::{AddressService, InMemoryAddressService};
pub use auth::{AuthService, InMemoryAuthService, LoginResponse};
pub use cart::{CartService, InMemoryCartService};
pub use coupon::{CouponService, InMemoryCouponService};
pub use notification::{InMemoryNotificationService, Notification, NotificationService};
pub use order::{InMemoryOrderService, OrderService};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Refuses expired or malformed tokens, and the next `pending` calls when
/// a test forced authorization failures.
fn authorize(token: &str, pending_rejections: &mut u32) -> Result<(), ServiceError> {
    if *pending_rejections > 0 {
        *pending_rejections -= 1;
        return Err(ServiceError::Unauthorized);
    }
    if domain::auth::is_expired(Some(token)) {
        return Err(ServiceError::Unauthorized);
    }
    Ok(())
}
