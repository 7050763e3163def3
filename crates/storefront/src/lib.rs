//! Storefront client core.
//!
//! Keeps the shopper's session and cart, prices the order, applies coupons
//! and drives checkout against remote collaborators defined in
//! [`services`].

pub mod cart_store;
pub mod checkout;
pub mod config;
pub mod coupons;
pub mod error;
pub mod guard;
pub mod notifications;
pub mod poller;
pub mod services;
pub mod session;
pub mod storefront;

pub use cart_store::CartStore;
pub use checkout::{CheckoutCoordinator, PlacedOrder};
pub use config::StorefrontConfig;
pub use coupons::{AvailableCoupon, CouponDecision, CouponDropped, CouponResolver};
pub use error::{Result, ServiceError, StorefrontError};
pub use guard::AuthGuard;
pub use notifications::NotificationCenter;
pub use poller::{PeriodicTask, TaskState};
pub use session::{SessionStatus, SessionStore};
pub use storefront::{CartUpdate, Storefront, StorefrontServices};
