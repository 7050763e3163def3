//! Coupon service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use domain::coupon::{UsageViolation, normalize_code};
use domain::{Coupon, Money};

use super::{authorize, read, write};
use crate::error::ServiceError;

/// Trait for the coupon backend.
#[async_trait]
pub trait CouponService: Send + Sync {
    /// Checks that `code` can be redeemed on an order of `subtotal`.
    async fn redeem(&self, token: &str, code: &str, subtotal: Money)
    -> Result<Coupon, ServiceError>;

    /// Lists coupons that are currently active.
    async fn list_active(&self, token: &str) -> Result<Vec<Coupon>, ServiceError>;
}

#[derive(Debug)]
struct InMemoryCouponState {
    coupons: HashMap<String, Coupon>,
    delays: HashMap<String, Duration>,
    enforce_minimum: bool,
    fail_on_redeem: bool,
    reject_auth: u32,
    redeem_calls: u32,
}

impl Default for InMemoryCouponState {
    fn default() -> Self {
        Self {
            coupons: HashMap::new(),
            delays: HashMap::new(),
            enforce_minimum: true,
            fail_on_redeem: false,
            reject_auth: 0,
            redeem_calls: 0,
        }
    }
}

/// In-memory coupon backend for testing.
///
/// Applies the usage window, usage limit and minimum order checks of the
/// real backend with the same messages.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCouponService {
    state: Arc<RwLock<InMemoryCouponState>>,
}

impl InMemoryCouponService {
    /// Creates a new in-memory coupon service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a coupon.
    pub fn add_coupon(&self, coupon: Coupon) {
        write(&self.state)
            .coupons
            .insert(normalize_code(&coupon.code), coupon);
    }

    /// Delays redemption responses for `code`.
    pub fn set_delay(&self, code: &str, delay: Duration) {
        write(&self.state).delays.insert(normalize_code(code), delay);
    }

    /// Turns the backend's own minimum order check on or off.
    pub fn set_enforce_minimum(&self, enforce: bool) {
        write(&self.state).enforce_minimum = enforce;
    }

    pub fn set_fail_on_redeem(&self, fail: bool) {
        write(&self.state).fail_on_redeem = fail;
    }

    /// Makes the next `count` calls answer `Unauthorized`.
    pub fn reject_next_auth(&self, count: u32) {
        write(&self.state).reject_auth = count;
    }

    pub fn redeem_calls(&self) -> u32 {
        read(&self.state).redeem_calls
    }

    fn check(
        state: &InMemoryCouponState,
        code: &str,
        subtotal: Money,
    ) -> Result<Coupon, ServiceError> {
        let coupon = state
            .coupons
            .get(code)
            .ok_or_else(|| ServiceError::NotFound(UsageViolation::Inactive.to_string()))?;

        match coupon.usage.check_at(Utc::now()) {
            Ok(()) => {}
            Err(UsageViolation::Inactive) => {
                return Err(ServiceError::NotFound(UsageViolation::Inactive.to_string()));
            }
            Err(violation) => return Err(ServiceError::Rejected(violation.to_string())),
        }

        if state.enforce_minimum {
            coupon
                .check_minimum(subtotal)
                .map_err(|rejection| ServiceError::Rejected(rejection.to_string()))?;
        }
        Ok(coupon.clone())
    }
}

#[async_trait]
impl CouponService for InMemoryCouponService {
    async fn redeem(
        &self,
        token: &str,
        code: &str,
        subtotal: Money,
    ) -> Result<Coupon, ServiceError> {
        let code = normalize_code(code);
        let delay = {
            let mut state = write(&self.state);
            state.redeem_calls += 1;
            authorize(token, &mut state.reject_auth)?;
            state.delays.get(&code).copied().unwrap_or_default()
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = read(&self.state);
        if state.fail_on_redeem {
            return Err(ServiceError::Network("connection reset".to_string()));
        }
        Self::check(&state, &code, subtotal)
    }

    async fn list_active(&self, token: &str) -> Result<Vec<Coupon>, ServiceError> {
        let mut state = write(&self.state);
        authorize(token, &mut state.reject_auth)?;
        let now = Utc::now();
        let mut active: Vec<Coupon> = state
            .coupons
            .values()
            .filter(|coupon| coupon.usage.check_at(now).is_ok())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use domain::UsageConstraints;
    use domain::auth::mint_unsigned_token;

    fn token() -> String {
        mint_unsigned_token("1", Utc::now() + ChronoDuration::minutes(5))
    }

    fn service() -> InMemoryCouponService {
        let service = InMemoryCouponService::new();
        service.add_coupon(Coupon::percentage("SAVE10", 10).with_min_order(Money::from_cents(1000)));
        service.add_coupon(Coupon::fixed("EXPIRED", Money::from_cents(500)).with_usage(
            UsageConstraints {
                ends_at: Some(Utc::now() - ChronoDuration::days(1)),
                ..UsageConstraints::default()
            },
        ));
        service.add_coupon(Coupon::fixed("USEDUP", Money::from_cents(500)).with_usage(
            UsageConstraints {
                max_uses: Some(1),
                used_count: 1,
                ..UsageConstraints::default()
            },
        ));
        service
    }

    #[tokio::test]
    async fn test_redeem_normalizes_code() {
        let coupon = service()
            .redeem(&token(), " save10 ", Money::from_cents(2000))
            .await
            .unwrap();
        assert_eq!(coupon.code, "SAVE10");
    }

    #[tokio::test]
    async fn test_remote_messages() {
        let service = service();
        let token = token();
        let subtotal = Money::from_cents(5000);

        assert_eq!(
            service.redeem(&token, "NOPE", subtotal).await,
            Err(ServiceError::NotFound("Coupon not available or inactive".to_string()))
        );
        assert_eq!(
            service.redeem(&token, "EXPIRED", subtotal).await,
            Err(ServiceError::Rejected("Coupon has expired".to_string()))
        );
        assert_eq!(
            service.redeem(&token, "USEDUP", subtotal).await,
            Err(ServiceError::Rejected("Coupon usage limit reached".to_string()))
        );
        assert_eq!(
            service.redeem(&token, "SAVE10", Money::from_cents(900)).await,
            Err(ServiceError::Rejected(
                "Order total below minimum required amount: 10.00".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_list_active_skips_unusable() {
        let active = service().list_active(&token()).await.unwrap();
        let codes: Vec<&str> = active.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["SAVE10"]);
    }
}
