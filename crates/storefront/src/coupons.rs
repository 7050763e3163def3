//! Coupon resolver: applies, revalidates and removes the order's coupon.

use std::sync::atomic::{AtomicU64, Ordering};

use domain::coupon::normalize_code;
use domain::{AppliedCoupon, Coupon, CouponRejection, Money};
use tokio::sync::RwLock;

use crate::error::{Result, StorefrontError};
use crate::guard::AuthGuard;
use crate::services::CouponService;

/// Outcome of an `apply` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponDecision {
    /// The coupon is now applied.
    Applied(AppliedCoupon),
    /// The coupon was refused; any previously applied coupon is kept.
    Rejected(CouponRejection),
    /// A newer apply or remove was issued while this one was in flight.
    Superseded,
}

/// Notice that the applied coupon stopped applying to the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponDropped {
    pub code: String,
    pub minimum: Money,
    pub subtotal: Money,
}

impl std::fmt::Display for CouponDropped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Coupon {} was removed: the order total is below its minimum of {}",
            self.code, self.minimum
        )
    }
}

/// A coupon offered in the picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableCoupon {
    pub coupon: Coupon,
    /// True when the current subtotal meets the coupon's minimum.
    pub eligible: bool,
}

/// Holds the coupon applied to the current order.
///
/// The last request wins: every `apply` and `remove` takes a ticket, and a
/// response is only used if its ticket is still the latest.
pub struct CouponResolver<S: CouponService> {
    service: S,
    guard: AuthGuard,
    applied: RwLock<Option<AppliedCoupon>>,
    latest: AtomicU64,
}

impl<S: CouponService> CouponResolver<S> {
    pub fn new(service: S, guard: AuthGuard) -> Self {
        Self {
            service,
            guard,
            applied: RwLock::new(None),
            latest: AtomicU64::new(0),
        }
    }

    pub async fn applied(&self) -> Option<AppliedCoupon> {
        self.applied.read().await.clone()
    }

    fn issue_ticket(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    /// Validates `code` remotely, then checks the minimum order amount
    /// against `subtotal` locally.
    ///
    /// Remote refusals are returned as [`CouponRejection::Remote`] with the
    /// service's message. Transport failures are errors.
    #[tracing::instrument(skip(self))]
    pub async fn apply(&self, code: &str, subtotal: Money) -> Result<CouponDecision> {
        let ticket = self.issue_ticket();
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(CouponDecision::Rejected(CouponRejection::EmptyCode));
        }

        let service = &self.service;
        let code_ref = code.as_str();
        let response = self
            .guard
            .call("coupon.redeem", |token| async move {
                service.redeem(&token, code_ref, subtotal).await
            })
            .await;

        if !self.is_latest(ticket) {
            tracing::debug!(code, ticket, "discarding superseded coupon response");
            return Ok(CouponDecision::Superseded);
        }

        let coupon = match response {
            Ok(coupon) => coupon,
            Err(StorefrontError::Service(e)) if e.rejection_message().is_some() => {
                let message = e.rejection_message().unwrap_or_default().to_string();
                metrics::counter!("coupon_applications_total", "outcome" => "rejected")
                    .increment(1);
                tracing::info!(code, reason = %message, "coupon rejected");
                return Ok(CouponDecision::Rejected(CouponRejection::Remote(message)));
            }
            Err(e) => return Err(e),
        };

        let applied = match AppliedCoupon::new(coupon, subtotal) {
            Ok(applied) => applied,
            Err(rejection) => {
                metrics::counter!("coupon_applications_total", "outcome" => "rejected")
                    .increment(1);
                tracing::info!(code, reason = %rejection, "coupon rejected");
                return Ok(CouponDecision::Rejected(rejection));
            }
        };

        let mut slot = self.applied.write().await;
        if !self.is_latest(ticket) {
            return Ok(CouponDecision::Superseded);
        }
        *slot = Some(applied.clone());
        metrics::counter!("coupon_applications_total", "outcome" => "applied").increment(1);
        tracing::info!(code = applied.code(), %subtotal, "coupon applied");
        Ok(CouponDecision::Applied(applied))
    }

    /// Re-checks the applied coupon after the subtotal changed, dropping it
    /// if the order no longer meets its minimum.
    pub async fn revalidate(&self, subtotal: Money) -> Option<CouponDropped> {
        let mut slot = self.applied.write().await;
        let applied = slot.as_mut()?;
        if applied.revalidate(subtotal).is_ok() {
            return None;
        }

        let dropped = CouponDropped {
            code: applied.code().to_string(),
            minimum: applied.coupon().min_order_amount,
            subtotal,
        };
        *slot = None;
        metrics::counter!("coupons_dropped_total").increment(1);
        tracing::info!(code = %dropped.code, %subtotal, "coupon dropped below minimum");
        Some(dropped)
    }

    /// Clears the applied coupon and discards any apply still in flight.
    pub async fn remove(&self) {
        self.issue_ticket();
        if let Some(previous) = self.applied.write().await.take() {
            tracing::info!(code = previous.code(), "coupon removed");
        }
    }

    /// Lists active coupons, flagging those the subtotal qualifies for.
    #[tracing::instrument(skip(self))]
    pub async fn available(&self, subtotal: Money) -> Result<Vec<AvailableCoupon>> {
        let service = &self.service;
        let coupons = self
            .guard
            .call("coupon.list_active", |token| async move {
                service.list_active(&token).await
            })
            .await?;
        Ok(coupons
            .into_iter()
            .map(|coupon| AvailableCoupon {
                eligible: coupon.is_eligible(subtotal),
                coupon,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryAuthService, InMemoryCouponService};
    use crate::session::SessionStore;
    use common::UserId;
    use domain::UserProfile;
    use local_store::InMemoryLocalStore;
    use std::sync::Arc;
    use std::time::Duration;

    async fn resolver() -> (CouponResolver<InMemoryCouponService>, InMemoryCouponService) {
        let auth = InMemoryAuthService::new();
        auth.add_account("asha", "secret", UserProfile::new(UserId::new(7), "asha"));
        let session = Arc::new(SessionStore::new(
            Arc::new(auth),
            Arc::new(InMemoryLocalStore::new()),
        ));
        session.sign_in("asha", "secret").await.unwrap();

        let service = InMemoryCouponService::new();
        service.add_coupon(Coupon::percentage("SAVE10", 10).with_min_order(Money::from_cents(500)));
        service.add_coupon(Coupon::percentage("BIG", 20).with_min_order(Money::from_cents(1200)));
        service.add_coupon(Coupon::fixed("FLAT1", Money::from_cents(100)));
        (
            CouponResolver::new(service.clone(), AuthGuard::new(session)),
            service,
        )
    }

    #[tokio::test]
    async fn test_empty_code_is_rejected_locally() {
        let (resolver, service) = resolver().await;
        let decision = resolver.apply("   ", Money::from_cents(1000)).await.unwrap();
        assert_eq!(decision, CouponDecision::Rejected(CouponRejection::EmptyCode));
        assert_eq!(service.redeem_calls(), 0);
    }

    #[tokio::test]
    async fn test_apply_and_revalidate() {
        let (resolver, _) = resolver().await;
        let decision = resolver.apply("save10", Money::from_cents(1000)).await.unwrap();
        assert!(matches!(decision, CouponDecision::Applied(ref a) if a.code() == "SAVE10"));

        assert!(resolver.revalidate(Money::from_cents(600)).await.is_none());
        let dropped = resolver.revalidate(Money::from_cents(400)).await.unwrap();
        assert_eq!(dropped.code, "SAVE10");
        assert_eq!(dropped.minimum.cents(), 500);
        assert!(resolver.applied().await.is_none());
    }

    #[tokio::test]
    async fn test_minimum_is_enforced_locally() {
        let (resolver, service) = resolver().await;
        service.set_enforce_minimum(false);

        let decision = resolver.apply("BIG", Money::from_cents(1000)).await.unwrap();
        assert!(matches!(
            decision,
            CouponDecision::Rejected(CouponRejection::BelowMinimum { .. })
        ));
        assert!(resolver.applied().await.is_none());
    }

    #[tokio::test]
    async fn test_remote_message_is_passed_through() {
        let (resolver, _) = resolver().await;
        let decision = resolver.apply("nope", Money::from_cents(1000)).await.unwrap();
        assert_eq!(
            decision,
            CouponDecision::Rejected(CouponRejection::Remote(
                "Coupon not available or inactive".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_rejection_keeps_previous_coupon() {
        let (resolver, _) = resolver().await;
        resolver.apply("SAVE10", Money::from_cents(1000)).await.unwrap();
        resolver.apply("BIG", Money::from_cents(1000)).await.unwrap();
        assert_eq!(resolver.applied().await.unwrap().code(), "SAVE10");
    }

    #[tokio::test]
    async fn test_network_failure_is_an_error() {
        let (resolver, service) = resolver().await;
        service.set_fail_on_redeem(true);
        assert!(resolver.apply("SAVE10", Money::from_cents(1000)).await.is_err());
    }

    #[tokio::test]
    async fn test_last_request_wins() {
        let (resolver, service) = resolver().await;
        service.set_delay("SAVE10", Duration::from_millis(50));

        let (slow, fast) = tokio::join!(
            resolver.apply("SAVE10", Money::from_cents(1000)),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                resolver.apply("FLAT1", Money::from_cents(1000)).await
            }
        );

        assert_eq!(slow.unwrap(), CouponDecision::Superseded);
        assert!(matches!(fast.unwrap(), CouponDecision::Applied(_)));
        assert_eq!(resolver.applied().await.unwrap().code(), "FLAT1");
    }

    #[tokio::test]
    async fn test_remove_discards_in_flight_apply() {
        let (resolver, service) = resolver().await;
        service.set_delay("SAVE10", Duration::from_millis(50));

        let (applied, ()) = tokio::join!(
            resolver.apply("SAVE10", Money::from_cents(1000)),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                resolver.remove().await;
            }
        );

        assert_eq!(applied.unwrap(), CouponDecision::Superseded);
        assert!(resolver.applied().await.is_none());
    }

    #[tokio::test]
    async fn test_available_flags_eligibility() {
        let (resolver, _) = resolver().await;
        let available = resolver.available(Money::from_cents(1000)).await.unwrap();
        let flags: Vec<(&str, bool)> = available
            .iter()
            .map(|a| (a.coupon.code.as_str(), a.eligible))
            .collect();
        assert_eq!(flags, vec![("BIG", false), ("FLAT1", true), ("SAVE10", true)]);
    }
}
