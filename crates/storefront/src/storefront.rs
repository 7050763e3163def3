//! The storefront client: wires session, cart, coupons, checkout and
//! background refresh together.

use std::sync::Arc;

use common::LineKey;
use domain::{Cart, CartLine, ProductSnapshot, Totals};
use local_store::LocalStore;
use tokio::sync::Mutex;

use crate::cart_store::CartStore;
use crate::checkout::CheckoutCoordinator;
use crate::config::StorefrontConfig;
use crate::coupons::{CouponDecision, CouponDropped, CouponResolver};
use crate::error::{Result, StorefrontError};
use crate::guard::AuthGuard;
use crate::notifications::NotificationCenter;
use crate::poller::{PeriodicTask, TaskState};
use crate::services::{
    AddressService, AuthService, CartService, CouponService, NotificationService, OrderService,
};
use crate::session::{SessionStatus, SessionStore};

/// The remote collaborators the storefront talks to.
pub struct StorefrontServices<C, S, O, A, N> {
    pub auth: Arc<dyn AuthService>,
    pub cart: C,
    pub coupons: S,
    pub orders: O,
    pub addresses: A,
    pub notifications: N,
}

/// Result of a cart change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartUpdate {
    /// The line as it now stands, if it still exists.
    pub line: Option<CartLine>,
    pub totals: Totals,
    /// Set when the change pushed the subtotal under the coupon's minimum.
    pub dropped_coupon: Option<CouponDropped>,
}

/// A shopper's storefront session.
///
/// Login merges the guest cart into the account cart before checkout can
/// read it, every cart change re-checks the applied coupon, and logout stops
/// background refresh before the session is wiped. A session that ends on
/// its own, such as after a failed token refresh, is noticed on the next
/// call and forgotten the same way.
pub struct Storefront<C, S, O, A, N>
where
    C: CartService + 'static,
    S: CouponService + 'static,
    O: OrderService + 'static,
    A: AddressService + 'static,
    N: NotificationService + 'static,
{
    config: StorefrontConfig,
    session: Arc<SessionStore>,
    cart: Arc<CartStore<C>>,
    coupons: Arc<CouponResolver<S>>,
    checkout: CheckoutCoordinator<C, S, O, A>,
    notifications: Arc<NotificationCenter<N>>,
    poller: Mutex<Option<PeriodicTask>>,
    observed: Mutex<SessionStatus>,
}

impl<C, S, O, A, N> Storefront<C, S, O, A, N>
where
    C: CartService + 'static,
    S: CouponService + 'static,
    O: OrderService + 'static,
    A: AddressService + 'static,
    N: NotificationService + 'static,
{
    pub fn new(
        config: StorefrontConfig,
        services: StorefrontServices<C, S, O, A, N>,
        local: Arc<dyn LocalStore>,
    ) -> Self {
        let session = Arc::new(SessionStore::new(services.auth, local.clone()));
        let guard = AuthGuard::new(session.clone());
        let cart = Arc::new(CartStore::new(services.cart, guard.clone(), local));
        let coupons = Arc::new(CouponResolver::new(services.coupons, guard.clone()));
        let checkout = CheckoutCoordinator::new(
            cart.clone(),
            coupons.clone(),
            services.orders,
            services.addresses,
            guard.clone(),
            config.shipping_rates,
        );
        let notifications = Arc::new(NotificationCenter::new(services.notifications, guard));
        let observed = Mutex::new(session.status());

        Self {
            config,
            session,
            cart,
            coupons,
            checkout,
            notifications,
            poller: Mutex::new(None),
            observed,
        }
    }

    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn cart(&self) -> &Arc<CartStore<C>> {
        &self.cart
    }

    pub fn coupons(&self) -> &Arc<CouponResolver<S>> {
        &self.coupons
    }

    pub fn checkout(&self) -> &CheckoutCoordinator<C, S, O, A> {
        &self.checkout
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter<N>> {
        &self.notifications
    }

    /// Restores the guest cart and any persisted session. Returns whether a
    /// shopper is signed in.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<bool> {
        self.cart.restore_guest().await?;
        if !self.session.restore().await? {
            return Ok(false);
        }
        self.after_login().await?;
        Ok(true)
    }

    /// Signs in and merges the guest cart into the account cart.
    ///
    /// A failed merge leaves the shopper signed in with the guest cart kept;
    /// [`Storefront::retry_merge`] completes it.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<Cart> {
        self.reconcile_session().await;
        self.session.sign_in(identifier, password).await?;
        self.after_login().await
    }

    pub async fn retry_merge(&self) -> Result<Cart> {
        self.reconcile_session().await;
        let merged = self.cart.merge_on_login().await;
        self.settle(merged).await
    }

    async fn after_login(&self) -> Result<Cart> {
        *self.observed.lock().await = self.session.status();
        self.start_polling().await;
        let merged = self.cart.merge_on_login().await?;
        self.coupons.revalidate(merged.subtotal()).await;
        Ok(merged)
    }

    /// Stops background refresh, then ends the session and forgets all
    /// shopper state.
    #[tracing::instrument(skip(self))]
    pub async fn sign_out(&self) {
        self.stop_polling().await;
        self.session.logout().await;
        *self.observed.lock().await = self.session.status();
        self.forget_shopper().await;
    }

    /// Forgets shopper state left behind by a session that ended without
    /// [`Storefront::sign_out`].
    async fn reconcile_session(&self) {
        let current = self.session.status();
        let ended = {
            let mut observed = self.observed.lock().await;
            let ended = observed.authenticated
                && (!current.authenticated || observed.generation != current.generation);
            *observed = current;
            ended
        };
        if ended {
            tracing::info!(
                generation = current.generation,
                "session ended, forgetting shopper state"
            );
            self.stop_polling().await;
            self.forget_shopper().await;
        }
    }

    /// Reconciles after a call that failed because the session is gone.
    async fn settle<T>(&self, result: Result<T>) -> Result<T> {
        if matches!(
            result,
            Err(StorefrontError::SessionExpired | StorefrontError::NotAuthenticated)
        ) {
            self.reconcile_session().await;
        }
        result
    }

    async fn forget_shopper(&self) {
        self.cart.reset().await;
        self.coupons.remove().await;
        self.checkout.reset().await;
        self.notifications.clear().await;
    }

    async fn stop_polling(&self) {
        if let Some(task) = self.poller.lock().await.take() {
            task.shutdown().await;
        }
    }

    /// Starts (or restarts) the periodic notification and cart refresh for
    /// the current session.
    async fn start_polling(&self) {
        let notifications = self.notifications.clone();
        let cart = self.cart.clone();
        let task = PeriodicTask::spawn(
            "storefront.refresh",
            self.config.poll_interval,
            self.session.subscribe(),
            move || {
                let notifications = notifications.clone();
                let cart = cart.clone();
                async move {
                    if let Err(e) = notifications.refresh().await {
                        tracing::warn!(error = %e, "background notification refresh failed");
                    }
                    if let Err(e) = cart.fetch().await {
                        tracing::warn!(error = %e, "background cart refresh failed");
                    }
                }
            },
        );
        if let Some(previous) = self.poller.lock().await.replace(task) {
            previous.cancel();
        }
    }

    pub async fn polling(&self) -> Option<TaskState> {
        self.poller.lock().await.as_ref().map(PeriodicTask::state)
    }

    pub async fn totals(&self) -> Totals {
        self.reconcile_session().await;
        self.checkout.totals().await
    }

    /// Adds `quantity` units of `product` to the cart.
    pub async fn add_to_cart(&self, product: &ProductSnapshot, quantity: u32) -> Result<CartUpdate> {
        self.reconcile_session().await;
        let line = self.cart.add_item(product, quantity).await;
        let line = self.settle(line).await?;
        Ok(self.after_cart_change(Some(line)).await)
    }

    /// Sets a line's quantity; zero removes it.
    pub async fn update_quantity(&self, key: LineKey, quantity: u32) -> Result<CartUpdate> {
        self.reconcile_session().await;
        let line = self.cart.set_quantity(key, quantity).await;
        let line = self.settle(line).await?;
        Ok(self.after_cart_change(line).await)
    }

    pub async fn remove_from_cart(&self, key: LineKey) -> Result<CartUpdate> {
        self.reconcile_session().await;
        let removed = self.cart.remove(key).await;
        self.settle(removed).await?;
        Ok(self.after_cart_change(None).await)
    }

    pub async fn clear_cart(&self) -> Result<CartUpdate> {
        self.reconcile_session().await;
        let cleared = self.cart.clear().await;
        self.settle(cleared).await?;
        Ok(self.after_cart_change(None).await)
    }

    async fn after_cart_change(&self, line: Option<CartLine>) -> CartUpdate {
        let dropped_coupon = self.coupons.revalidate(self.cart.subtotal().await).await;
        CartUpdate {
            line,
            totals: self.checkout.totals().await,
            dropped_coupon,
        }
    }

    /// Applies a coupon to the current subtotal.
    pub async fn apply_coupon(&self, code: &str) -> Result<CouponDecision> {
        self.reconcile_session().await;
        let subtotal = self.cart.subtotal().await;
        let decision = self.coupons.apply(code, subtotal).await;
        self.settle(decision).await
    }

    pub async fn remove_coupon(&self) -> Totals {
        self.coupons.remove().await;
        self.totals().await
    }
}
