//! Checkout coordinator: drives the step machine against the cart, the
//! coupon resolver and the order service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use domain::checkout::preselect;
use domain::{
    CheckoutState, CheckoutStep, OrderConfirmation, OrderSubmission, PaymentMethod,
    SavedAddress, ShippingAddress, ShippingMode, ShippingRates, Totals, compute_totals,
};
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::cart_store::CartStore;
use crate::coupons::{CouponDropped, CouponResolver};
use crate::error::{Result, StorefrontError};
use crate::guard::AuthGuard;
use crate::services::{AddressService, CartService, CouponService, OrderService};

/// Clears the in-flight flag when a submission ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StorefrontError::SubmissionInFlight)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outcome of a placed order.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub confirmation: OrderConfirmation,
    /// Totals the order was submitted with.
    pub totals: Totals,
    /// Set when the applied coupon no longer met its minimum at submission
    /// and the order went out without it.
    pub dropped_coupon: Option<CouponDropped>,
}

/// Orchestrates one checkout.
///
/// Submission is single-flight and never retried automatically, apart from
/// the guard's one retry after an authorization refusal, which the backend
/// did not accept as an order.
pub struct CheckoutCoordinator<C, S, O, A>
where
    C: CartService,
    S: CouponService,
    O: OrderService,
    A: AddressService,
{
    cart: Arc<CartStore<C>>,
    coupons: Arc<CouponResolver<S>>,
    orders: O,
    addresses: A,
    guard: AuthGuard,
    rates: ShippingRates,
    state: RwLock<CheckoutState>,
    saved_addresses: RwLock<Vec<SavedAddress>>,
    submitting: AtomicBool,
    torn_down: AtomicBool,
    resets: AtomicU64,
}

impl<C, S, O, A> CheckoutCoordinator<C, S, O, A>
where
    C: CartService,
    S: CouponService,
    O: OrderService,
    A: AddressService,
{
    pub fn new(
        cart: Arc<CartStore<C>>,
        coupons: Arc<CouponResolver<S>>,
        orders: O,
        addresses: A,
        guard: AuthGuard,
        rates: ShippingRates,
    ) -> Self {
        Self {
            cart,
            coupons,
            orders,
            addresses,
            guard,
            rates,
            state: RwLock::new(CheckoutState::new()),
            saved_addresses: RwLock::new(Vec::new()),
            submitting: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            resets: AtomicU64::new(0),
        }
    }

    /// Snapshot of the form state.
    pub async fn state(&self) -> CheckoutState {
        self.state.read().await.clone()
    }

    pub async fn step(&self) -> CheckoutStep {
        self.state.read().await.step()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Write access to the form. Refused while an order is being placed.
    async fn form_mut(&self) -> Result<RwLockWriteGuard<'_, CheckoutState>> {
        let state = self.state.write().await;
        if self.is_submitting() {
            return Err(StorefrontError::SubmissionInFlight);
        }
        Ok(state)
    }

    /// Current totals for the cart, applied coupon and shipping mode.
    pub async fn totals(&self) -> Totals {
        let cart = self.cart.cart().await;
        let applied = self.coupons.applied().await;
        let mode = self.state.read().await.shipping_mode();
        compute_totals(
            cart.lines(),
            applied.as_ref().map(|applied| applied.coupon()),
            mode,
            &self.rates,
        )
    }

    /// Enters a new shipping address, then re-checks the applied coupon.
    pub async fn set_address(
        &self,
        address: ShippingAddress,
        save: bool,
    ) -> Result<Option<CouponDropped>> {
        self.form_mut()
            .await?
            .set_shipping_address(address, save)?;
        Ok(self.coupons.revalidate(self.cart.subtotal().await).await)
    }

    /// Copies a saved address into the form, then re-checks the coupon.
    pub async fn select_saved_address(&self, id: u64) -> Result<Option<CouponDropped>> {
        let saved = self
            .saved_addresses
            .read()
            .await
            .iter()
            .find(|saved| saved.id == id)
            .cloned()
            .ok_or(StorefrontError::AddressNotFound(id))?;
        self.form_mut()
            .await?
            .select_saved_address(saved.id, saved.address)?;
        Ok(self.coupons.revalidate(self.cart.subtotal().await).await)
    }

    /// Lists the shopper's saved addresses and preselects the default one
    /// (or the first) while the shipping form is still blank.
    #[tracing::instrument(skip(self))]
    pub async fn load_saved_addresses(&self) -> Result<Vec<SavedAddress>> {
        let addresses = &self.addresses;
        let saved = self
            .guard
            .call("address.list", |token| async move {
                addresses.list(&token).await
            })
            .await?;

        {
            let mut state = self.state.write().await;
            let blank = *state.shipping_address() == ShippingAddress::default();
            if blank && state.step() == CheckoutStep::Shipping {
                if let Some(chosen) = preselect(&saved) {
                    state.select_saved_address(chosen.id, chosen.address.clone())?;
                }
            }
        }
        *self.saved_addresses.write().await = saved.clone();
        Ok(saved)
    }

    pub async fn set_shipping_mode(&self, mode: ShippingMode) -> Result<Totals> {
        self.form_mut().await?.set_shipping_mode(mode)?;
        Ok(self.totals().await)
    }

    pub async fn set_payment_method(&self, method: PaymentMethod) -> Result<()> {
        Ok(self.form_mut().await?.set_payment_method(method)?)
    }

    pub async fn confirm_upi_payment(&self) -> Result<()> {
        Ok(self.form_mut().await?.confirm_payment()?)
    }

    /// Validates the current step and moves to the next.
    #[tracing::instrument(skip(self))]
    pub async fn advance(&self) -> Result<CheckoutStep> {
        let mut state = self.form_mut().await?;
        let from = state.step();
        let to = state.advance()?;
        tracing::info!(%from, %to, "checkout step advanced");
        Ok(to)
    }

    /// Returns to the previous step.
    #[tracing::instrument(skip(self))]
    pub async fn back(&self) -> Result<CheckoutStep> {
        let mut state = self.form_mut().await?;
        let from = state.step();
        let to = state.back()?;
        tracing::info!(%from, %to, "checkout step reverted");
        Ok(to)
    }

    /// Places the order.
    ///
    /// Sends exactly one submission per call. On success the cart is emptied
    /// and checkout enters `Submitted`; on failure checkout stays on
    /// `Payment` with the cart intact. Step changes are refused while the
    /// submission runs. Once the backend accepts the order the call
    /// succeeds; if checkout was reset meanwhile the local cleanup is
    /// skipped.
    #[tracing::instrument(skip(self))]
    pub async fn submit(&self) -> Result<PlacedOrder> {
        let _in_flight = InFlight::acquire(&self.submitting)?;
        let start = Instant::now();
        let epoch = self.resets.load(Ordering::Acquire);

        let form = self.state.read().await.clone();
        form.ready_to_submit()?;
        let lines = self.cart.snapshot_for_checkout().await?;

        let subtotal = lines.iter().map(|line| line.line_total()).sum();
        let dropped_coupon = self.coupons.revalidate(subtotal).await;
        if let Some(dropped) = &dropped_coupon {
            tracing::info!(code = %dropped.code, "coupon dropped before submission");
        }
        let applied = self.coupons.applied().await;
        let totals = compute_totals(
            &lines,
            applied.as_ref().map(|applied| applied.coupon()),
            form.shipping_mode(),
            &self.rates,
        );
        let submission = OrderSubmission::new(
            &lines,
            form.shipping_address().clone(),
            form.shipping_mode(),
            applied.as_ref().map(|applied| applied.code().to_string()),
            totals.shipping_cost,
        )?;

        let orders = &self.orders;
        let submission_ref = &submission;
        let result = self
            .guard
            .call("order.create", |token| async move {
                orders.create(&token, submission_ref).await
            })
            .await;
        metrics::histogram!("checkout_submit_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        let confirmation = match result {
            Ok(confirmation) => confirmation,
            Err(e) => {
                metrics::counter!("checkout_submissions_total", "outcome" => "failure")
                    .increment(1);
                tracing::warn!(
                    submission_id = %submission.submission_id(),
                    error = %e,
                    "order submission failed"
                );
                return Err(e);
            }
        };
        metrics::counter!("checkout_submissions_total", "outcome" => "success").increment(1);

        let placed = PlacedOrder {
            confirmation,
            totals,
            dropped_coupon,
        };
        let confirmation = &placed.confirmation;
        if self.resets.load(Ordering::Acquire) != epoch {
            tracing::info!(
                order_id = %confirmation.order_id,
                "order placed after checkout was reset"
            );
            return Ok(placed);
        }

        self.cart.clear_after_order().await;
        self.coupons.remove().await;
        if form.save_address() {
            self.save_address(form.shipping_address()).await;
        }

        if let Err(e) = self.state.write().await.mark_submitted() {
            tracing::warn!(
                order_id = %confirmation.order_id,
                error = %e,
                "order placed but checkout state moved on"
            );
        }
        if self.torn_down.load(Ordering::Acquire) {
            tracing::info!(
                order_id = %confirmation.order_id,
                "order placed after checkout was closed"
            );
        } else {
            tracing::info!(
                order_id = %confirmation.order_id,
                total = %placed.totals.total,
                "order placed"
            );
        }
        Ok(placed)
    }

    /// Saves a newly entered address. The order exists already, so a
    /// failure is only logged.
    async fn save_address(&self, address: &ShippingAddress) {
        let addresses = &self.addresses;
        let result = self
            .guard
            .call("address.create", |token| async move {
                addresses.create(&token, address).await
            })
            .await;
        match result {
            Ok(saved) => self.saved_addresses.write().await.push(saved),
            Err(e) => tracing::warn!(error = %e, "failed to save shipping address"),
        }
    }

    /// Marks the checkout view as closed. An in-flight submission still
    /// completes.
    pub fn teardown(&self) {
        self.torn_down.store(true, Ordering::Release);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Starts over with an empty form. A submission still in flight keeps
    /// its order but leaves the new form alone.
    pub async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::AcqRel);
        *self.state.write().await = CheckoutState::new();
        self.saved_addresses.write().await.clear();
        self.torn_down.store(false, Ordering::Release);
    }
}
