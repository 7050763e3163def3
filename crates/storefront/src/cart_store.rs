//! Cart store: the shopper's cart in guest or synced mode.

use std::sync::Arc;

use common::LineKey;
use domain::{Cart, CartError, CartLine, CartMode, Money, ProductSnapshot, merge_carts};
use local_store::{LocalStore, LocalStoreExt, keys};
use tokio::sync::{Mutex, RwLock};

use crate::error::{Result, StorefrontError};
use crate::guard::AuthGuard;
use crate::services::CartService;

#[derive(Debug, Default)]
struct CartState {
    cart: Cart,
    /// Increases on every local change; a fetch started at an older
    /// revision is dropped.
    revision: u64,
    /// Session generation whose login merge has completed.
    merged_generation: Option<u64>,
}

/// Holds the authoritative cart.
///
/// In guest mode the cart lives only locally and is persisted under the
/// `cart` key after every change. In synced mode every change goes to the
/// cart service first and the returned cart replaces local state wholesale.
/// Mutations are serialized; background fetches are not, and lose against
/// any mutation that completed while they were in flight.
pub struct CartStore<C: CartService> {
    service: C,
    guard: AuthGuard,
    local: Arc<dyn LocalStore>,
    state: RwLock<CartState>,
    mutation: Mutex<()>,
}

impl<C: CartService> CartStore<C> {
    /// Creates a store holding an empty guest cart.
    pub fn new(service: C, guard: AuthGuard, local: Arc<dyn LocalStore>) -> Self {
        Self {
            service,
            guard,
            local,
            state: RwLock::new(CartState::default()),
            mutation: Mutex::new(()),
        }
    }

    /// Loads the guest cart persisted by an earlier run, if any.
    #[tracing::instrument(skip(self))]
    pub async fn restore_guest(&self) -> Result<usize> {
        let _serialized = self.mutation.lock().await;
        let stored: Option<Cart> = self.local.get_json(keys::CART).await?;
        let mut state = self.state.write().await;
        if state.cart.mode() == CartMode::Synced {
            return Ok(0);
        }
        let cart = stored.unwrap_or_default().with_mode(CartMode::Guest);
        let count = cart.len();
        state.cart = cart;
        state.revision += 1;
        tracing::debug!(lines = count, "guest cart restored");
        Ok(count)
    }

    /// Snapshot of the current cart.
    pub async fn cart(&self) -> Cart {
        self.state.read().await.cart.clone()
    }

    pub async fn mode(&self) -> CartMode {
        self.state.read().await.cart.mode()
    }

    pub async fn subtotal(&self) -> Money {
        self.state.read().await.cart.subtotal()
    }

    pub async fn line(&self, key: &LineKey) -> Option<CartLine> {
        self.state.read().await.cart.get(key).cloned()
    }

    pub async fn line_count(&self) -> usize {
        self.state.read().await.cart.len()
    }

    /// Upserts the line for `product` holding `quantity` units, clamped
    /// into `[1, stock]`.
    #[tracing::instrument(skip(self, product), fields(line = %product.line_key()))]
    pub async fn add_or_update(
        &self,
        product: &ProductSnapshot,
        quantity: u32,
    ) -> Result<CartLine> {
        let line = CartLine::from_product(product, quantity)?;
        let _serialized = self.mutation.lock().await;
        self.detach_ended_session().await;
        self.apply_line(line).await
    }

    /// Adds `delta` units of `product` to whatever the cart already holds.
    #[tracing::instrument(skip(self, product), fields(line = %product.line_key()))]
    pub async fn add_item(&self, product: &ProductSnapshot, delta: u32) -> Result<CartLine> {
        let _serialized = self.mutation.lock().await;
        self.detach_ended_session().await;
        let existing = self
            .line(&product.line_key())
            .await
            .map_or(0, |line| line.quantity());
        let line = CartLine::from_product(product, existing.saturating_add(delta))?;
        self.apply_line(line).await
    }

    /// Sets a line's quantity. Zero removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(&self, key: LineKey, quantity: u32) -> Result<Option<CartLine>> {
        let _serialized = self.mutation.lock().await;
        self.detach_ended_session().await;
        let existing = self
            .line(&key)
            .await
            .ok_or(StorefrontError::Cart(CartError::LineNotFound(key)))?;
        if quantity == 0 {
            self.remove_line(key).await?;
            return Ok(None);
        }
        self.apply_line(existing.with_quantity(quantity)).await.map(Some)
    }

    /// Removes a line. Removing an absent line does nothing.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, key: LineKey) -> Result<()> {
        let _serialized = self.mutation.lock().await;
        self.detach_ended_session().await;
        if self.line(&key).await.is_none() {
            return Ok(());
        }
        self.remove_line(key).await
    }

    /// Empties the cart, and the server cart too when synced.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let _serialized = self.mutation.lock().await;
        self.detach_ended_session().await;
        match self.mode().await {
            CartMode::Guest => {
                self.commit_guest(Cart::new(CartMode::Guest)).await?;
            }
            CartMode::Synced => {
                let service = &self.service;
                self.guard
                    .call("cart.clear", |token| async move {
                        service.clear_cart(&token).await
                    })
                    .await?;
                self.commit_synced(Cart::new(CartMode::Synced)).await;
            }
        }
        tracing::info!("cart cleared");
        Ok(())
    }

    /// Replaces a synced cart with the server's. Does nothing for a guest.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self) -> Result<()> {
        let revision = {
            let state = self.state.read().await;
            if state.cart.mode() == CartMode::Guest {
                return Ok(());
            }
            state.revision
        };

        let service = &self.service;
        let server = self
            .guard
            .call("cart.get", |token| async move { service.get_cart(&token).await })
            .await?;

        let mut state = self.state.write().await;
        if state.revision != revision || state.cart.mode() != CartMode::Synced {
            tracing::debug!(
                started_at = revision,
                current = state.revision,
                "discarding stale cart fetch"
            );
            return Ok(());
        }
        state.cart = server.with_mode(CartMode::Synced);
        state.revision += 1;
        Ok(())
    }

    /// Merges the guest cart into the account cart of the session that just
    /// started.
    ///
    /// Runs at most once per session generation; later calls in the same
    /// session are a plain fetch. If writing the merged cart fails, the guest
    /// cart is left untouched so the merge can be retried.
    #[tracing::instrument(skip(self))]
    pub async fn merge_on_login(&self) -> Result<Cart> {
        let _serialized = self.mutation.lock().await;
        let status = self.guard.session().status();
        if !status.authenticated {
            return Err(StorefrontError::NotAuthenticated);
        }

        let (guest, already_merged) = {
            let state = self.state.read().await;
            let guest = match state.cart.mode() {
                CartMode::Guest => state.cart.clone(),
                CartMode::Synced => Cart::new(CartMode::Guest),
            };
            (guest, state.merged_generation == Some(status.generation))
        };

        let service = &self.service;
        let server = self
            .guard
            .call("cart.get", |token| async move { service.get_cart(&token).await })
            .await?;

        let merged = if guest.is_empty() || already_merged {
            server.with_mode(CartMode::Synced)
        } else {
            let merged = merge_carts(&server, &guest);
            let merged = &merged;
            match self
                .guard
                .call("cart.replace", |token| async move {
                    service.replace_cart(&token, merged).await
                })
                .await
            {
                Ok(stored) => stored.with_mode(CartMode::Synced),
                Err(StorefrontError::Service(e)) => {
                    metrics::counter!("cart_merges_total", "outcome" => "failure").increment(1);
                    tracing::warn!(error = %e, "cart merge write failed, keeping guest cart");
                    return Err(StorefrontError::MergeFailed(e));
                }
                Err(e) => {
                    metrics::counter!("cart_merges_total", "outcome" => "failure").increment(1);
                    return Err(e);
                }
            }
        };

        if self.guard.session().status().generation != status.generation {
            tracing::debug!("session changed during merge, discarding result");
            return Err(StorefrontError::NotAuthenticated);
        }

        {
            let mut state = self.state.write().await;
            state.cart = merged.clone();
            state.revision += 1;
            state.merged_generation = Some(status.generation);
        }
        if let Err(e) = self.local.remove(keys::CART).await {
            tracing::warn!(error = %e, "failed to drop persisted guest cart");
        }

        if !guest.is_empty() && !already_merged {
            metrics::counter!("cart_merges_total", "outcome" => "success").increment(1);
            tracing::info!(
                guest_lines = guest.len(),
                merged_lines = merged.len(),
                "guest cart merged"
            );
        }
        Ok(merged)
    }

    /// Lines to order.
    ///
    /// Fails with [`StorefrontError::MergePending`] while the guest cart of
    /// the current session has not been merged.
    pub async fn snapshot_for_checkout(&self) -> Result<Vec<CartLine>> {
        let status = self.guard.session().status();
        let state = self.state.read().await;
        if status.authenticated && state.merged_generation != Some(status.generation) {
            return Err(StorefrontError::MergePending);
        }
        if state.cart.is_empty() {
            return Err(StorefrontError::EmptyCart);
        }
        Ok(state.cart.sorted_lines())
    }

    /// Empties the cart after an order was placed.
    ///
    /// The order already exists, so a failure to clear the server cart is
    /// logged and the local cart is emptied regardless.
    pub async fn clear_after_order(&self) {
        if let Err(e) = self.clear().await {
            tracing::warn!(error = %e, "failed to clear cart after order");
            let _serialized = self.mutation.lock().await;
            let mut state = self.state.write().await;
            state.cart.clear();
            state.revision += 1;
        }
    }

    /// Drops the account cart on logout, leaving an empty guest cart.
    pub async fn reset(&self) {
        let _serialized = self.mutation.lock().await;
        let mut state = self.state.write().await;
        state.cart = Cart::new(CartMode::Guest);
        state.revision += 1;
        state.merged_generation = None;
    }

    async fn apply_line(&self, line: CartLine) -> Result<CartLine> {
        match self.mode().await {
            CartMode::Guest => {
                let mut cart = self.cart().await;
                cart.upsert(line.clone());
                self.commit_guest(cart).await?;
                Ok(line)
            }
            CartMode::Synced => {
                let service = &self.service;
                let line_ref = &line;
                let server = self
                    .guard
                    .call("cart.add_item", |token| async move {
                        service.add_item(&token, line_ref).await
                    })
                    .await?;
                let stored = server.get(&line.key()).cloned().unwrap_or(line);
                self.commit_synced(server).await;
                Ok(stored)
            }
        }
    }

    async fn remove_line(&self, key: LineKey) -> Result<()> {
        match self.mode().await {
            CartMode::Guest => {
                let mut cart = self.cart().await;
                cart.remove(&key);
                self.commit_guest(cart).await
            }
            CartMode::Synced => {
                let service = &self.service;
                let server = self
                    .guard
                    .call("cart.remove_item", |token| async move {
                        service.remove_item(&token, key).await
                    })
                    .await?;
                self.commit_synced(server).await;
                Ok(())
            }
        }
    }

    /// Drops a synced cart whose session has ended, so the shopper carries
    /// on with an empty guest cart. Callers hold the mutation lock.
    async fn detach_ended_session(&self) {
        if self.guard.session().status().authenticated {
            return;
        }
        let mut state = self.state.write().await;
        if state.cart.mode() == CartMode::Synced {
            state.cart = Cart::new(CartMode::Guest);
            state.revision += 1;
            state.merged_generation = None;
            tracing::info!("session ended, dropping account cart");
        }
    }

    /// Persists then publishes a guest cart.
    async fn commit_guest(&self, cart: Cart) -> Result<()> {
        self.local.set_json(keys::CART, &cart).await?;
        let mut state = self.state.write().await;
        state.cart = cart;
        state.revision += 1;
        Ok(())
    }

    async fn commit_synced(&self, cart: Cart) {
        let mut state = self.state.write().await;
        state.cart = cart.with_mode(CartMode::Synced);
        state.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{InMemoryAuthService, InMemoryCartService};
    use crate::session::SessionStore;
    use common::{ItemId, UserId, VariantId};
    use domain::UserProfile;
    use local_store::InMemoryLocalStore;
    use std::time::Duration;

    struct Fixture {
        store: CartStore<InMemoryCartService>,
        service: InMemoryCartService,
        session: Arc<SessionStore>,
        local: InMemoryLocalStore,
    }

    fn fixture() -> Fixture {
        let auth = InMemoryAuthService::new();
        auth.add_account("asha", "secret", UserProfile::new(UserId::new(7), "asha"));
        let local = InMemoryLocalStore::new();
        let session = Arc::new(SessionStore::new(Arc::new(auth), Arc::new(local.clone())));
        let service = InMemoryCartService::new();
        let store = CartStore::new(
            service.clone(),
            AuthGuard::new(session.clone()),
            Arc::new(local.clone()),
        );
        Fixture {
            store,
            service,
            session,
            local,
        }
    }

    fn product(item: u64, price_cents: i64) -> ProductSnapshot {
        ProductSnapshot::item(
            ItemId::new(item),
            format!("Item {item}"),
            Money::from_cents(price_cents),
        )
    }

    #[tokio::test]
    async fn test_guest_mutations_are_persisted() {
        let f = fixture();
        f.store.add_or_update(&product(1, 500), 2).await.unwrap();

        let stored: Option<Cart> = f.local.get_json(keys::CART).await.unwrap();
        assert_eq!(stored.unwrap().total_quantity(), 2);
        assert_eq!(f.store.mode().await, CartMode::Guest);
    }

    #[tokio::test]
    async fn test_add_item_increments_and_clamps() {
        let f = fixture();
        let limited = product(1, 500).with_stock(3);
        f.store.add_item(&limited, 2).await.unwrap();
        let line = f.store.add_item(&limited, 2).await.unwrap();
        assert_eq!(line.quantity(), 3);
    }

    #[tokio::test]
    async fn test_set_quantity_zero_removes_line() {
        let f = fixture();
        let line = f.store.add_or_update(&product(1, 500), 2).await.unwrap();
        assert!(f.store.set_quantity(line.key(), 0).await.unwrap().is_none());
        assert_eq!(f.store.line_count().await, 0);
        assert!(matches!(
            f.store.set_quantity(line.key(), 1).await,
            Err(StorefrontError::Cart(CartError::LineNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_remove_absent_line_is_noop() {
        let f = fixture();
        let key = LineKey::new(ItemId::new(9), Some(VariantId::new(1)));
        f.store.remove(key).await.unwrap();
        assert_eq!(f.store.line_count().await, 0);
    }

    #[tokio::test]
    async fn test_restore_guest_reads_persisted_cart() {
        let f = fixture();
        f.store.add_or_update(&product(1, 500), 2).await.unwrap();

        let fresh = CartStore::new(
            f.service.clone(),
            AuthGuard::new(f.session.clone()),
            Arc::new(f.local.clone()),
        );
        assert_eq!(fresh.restore_guest().await.unwrap(), 1);
        assert_eq!(fresh.subtotal().await.cents(), 1000);
    }

    #[tokio::test]
    async fn test_merge_sums_and_writes_back() {
        let f = fixture();
        f.service.seed([CartLine::from_product(&product(1, 500), 1).unwrap()]);
        f.store.add_or_update(&product(1, 500), 2).await.unwrap();
        f.store.add_or_update(&product(2, 300), 1).await.unwrap();
        f.session.sign_in("asha", "secret").await.unwrap();

        let merged = f.store.merge_on_login().await.unwrap();

        assert_eq!(merged.mode(), CartMode::Synced);
        assert_eq!(merged.total_quantity(), 4);
        assert_eq!(f.service.stored(), merged);
        assert!(!f.local.contains(keys::CART).await);
    }

    #[tokio::test]
    async fn test_second_merge_is_a_pure_fetch() {
        let f = fixture();
        f.store.add_or_update(&product(1, 500), 2).await.unwrap();
        f.session.sign_in("asha", "secret").await.unwrap();

        let first = f.store.merge_on_login().await.unwrap();
        let second = f.store.merge_on_login().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.service.replace_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_merge_keeps_guest_cart() {
        let f = fixture();
        f.store.add_or_update(&product(1, 500), 2).await.unwrap();
        f.session.sign_in("asha", "secret").await.unwrap();
        f.service.set_fail_on_replace(true);

        let result = f.store.merge_on_login().await;
        assert!(matches!(result, Err(StorefrontError::MergeFailed(_))));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(f.store.mode().await, CartMode::Guest);
        assert_eq!(f.store.cart().await.total_quantity(), 2);
        assert!(matches!(
            f.store.snapshot_for_checkout().await,
            Err(StorefrontError::MergePending)
        ));

        f.service.set_fail_on_replace(false);
        let merged = f.store.merge_on_login().await.unwrap();
        assert_eq!(merged.total_quantity(), 2);
        assert_eq!(f.store.snapshot_for_checkout().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_synced_mutations_go_through_server() {
        let f = fixture();
        f.session.sign_in("asha", "secret").await.unwrap();
        f.store.merge_on_login().await.unwrap();

        let line = f.store.add_or_update(&product(3, 250), 4).await.unwrap();
        assert_eq!(f.service.stored().total_quantity(), 4);

        f.store.set_quantity(line.key(), 1).await.unwrap();
        assert_eq!(f.service.stored().total_quantity(), 1);

        f.store.clear().await.unwrap();
        assert!(f.service.stored().is_empty());
        assert_eq!(f.store.line_count().await, 0);
    }

    #[tokio::test]
    async fn test_stale_fetch_does_not_clobber_newer_state() {
        let f = fixture();
        f.session.sign_in("asha", "secret").await.unwrap();
        f.store.merge_on_login().await.unwrap();
        f.service.set_get_delay(Duration::from_millis(50));

        let (fetched, added) = tokio::join!(f.store.fetch(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            f.store.add_or_update(&product(4, 100), 2).await
        });

        fetched.unwrap();
        added.unwrap();
        assert_eq!(f.store.cart().await.total_quantity(), 2);
    }

    #[tokio::test]
    async fn test_fetch_in_guest_mode_is_noop() {
        let f = fixture();
        f.store.fetch().await.unwrap();
        assert_eq!(f.service.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_reset_returns_to_empty_guest() {
        let f = fixture();
        f.session.sign_in("asha", "secret").await.unwrap();
        f.store.add_or_update(&product(1, 500), 1).await.unwrap();
        f.store.merge_on_login().await.unwrap();

        f.session.logout().await;
        f.store.reset().await;
        assert_eq!(f.store.mode().await, CartMode::Guest);
        assert!(matches!(
            f.store.snapshot_for_checkout().await,
            Err(StorefrontError::EmptyCart)
        ));
    }

    #[tokio::test]
    async fn test_ended_session_falls_back_to_guest_cart() {
        let f = fixture();
        f.session.sign_in("asha", "secret").await.unwrap();
        f.store.merge_on_login().await.unwrap();
        f.store.add_or_update(&product(1, 500), 2).await.unwrap();

        f.session.logout().await;
        let line = f.store.add_item(&product(2, 300), 1).await.unwrap();

        assert_eq!(line.quantity(), 1);
        assert_eq!(f.store.mode().await, CartMode::Guest);
        assert_eq!(f.store.line_count().await, 1);
        assert_eq!(f.service.stored().total_quantity(), 2);
        let stored: Option<Cart> = f.local.get_json(keys::CART).await.unwrap();
        assert_eq!(stored.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_guest_discards_invalid_persisted_cart() {
        let f = fixture();
        let corrupt = serde_json::json!({
            "mode": "guest",
            "lines": {"1": {"key": "1", "title": "x", "quantity": 0, "unit_price": {"cents": 100}}}
        });
        f.local.set(keys::CART, corrupt).await.unwrap();

        assert_eq!(f.store.restore_guest().await.unwrap(), 0);
        assert!(f.store.cart().await.is_empty());
    }
}
