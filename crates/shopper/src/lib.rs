//! A scripted shopping session against in-memory backends.
//!
//! Used by the `shopper` binary to exercise the whole storefront: a guest
//! fills a cart, signs in, applies a coupon and checks out.

use std::sync::Arc;

use common::{ItemId, UserId, VariantId};
use domain::{
    Coupon, Money, OrderConfirmation, PaymentMethod, ProductSnapshot, ShippingAddress, Totals,
    UserProfile,
};
use local_store::LocalStore;
use storefront::services::{
    InMemoryAddressService, InMemoryAuthService, InMemoryCartService, InMemoryCouponService,
    InMemoryNotificationService, InMemoryOrderService,
};
use storefront::{Storefront, StorefrontConfig, StorefrontServices};

pub type DemoStorefront = Storefront<
    InMemoryCartService,
    InMemoryCouponService,
    InMemoryOrderService,
    InMemoryAddressService,
    InMemoryNotificationService,
>;

pub const DEMO_USER: &str = "demo";
pub const DEMO_PASSWORD: &str = "demo";

/// In-memory backends seeded with a demo account, coupons and a saved
/// address.
#[derive(Clone, Default)]
pub struct Backend {
    pub auth: InMemoryAuthService,
    pub cart: InMemoryCartService,
    pub coupons: InMemoryCouponService,
    pub orders: InMemoryOrderService,
    pub addresses: InMemoryAddressService,
    pub notifications: InMemoryNotificationService,
}

impl Backend {
    pub fn seeded() -> Self {
        let backend = Self::default();

        let mut profile = UserProfile::new(UserId::new(1), DEMO_USER);
        profile.email = Some("demo@example.com".to_string());
        backend.auth.add_account(DEMO_USER, DEMO_PASSWORD, profile);

        backend.coupons.add_coupon(
            Coupon::percentage("WELCOME10", 10)
                .with_min_order(Money::from_major(10))
                .with_description("10% off orders over 10.00"),
        );
        backend.coupons.add_coupon(
            Coupon::fixed("FLAT5", Money::from_major(5)).with_min_order(Money::from_major(50)),
        );

        backend.addresses.seed(ShippingAddress {
            full_name: "Demo Shopper".to_string(),
            phone: "98765 43210".to_string(),
            address_line1: "221 Residency Road".to_string(),
            address_line2: None,
            city: "Bengaluru".to_string(),
            state: "KA".to_string(),
            postal_code: "560025".to_string(),
            country: "India".to_string(),
            is_default: true,
        });
        backend.notifications.push("Welcome back! Your saved address is ready.");
        backend
    }

    pub fn storefront(&self, config: StorefrontConfig, local: Arc<dyn LocalStore>) -> DemoStorefront {
        Storefront::new(
            config,
            StorefrontServices {
                auth: Arc::new(self.auth.clone()),
                cart: self.cart.clone(),
                coupons: self.coupons.clone(),
                orders: self.orders.clone(),
                addresses: self.addresses.clone(),
                notifications: self.notifications.clone(),
            },
            local,
        )
    }
}

/// Outcome of [`run_demo`].
#[derive(Debug, Clone)]
pub struct DemoReport {
    pub totals: Totals,
    pub order: OrderConfirmation,
    pub unread_notifications: usize,
}

pub fn catalog() -> Vec<ProductSnapshot> {
    vec![
        ProductSnapshot::item(ItemId::new(101), "Linen shirt", Money::from_major(8))
            .with_variant(VariantId::new(1), Some(Money::from_major(10)))
            .with_stock(5),
        ProductSnapshot::item(ItemId::new(202), "Enamel mug", Money::from_cents(350)),
    ]
}

/// Runs one guest-to-order session.
pub async fn run_demo(storefront: &DemoStorefront) -> storefront::Result<DemoReport> {
    if storefront.start().await? {
        tracing::info!("resumed existing session");
    }

    let catalog = catalog();
    storefront.add_to_cart(&catalog[0], 2).await?;
    storefront.add_to_cart(&catalog[1], 1).await?;
    tracing::info!(
        lines = storefront.cart().line_count().await,
        subtotal = %storefront.cart().subtotal().await,
        "guest cart filled"
    );

    if !storefront.session().is_authenticated().await {
        storefront.sign_in(DEMO_USER, DEMO_PASSWORD).await?;
    }
    let unread_notifications = storefront.notifications().refresh().await?;

    let decision = storefront.apply_coupon("welcome10").await?;
    tracing::info!(?decision, "coupon decision");

    let checkout = storefront.checkout();
    checkout.load_saved_addresses().await?;
    checkout.advance().await?;
    checkout.advance().await?;
    checkout.set_payment_method(PaymentMethod::Upi).await?;
    checkout.confirm_upi_payment().await?;

    let placed = checkout.submit().await?;
    if let Some(dropped) = &placed.dropped_coupon {
        tracing::warn!(%dropped, "order placed without its coupon");
    }
    let order = placed.confirmation;
    tracing::info!(
        order_id = %order.order_id,
        confirmation = %order.confirmation,
        total = %placed.totals.total,
        "demo order placed"
    );

    Ok(DemoReport {
        totals: placed.totals,
        order,
        unread_notifications,
    })
}
