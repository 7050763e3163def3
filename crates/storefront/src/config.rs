//! Storefront configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use domain::{Money, ShippingRates};
use rust_decimal::Decimal;

/// Client configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `STOREFRONT_DELIVERY_FEE`: delivery fee in currency units (default: `9.99`)
/// - `STOREFRONT_PICKUP_FEE`: pickup fee in currency units (default: `0`)
/// - `STOREFRONT_POLL_INTERVAL_SECS`: background refresh period (default: `30`)
/// - `STOREFRONT_STATE_PATH`: JSON file backing local state (default: in memory)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
///
/// Malformed or negative values fall back to the defaults.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    pub shipping_rates: ShippingRates,
    pub poll_interval: Duration,
    pub state_path: Option<PathBuf>,
    pub log_level: String,
}

impl StorefrontConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            shipping_rates: ShippingRates::new(
                env_fee("STOREFRONT_DELIVERY_FEE").unwrap_or(defaults.shipping_rates.delivery),
                env_fee("STOREFRONT_PICKUP_FEE").unwrap_or(defaults.shipping_rates.pickup),
            ),
            poll_interval: std::env::var("STOREFRONT_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|secs| secs.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            state_path: std::env::var("STOREFRONT_STATE_PATH")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            shipping_rates: ShippingRates::default(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            state_path: None,
            log_level: "info".to_string(),
        }
    }
}

fn env_fee(name: &str) -> Option<Money> {
    let raw = std::env::var(name).ok()?;
    let amount = Decimal::from_str(raw.trim()).ok()?;
    if amount.is_sign_negative() {
        return None;
    }
    Some(Money::from_decimal(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 4] = [
        "STOREFRONT_DELIVERY_FEE",
        "STOREFRONT_PICKUP_FEE",
        "STOREFRONT_POLL_INTERVAL_SECS",
        "STOREFRONT_STATE_PATH",
    ];

    fn clear_env() {
        for var in VARS {
            // SAFETY: env-mutating tests are serialized.
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn test_default_values() {
        let config = StorefrontConfig::default();
        assert_eq!(config.shipping_rates.delivery.cents(), 999);
        assert_eq!(config.shipping_rates.pickup, Money::zero());
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert!(config.state_path.is_none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_values() {
        clear_env();
        // SAFETY: env-mutating tests are serialized.
        unsafe {
            std::env::set_var("STOREFRONT_DELIVERY_FEE", "0.99");
            std::env::set_var("STOREFRONT_PICKUP_FEE", "1.5");
            std::env::set_var("STOREFRONT_POLL_INTERVAL_SECS", "5");
            std::env::set_var("STOREFRONT_STATE_PATH", "/tmp/shopper.json");
        }

        let config = StorefrontConfig::from_env();
        assert_eq!(config.shipping_rates.delivery.cents(), 99);
        assert_eq!(config.shipping_rates.pickup.cents(), 150);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.state_path, Some(PathBuf::from("/tmp/shopper.json")));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_falls_back_on_bad_values() {
        clear_env();
        // SAFETY: env-mutating tests are serialized.
        unsafe {
            std::env::set_var("STOREFRONT_DELIVERY_FEE", "free");
            std::env::set_var("STOREFRONT_PICKUP_FEE", "-2");
            std::env::set_var("STOREFRONT_POLL_INTERVAL_SECS", "0");
        }

        let config = StorefrontConfig::from_env();
        assert_eq!(config.shipping_rates, ShippingRates::default());
        assert_eq!(config.poll_interval, StorefrontConfig::DEFAULT_POLL_INTERVAL);
        clear_env();
    }
}
