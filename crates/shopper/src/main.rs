//! Shopper entry point: runs the scripted storefront session.
//!
//! Flags:
//! - `--metrics`: print the Prometheus rendering of the recorded metrics
//! - `--watch`: keep the session (and its background refresh) alive until
//!   SIGINT or SIGTERM

use std::sync::Arc;

use local_store::{FileLocalStore, InMemoryLocalStore, LocalStore};
use shopper::Backend;
use storefront::StorefrontConfig;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = StorefrontConfig::from_env();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let print_metrics = args.iter().any(|arg| arg == "--metrics");
    let watch = args.iter().any(|arg| arg == "--watch");

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open local state
    let local: Arc<dyn LocalStore> = match &config.state_path {
        Some(path) => Arc::new(
            FileLocalStore::open(path)
                .await
                .expect("failed to open local state file"),
        ),
        None => Arc::new(InMemoryLocalStore::new()),
    };

    // 4. Run the session
    let backend = Backend::seeded();
    let storefront = backend.storefront(config, local);
    match shopper::run_demo(&storefront).await {
        Ok(report) => {
            println!(
                "order {} ({}) subtotal {} discount {} shipping {} total {}",
                report.order.order_id,
                report.order.confirmation,
                report.totals.subtotal,
                report.totals.discount,
                report.totals.shipping_cost,
                report.totals.total,
            );
            println!("unread notifications: {}", report.unread_notifications);
        }
        Err(e) => {
            tracing::error!(error = %e, retryable = e.is_retryable(), "shopping session failed");
        }
    }

    if watch {
        tracing::info!(
            period = ?storefront.config().poll_interval,
            "watching for notifications"
        );
        shutdown_signal().await;
    }

    if print_metrics {
        print!("{}", metrics_handle.render());
    }
}
