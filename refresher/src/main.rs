//! refrate Refresher Binary
//!
//! Keeps the configured provider's feed cache up to date.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refrate_fx::{Converter, FileCache};
use refrate_refresher::{Refresher, RefresherConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = RefresherConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting refrate refresher");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let provider = config.converter.provider;
    let cache = Arc::new(FileCache::open(&config.cache_dir, provider.id())?);
    let converter = Arc::new(Converter::from_config(&config.converter, cache)?);

    info!(
        provider = %provider,
        locator = %converter.locator(),
        cache_dir = %config.cache_dir.display(),
        refresh_interval = ?config.refresh_interval,
        "Converter ready"
    );

    let refresher = Arc::new(Refresher::new(
        converter,
        config.refresh_interval,
        config.retry_interval,
    ));

    // Set up graceful shutdown
    let refresher_clone = refresher.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Shutdown signal received");
        refresher_clone.stop();
    });

    refresher.run().await;

    info!("Refresher shutdown complete");
    Ok(())
}
