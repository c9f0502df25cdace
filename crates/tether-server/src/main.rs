//! # Tether server
//!
//! Standalone hub daemon: hosts configured models over the WebSocket
//! transport and mirrors their collections to every connected leaf.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! tether
//!
//! # Run with a config file in the search path (tether.toml)
//! tether
//!
//! # Run with environment variables
//! TETHER_PORT=4300 TETHER_HOST=0.0.0.0 tether
//! ```

mod config;
mod hosting;
mod metrics;

use anyhow::Result;
use std::sync::Arc;
use tether_transport::{Hub, WebSocketHub};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Tether hub on {}:{}", config.host, config.port);

    // Initialize metrics
    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    // Bind the transport and host the configured models
    let hub = Arc::new(WebSocketHub::bind(config.bind_addr()?).await?);

    if config.models.is_empty() {
        tracing::warn!("No models configured; the hub will accept peers but route nothing");
    }

    let mut hosted = Vec::with_capacity(config.models.len());
    for name in &config.models {
        let model = hosting::host_model(name, hub.clone() as Arc<dyn Hub>, config.echo.policy())?;
        hosted.push(model);
    }
    metrics::set_hosted_models(hosted.len());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}
