//! # Concierge
//!
//! Presence tracking and server-timestamp relay for multiplayer clients on
//! a shared pub/sub bus.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! concierge
//!
//! # Run with custom config
//! concierge --config /path/to/concierge.toml
//!
//! # Run with environment variables
//! PORT=8080 CONCIERGE_BUS_URL=nats://broker:4222 concierge
//! CONCIERGE__RELAY__RECENCY_WINDOW_MS=30000 concierge
//! ```

mod browser;
mod config;
mod handlers;
mod metrics;
mod relay;

use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concierge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = config_arg(std::env::args().skip(1))?;
    let config = config::Config::load(config_path.as_deref())?;

    tracing::info!(
        "Starting concierge {} on {}:{}",
        config.bus.client_id,
        config.http.host,
        config.http.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}

/// Extract the `--config <path>` argument.
fn config_arg(mut args: impl Iterator<Item = String>) -> Result<Option<PathBuf>> {
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(value) => path = Some(PathBuf::from(value)),
                None => bail!("--config requires a path"),
            },
            other => match other.strip_prefix("--config=") {
                Some(value) => path = Some(PathBuf::from(value)),
                None => bail!("Unknown argument: {}", other),
            },
        }
    }
    Ok(path)
}
