//! HLS Relay server
//!
//! Loads configuration from the environment (and the optional YAML file
//! named by `RELAY_CONFIG`), sets up logging, and serves until Ctrl+C or
//! SIGTERM.
//!
//! # Usage
//! ```bash
//! STREAM_URL=http://origin.example:8080 PORT=3000 hls-relay
//!
//! RELAY_CONFIG=/etc/hls-relay.yaml RUST_LOG=hls_relay=debug hls-relay
//! ```

use anyhow::Context;
use hls_relay::server::shutdown_signal;
use hls_relay::{RelayConfig, RelayServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_line_number(true)
        .init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Server stopped");
}

async fn run() -> anyhow::Result<()> {
    info!("Starting HLS Relay");

    let config = RelayConfig::from_env().context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  - Listen address: {}", config.listen_address());
    info!("  - Environment: {}", config.environment.as_str());
    info!("  - Origin: {}", config.origin_base());
    info!("  - Route: {}", config.route_prefix());
    info!("  - Manifest TTL: {:?}", config.manifest_ttl());
    info!(
        "  - Timeouts: manifest {:?}, segment {:?}",
        config.manifest_timeout(),
        config.segment_timeout()
    );

    let server = RelayServer::new(config).context("Failed to create relay server")?;
    let listener = server.bind().await.context("Failed to bind listener")?;

    server
        .serve(listener, shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
