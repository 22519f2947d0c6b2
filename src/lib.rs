//! HLS Relay
//!
//! A small relay that sits between browser players and an HLS origin that
//! does not serve CORS headers or is unreliable about content types.
//!
//! # Overview
//!
//! Requests under the streaming route (`/stream` by default) are mapped onto
//! the origin:
//!
//! - **Manifests** (`.m3u8`) are fetched, checked for the `#EXTM3U` marker
//!   and cached in memory for a short TTL, so a burst of players polling
//!   the same live playlist costs the origin one request per TTL.
//! - **Segments** (`.ts`) are piped through without buffering, with
//!   backpressure from the client connection.
//! - Anything else is rejected before the origin is contacted.
//!
//! Failures between the relay and the origin always become `502`, which
//! players treat as "retry".
//!
//! The [`player`] module holds the client-side half: a playback state
//! machine that keeps a live stream running through network errors, media
//! errors and stalls.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hls_relay::{RelayConfig, RelayServer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::from_env()?;
//! let server = RelayServer::new(config)?;
//! let listener = server.bind().await?;
//! server.serve(listener, hls_relay::server::shutdown_signal()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Configuration comes from an optional YAML file named by `RELAY_CONFIG`,
//! overridden by environment variables:
//!
//! ```yaml
//! port: 3000
//! origin_url: "http://origin.example:8080"
//! environment: production      # manifest TTL 2s (development: 5s)
//! base_route: "/stream"
//! stream_path: "/CH2/tracks-v1a1/mono.m3u8"
//! manifest_timeout_ms: 5000
//! segment_timeout_ms: 10000
//! ```

pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod health_check;
pub mod manifest_cache;
pub mod metrics;
pub mod models;
pub mod player;
pub mod server;
pub mod upstream;
pub mod validation;

pub use config::{Environment, RelayConfig};
pub use dispatcher::{RelayBody, RelayDispatcher};
pub use error::{RelayError, Result};
pub use health_check::HealthReport;
pub use manifest_cache::{CacheStats, ManifestCache};
pub use metrics::RelayMetrics;
pub use models::{ResourceKind, UpstreamRequest};
pub use server::{RelayServer, RelayState};
pub use upstream::{UpstreamBody, UpstreamClient, UpstreamResponse};
