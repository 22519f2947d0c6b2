//! Configuration management for the HLS relay
//!
//! Configuration is read from an optional YAML file and then overlaid with
//! environment variables, so a deployment can ship a file and still override
//! the origin or port per host.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Upper bound for the manifest fetch timeout
pub const MAX_MANIFEST_TIMEOUT_MS: u64 = 5_000;

/// Upper bound for the segment fetch timeout
pub const MAX_SEGMENT_TIMEOUT_MS: u64 = 10_000;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Default manifest cache TTL for this environment
    ///
    /// Production runs under concurrent viewers against a live feed, so it
    /// tolerates less staleness.
    pub fn default_manifest_ttl(&self) -> Duration {
        match self {
            Environment::Development => Duration::from_secs(5),
            Environment::Production => Duration::from_secs(2),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(RelayError::ConfigError(format!(
                "Invalid environment '{}', must be 'development' or 'production'",
                other
            ))),
        }
    }
}

/// Configuration for the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address to listen on (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the origin serving the live feed
    #[serde(default = "default_origin_url")]
    pub origin_url: String,

    /// Deployment environment (default: development)
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Route the relay is mounted under (default: /stream)
    #[serde(default = "default_base_route")]
    pub base_route: String,

    /// Manifest path of the channel, relative to the origin
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Explicit manifest cache TTL; overrides the environment default
    #[serde(default)]
    pub manifest_ttl_ms: Option<u64>,

    /// Manifest fetch timeout in milliseconds (default: 5000, max 5000)
    #[serde(default = "default_manifest_timeout_ms")]
    pub manifest_timeout_ms: u64,

    /// Segment fetch timeout in milliseconds (default: 10000, max 10000)
    #[serde(default = "default_segment_timeout_ms")]
    pub segment_timeout_ms: u64,

    /// Maximum number of redirects followed towards the origin (default: 5)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// User-Agent presented to the origin
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Directory holding the player page
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_origin_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_environment() -> Environment {
    Environment::Development
}

fn default_base_route() -> String {
    "/stream".to_string()
}

fn default_stream_path() -> String {
    "/CH2/tracks-v1a1/mono.m3u8".to_string()
}

fn default_manifest_timeout_ms() -> u64 {
    MAX_MANIFEST_TIMEOUT_MS
}

fn default_segment_timeout_ms() -> u64 {
    MAX_SEGMENT_TIMEOUT_MS
}

fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_static_dir() -> String {
    "static".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            host: default_host(),
            port: default_port(),
            origin_url: default_origin_url(),
            environment: default_environment(),
            base_route: default_base_route(),
            stream_path: default_stream_path(),
            manifest_ttl_ms: None,
            manifest_timeout_ms: default_manifest_timeout_ms(),
            segment_timeout_ms: default_segment_timeout_ms(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            static_dir: default_static_dir(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(RelayConfig)` if loading and validation succeed
    /// * `Err(RelayError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file without validating it
    fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RelayError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            RelayError::ConfigError(format!("Failed to parse config file: {}", e))
        })
    }

    /// Build the configuration from the process environment
    ///
    /// `RELAY_CONFIG` names an optional YAML file used as the base; `PORT`,
    /// `STREAM_URL`, `RELAY_ENV` (or `NODE_ENV`) and `STATIC_DIR` override it.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`] with an injectable variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // The file is only a base layer; validate once the overrides are in
        let mut config = match lookup("RELAY_CONFIG") {
            Some(path) => Self::parse_file(path)?,
            None => RelayConfig::default(),
        };

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|e| {
                RelayError::ConfigError(format!("Invalid PORT '{}': {}", port, e))
            })?;
        }

        if let Some(origin) = lookup("STREAM_URL") {
            self.origin_url = origin;
        }

        if let Some(env) = lookup("RELAY_ENV").or_else(|| lookup("NODE_ENV")) {
            self.environment = env.parse()?;
        }

        if let Some(dir) = lookup("STATIC_DIR") {
            self.static_dir = dir;
        }

        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - origin_url must parse with an http/https scheme and a host
    /// - port must be non-zero
    /// - base_route must start with '/' and must not be '/'
    /// - stream_path must start with '/' and end with '.m3u8'
    /// - timeouts must be > 0 and within their caps
    /// - manifest_ttl_ms, when set, must be > 0
    pub fn validate(&self) -> Result<()> {
        let origin = url::Url::parse(&self.origin_url).map_err(|e| {
            RelayError::ConfigError(format!("Invalid origin_url '{}': {}", self.origin_url, e))
        })?;

        if !matches!(origin.scheme(), "http" | "https") {
            return Err(RelayError::ConfigError(format!(
                "origin_url must use http or https, got '{}'",
                origin.scheme()
            )));
        }

        if origin.host_str().is_none() {
            return Err(RelayError::ConfigError(format!(
                "origin_url '{}' has no host",
                self.origin_url
            )));
        }

        if self.port == 0 {
            return Err(RelayError::ConfigError(
                "port must be greater than 0".to_string(),
            ));
        }

        if !self.base_route.starts_with('/') || self.base_route.trim_end_matches('/').is_empty() {
            return Err(RelayError::ConfigError(format!(
                "base_route must start with '/' and name a route, got '{}'",
                self.base_route
            )));
        }

        if !self.stream_path.starts_with('/') || !self.stream_path.ends_with(".m3u8") {
            return Err(RelayError::ConfigError(format!(
                "stream_path must be an absolute .m3u8 path, got '{}'",
                self.stream_path
            )));
        }

        if self.manifest_timeout_ms == 0 || self.manifest_timeout_ms > MAX_MANIFEST_TIMEOUT_MS {
            return Err(RelayError::ConfigError(format!(
                "manifest_timeout_ms must be between 1 and {}, got {}",
                MAX_MANIFEST_TIMEOUT_MS, self.manifest_timeout_ms
            )));
        }

        if self.segment_timeout_ms == 0 || self.segment_timeout_ms > MAX_SEGMENT_TIMEOUT_MS {
            return Err(RelayError::ConfigError(format!(
                "segment_timeout_ms must be between 1 and {}, got {}",
                MAX_SEGMENT_TIMEOUT_MS, self.segment_timeout_ms
            )));
        }

        if self.manifest_ttl_ms == Some(0) {
            return Err(RelayError::ConfigError(
                "manifest_ttl_ms must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Effective manifest cache TTL
    pub fn manifest_ttl(&self) -> Duration {
        self.manifest_ttl_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.environment.default_manifest_ttl())
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_millis(self.segment_timeout_ms)
    }

    /// Base route without a trailing slash
    pub fn route_prefix(&self) -> &str {
        self.base_route.trim_end_matches('/')
    }

    /// Origin base URL without a trailing slash
    pub fn origin_base(&self) -> &str {
        self.origin_url.trim_end_matches('/')
    }

    /// Address string to bind the listener to
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
