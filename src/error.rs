//! Error types for the HLS relay

use http::HeaderMap;
use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Error types that can occur while relaying a stream
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request path: {0}")]
    InvalidPath(String),

    #[error("Unsupported resource type: {0}")]
    UnsupportedExtension(String),

    #[error("Upstream request to {url} failed: {message}")]
    Upstream {
        url: String,
        message: String,
        /// Short classification of the failure (`timeout`, `connect`, `status`, ...)
        code: &'static str,
        /// Status returned by the origin, when it answered at all
        status: Option<u16>,
        /// Headers returned by the origin, when it answered at all
        headers: Option<HeaderMap>,
    },

    #[error("Invalid manifest content from {url}")]
    InvalidManifest { url: String },

    #[error("Empty response body from {url}")]
    EmptyBody { url: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::IoError(err.to_string())
    }
}

impl RelayError {
    /// Convert error to HTTP status code
    ///
    /// The relay never passes origin statuses through: everything that went
    /// wrong between the relay and the origin becomes 502 so that players
    /// treat it uniformly as "retry".
    pub fn to_http_status(&self) -> u16 {
        match self {
            RelayError::InvalidPath(_) => 400,
            RelayError::UnsupportedExtension(_) => 400,

            RelayError::Upstream { .. } => 502,
            RelayError::InvalidManifest { .. } => 502,
            RelayError::EmptyBody { .. } => 502,
            RelayError::StreamError(_) => 502,

            RelayError::ConfigError(_) => 500,
            RelayError::IoError(_) => 500,
            RelayError::InternalError(_) => 500,
        }
    }

    /// Whether the caller made a bad request (as opposed to the origin failing)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.to_http_status())
    }

    /// Short code used in logs and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::ConfigError(_) => "config",
            RelayError::InvalidPath(_) => "invalid_path",
            RelayError::UnsupportedExtension(_) => "unsupported_extension",
            RelayError::Upstream { code, .. } => *code,
            RelayError::InvalidManifest { .. } => "invalid_manifest",
            RelayError::EmptyBody { .. } => "empty_body",
            RelayError::StreamError(_) => "stream",
            RelayError::IoError(_) => "io",
            RelayError::InternalError(_) => "internal",
        }
    }

    /// Create an error for an origin that answered with a non-2xx status
    pub fn upstream_status(url: impl Into<String>, status: u16, headers: HeaderMap) -> Self {
        RelayError::Upstream {
            url: url.into(),
            message: format!("Request failed with status code {}", status),
            code: "status",
            status: Some(status),
            headers: Some(headers),
        }
    }

    /// Create an error from a transport failure reported by the HTTP client
    pub fn from_transport(url: impl Into<String>, err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connect"
        } else if err.is_redirect() {
            "redirect"
        } else if err.is_body() {
            "body"
        } else if err.is_decode() {
            "decode"
        } else {
            "request"
        };

        RelayError::Upstream {
            url: url.into(),
            message: err.to_string(),
            code,
            status: err.status().map(|s| s.as_u16()),
            headers: None,
        }
    }
}
