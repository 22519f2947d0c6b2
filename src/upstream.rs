//! Upstream client for fetching manifests and segments from the origin

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::models::ResourceKind;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use http::{HeaderMap, HeaderValue};
use reqwest::{redirect, Client};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Byte stream of a segment body as it arrives from the origin
pub type SegmentStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Body of an upstream response, shaped by the resource kind
pub enum UpstreamBody {
    /// Fully buffered manifest text
    Text(String),
    /// Segment bytes, pulled on demand
    Stream(SegmentStream),
}

impl fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamBody::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            UpstreamBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Successful response from the origin
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub content_length: Option<u64>,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Take the body as text, if this was a manifest fetch
    pub fn into_text(self) -> Option<String> {
        match self.body {
            UpstreamBody::Text(text) => Some(text),
            UpstreamBody::Stream(_) => None,
        }
    }
}

/// UpstreamClient issues GET requests against the origin over pooled,
/// keep-alive connections
///
/// It never retries: retry policy belongs to the player.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    manifest_timeout: Duration,
    segment_timeout: Duration,
}

impl UpstreamClient {
    /// Create an UpstreamClient from the relay configuration
    pub fn new(config: &RelayConfig) -> Result<Self> {
        Self::build(
            config.manifest_timeout(),
            config.segment_timeout(),
            config.max_redirects,
            &config.user_agent,
        )
    }

    /// Create an UpstreamClient with custom timeouts and default headers
    pub fn with_timeouts(manifest_timeout: Duration, segment_timeout: Duration) -> Result<Self> {
        let defaults = RelayConfig::default();
        Self::build(
            manifest_timeout,
            segment_timeout,
            defaults.max_redirects,
            &defaults.user_agent,
        )
    }

    fn build(
        manifest_timeout: Duration,
        segment_timeout: Duration,
        max_redirects: usize,
        user_agent: &str,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(http::header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .redirect(redirect::Policy::limited(max_redirects))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| RelayError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(UpstreamClient {
            client,
            manifest_timeout,
            segment_timeout,
        })
    }

    /// Total request timeout applied to a resource kind
    pub fn timeout_for(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Manifest => self.manifest_timeout,
            ResourceKind::Segment => self.segment_timeout,
        }
    }

    /// Fetch a resource from the origin
    ///
    /// Manifests are read fully into memory; segments are returned as a byte
    /// stream so the caller can pipe them without buffering.
    ///
    /// # Returns
    /// * `Ok(UpstreamResponse)` for any 2xx answer
    /// * `Err(RelayError::Upstream)` for transport failures and non-2xx
    ///   statuses, carrying the status and headers when the origin answered
    pub async fn fetch(&self, url: &str, kind: ResourceKind) -> Result<UpstreamResponse> {
        debug!("Fetching {} from upstream: url={}", kind, url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout_for(kind))
            .send()
            .await
            .map_err(|e| RelayError::from_transport(url, &e))?;

        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            warn!("Origin returned non-success status: url={}, status={}", url, status);
            return Err(RelayError::upstream_status(url, status.as_u16(), headers));
        }

        let content_length = response.content_length();

        let body = match kind {
            ResourceKind::Manifest => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| RelayError::from_transport(url, &e))?;
                UpstreamBody::Text(text)
            }
            ResourceKind::Segment => {
                let target = url.to_string();
                let stream = response.bytes_stream().map(move |chunk| {
                    chunk.map_err(|e| {
                        RelayError::StreamError(format!("{} while reading {}", e, target))
                    })
                });
                UpstreamBody::Stream(Box::pin(stream))
            }
        };

        Ok(UpstreamResponse {
            status: status.as_u16(),
            headers,
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = UpstreamClient::new(&RelayConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_timeouts_per_kind() {
        let client =
            UpstreamClient::with_timeouts(Duration::from_secs(5), Duration::from_secs(10)).unwrap();
        assert_eq!(client.timeout_for(ResourceKind::Manifest), Duration::from_secs(5));
        assert_eq!(client.timeout_for(ResourceKind::Segment), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_invalid_url_is_upstream_error() {
        let client = UpstreamClient::new(&RelayConfig::default()).unwrap();
        let result = client.fetch("not-a-valid-url", ResourceKind::Manifest).await;
        assert!(matches!(result, Err(RelayError::Upstream { .. })));
    }
}
