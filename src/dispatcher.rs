//! Relay dispatcher
//!
//! Classifies each request under the streaming route as a manifest or a
//! segment and serves it:
//!
//! ```text
//! .m3u8 ──> ManifestCache ──hit──────────────────────────> 200 (buffered)
//!                 └──miss──> UpstreamClient ──> validate ──> cache ──> 200
//! .ts   ──> UpstreamClient ──> first chunk ──> 200 (piped stream)
//! other ──> 400
//! ```
//!
//! Everything that goes wrong between the relay and the origin is answered
//! with 502, including origin 404s: players treat 502 uniformly as "retry".

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::manifest_cache::ManifestCache;
use crate::metrics::RelayMetrics;
use crate::models::{ResourceKind, UpstreamRequest};
use crate::upstream::{UpstreamBody, UpstreamClient};
use crate::validation::is_hls_manifest;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http::{header, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Response body produced by the relay
pub type RelayBody = UnsyncBoxBody<Bytes, RelayError>;

/// Build a buffered body
pub fn full_body(data: impl Into<Bytes>) -> RelayBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Build a plain-text response with the given status
pub fn text_response(status: StatusCode, message: &'static str) -> Response<RelayBody> {
    let mut response = Response::new(full_body(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Dispatcher for requests under the streaming route
pub struct RelayDispatcher {
    origin_base: String,
    cache: Arc<ManifestCache>,
    upstream: UpstreamClient,
    metrics: RelayMetrics,
}

impl RelayDispatcher {
    /// Create a dispatcher from the relay configuration
    pub fn new(config: &RelayConfig, metrics: RelayMetrics) -> Result<Self> {
        let cache = Arc::new(ManifestCache::new(config.manifest_ttl()));
        let upstream = UpstreamClient::new(config)?;
        Ok(Self::with_parts(config.origin_base(), cache, upstream, metrics))
    }

    /// Create a dispatcher from already built parts
    pub fn with_parts(
        origin_base: impl Into<String>,
        cache: Arc<ManifestCache>,
        upstream: UpstreamClient,
        metrics: RelayMetrics,
    ) -> Self {
        RelayDispatcher {
            origin_base: origin_base.into().trim_end_matches('/').to_string(),
            cache,
            upstream,
            metrics,
        }
    }

    pub fn cache(&self) -> &ManifestCache {
        &self.cache
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn origin_base(&self) -> &str {
        &self.origin_base
    }

    /// Handle a request for `path`, relative to the streaming route
    ///
    /// Never fails: every error is logged and turned into a response.
    pub async fn handle(&self, path: &str) -> Response<RelayBody> {
        match self.relay(path).await {
            Ok(response) => response,
            Err(err) => {
                let kind = ResourceKind::from_path(path)
                    .map(|k| k.as_str())
                    .unwrap_or("unknown");

                if err.is_client_error() {
                    warn!("Rejected relay request: path={}, error={}", path, err);
                    self.metrics.record_request(kind, "rejected");
                    text_response(StatusCode::BAD_REQUEST, "Invalid request")
                } else {
                    log_failure(&err);
                    self.metrics.record_request(kind, "failed");
                    self.metrics.record_upstream_failure(err.code());
                    if err.to_http_status() == 502 {
                        text_response(StatusCode::BAD_GATEWAY, "Error fetching content")
                    } else {
                        text_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
                    }
                }
            }
        }
    }

    async fn relay(&self, path: &str) -> Result<Response<RelayBody>> {
        let request = UpstreamRequest::from_path(&self.origin_base, path)?;

        match request.kind {
            ResourceKind::Manifest => self.relay_manifest(&request).await,
            ResourceKind::Segment => self.relay_segment(&request).await,
        }
    }

    async fn relay_manifest(&self, request: &UpstreamRequest) -> Result<Response<RelayBody>> {
        if let Some(content) = self.cache.get(&request.path) {
            self.metrics.record_cache_lookup(true);
            self.metrics.record_request(request.kind.as_str(), "cached");
            return build_response(request.kind, None, full_body(content));
        }
        self.metrics.record_cache_lookup(false);

        info!("Fetching manifest from: {}", request.target_url);
        let response = self
            .upstream
            .fetch(&request.target_url, ResourceKind::Manifest)
            .await?;

        let content = response.into_text().ok_or_else(|| {
            RelayError::InternalError("manifest fetch returned a stream".to_string())
        })?;

        debug!(
            "Manifest content: {}",
            content.chars().take(200).collect::<String>()
        );

        if content.is_empty() {
            return Err(RelayError::EmptyBody {
                url: request.target_url.clone(),
            });
        }

        if !is_hls_manifest(&content) {
            return Err(RelayError::InvalidManifest {
                url: request.target_url.clone(),
            });
        }

        self.cache.put(&request.path, content.clone());
        self.metrics.record_request(request.kind.as_str(), "ok");
        build_response(request.kind, None, full_body(content))
    }

    async fn relay_segment(&self, request: &UpstreamRequest) -> Result<Response<RelayBody>> {
        info!("Fetching segment from: {}", request.target_url);
        let response = self
            .upstream
            .fetch(&request.target_url, ResourceKind::Segment)
            .await?;

        let content_length = response.content_length;
        let mut upstream = match response.body {
            UpstreamBody::Stream(stream) => stream,
            UpstreamBody::Text(_) => {
                return Err(RelayError::InternalError(
                    "segment fetch returned buffered text".to_string(),
                ))
            }
        };

        // Hold the response head back until the origin has produced data, so
        // an empty body or an immediate failure can still be answered with 502.
        let first = match upstream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => return Err(err),
            None => {
                return Err(RelayError::EmptyBody {
                    url: request.target_url.clone(),
                })
            }
        };

        let metrics = self.metrics.clone();
        let url = request.target_url.clone();
        let frames = stream::once(async move { Ok(first) })
            .chain(upstream)
            .map(move |chunk| {
                match &chunk {
                    Ok(bytes) => metrics.record_segment_bytes(bytes.len() as u64),
                    Err(err) => {
                        // The head is already out; hyper aborts the connection.
                        error!("Stream error: url={}, error={}", url, err);
                        metrics.record_upstream_failure(err.code());
                    }
                }
                chunk.map(Frame::data)
            });

        self.metrics.record_request(request.kind.as_str(), "ok");
        build_response(
            request.kind,
            content_length,
            StreamBody::new(frames).boxed_unsync(),
        )
    }
}

fn build_response(
    kind: ResourceKind,
    content_length: Option<u64>,
    body: RelayBody,
) -> Result<Response<RelayBody>> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, kind.content_type())
        .header(header::CACHE_CONTROL, kind.cache_control());

    if let Some(length) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder
        .body(body)
        .map_err(|e| RelayError::InternalError(format!("Failed to build response: {}", e)))
}

/// Log a relay failure with whatever the origin told us
fn log_failure(err: &RelayError) {
    match err {
        RelayError::Upstream {
            url,
            message,
            code,
            status,
            headers,
        } => {
            error!(
                "Proxy error: url={}, message={}, code={}, response_status={:?}, response_headers={:?}",
                url, message, code, status, headers
            );
        }
        RelayError::InvalidManifest { url } => {
            error!("Proxy error: url={}, message=Invalid M3U8 content", url);
        }
        RelayError::EmptyBody { url } => {
            error!("Proxy error: url={}, message=Empty upstream body", url);
        }
        other => {
            error!("Proxy error: message={}, code={}", other, other.code());
        }
    }
}
