//! Prometheus metrics for the relay

use crate::models::ResourceKind;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics collected by the relay
///
/// Every instance owns its own registry, so several relays (or tests) can
/// coexist in one process.
#[derive(Clone)]
pub struct RelayMetrics {
    registry: Registry,

    /// Requests by resource kind and outcome (ok, cached, rejected, failed)
    pub requests_total: IntCounterVec,

    /// Manifest cache lookups by result (hit, miss)
    pub manifest_cache_total: IntCounterVec,

    /// Upstream failures by reason code
    pub upstream_failures_total: IntCounterVec,

    /// Segment bytes piped to clients
    pub segment_bytes_total: IntCounter,
}

impl RelayMetrics {
    /// Create metrics registered in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics registered in the given registry
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let requests_total = IntCounterVec::new(
            Opts::new("hls_relay_requests_total", "Total number of relayed requests"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let manifest_cache_total = IntCounterVec::new(
            Opts::new(
                "hls_relay_manifest_cache_total",
                "Manifest cache lookups by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(manifest_cache_total.clone()))?;

        let upstream_failures_total = IntCounterVec::new(
            Opts::new(
                "hls_relay_upstream_failures_total",
                "Failed upstream fetches by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(upstream_failures_total.clone()))?;

        let segment_bytes_total = IntCounter::with_opts(Opts::new(
            "hls_relay_segment_bytes_total",
            "Segment bytes streamed to clients",
        ))?;
        registry.register(Box::new(segment_bytes_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            manifest_cache_total,
            upstream_failures_total,
            segment_bytes_total,
        })
    }

    pub fn record_request(&self, kind: &str, outcome: &str) {
        self.requests_total.with_label_values(&[kind, outcome]).inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.manifest_cache_total.with_label_values(&[result]).inc();
    }

    pub fn record_upstream_failure(&self, reason: &str) {
        self.upstream_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_segment_bytes(&self, bytes: u64) {
        self.segment_bytes_total.inc_by(bytes);
    }

    /// Requests recorded for a kind and outcome
    pub fn requests(&self, kind: ResourceKind, outcome: &str) -> u64 {
        self.requests_total
            .with_label_values(&[kind.as_str(), outcome])
            .get()
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<(String, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        let body = String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics are not UTF-8: {}", e)))?;
        Ok((encoder.format_type().to_string(), body))
    }
}
