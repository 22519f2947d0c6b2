//! Short-lived cache for live manifests
//!
//! A live playlist changes every few seconds, so entries are only servable
//! for a small TTL. Expired entries are treated as misses and overwritten by
//! the next successful fetch; nothing is evicted, since only the handful of
//! manifest paths of one channel are ever stored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A manifest as last fetched from the origin
#[derive(Debug, Clone)]
pub struct CachedManifest {
    pub content: String,
    pub fetched_at: Instant,
}

impl CachedManifest {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Manifest cache keyed by request path
pub struct ManifestCache {
    entries: RwLock<HashMap<String, CachedManifest>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ManifestCache {
    /// Create a new ManifestCache
    ///
    /// # Arguments
    /// * `ttl` - How long a fetched manifest may be served
    pub fn new(ttl: Duration) -> Self {
        ManifestCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a manifest
    ///
    /// Returns the stored content only while its age is below the TTL.
    pub fn get(&self, path: &str) -> Option<String> {
        let now = Instant::now();

        let result = match self.entries.read() {
            Ok(entries) => match entries.get(path) {
                Some(entry) if entry.is_fresh(now, self.ttl) => {
                    debug!("Manifest cache hit: path={}", path);
                    Some(entry.content.clone())
                }
                Some(_) => {
                    debug!("Manifest cache entry expired: path={}", path);
                    None
                }
                None => {
                    debug!("Manifest cache miss: path={}", path);
                    None
                }
            },
            Err(e) => {
                warn!("Manifest cache lookup error: path={}, error={:?}", path, e);
                None
            }
        };

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        result
    }

    /// Store a freshly fetched manifest, replacing any previous entry
    pub fn put(&self, path: &str, content: String) {
        let entry = CachedManifest {
            content,
            fetched_at: Instant::now(),
        };

        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(path.to_string(), entry);
            }
            Err(e) => {
                warn!("Manifest cache store error: path={}, error={:?}", path, e);
            }
        }
    }

    /// Number of stored entries, fresh or not
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
