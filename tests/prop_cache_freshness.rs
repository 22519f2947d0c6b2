// Property: a cached manifest is served while its age is strictly below
// the TTL and never once the TTL has elapsed, for any TTL. A later put
// always restarts the entry's lifetime.

use hls_relay::ManifestCache;
use proptest::prelude::*;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

const PATH: &str = "/CH2/tracks-v1a1/mono.m3u8";
const MANIFEST: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:2\n";

fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_fresh_only_below_ttl(ttl_ms in 1u64..30_000, delta_ms in 0u64..60_000) {
        let rt = paused_runtime();

        let served = rt.block_on(async {
            let cache = ManifestCache::new(Duration::from_millis(ttl_ms));
            cache.put(PATH, MANIFEST.to_string());
            tokio::time::advance(Duration::from_millis(delta_ms)).await;
            cache.get(PATH)
        });

        prop_assert_eq!(
            served.is_some(),
            delta_ms < ttl_ms,
            "ttl={}ms age={}ms",
            ttl_ms,
            delta_ms
        );
        if let Some(content) = served {
            prop_assert_eq!(content, MANIFEST);
        }
    }

    /// Right at the boundary: one millisecond short is a hit, the TTL itself a miss
    #[test]
    fn prop_ttl_boundary(ttl_ms in 1u64..30_000) {
        let rt = paused_runtime();

        let (before, at) = rt.block_on(async {
            let cache = ManifestCache::new(Duration::from_millis(ttl_ms));
            cache.put(PATH, MANIFEST.to_string());

            tokio::time::advance(Duration::from_millis(ttl_ms - 1)).await;
            let before = cache.get(PATH).is_some();
            tokio::time::advance(Duration::from_millis(1)).await;
            let at = cache.get(PATH).is_some();
            (before, at)
        });

        prop_assert!(before, "miss 1ms before a {}ms TTL", ttl_ms);
        prop_assert!(!at, "hit at a {}ms TTL", ttl_ms);
    }

    #[test]
    fn prop_put_restarts_lifetime(ttl_ms in 1u64..10_000, stale_ms in 0u64..20_000) {
        let rt = paused_runtime();

        let served = rt.block_on(async {
            let cache = ManifestCache::new(Duration::from_millis(ttl_ms));
            cache.put(PATH, "#EXTM3U\nold".to_string());
            tokio::time::advance(Duration::from_millis(stale_ms)).await;

            cache.put(PATH, MANIFEST.to_string());
            cache.get(PATH)
        });

        prop_assert_eq!(served.as_deref(), Some(MANIFEST));
    }
}
