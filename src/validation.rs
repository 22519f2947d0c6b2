//! Manifest content validation
//!
//! The check is a substring heuristic: a body is accepted as an HLS playlist
//! when it carries the `#EXTM3U` marker anywhere. Dispatch only calls
//! [`is_hls_manifest`], so a stricter parser can replace it here.

/// Marker every HLS playlist carries
pub const HLS_MARKER: &str = "#EXTM3U";

/// Whether `body` looks like an HLS playlist
pub fn is_hls_manifest(body: &str) -> bool {
    body.contains(HLS_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_manifest() {
        let body = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\nseg001.ts\n";
        assert!(is_hls_manifest(body));
    }

    #[test]
    fn test_marker_with_bom() {
        assert!(is_hls_manifest("\u{feff}#EXTM3U\n"));
    }

    #[test]
    fn test_rejects_non_manifest() {
        assert!(!is_hls_manifest("not a manifest"));
        assert!(!is_hls_manifest(""));
        assert!(!is_hls_manifest("<html><body>502 Bad Gateway</body></html>"));
    }
}
