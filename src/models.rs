//! Data models for relayed resources

use crate::error::{RelayError, Result};
use percent_encoding::percent_decode_str;
use std::fmt;

/// Kind of HLS resource, derived from the request path's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `.m3u8` playlist, buffered and cached
    Manifest,
    /// `.ts` media segment, streamed through
    Segment,
}

impl ResourceKind {
    /// Classify a request path by extension
    ///
    /// Returns `None` for anything that is neither a playlist nor a segment.
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with(".m3u8") {
            Some(ResourceKind::Manifest)
        } else if path.ends_with(".ts") {
            Some(ResourceKind::Segment)
        } else {
            None
        }
    }

    /// Content-Type sent to the client
    pub fn content_type(&self) -> &'static str {
        match self {
            ResourceKind::Manifest => "application/vnd.apple.mpegurl",
            ResourceKind::Segment => "video/MP2T",
        }
    }

    /// Cache-Control sent to the client
    ///
    /// Manifests are never cached downstream; the relay's own cache is the
    /// only staleness allowed. Segments may be reused after revalidation.
    pub fn cache_control(&self) -> &'static str {
        match self {
            ResourceKind::Manifest => "no-cache",
            ResourceKind::Segment => "public, max-age=0",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Manifest => "manifest",
            ResourceKind::Segment => "segment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request the relay is about to issue against the origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    /// Path relative to the base route, e.g. `/CH2/tracks-v1a1/mono.m3u8`
    pub path: String,
    /// Full origin URL
    pub target_url: String,
    pub kind: ResourceKind,
}

impl UpstreamRequest {
    /// Build an upstream request from an inbound relay path
    ///
    /// The path is checked before being appended to the origin URL:
    /// traversal segments, backslashes, encoded separators and NUL bytes are
    /// rejected, as is any extension other than `.m3u8` or `.ts`.
    pub fn from_path(origin_base: &str, path: &str) -> Result<Self> {
        let path = sanitize_path(path)?;

        let kind = ResourceKind::from_path(&path)
            .ok_or_else(|| RelayError::UnsupportedExtension(path.clone()))?;

        Ok(UpstreamRequest {
            target_url: format!("{}{}", origin_base.trim_end_matches('/'), path),
            path,
            kind,
        })
    }
}

/// Validate a relay path, returning it unchanged when safe to forward
pub fn sanitize_path(path: &str) -> Result<String> {
    if path.is_empty() || !path.starts_with('/') || path == "/" {
        return Err(RelayError::InvalidPath(path.to_string()));
    }

    let lowered = path.to_ascii_lowercase();
    if lowered.contains("%2f") || lowered.contains("%5c") || lowered.contains("%00") {
        return Err(RelayError::InvalidPath(path.to_string()));
    }

    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| RelayError::InvalidPath(path.to_string()))?;

    if decoded.contains('\\') || decoded.contains('\0') {
        return Err(RelayError::InvalidPath(path.to_string()));
    }

    if decoded.split('/').any(|segment| segment == "..") {
        return Err(RelayError::InvalidPath(path.to_string()));
    }

    Ok(path.to_string())
}
