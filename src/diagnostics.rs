//! `/test-stream` origin probe
//!
//! Fetches the channel manifest straight from the origin, bypassing the
//! manifest cache and content validation, and reports what came back.

use crate::error::RelayError;
use crate::models::ResourceKind;
use crate::upstream::UpstreamClient;
use http::HeaderMap;
use serde_json::{json, Map, Value};
use tracing::{error, info};

/// Number of body characters echoed back by the probe
pub const PREVIEW_CHARS: usize = 500;

/// Outcome of a probe: HTTP status plus JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub status: u16,
    pub body: Value,
}

/// Probe `url` and describe the origin's answer
pub async fn probe_stream(client: &UpstreamClient, url: &str) -> ProbeReport {
    info!("Testing stream URL: {}", url);

    match client.fetch(url, ResourceKind::Manifest).await {
        Ok(response) => {
            let content_type = response.content_type().map(str::to_string);
            let headers = headers_to_json(&response.headers);
            let text = response.into_text().unwrap_or_default();

            ProbeReport {
                status: 200,
                body: json!({
                    "status": "ok",
                    "contentType": content_type,
                    "data": text.chars().take(PREVIEW_CHARS).collect::<String>(),
                    "headers": headers,
                }),
            }
        }
        Err(err) => {
            error!("Test stream error: url={}, error={}", url, err);
            ProbeReport {
                status: 502,
                body: error_json(&err),
            }
        }
    }
}

fn error_json(err: &RelayError) -> Value {
    match err {
        RelayError::Upstream {
            message,
            code,
            status,
            headers,
            ..
        } => {
            let response = match (status, headers) {
                (Some(status), Some(headers)) => json!({
                    "status": status,
                    "headers": headers_to_json(headers),
                }),
                _ => Value::Null,
            };
            json!({
                "status": "error",
                "message": message,
                "code": code,
                "response": response,
            })
        }
        other => json!({
            "status": "error",
            "message": other.to_string(),
            "code": other.code(),
            "response": Value::Null,
        }),
    }
}

fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            map.insert(name.as_str().to_string(), Value::String(v.to_string()));
        }
    }
    Value::Object(map)
}
