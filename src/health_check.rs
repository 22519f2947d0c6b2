//! Health check endpoint
//!
//! Liveness only: answering at all means the relay is up. The origin is not
//! probed here; `/test-stream` does that on demand.

use crate::config::Environment;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: &'static str,
    pub environment: &'static str,
    pub timestamp: String,
}

impl HealthReport {
    /// Build a report for the current instant
    pub fn now(environment: Environment) -> Self {
        Self::at(environment, Utc::now())
    }

    pub fn at(environment: Environment, time: DateTime<Utc>) -> Self {
        HealthReport {
            status: "ok",
            environment: environment.as_str(),
            timestamp: time.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"status":"ok"}"#.to_string())
    }
}
