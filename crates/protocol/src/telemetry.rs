use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric telemetry snapshot carried by `"metrics"` envelopes.
///
/// Every field is optional; the backend decides which series it pushes.
/// Fields this type does not know about are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Bandwidth usage in Mbps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<f64>,
    /// Round-trip latency in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_users: Option<f64>,
    /// Backend timestamp, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MetricsSnapshot {
    /// Looks up a numeric field by its wire name, including unknown ones.
    pub fn value(&self, name: &str) -> Option<f64> {
        match name {
            "bandwidth" => self.bandwidth,
            "latency" => self.latency,
            "activeUsers" | "users" => self.active_users,
            other => self.extra.get(other).and_then(Value::as_f64),
        }
    }
}

/// Alert severity. Unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    #[serde(untagged)]
    Other(String),
}

/// Facility alert descriptor carried by `"alert"` envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,
}
