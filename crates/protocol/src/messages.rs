//! Payloads of the control and status envelopes.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_STREAM_INTERVAL_MS;

/// Link state reported through `"connection"` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Connected,
    Disconnected,
    Error,
}

/// Payload of `"connection"` envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: LinkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn connected() -> Self {
        Self {
            status: LinkStatus::Connected,
            error: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: LinkStatus::Disconnected,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: LinkStatus::Error,
            error: Some(message.into()),
        }
    }
}

/// Payload of `"error"` envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error: String,
}

impl ErrorEvent {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Metric series a consumer can ask the peer to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Bandwidth,
    Latency,
    Users,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Bandwidth, MetricKind::Latency, MetricKind::Users];
}

/// Payload of the outbound `"subscribe"` / `"unsubscribe"` hints.
///
/// These are advisory: the client never checks whether the peer honours
/// the requested cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub metrics: Vec<MetricKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

impl StreamRequest {
    /// Hint asking for all series at the given cadence (milliseconds).
    pub fn subscribe_all(interval_ms: u64) -> Self {
        Self {
            metrics: MetricKind::ALL.to_vec(),
            interval: Some(interval_ms),
        }
    }

    /// Hint releasing all series. Carries no cadence.
    pub fn unsubscribe_all() -> Self {
        Self {
            metrics: MetricKind::ALL.to_vec(),
            interval: None,
        }
    }
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self::subscribe_all(DEFAULT_STREAM_INTERVAL_MS)
    }
}
