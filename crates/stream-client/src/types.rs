//! Public types for the stream client.

use std::time::Duration;

use healthnet_protocol::constants::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY, DEFAULT_WS_URL, FACILITY_PATH,
};

use crate::error::StreamError;

/// Lifecycle state of the single transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and no pending reconnect.
    Disconnected,
    /// Transport open in progress.
    Connecting,
    /// Session open; `send` is allowed.
    Connected,
    /// Session lost, waiting out the backoff before `attempt`.
    Reconnecting { attempt: u32 },
    /// Reconnection attempts exhausted. Only an explicit `connect` leaves this state.
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Linear reconnection backoff: attempt `n` waits `base_delay * n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Attempts allowed after an unplanned close before the state turns `Failed`.
    pub max_attempts: u32,
    /// Delay before the first attempt; later attempts wait a multiple of it.
    pub base_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base WebSocket URL, e.g. `ws://localhost:8080`.
    pub ws_url: String,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }

    /// Builds the stream address for a facility: `{base}/ws/facilities/{target}`.
    pub fn endpoint_url(&self, target: &str) -> Result<String, StreamError> {
        let invalid = target.is_empty()
            || target
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'));
        if invalid {
            return Err(StreamError::InvalidTarget(target.to_string()));
        }
        let base = self.ws_url.trim_end_matches('/');
        Ok(format!("{base}/{FACILITY_PATH}/{target}"))
    }
}
