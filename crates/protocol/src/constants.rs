//! Reserved event tags and wire-level constants.

use std::time::Duration;

/// Numeric telemetry snapshot pushed by the backend.
pub const EVENT_METRICS: &str = "metrics";

/// Facility alert descriptor pushed by the backend.
pub const EVENT_ALERT: &str = "alert";

/// Connection status changes. Synthesized locally, never read off the wire.
pub const EVENT_CONNECTION: &str = "connection";

/// Transport, parse and reconnection-exhaustion failures.
pub const EVENT_ERROR: &str = "error";

/// Outbound advisory hint asking the peer to start pushing metrics.
pub const EVENT_SUBSCRIBE: &str = "subscribe";

/// Outbound advisory hint asking the peer to stop pushing metrics.
pub const EVENT_UNSUBSCRIBE: &str = "unsubscribe";

/// Base WebSocket URL used when no configuration overrides it.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080";

/// Path segment under which facility streams are served.
pub const FACILITY_PATH: &str = "ws/facilities";

/// Reconnection attempts allowed after an unplanned close before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base delay multiplied by the attempt number (linear backoff).
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Message carried by the `"error"` event emitted once retries are exhausted.
pub const RECONNECT_EXHAUSTED_MESSAGE: &str = "Maximum reconnection attempts reached";

/// Maximum accepted inbound text frame (1 MiB).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Interval between keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(30);

/// A session that receives nothing for this long is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Cadence requested in the default `subscribe` hint, in milliseconds.
pub const DEFAULT_STREAM_INTERVAL_MS: u64 = 2000;
