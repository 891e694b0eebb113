//! Error types for the stream client.

use tokio_tungstenite::tungstenite;

/// Errors returned to callers of the stream client.
///
/// Transport failures that happen inside the client's own event loop are
/// never returned from here; they surface as `"connection"` and `"error"`
/// envelopes on the hub instead.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("not connected")]
    NotConnected,

    #[error("invalid endpoint target: {0:?}")]
    InvalidTarget(String),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    Backpressure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(StreamError::NotConnected.to_string(), "not connected");
        assert_eq!(StreamError::Closed.to_string(), "connection closed");
        assert_eq!(
            StreamError::InvalidTarget("a/b".into()).to_string(),
            "invalid endpoint target: \"a/b\""
        );
    }
}
