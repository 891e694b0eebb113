//! WebSocket read pump: decodes inbound frames and fans them out.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use healthnet_protocol::constants::{EVENT_CONNECTION, EVENT_ERROR, WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use healthnet_protocol::{Envelope, ErrorEvent};

use crate::hub::SubscriptionHub;
use crate::ws_client::{CloseCallback, CloseReason};

/// Reads frames until the session ends, then fires `on_close` exactly once.
///
/// Any inbound frame resets the liveness deadline; if nothing arrives
/// within [`WS_PONG_WAIT`] the session is treated as dead.
pub(crate) async fn read_pump<S>(
    mut read: S,
    hub: Arc<SubscriptionHub>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    on_close: CloseCallback,
    cancel: CancellationToken,
    write_failed: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break CloseReason::Local,

            _ = write_failed.cancelled() => {
                break CloseReason::Error("outbound write failed".into());
            }

            () = &mut deadline => {
                warn!("no frames within {WS_PONG_WAIT:?}, closing session");
                break CloseReason::Timeout;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => handle_text_frame(&text, &hub),
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.try_send(tungstenite::Message::Pong(data));
                            }
                            tungstenite::Message::Pong(_) => trace!("received pong"),
                            tungstenite::Message::Close(frame) => {
                                debug!(?frame, "received close frame");
                                break CloseReason::Remote;
                            }
                            tungstenite::Message::Binary(data) => {
                                debug!(len = data.len(), "ignoring binary frame");
                            }
                            tungstenite::Message::Frame(_) => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break CloseReason::Error(e.to_string());
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break CloseReason::Remote;
                    }
                }
            }
        }
    };

    on_close(reason);
}

/// Decodes one text frame and publishes it. Never panics on bad input.
pub(crate) fn handle_text_frame(text: &str, hub: &SubscriptionHub) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!(len = text.len(), "frame too large, dropping");
        publish_error(hub, format!("frame too large ({} bytes)", text.len()));
        return;
    }

    let envelope = match Envelope::from_frame(text) {
        Ok(env) => env,
        Err(e) => {
            warn!("failed to parse frame: {e}");
            publish_error(hub, format!("malformed frame: {e}"));
            return;
        }
    };

    if envelope.is(EVENT_CONNECTION) {
        debug!("dropping inbound connection frame; status is tracked locally");
        return;
    }

    let delivered = hub.publish(&envelope.event_type, &envelope.payload);
    trace!(event_type = %envelope.event_type, delivered, "frame dispatched");
}

fn publish_error(hub: &SubscriptionHub, message: String) {
    let payload = serde_json::to_value(ErrorEvent::new(message)).unwrap_or(Value::Null);
    hub.publish(EVENT_ERROR, &payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;
    use std::sync::Mutex;

    fn record(hub: &Arc<SubscriptionHub>, event_type: &str) -> (Arc<Mutex<Vec<Value>>>, crate::hub::Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = hub.subscribe(event_type, move |v| sink.lock().unwrap().push(v.clone()));
        (seen, sub)
    }

    fn close_recorder() -> (Arc<Mutex<Vec<CloseReason>>>, CloseCallback) {
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let r = reasons.clone();
        (reasons, Box::new(move |reason| r.lock().unwrap().push(reason)))
    }

    #[test]
    fn text_frame_reaches_subscribers() {
        let hub = SubscriptionHub::new();
        let (seen, _sub) = record(&hub, "metrics");

        handle_text_frame(r#"{"type":"metrics","payload":{"bandwidth":75}}"#, &hub);

        assert_eq!(*seen.lock().unwrap(), vec![json!({"bandwidth": 75})]);
    }

    #[test]
    fn malformed_frame_is_dropped_and_reported() {
        let hub = SubscriptionHub::new();
        let (metrics, _m) = record(&hub, "metrics");
        let (errors, _e) = record(&hub, EVENT_ERROR);

        handle_text_frame("not valid json {{{", &hub);

        assert!(metrics.lock().unwrap().is_empty());
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0]["error"].as_str().unwrap().starts_with("malformed frame"));
    }

    #[test]
    fn array_frame_is_not_delivered() {
        let hub = SubscriptionHub::new();
        let (metrics, _m) = record(&hub, "metrics");
        let (errors, _e) = record(&hub, EVENT_ERROR);

        handle_text_frame(r#"["metrics", {"bandwidth": 99}]"#, &hub);

        assert!(metrics.lock().unwrap().is_empty());
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn oversized_frame_is_dropped() {
        let hub = SubscriptionHub::new();
        let (errors, _e) = record(&hub, EVENT_ERROR);

        let huge = "x".repeat(WS_MAX_MESSAGE_SIZE + 1);
        handle_text_frame(&huge, &hub);

        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn inbound_connection_frame_is_ignored() {
        let hub = SubscriptionHub::new();
        let (status, _s) = record(&hub, EVENT_CONNECTION);

        handle_text_frame(r#"{"type":"connection","payload":{"status":"connected"}}"#, &hub);

        assert!(status.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn frames_are_delivered_in_arrival_order() {
        let hub = SubscriptionHub::new();
        let (seen, _sub) = record(&hub, "metrics");
        let (reasons, on_close) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(16);

        let frames = (1..=3).map(|n| {
            Ok(tungstenite::Message::Text(
                format!(r#"{{"type":"metrics","payload":{{"seq":{n}}}}}"#).into(),
            ))
        });
        read_pump(
            stream::iter(frames),
            hub.clone(),
            write_tx,
            on_close,
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await;

        let seqs: Vec<i64> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|v| v["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(*reasons.lock().unwrap(), vec![CloseReason::Remote]);
    }

    #[tokio::test]
    async fn answers_ping_with_pong() {
        let hub = SubscriptionHub::new();
        let (_reasons, on_close) = close_recorder();
        let (write_tx, mut write_rx) = mpsc::channel(16);

        let frames = vec![Ok(tungstenite::Message::Ping(vec![7u8].into()))];
        read_pump(
            stream::iter(frames),
            hub,
            write_tx,
            on_close,
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await;

        match write_rx.recv().await {
            Some(tungstenite::Message::Pong(data)) => assert_eq!(data.as_ref(), &[7u8]),
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_error_reports_error_reason() {
        let hub = SubscriptionHub::new();
        let (reasons, on_close) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(16);

        let frames = vec![Err(tungstenite::Error::ConnectionClosed)];
        read_pump(
            stream::iter(frames),
            hub,
            write_tx,
            on_close,
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await;

        let reasons = reasons.lock().unwrap();
        assert!(matches!(reasons.as_slice(), [CloseReason::Error(_)]));
    }

    #[tokio::test]
    async fn cancel_reports_local_close() {
        let hub = SubscriptionHub::new();
        let (reasons, on_close) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();
        read_pump(silent, hub, write_tx, on_close, cancel, CancellationToken::new()).await;

        assert_eq!(*reasons.lock().unwrap(), vec![CloseReason::Local]);
    }

    #[tokio::test]
    async fn silence_past_deadline_times_out() {
        tokio::time::pause();

        let hub = SubscriptionHub::new();
        let (reasons, on_close) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(16);

        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();
        read_pump(
            silent,
            hub,
            write_tx,
            on_close,
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(*reasons.lock().unwrap(), vec![CloseReason::Timeout]);
    }

    #[tokio::test]
    async fn write_failure_ends_session_with_error() {
        let hub = SubscriptionHub::new();
        let (reasons, on_close) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(16);
        let write_failed = CancellationToken::new();
        write_failed.cancel();

        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();
        read_pump(
            silent,
            hub,
            write_tx,
            on_close,
            CancellationToken::new(),
            write_failed,
        )
        .await;

        let reasons = reasons.lock().unwrap();
        assert!(matches!(reasons.as_slice(), [CloseReason::Error(_)]));
    }
}
