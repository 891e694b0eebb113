//! One live transport session.
//!
//! A [`WsClient`] owns the read, write and ping pumps of a single session.
//! It does not reconnect; when the session ends it reports why through the
//! close callback and the connection manager decides what happens next.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use healthnet_protocol::Envelope;
use healthnet_protocol::constants::WS_PING_PERIOD;

use crate::error::StreamError;
use crate::hub::SubscriptionHub;
use crate::transport::{FrameStream, Transport};

/// Outbound frames that can be queued before `send` reports backpressure.
const WRITE_QUEUE_CAPACITY: usize = 256;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by this process (`close`, `disconnect`, replacement).
    Local,
    /// Peer sent a close frame or the stream ended.
    Remote,
    /// Transport read or write error.
    Error(String),
    /// Nothing received within the liveness deadline.
    Timeout,
}

impl CloseReason {
    /// Human-readable error for reasons that indicate a failure.
    pub fn error_message(&self) -> Option<String> {
        match self {
            CloseReason::Error(e) => Some(e.clone()),
            CloseReason::Timeout => Some("connection timed out".into()),
            CloseReason::Local | CloseReason::Remote => None,
        }
    }
}

/// Called once by the read pump when the session ends.
pub(crate) type CloseCallback = Box<dyn FnOnce(CloseReason) + Send>;

/// Inbound half held back until [`WsClient::start_reading`] is called.
struct PendingReader {
    stream: FrameStream,
    hub: Arc<SubscriptionHub>,
    on_close: CloseCallback,
}

/// A running session: inbound envelopes go to the hub, outbound ones go
/// through a bounded write queue.
pub struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    write_failed: CancellationToken,
    reader: Option<PendingReader>,
    read_handle: Option<JoinHandle<()>>,
    _write_handle: JoinHandle<()>,
    _ping_handle: JoinHandle<()>,
}

impl WsClient {
    /// Starts all pumps on an opened transport.
    pub(crate) fn start(
        transport: Transport,
        hub: Arc<SubscriptionHub>,
        on_close: CloseCallback,
    ) -> Self {
        let mut client = Self::open(transport, hub, on_close);
        client.start_reading();
        client
    }

    /// Starts the write and ping pumps only. Inbound frames stay queued in
    /// the transport until [`start_reading`](Self::start_reading).
    pub(crate) fn open(
        transport: Transport,
        hub: Arc<SubscriptionHub>,
        on_close: CloseCallback,
    ) -> Self {
        let Transport { sink, stream } = transport;
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        let write_failed = CancellationToken::new();

        let write_handle = tokio::spawn(crate::pumps::write::write_pump(
            sink,
            write_rx,
            cancel.clone(),
            write_failed.clone(),
        ));

        let ping_handle = tokio::spawn(crate::pumps::ping::ping_pump(
            write_tx.clone(),
            WS_PING_PERIOD,
            cancel.clone(),
        ));

        Self {
            write_tx,
            cancel,
            write_failed,
            reader: Some(PendingReader {
                stream,
                hub,
                on_close,
            }),
            read_handle: None,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        }
    }

    /// Spawns the read pump. Later calls do nothing.
    pub(crate) fn start_reading(&mut self) {
        let Some(PendingReader {
            stream,
            hub,
            on_close,
        }) = self.reader.take()
        else {
            return;
        };
        self.read_handle = Some(tokio::spawn(crate::pumps::read::read_pump(
            stream,
            hub,
            self.write_tx.clone(),
            on_close,
            self.cancel.clone(),
            self.write_failed.clone(),
        )));
    }

    /// Serializes and queues one envelope. Does not wait for the write.
    pub fn send(&self, envelope: &Envelope) -> Result<(), StreamError> {
        if self.cancel.is_cancelled() {
            return Err(StreamError::Closed);
        }
        let frame = envelope.to_frame()?;
        self.write_tx
            .try_send(tungstenite::Message::Text(frame.into()))
            .map_err(|e| match e {
                TrySendError::Full(_) => StreamError::Backpressure,
                TrySendError::Closed(_) => StreamError::Closed,
            })
    }

    /// Returns `true` once the session has been closed or its writer stopped.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.write_tx.is_closed()
    }

    /// Stops all pumps. The write pump still tries to send a close frame.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = &self.read_handle {
            handle.abort();
        }
        self._ping_handle.abort();
        // The write pump exits by itself after flushing the close frame.
    }
}
