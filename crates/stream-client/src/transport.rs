//! Transport seam between the connection manager and the network.
//!
//! The manager never dials sockets itself; it asks a [`Connector`] for a
//! [`Transport`] (a frame sink plus a frame stream). [`WsConnector`] is the
//! production implementation on top of `tokio-tungstenite`.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use healthnet_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::error::StreamError;

/// Outbound half of a session.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;

/// Inbound half of a session.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, tungstenite::Error>> + Send>>;

/// Future returned by [`Connector::connect`].
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<Transport, StreamError>> + Send + 'a>>;

/// An opened, message-based bidirectional connection.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Message, Error = tungstenite::Error> + Send + 'static,
        St: Stream<Item = Result<Message, tungstenite::Error>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens transports to a URL.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a>;
}

/// Hard ceiling enforced by the WebSocket layer itself. A message above it
/// is a transport error and ends the session; messages between
/// [`WS_MAX_MESSAGE_SIZE`] and this ceiling reach the read pump, which drops
/// and reports them.
const TRANSPORT_MESSAGE_CEILING: usize = 16 * WS_MAX_MESSAGE_SIZE;

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    max_message_size: usize,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            max_message_size: TRANSPORT_MESSAGE_CEILING,
        }
    }
}

impl Connector for WsConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
            ws_config.max_message_size = Some(self.max_message_size);
            ws_config.max_frame_size = Some(self.max_message_size);
            let (ws_stream, response) =
                tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
            debug!(url, status = %response.status(), "WebSocket handshake complete");
            let (write, read) = ws_stream.split();
            Ok(Transport::new(write, read))
        })
    }
}
