//! In-memory transports for exercising the client without sockets.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::StreamError;
use crate::transport::{ConnectFuture, Connector, Transport};

/// Server side of an in-memory transport.
pub(crate) struct ServerEnd {
    to_client: Option<mpsc::UnboundedSender<Result<Message, tungstenite::Error>>>,
    from_client: mpsc::UnboundedReceiver<Message>,
}

impl ServerEnd {
    /// Pushes one text frame to the client.
    pub(crate) fn push_text(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(Message::Text(text.to_string().into())));
        }
    }

    /// Ends the client's inbound stream, as if the peer went away.
    pub(crate) fn hang_up(&mut self) {
        self.to_client.take();
    }

    /// Waits for the next text frame written by the client.
    pub(crate) async fn next_text(&mut self) -> Option<String> {
        while let Some(msg) = self.from_client.recv().await {
            if let Message::Text(t) = msg {
                return Some(t.to_string());
            }
        }
        None
    }

    /// Text frames the client has written so far.
    pub(crate) fn drain_texts(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = self.from_client.try_recv() {
            if let Message::Text(t) = msg {
                out.push(t.to_string());
            }
        }
        out
    }
}

/// Builds a connected transport pair backed by unbounded channels.
pub(crate) fn channel_transport() -> (Transport, ServerEnd) {
    let (to_client, client_rx) = mpsc::unbounded_channel();
    let (client_tx, from_client) = mpsc::unbounded_channel();

    let inbound = stream::unfold(client_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    let outbound = sink::unfold(client_tx, |tx, msg: Message| async move {
        let _ = tx.send(msg);
        Ok::<_, tungstenite::Error>(tx)
    });

    (
        Transport::new(outbound, inbound),
        ServerEnd {
            to_client: Some(to_client),
            from_client,
        },
    )
}

/// What the mock connector does on its next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Accept,
    Refuse,
}

/// Scripted connector. Calls beyond the script are refused.
#[derive(Default)]
pub(crate) struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    urls: Mutex<Vec<String>>,
    sessions: Mutex<Vec<ServerEnd>>,
    preload: Mutex<Vec<String>>,
}

impl MockConnector {
    pub(crate) fn new(script: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        })
    }

    pub(crate) fn push(&self, outcome: Outcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Queues a text frame that the next accepted session already holds
    /// when the connector returns.
    pub(crate) fn preload(&self, frame: &str) {
        self.preload.lock().unwrap().push(frame.to_string());
    }

    /// Number of connect attempts seen.
    pub(crate) fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Runs `f` against the server end of the `idx`-th accepted session.
    pub(crate) fn session<R>(&self, idx: usize, f: impl FnOnce(&mut ServerEnd) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap();
        f(&mut sessions[idx])
    }
}

impl Connector for MockConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            self.urls.lock().unwrap().push(url.to_string());
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Outcome::Refuse);
            match outcome {
                Outcome::Accept => {
                    let (transport, server) = channel_transport();
                    for frame in self.preload.lock().unwrap().drain(..) {
                        server.push_text(&frame);
                    }
                    self.sessions.lock().unwrap().push(server);
                    Ok(transport)
                }
                Outcome::Refuse => Err(StreamError::Ws(tungstenite::Error::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )))),
            }
        })
    }
}
