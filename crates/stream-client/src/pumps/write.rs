//! WebSocket write pump: serialises outbound frames.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

/// Upper bound on flushing the final close frame to a peer that stopped reading.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Writes queued frames to the transport until cancelled or the queue closes.
///
/// A failed write cancels `write_failed` so the read pump can end the
/// session as an unplanned close.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
    write_failed: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        trace!(len = m.len(), "writing frame");
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            write_failed.cancel();
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = tokio::time::timeout(
        CLOSE_FLUSH_TIMEOUT,
        write.send(tungstenite::Message::Close(None)),
    )
    .await;
}
