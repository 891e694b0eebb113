//! Typed view over the metrics stream: latest snapshot, connectivity flag
//! and last error.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use healthnet_protocol::constants::{EVENT_CONNECTION, EVENT_ERROR, EVENT_METRICS};
use healthnet_protocol::{ConnectionStatus, ErrorEvent, LinkStatus, MetricsSnapshot};
use healthnet_stream_client::{ConnectionManager, Subscription, SubscriptionHub};

/// Live metrics adapter.
///
/// Registers on the `"metrics"`, `"connection"` and `"error"` channels of a
/// hub. Dropping it removes all three callbacks.
pub struct LiveMetrics {
    metrics_rx: watch::Receiver<Option<MetricsSnapshot>>,
    connected_rx: watch::Receiver<bool>,
    last_error: Arc<Mutex<Option<String>>>,
    _subscriptions: Vec<Subscription>,
}

impl LiveMetrics {
    /// Attaches to a manager's hub, seeding the connectivity flag from its
    /// current state.
    pub fn attach(manager: &ConnectionManager) -> Self {
        Self::with_hub(manager.hub(), manager.is_connected())
    }

    pub fn with_hub(hub: &Arc<SubscriptionHub>, connected: bool) -> Self {
        let (metrics_tx, metrics_rx) = watch::channel(None);
        let (connected_tx, connected_rx) = watch::channel(connected);
        let last_error = Arc::new(Mutex::new(None));

        let metrics_sub = hub.subscribe(EVENT_METRICS, move |payload| {
            match serde_json::from_value::<MetricsSnapshot>(payload.clone()) {
                Ok(snapshot) => {
                    metrics_tx.send_replace(Some(snapshot));
                }
                Err(e) => warn!(error = %e, "ignoring metrics payload"),
            }
        });

        let status_sub = {
            let last_error = last_error.clone();
            hub.subscribe(EVENT_CONNECTION, move |payload| {
                let Ok(status) = serde_json::from_value::<ConnectionStatus>(payload.clone()) else {
                    debug!("unrecognized connection status");
                    return;
                };
                let mut slot = last_error.lock().unwrap_or_else(PoisonError::into_inner);
                match status.status {
                    LinkStatus::Connected => {
                        slot.take();
                        connected_tx.send_replace(true);
                    }
                    LinkStatus::Disconnected => {
                        connected_tx.send_replace(false);
                    }
                    LinkStatus::Error => {
                        *slot = Some(status.error.unwrap_or_else(|| "connection error".into()));
                        connected_tx.send_replace(false);
                    }
                }
            })
        };

        let error_sub = {
            let last_error = last_error.clone();
            hub.subscribe(EVENT_ERROR, move |payload| {
                *last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(error_text(payload));
            })
        };

        Self {
            metrics_rx,
            connected_rx,
            last_error,
            _subscriptions: vec![metrics_sub, status_sub, error_sub],
        }
    }

    /// Most recent metrics snapshot, if one has arrived.
    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.metrics_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receiver that changes on every decoded metrics snapshot.
    pub fn metrics(&self) -> watch::Receiver<Option<MetricsSnapshot>> {
        self.metrics_rx.clone()
    }

    /// Receiver that changes on every connectivity transition.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected_rx.clone()
    }
}

fn error_text(payload: &Value) -> String {
    match serde_json::from_value::<ErrorEvent>(payload.clone()) {
        Ok(event) => event.error,
        Err(_) => payload.to_string(),
    }
}
