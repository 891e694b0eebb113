use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use healthnet_protocol::constants::{
    DEFAULT_STREAM_INTERVAL_MS, EVENT_ALERT, EVENT_METRICS, EVENT_SUBSCRIBE, EVENT_UNSUBSCRIBE,
};
use healthnet_protocol::{Alert, MetricsSnapshot, StreamRequest};
use healthnet_stream_client::{ConnectionManager, StreamError, Subscription, SubscriptionHub};

use crate::buffer::RingBuffer;

/// Samples kept per series.
pub const HISTORY_LEN: usize = 20;

/// Alerts kept, newest first.
pub const MAX_ALERTS: usize = 5;

/// One point of a metric series. `value` is `None` when the snapshot did
/// not carry the field, so all series stay aligned on the same timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Debug)]
struct FacilityState {
    bandwidth: RingBuffer<Sample>,
    latency: RingBuffer<Sample>,
    users: RingBuffer<Sample>,
    alerts: VecDeque<Alert>,
    live: bool,
}

impl FacilityState {
    fn new() -> Self {
        Self {
            bandwidth: RingBuffer::new(HISTORY_LEN),
            latency: RingBuffer::new(HISTORY_LEN),
            users: RingBuffer::new(HISTORY_LEN),
            alerts: VecDeque::with_capacity(MAX_ALERTS),
            live: true,
        }
    }

    fn record_metrics(&mut self, snapshot: &MetricsSnapshot, at: DateTime<Utc>) {
        if !self.live {
            return;
        }
        let sample = |value| Sample { at, value };
        self.bandwidth.push(sample(snapshot.bandwidth));
        self.latency.push(sample(snapshot.latency));
        self.users.push(sample(snapshot.active_users));
    }

    fn record_alert(&mut self, alert: Alert) {
        if !self.live {
            return;
        }
        self.alerts.push_front(alert);
        self.alerts.truncate(MAX_ALERTS);
    }
}

/// Rolling per-facility dashboard state fed from the hub.
///
/// Keeps the last [`HISTORY_LEN`] samples of bandwidth, latency and active
/// users plus the [`MAX_ALERTS`] newest alerts. While paused (see
/// [`set_live`](Self::set_live)) incoming data is dropped.
pub struct FacilityMonitor {
    state: Arc<Mutex<FacilityState>>,
    _subscriptions: Vec<Subscription>,
}

impl FacilityMonitor {
    pub fn attach(hub: &Arc<SubscriptionHub>) -> Self {
        let state = Arc::new(Mutex::new(FacilityState::new()));

        let metrics_sub = {
            let state = state.clone();
            hub.subscribe(EVENT_METRICS, move |payload| {
                match serde_json::from_value::<MetricsSnapshot>(payload.clone()) {
                    Ok(snapshot) => lock(&state).record_metrics(&snapshot, Utc::now()),
                    Err(e) => warn!(error = %e, "ignoring metrics payload"),
                }
            })
        };

        let alert_sub = {
            let state = state.clone();
            hub.subscribe(EVENT_ALERT, move |payload| match decode_alert(payload) {
                Ok(alert) => {
                    debug!(severity = ?alert.severity, "alert received");
                    lock(&state).record_alert(alert);
                }
                Err(e) => warn!(error = %e, "ignoring alert payload"),
            })
        };

        Self {
            state,
            _subscriptions: vec![metrics_sub, alert_sub],
        }
    }

    pub fn is_live(&self) -> bool {
        lock(&self.state).live
    }

    pub fn set_live(&self, live: bool) {
        lock(&self.state).live = live;
        info!(live, "facility monitor live toggle");
    }

    /// Flips the live toggle and returns the new value.
    pub fn toggle_live(&self) -> bool {
        let live = !self.is_live();
        self.set_live(live);
        live
    }

    pub fn bandwidth(&self) -> Vec<Sample> {
        lock(&self.state).bandwidth.to_vec()
    }

    pub fn latency(&self) -> Vec<Sample> {
        lock(&self.state).latency.to_vec()
    }

    pub fn users(&self) -> Vec<Sample> {
        lock(&self.state).users.to_vec()
    }

    /// Recent alerts, newest first.
    pub fn alerts(&self) -> Vec<Alert> {
        lock(&self.state).alerts.iter().cloned().collect()
    }

    /// Asks the peer to push every series at `interval_ms`.
    ///
    /// Advisory only; fails with `NotConnected` when there is no session.
    pub fn request_stream(
        &self,
        manager: &ConnectionManager,
        interval_ms: u64,
    ) -> Result<(), StreamError> {
        manager.send(EVENT_SUBSCRIBE, &StreamRequest::subscribe_all(interval_ms))
    }

    /// Same as [`request_stream`](Self::request_stream) at the default cadence.
    pub fn request_default_stream(&self, manager: &ConnectionManager) -> Result<(), StreamError> {
        self.request_stream(manager, DEFAULT_STREAM_INTERVAL_MS)
    }

    pub fn release_stream(&self, manager: &ConnectionManager) -> Result<(), StreamError> {
        manager.send(EVENT_UNSUBSCRIBE, &StreamRequest::unsubscribe_all())
    }
}

fn lock(state: &Mutex<FacilityState>) -> MutexGuard<'_, FacilityState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Alerts arrive either bare or wrapped as `{"alert": {...}}`.
fn decode_alert(payload: &Value) -> Result<Alert, serde_json::Error> {
    match payload.get("alert") {
        Some(inner) => serde_json::from_value(inner.clone()),
        None => serde_json::from_value(payload.clone()),
    }
}
