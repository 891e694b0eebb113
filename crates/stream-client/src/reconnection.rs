//! Session lifecycle and linear-backoff reconnection.
//!
//! Contains the shared [`SessionContext`], the session opener, the close
//! handler and the backoff scheduler. Lifecycle transitions (open, close,
//! disconnect) are serialized by `SessionContext::transition`; status
//! envelopes are published while it is held so subscribers observe them
//! in transition order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use healthnet_protocol::constants::{EVENT_CONNECTION, EVENT_ERROR, RECONNECT_EXHAUSTED_MESSAGE};
use healthnet_protocol::{ConnectionStatus, ErrorEvent};

use crate::hub::SubscriptionHub;
use crate::transport::Connector;
use crate::types::{ClientConfig, ConnectionState};
use crate::ws_client::{CloseReason, WsClient};

/// Shared state handed to the close callback and the reconnect task.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) config: ClientConfig,
    pub(crate) hub: Arc<SubscriptionHub>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) client: Arc<Mutex<Option<WsClient>>>,
    pub(crate) state: Arc<RwLock<ConnectionState>>,
    pub(crate) target: Arc<RwLock<Option<String>>>,
    pub(crate) attempt: Arc<AtomicU32>,
    /// Bumped by every explicit `connect` and `disconnect`. Work started
    /// under an older generation is discarded.
    pub(crate) generation: Arc<AtomicU64>,
    pub(crate) transition: Arc<tokio::sync::Mutex<()>>,
    pub(crate) reconnect_cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl SessionContext {
    pub(crate) fn new(
        config: ClientConfig,
        hub: Arc<SubscriptionHub>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            hub,
            connector,
            client: Arc::new(Mutex::new(None)),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            target: Arc::new(RwLock::new(None)),
            attempt: Arc::new(AtomicU32::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
            transition: Arc::new(tokio::sync::Mutex::new(())),
            reconnect_cancel: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *guard != state {
            debug!(from = ?*guard, to = ?state, "connection state changed");
            *guard = state;
        }
    }

    pub(crate) fn target(&self) -> Option<String> {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_target(&self, target: Option<String>) {
        *self.target.write().unwrap_or_else(PoisonError::into_inner) = target;
    }

    pub(crate) fn client(&self) -> MutexGuard<'_, Option<WsClient>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Starts a new generation, invalidating pending opens and close callbacks.
    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn emit_status(&self, status: ConnectionStatus) {
        self.emit(EVENT_CONNECTION, &status);
    }

    pub(crate) fn emit_error(&self, message: impl Into<String>) {
        self.emit(EVENT_ERROR, &ErrorEvent::new(message));
    }

    fn emit<T: Serialize>(&self, event_type: &str, payload: &T) {
        let payload = serde_json::to_value(payload).unwrap_or(Value::Null);
        self.hub.publish(event_type, &payload);
    }
}

/// Cancels the pending backoff timer, if any.
pub(crate) fn cancel_reconnect(reconnect_cancel: &Mutex<Option<CancellationToken>>) {
    let mut guard = reconnect_cancel
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(token) = guard.take() {
        token.cancel();
    }
}

/// Opens one session for the current target.
///
/// Returns a boxed future to break the recursive type cycle with
/// [`schedule_reconnect`], which spawns this function from a timer.
pub(crate) fn open_session(
    ctx: SessionContext,
    generation: u64,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let url = {
            let _t = ctx.transition.lock().await;
            if !ctx.is_current(generation) {
                return;
            }
            let Some(target) = ctx.target() else {
                return;
            };
            let url = match ctx.config.endpoint_url(&target) {
                Ok(url) => url,
                Err(e) => {
                    warn!(target = %target, error = %e, "cannot build endpoint address");
                    return;
                }
            };
            ctx.set_state(ConnectionState::Connecting);
            url
        };

        debug!(url = %url, "opening session");
        // The transition lock is not held while the handshake is in flight.
        let result = ctx.connector.connect(&url).await;

        let _t = ctx.transition.lock().await;
        if !ctx.is_current(generation) {
            debug!(url = %url, "session superseded before it opened, discarding");
            return;
        }

        match result {
            Ok(transport) => {
                let on_close = {
                    let ctx = ctx.clone();
                    Box::new(move |reason: CloseReason| {
                        if reason == CloseReason::Local {
                            return;
                        }
                        tokio::spawn(handle_close(ctx, generation, reason));
                    })
                };
                let client = WsClient::open(transport, ctx.hub.clone(), on_close);
                *ctx.client() = Some(client);
                ctx.attempt.store(0, Ordering::Release);
                ctx.set_state(ConnectionState::Connected);
                info!(url = %url, "connected");
                ctx.emit_status(ConnectionStatus::connected());
                // Inbound frames are dispatched only after "connected" is out.
                if let Some(client) = ctx.client().as_mut() {
                    client.start_reading();
                }
            }
            Err(e) => {
                warn!(
                    url = %url,
                    attempt = ctx.attempt.load(Ordering::Acquire),
                    error = %e,
                    "connect attempt failed"
                );
                session_lost(&ctx, generation, Some(e.to_string()));
            }
        }
    })
}

/// Close callback body: runs on its own task once the read pump has exited.
async fn handle_close(ctx: SessionContext, generation: u64, reason: CloseReason) {
    let _t = ctx.transition.lock().await;
    if !ctx.is_current(generation) {
        debug!(?reason, "close from a superseded session, ignoring");
        return;
    }
    info!(?reason, "session closed");
    session_lost(&ctx, generation, reason.error_message());
}

/// Unplanned loss of the session (or failure to open one).
///
/// Caller must hold the transition lock.
fn session_lost(ctx: &SessionContext, generation: u64, error: Option<String>) {
    drop(ctx.client().take());
    ctx.set_state(ConnectionState::Disconnected);
    if let Some(error) = error {
        ctx.emit_status(ConnectionStatus::error(error));
    }
    ctx.emit_status(ConnectionStatus::disconnected());
    schedule_reconnect(ctx, generation);
}

/// Schedules the next attempt after `base_delay * attempt`, or gives up
/// once `max_attempts` have been used.
///
/// Caller must hold the transition lock.
fn schedule_reconnect(ctx: &SessionContext, generation: u64) {
    let policy = &ctx.config.reconnect;
    let used = ctx.attempt.load(Ordering::Acquire);

    if used >= policy.max_attempts {
        warn!(attempts = used, "giving up on reconnection");
        ctx.set_state(ConnectionState::Failed);
        ctx.emit_error(RECONNECT_EXHAUSTED_MESSAGE);
        return;
    }

    let attempt = used + 1;
    ctx.attempt.store(attempt, Ordering::Release);
    let delay = policy.delay_for_attempt(attempt);
    // Measured from now, not from when the timer task first runs.
    let deadline = tokio::time::Instant::now() + delay;
    ctx.set_state(ConnectionState::Reconnecting { attempt });
    info!(
        attempt,
        max_attempts = policy.max_attempts,
        delay_ms = delay.as_millis() as u64,
        "reconnecting"
    );

    let cancel = CancellationToken::new();
    {
        let mut guard = ctx
            .reconnect_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = guard.replace(cancel.clone()) {
            previous.cancel();
        }
    }

    let ctx = ctx.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(attempt, "reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep_until(deadline) => {}
        }
        if cancel.is_cancelled() {
            return;
        }
        open_session(ctx, generation).await;
    });
}
