//! Connection manager owning the single stream session.
//!
//! External code only calls [`connect`](ConnectionManager::connect),
//! [`send`](ConnectionManager::send) and
//! [`disconnect`](ConnectionManager::disconnect); everything else
//! (session state, reconnect attempts, the transport handle) is mutated by
//! the manager's own handlers. Consumers observe it through the
//! `"connection"` and `"error"` events on the shared hub.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use healthnet_protocol::{ConnectionStatus, Envelope};

use crate::error::StreamError;
use crate::hub::{Subscription, SubscriptionHub};
use crate::reconnection::{SessionContext, cancel_reconnect, open_session};
use crate::transport::{Connector, WsConnector};
use crate::types::{ClientConfig, ConnectionState};

/// Owns one transport session and drives reconnection.
pub struct ConnectionManager {
    ctx: SessionContext,
}

impl ConnectionManager {
    /// Creates a manager that dials real WebSockets.
    pub fn new(config: ClientConfig, hub: Arc<SubscriptionHub>) -> Self {
        Self::with_connector(config, hub, Arc::new(WsConnector::default()))
    }

    /// Creates a manager on top of a custom transport.
    pub fn with_connector(
        config: ClientConfig,
        hub: Arc<SubscriptionHub>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            ctx: SessionContext::new(config, hub, connector),
        }
    }

    pub fn hub(&self) -> &Arc<SubscriptionHub> {
        &self.ctx.hub
    }

    pub fn config(&self) -> &ClientConfig {
        &self.ctx.config
    }

    /// Registers a callback on the shared hub.
    pub fn subscribe<F>(&self, event_type: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.ctx.hub.subscribe(event_type, callback)
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Reconnect attempts used since the last successful connect.
    pub fn reconnect_attempt(&self) -> u32 {
        self.ctx.attempt.load(Ordering::Acquire)
    }

    /// Endpoint target of the current (or last attempted) session.
    pub fn target(&self) -> Option<String> {
        self.ctx.target()
    }

    /// Opens a session to `target`, replacing any existing one.
    ///
    /// Resolves once the first attempt has either connected or failed; a
    /// failed attempt is reported on the `"connection"` channel and handed
    /// to the reconnection schedule rather than returned here. Only an
    /// unusable target is an error.
    pub async fn connect(&self, target: &str) -> Result<(), StreamError> {
        let url = self.ctx.config.endpoint_url(target)?;

        let generation = {
            let _t = self.ctx.transition.lock().await;
            cancel_reconnect(&self.ctx.reconnect_cancel);
            let generation = self.ctx.next_generation();

            if let Some(old) = self.ctx.client().take() {
                info!("replacing existing session");
                old.close();
            }

            self.ctx.set_target(Some(target.to_string()));
            self.ctx.attempt.store(0, Ordering::Release);
            info!(target, url = %url, "connecting");
            generation
        };

        open_session(self.ctx.clone(), generation).await;
        Ok(())
    }

    /// Sends one envelope. Fails fast with [`StreamError::NotConnected`]
    /// unless the session is open; nothing is queued for later.
    pub fn send<T: Serialize>(&self, event_type: &str, payload: &T) -> Result<(), StreamError> {
        if !self.state().is_connected() {
            return Err(StreamError::NotConnected);
        }
        let envelope = Envelope::new(event_type, payload)?;
        let client = self.ctx.client();
        let client = client.as_ref().ok_or(StreamError::NotConnected)?;
        client.send(&envelope)?;
        debug!(event_type, "envelope queued");
        Ok(())
    }

    /// Closes the session for good: cancels any pending reconnect, closes
    /// the transport and leaves the state `Disconnected`. Safe to call in
    /// any state.
    pub async fn disconnect(&self) {
        let _t = self.ctx.transition.lock().await;
        cancel_reconnect(&self.ctx.reconnect_cancel);
        self.ctx.next_generation();

        let closed = self.ctx.client().take();
        if let Some(client) = &closed {
            client.close();
        }

        self.ctx.set_state(ConnectionState::Disconnected);
        self.ctx.set_target(None);
        self.ctx.attempt.store(0, Ordering::Release);

        if closed.is_some() {
            info!("disconnected");
            self.ctx.emit_status(ConnectionStatus::disconnected());
        }
    }

    /// Tears the manager down at application shutdown.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        info!("connection manager shut down");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        cancel_reconnect(&self.ctx.reconnect_cancel);
        self.ctx.next_generation();
        if let Some(client) = self.ctx.client().take() {
            client.close();
        }
    }
}
