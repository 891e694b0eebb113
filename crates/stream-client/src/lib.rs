//! Client side of the HealthNet facility metrics stream.
//!
//! A [`ConnectionManager`] owns one WebSocket session per process and
//! reconnects with linear backoff after unplanned closes. Every inbound
//! envelope is fanned out through a shared [`SubscriptionHub`] to the
//! callbacks registered for its event type.

pub mod error;
pub mod hub;
pub mod manager;
pub(crate) mod reconnection;
pub mod transport;
pub mod types;
pub mod ws_client;

mod pumps {
    pub(crate) mod ping;
    pub(crate) mod read;
    pub(crate) mod write;
}

#[cfg(test)]
pub(crate) mod testing;

pub use error::StreamError;
pub use hub::{Subscription, SubscriptionHub};
pub use manager::ConnectionManager;
pub use transport::{Connector, Transport, WsConnector};
pub use types::{ClientConfig, ConnectionState, ReconnectConfig};
pub use ws_client::{CloseReason, WsClient};
