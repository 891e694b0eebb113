//! HealthNet facility monitor entry point.

mod config;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use healthnet_facility_monitor::{FacilityMonitor, LiveMetrics};
use healthnet_protocol::constants::{EVENT_ALERT, EVENT_ERROR};
use healthnet_protocol::ErrorEvent;
use healthnet_stream_client::{ConnectionManager, ConnectionState, SubscriptionHub};

use config::{Args, MonitorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = MonitorConfig::resolve(&args).context("loading configuration")?;
    let facility = config
        .facility
        .clone()
        .context("no facility given (use --facility or set `facility` in the config file)")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        facility = %facility,
        ws_url = %config.ws_url,
        "starting HealthNet monitor"
    );

    let hub = SubscriptionHub::new();
    let manager = ConnectionManager::new(config.client_config(), hub.clone());
    let live = LiveMetrics::attach(&manager);
    let monitor = FacilityMonitor::attach(&hub);

    let (error_tx, mut error_rx) = mpsc::unbounded_channel::<String>();
    let _errors = hub.subscribe(EVENT_ERROR, move |payload| {
        let message = serde_json::from_value::<ErrorEvent>(payload.clone())
            .map(|e| e.error)
            .unwrap_or_else(|_| payload.to_string());
        let _ = error_tx.send(message);
    });
    let _alerts = hub.subscribe(EVENT_ALERT, |payload| {
        tracing::warn!(alert = %payload, "facility alert");
    });

    manager
        .connect(&facility)
        .await
        .with_context(|| format!("connecting to facility {facility}"))?;

    let mut connected = live.connected();
    let mut metrics = live.metrics();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break Ok(());
            }
            Ok(()) = connected.changed() => {
                let up = *connected.borrow_and_update();
                if up {
                    if let Err(e) = monitor.request_stream(&manager, config.stream_interval_ms) {
                        tracing::warn!(error = %e, "could not send stream request");
                    }
                } else if let Some(error) = live.last_error() {
                    tracing::warn!(error = %error, "stream down");
                }
            }
            Ok(()) = metrics.changed() => {
                if let Some(snapshot) = metrics.borrow_and_update().clone() {
                    tracing::info!(
                        bandwidth = ?snapshot.bandwidth,
                        latency = ?snapshot.latency,
                        active_users = ?snapshot.active_users,
                        alerts = monitor.alerts().len(),
                        "metrics"
                    );
                }
            }
            Some(error) = error_rx.recv() => {
                tracing::error!(error = %error, "stream error");
                if manager.state() == ConnectionState::Failed {
                    break Err(anyhow::anyhow!("giving up on facility {facility}: {error}"));
                }
            }
        }
    };

    if manager.is_connected() {
        if let Err(e) = monitor.release_stream(&manager) {
            tracing::debug!(error = %e, "could not send stream release");
        }
    }
    manager.shutdown().await;
    outcome
}
