//! Monitor configuration.
//!
//! Stored as TOML at `~/.config/healthnet/monitor.toml` unless `--config`
//! points elsewhere. A missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use healthnet_protocol::constants::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY, DEFAULT_STREAM_INTERVAL_MS,
    DEFAULT_WS_URL,
};
use healthnet_stream_client::{ClientConfig, ReconnectConfig};

/// Command-line flags. Each one overrides the matching config key.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Facility to monitor
    #[arg(long)]
    pub facility: Option<String>,

    /// Base WebSocket URL of the metrics backend
    #[arg(long, env = "HEALTHNET_WS_URL")]
    pub ws_url: Option<String>,

    /// Path to the configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub ws_url: String,
    pub facility: Option<String>,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub stream_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.into(),
            facility: None,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            stream_interval_ms: DEFAULT_STREAM_INTERVAL_MS,
        }
    }
}

impl MonitorConfig {
    /// Reads `path`, or returns defaults when it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Config file, then flags (the URL flag also reads `HEALTHNET_WS_URL`).
    pub fn resolve(args: &Args) -> anyhow::Result<Self> {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => config_path(),
        };
        let mut config = Self::load_from(&path)?;
        config.apply_args(args);
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(url) = &args.ws_url {
            self.ws_url = url.clone();
        }
        if let Some(facility) = &args.facility {
            self.facility = Some(facility.clone());
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            ws_url: self.ws_url.clone(),
            reconnect: ReconnectConfig {
                max_attempts: self.max_reconnect_attempts,
                base_delay: Duration::from_millis(self.reconnect_delay_ms),
            },
        }
    }
}

/// `$HOME/.config/healthnet/monitor.toml`.
fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("healthnet")
        .join("monitor.toml")
}
