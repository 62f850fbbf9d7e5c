//! Client configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use varta_net::LinkConfig;
use varta_shared::constants::{
    DEFAULT_RELAY_PORT, DISCOVERY_TIMEOUT_MS, RECONNECT_INITIAL_MS, RECONNECT_MAX_MS,
    RELAY_WS_PATH,
};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay.
    pub relay_url: String,
    /// How long `resolve_identity` waits for a PONG.
    pub discovery_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// Database file; `None` means the platform data directory.
    pub db_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: format!("ws://127.0.0.1:{DEFAULT_RELAY_PORT}{RELAY_WS_PATH}"),
            discovery_timeout: Duration::from_millis(DISCOVERY_TIMEOUT_MS),
            reconnect_initial: Duration::from_millis(RECONNECT_INITIAL_MS),
            reconnect_max: Duration::from_millis(RECONNECT_MAX_MS),
            db_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// | Variable                      | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `VARTA_RELAY_URL`             | `ws://127.0.0.1:3000/ws` |
    /// | `VARTA_DISCOVERY_TIMEOUT_MS`  | `5000`                   |
    /// | `VARTA_RECONNECT_INITIAL_MS`  | `1000`                   |
    /// | `VARTA_RECONNECT_MAX_MS`      | `30000`                  |
    /// | `VARTA_DB_PATH`               | platform data dir        |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("VARTA_RELAY_URL") {
            if url.starts_with("ws://") || url.starts_with("wss://") {
                config.relay_url = url;
            } else {
                warn!(value = %url, "Invalid VARTA_RELAY_URL, using default");
            }
        }

        if let Some(ms) = millis_var("VARTA_DISCOVERY_TIMEOUT_MS") {
            config.discovery_timeout = ms;
        }
        if let Some(ms) = millis_var("VARTA_RECONNECT_INITIAL_MS") {
            config.reconnect_initial = ms;
        }
        if let Some(ms) = millis_var("VARTA_RECONNECT_MAX_MS") {
            config.reconnect_max = ms;
        }

        if let Ok(path) = std::env::var("VARTA_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        config
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            url: self.relay_url.clone(),
            reconnect_initial: self.reconnect_initial,
            reconnect_max: self.reconnect_max,
            ..LinkConfig::default()
        }
    }
}

fn millis_var(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            warn!(var = name, value = %raw, "Invalid duration, using default");
            None
        }
    }
}
