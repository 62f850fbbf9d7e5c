//! Relay configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the relay can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use varta_shared::constants::DEFAULT_RELAY_PORT;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`, or `PORT` to bind `0.0.0.0:<PORT>`.
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Human-readable name reported by `/info`.
    /// Env: `INSTANCE_NAME`
    pub instance_name: String,

    /// Maximum number of concurrent WebSocket connections (0 = unlimited).
    /// Env: `MAX_CONNECTIONS`
    pub max_connections: usize,

    /// Outbound frames buffered per connection before frames are dropped.
    /// Env: `CHANNEL_CAPACITY`
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_RELAY_PORT).into(),
            instance_name: "VartaSphere Nexus".to_string(),
            max_connections: 0,
            channel_capacity: 256,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => config.http_addr.set_port(port),
                Err(_) => tracing::warn!(value = %port, "Invalid PORT, using default"),
            }
        }

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            if !name.is_empty() {
                config.instance_name = name;
            }
        }

        if let Ok(val) = std::env::var("MAX_CONNECTIONS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_connections = n;
            }
        }

        if let Ok(val) = std::env::var("CHANNEL_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.channel_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid CHANNEL_CAPACITY, using default"),
            }
        }

        config
    }
}
