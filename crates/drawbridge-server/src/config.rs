//! Server configuration.

use std::time::Duration;

use drawbridge_bus::BusConfig;
use drawbridge_settings::BridgeSettings;

/// Configuration for the bridge server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// WebSocket ping and SSE keep-alive interval.
    pub heartbeat_interval: Duration,
    /// Largest inbound WebSocket message or `/reply` body in bytes.
    pub max_message_size: usize,
    /// Correlation bus tuning.
    pub bus: BusConfig,
}

impl ServerConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            heartbeat_interval: settings.server.heartbeat_interval(),
            max_message_size: settings.server.max_message_size,
            bus: BusConfig {
                request_timeout: settings.bus.request_timeout(),
                sweep_interval: settings.bus.sweep_interval(),
                send_queue_capacity: settings.server.send_queue_capacity,
            },
        }
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval: Duration::from_secs(30),
            max_message_size: 4 * 1024 * 1024,
            bus: BusConfig::default(),
        }
    }
}
