//! Runtime server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tack_settings::TackSettings;

/// Configuration for the gateway server.
///
/// [`Default`] is tuned for tests (port 0 picks a free port); production
/// values come from [`ServerConfig::from_settings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on (0 = auto-assign).
    pub port: u16,
    /// Maximum number of concurrently registered connections.
    pub max_connections: usize,
    /// Capacity of each connection's outbound message queue.
    pub send_queue_size: usize,
    /// Heartbeat ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Time without a pong after which a connection is closed, in
    /// milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Maximum inbound WebSocket frame size in bytes.
    pub max_message_size: usize,
    /// Accept connections that present no token.
    pub allow_anonymous: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_connections: 1024,
            send_queue_size: 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size: 16 * 1024 * 1024,
            allow_anonymous: false,
        }
    }
}

impl ServerConfig {
    /// Build the runtime config from loaded settings.
    pub fn from_settings(settings: &TackSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            send_queue_size: settings.server.send_queue_size.max(1),
            heartbeat_interval_ms: settings.server.heartbeat_interval_ms.max(1),
            heartbeat_timeout_ms: settings.server.heartbeat_timeout_ms,
            max_message_size: settings.server.max_message_size_bytes,
            allow_anonymous: settings.auth.allow_anonymous,
        }
    }

    /// Heartbeat ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat liveness timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_with_random_port() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 0);
    }

    #[test]
    fn default_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.send_queue_size, 1024);
        assert_eq!(config.max_message_size, 16 * 1024 * 1024);
        assert!(!config.allow_anonymous);
    }

    #[test]
    fn default_heartbeat_durations() {
        let config = ServerConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn custom_values() {
        let config = ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 9090,
            max_connections: 5,
            ..ServerConfig::default()
        };
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn from_settings_maps_every_field() {
        let mut settings = TackSettings::default();
        settings.server.host = "0.0.0.0".to_string();
        settings.server.port = 9090;
        settings.server.max_connections = 7;
        settings.server.send_queue_size = 8;
        settings.server.heartbeat_interval_ms = 1_000;
        settings.server.heartbeat_timeout_ms = 2_000;
        settings.server.max_message_size_bytes = 1024;
        settings.auth.allow_anonymous = true;

        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.send_queue_size, 8);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_message_size, 1024);
        assert!(config.allow_anonymous);
    }

    #[test]
    fn from_settings_clamps_zero_queue_and_interval() {
        // A zero-size queue or zero-length interval would panic downstream
        // (mpsc::channel and tokio::time::interval both reject zero).
        let mut settings = TackSettings::default();
        settings.server.send_queue_size = 0;
        settings.server.heartbeat_interval_ms = 0;

        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.send_queue_size, 1);
        assert_eq!(config.heartbeat_interval_ms, 1);
    }

    #[test]
    fn serde_roundtrip() {
        let config = ServerConfig {
            port: 4242,
            allow_anonymous: true,
            ..ServerConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port, 4242);
        assert!(back.allow_anonymous);
    }

    #[test]
    fn deserialize_from_partial_json() {
        let config: ServerConfig = serde_json::from_str(r#"{"port": 3000}"#).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "127.0.0.1");
    }
}
