//! Server and logging settings.
//!
//! Grouped here because logging is configured alongside the server's
//! network knobs and has no section of its own in the product config.

use serde::{Deserialize, Serialize};

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum number of concurrently registered connections; further
    /// upgrades are closed with "try again later".
    pub max_connections: usize,
    /// Capacity of each connection's outbound message queue.
    pub send_queue_size: usize,
    /// WebSocket heartbeat ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Time without a pong after which a connection is considered dead,
    /// in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Maximum inbound frame size in bytes.
    pub max_message_size_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: 1024,
            send_queue_size: 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter level (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON-formatted log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
