//! Upstream event relay settings.

use serde::{Deserialize, Serialize};

/// Settings for the upstream backend relay connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Whether to maintain an upstream relay connection at all.
    pub enabled: bool,
    /// WebSocket URL of the upstream backend (e.g.
    /// `ws://127.0.0.1:5001/socket`).
    pub upstream_url: String,
    /// Timeout for a single connect attempt, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Interval between reconnect attempts while disconnected, in
    /// milliseconds.
    pub retry_interval_ms: u64,
    /// Capacity of the relay's inbound command queue (join intents).
    pub queue_size: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            upstream_url: String::new(),
            connect_timeout_ms: 5_000,
            retry_interval_ms: 15_000,
            queue_size: 256,
        }
    }
}
