//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON wire
//! format the rest of the product uses. Each type implements [`Default`] with
//! production default values. Types marked with `#[serde(default)]` allow
//! partial JSON — missing fields get their default value during
//! deserialization.

mod auth;
mod relay;
mod server;

pub use auth::*;
pub use relay::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the tack gateway.
///
/// Loaded from `~/.tack/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
///
/// # JSON Format
///
/// All field names are camelCase. Example:
///
/// ```json
/// {
///   "version": "0.1.0",
///   "name": "tack",
///   "server": { "port": 9090 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TackSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Server network and runtime settings.
    pub server: ServerSettings,
    /// Token verification settings.
    pub auth: AuthSettings,
    /// Upstream event relay settings.
    pub relay: RelaySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for TackSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "tack".to_string(),
            server: ServerSettings::default(),
            auth: AuthSettings::default(),
            relay: RelaySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_json_shape() {
        insta::assert_json_snapshot!(TackSettings::default(), @r###"
        {
          "version": "0.1.0",
          "name": "tack",
          "server": {
            "host": "127.0.0.1",
            "port": 8080,
            "maxConnections": 1024,
            "sendQueueSize": 1024,
            "heartbeatIntervalMs": 30000,
            "heartbeatTimeoutMs": 60000,
            "maxMessageSizeBytes": 16777216
          },
          "auth": {
            "jwtSecret": "",
            "allowAnonymous": false
          },
          "relay": {
            "enabled": false,
            "upstreamUrl": "",
            "connectTimeoutMs": 5000,
            "retryIntervalMs": 15000,
            "queueSize": 256
          },
          "logging": {
            "level": "info",
            "json": false
          }
        }
        "###);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: TackSettings =
            serde_json::from_str(r#"{"server": {"port": 9090}}"#).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.name, "tack");
    }

    #[test]
    fn roundtrip_preserves_values() {
        let mut settings = TackSettings::default();
        settings.server.port = 4321;
        settings.auth.allow_anonymous = true;
        settings.relay.upstream_url = "ws://backend:5001/socket".to_string();

        let json = serde_json::to_string(&settings).unwrap();
        let back: TackSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server.port, 4321);
        assert!(back.auth.allow_anonymous);
        assert_eq!(back.relay.upstream_url, "ws://backend:5001/socket");
    }

    #[test]
    fn camel_case_field_names() {
        let json = serde_json::to_value(TackSettings::default()).unwrap();
        assert!(json["server"].get("maxConnections").is_some());
        assert!(json["server"].get("heartbeatIntervalMs").is_some());
        assert!(json["auth"].get("jwtSecret").is_some());
        assert!(json["relay"].get("upstreamUrl").is_some());
    }
}
