//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Inbound client frames dispatched total (counter).
pub const WS_MESSAGES_TOTAL: &str = "ws_messages_total";
/// Outbound messages dropped on full or closed queues total (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Connection lifetime in seconds, recorded at disconnect (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upstream events routed into rooms total (counter).
pub const RELAY_EVENTS_TOTAL: &str = "relay_events_total";
/// Upstream events dropped as unparseable or unroutable total (counter).
pub const RELAY_DROPPED_EVENTS_TOTAL: &str = "relay_dropped_events_total";
/// Upstream relay connection state (gauge). 1 = connected, 0 = down.
pub const RELAY_CONNECTED: &str = "relay_upstream_connected";
