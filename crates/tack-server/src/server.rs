//! HTTP + WebSocket server setup.
//!
//! Routes:
//! - `GET /ws` — WebSocket upgrade (token-authenticated)
//! - `GET /health` — liveness probe with connection counts
//! - `GET /ws/stats` — per-room registry snapshot
//! - `GET /metrics` — Prometheus text exposition

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AccessPolicy, TokenVerifier};
use crate::config::ServerConfig;
use crate::health::{HealthResponse, health_check};
use crate::relay::RelayHandle;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::RoomBroadcaster;
use crate::websocket::registry::{ClientRegistry, RegistryStats};
use crate::websocket::session::{WsQuery, serve_connection};

/// Shared state for all HTTP and WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection and room registry.
    pub registry: Arc<ClientRegistry>,
    /// Room fan-out on top of the registry.
    pub broadcaster: Arc<RoomBroadcaster>,
    /// Handle to the upstream relay task, if the relay is enabled.
    pub relay: Option<RelayHandle>,
    /// Handshake token verification.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Workspace access checks.
    pub policy: Arc<dyn AccessPolicy>,
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown signal shared with every task.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server was created, for uptime reporting.
    pub start_time: Instant,
    /// Renders the `/metrics` endpoint.
    pub metrics: PrometheusHandle,
}

/// The gateway server.
pub struct TackServer {
    state: AppState,
}

impl TackServer {
    /// Assemble a server from its parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ServerConfig,
        registry: Arc<ClientRegistry>,
        broadcaster: Arc<RoomBroadcaster>,
        relay: Option<RelayHandle>,
        verifier: Arc<dyn TokenVerifier>,
        policy: Arc<dyn AccessPolicy>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            state: AppState {
                registry,
                broadcaster,
                relay,
                verifier,
                policy,
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics,
            },
        }
    }

    /// Build the Axum router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/ws/stats", get(stats_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.state.registry
    }

    /// The room broadcaster.
    pub fn broadcaster(&self) -> &Arc<RoomBroadcaster> {
        &self.state.broadcaster
    }

    /// The shutdown coordinator shared with every task.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// The active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task's
    /// join handle.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind((
            self.state.config.host.as_str(),
            self.state.config.port,
        ))
        .await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve =
                axum::serve(listener, router).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "server error");
            }
        });

        Ok((addr, handle))
    }
}

/// GET /ws — upgrade and hand the socket to the session loop.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| serve_connection(socket, query, state))
}

/// GET /health — liveness plus headline counts.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(state.start_time, &state.registry.stats()))
}

/// GET /ws/stats — full per-room snapshot.
async fn stats_handler(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.registry.stats())
}

/// GET /metrics — Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::{Value, json};
    use tack_core::{ConnectionId, RoomId, UserId};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::auth::{AllowAllPolicy, JwtTokenVerifier};
    use crate::websocket::connection::ClientConnection;

    fn make_server() -> TackServer {
        let registry = Arc::new(ClientRegistry::new());
        let broadcaster = Arc::new(RoomBroadcaster::new(Arc::clone(&registry)));
        TackServer::new(
            ServerConfig::default(),
            registry,
            broadcaster,
            None,
            Arc::new(JwtTokenVerifier::new("test-secret")),
            Arc::new(AllowAllPolicy),
            PrometheusBuilder::new().build_recorder().handle(),
        )
    }

    async fn get_json(server: &TackServer, uri: &str) -> (StatusCode, Value) {
        let response = server
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 100_000).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let server = make_server();
        let (status, body) = get_json(&server, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["total_connections"], 0);
        assert!(body["uptime_secs"].is_u64());
    }

    #[tokio::test]
    async fn stats_endpoint_starts_empty() {
        let server = make_server();
        let (status, body) = get_json(&server, "/ws/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "total_connections": 0,
                "total_users": 0,
                "total_rooms": 0,
                "rooms": {}
            })
        );
    }

    #[tokio::test]
    async fn stats_endpoint_reflects_joined_rooms() {
        let server = make_server();
        let (tx, _rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new(
            ConnectionId::new(),
            Some(UserId::from("alice")),
            tx,
        ));
        server.registry().connect(Arc::clone(&conn));
        assert!(server.registry().join_room(&conn.id, &RoomId::from("p1")));

        let (status, body) = get_json(&server, "/ws/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_connections"], 1);
        assert_eq!(body["rooms"]["p1"], json!({"connections": 1, "users": 1}));
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let server = make_server();
        let response = server
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let server = make_server();
        let (status, _) = get_json(&server, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade_headers() {
        let server = make_server();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/ws?token=whatever")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // A plain GET is not a WebSocket handshake.
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn shutdown_accessor_propagates() {
        let server = make_server();
        let token = server.shutdown().token();
        assert!(!token.is_cancelled());
        server.shutdown().shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn config_accessor_exposes_limits() {
        let server = make_server();
        assert_eq!(server.config().max_connections, 1024);
        assert_eq!(server.config().port, 0);
    }
}
