//! One WebSocket session, from upgrade through disconnect.
//!
//! The accept sequence closes the socket with a policy code before any
//! registration happens: `4001` for missing/invalid tokens, `4404`/`4403`
//! for workspace checks, `1013` when the server is at capacity. Accepted
//! connections get a `connection:established` frame, then an outbound
//! writer task drains the send queue while the inbound loop dispatches
//! client frames until the peer goes away.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use tack_core::constants::close;
use tack_core::{ConnectionId, ServerEvent, UserId, WorkspaceId};

use super::connection::ClientConnection;
use super::handler::handle_client_event;
use crate::auth::AccessError;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_DISCONNECTIONS_TOTAL, WS_MESSAGES_TOTAL,
};
use crate::server::AppState;

/// Query parameters accepted on the `/ws` upgrade request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsQuery {
    /// Bearer token (`?token=`).
    pub token: Option<String>,
    /// Optional workspace scope to check before accepting (`?workspace=`).
    pub workspace: Option<String>,
}

/// Drive an upgraded socket through its whole lifecycle.
#[instrument(skip_all)]
pub(crate) async fn serve_connection(socket: WebSocket, query: WsQuery, state: AppState) {
    let user_id = match authenticate(&query, &state).await {
        Ok(user_id) => user_id,
        Err((code, reason)) => {
            info!(code, reason, "rejecting connection");
            close_with(socket, code, reason).await;
            return;
        }
    };

    if state.registry.connection_count() >= state.config.max_connections {
        warn!(
            max_connections = state.config.max_connections,
            "at capacity, refusing connection"
        );
        close_with(socket, close::TRY_AGAIN_LATER, "Server at capacity").await;
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.send_queue_size);
    let connection = Arc::new(ClientConnection::new(ConnectionId::new(), user_id, send_tx));
    let session_start = Instant::now();

    info!(conn_id = %connection.id, user_id = ?connection.user_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    state.registry.connect(Arc::clone(&connection));

    // The greeting goes straight onto the socket so it beats anything a
    // concurrent broadcast may already have queued.
    let established = ServerEvent::ConnectionEstablished {
        user_id: connection.user_id.clone(),
        message: "Connected to WebSocket server".to_owned(),
    };
    match serde_json::to_string(&established) {
        Ok(json) => {
            let _ = ws_tx.send(Message::Text(json.into())).await;
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize established event"),
    }

    // Outbound writer: drains the send queue, emits protocol pings, and
    // closes the sink when the registry drops this connection or the
    // server shuts down.
    let writer_conn = Arc::clone(&connection);
    let shutdown = state.shutdown.token();
    let heartbeat_interval = state.config.heartbeat_interval();
    let heartbeat_timeout = state.config.heartbeat_timeout();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        let _ = ping_interval.tick().await; // skip the immediate first tick

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !writer_conn.check_alive()
                        && writer_conn.last_pong_elapsed() > heartbeat_timeout
                    {
                        warn!(conn_id = %writer_conn.id, "client unresponsive, closing");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = writer_conn.closing().cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                () = shutdown.cancelled() => {
                    // Well-behaved clients echo the close, which ends the
                    // receive loop below.
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Inbound loop. Malformed frames get an error reply; the connection
    // stays open until the peer leaves, the socket errors, or the registry
    // culls us.
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = connection.closing().cancelled() => break,
        };
        let Some(Ok(msg)) = msg else { break };

        let text = match msg {
            Message::Text(text) => text.to_string(),
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => text.to_owned(),
                Err(_) => {
                    debug!(conn_id = %connection.id, len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                debug!(conn_id = %connection.id, "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                continue;
            }
        };

        connection.mark_alive();
        counter!(WS_MESSAGES_TOTAL).increment(1);

        let reply = handle_client_event(&text, &connection, &state.registry, state.relay.as_ref());
        let _ = state.broadcaster.send_to_connection(&connection, &reply);
    }

    info!(conn_id = %connection.id, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(session_start.elapsed().as_secs_f64());
    outbound.abort();
    state.registry.disconnect(&connection.id);
}

/// Validate the handshake query against the verifier and access policy.
///
/// Returns the authenticated user (`None` when anonymous connections are
/// allowed), or the close code and reason to reject with.
async fn authenticate(
    query: &WsQuery,
    state: &AppState,
) -> Result<Option<UserId>, (u16, &'static str)> {
    let user_id = match query.token.as_deref() {
        None | Some("") => {
            if state.config.allow_anonymous {
                None
            } else {
                return Err((close::UNAUTHENTICATED, "Missing authentication token"));
            }
        }
        Some(token) => match state.verifier.verify(token).await {
            Ok(user_id) => Some(user_id),
            Err(e) => {
                debug!(error = %e, "token rejected");
                return Err((close::UNAUTHENTICATED, "Invalid token"));
            }
        },
    };

    if let Some(workspace) = query.workspace.as_deref().filter(|w| !w.is_empty()) {
        let workspace = WorkspaceId::from(workspace);
        if let Err(e) = state.policy.check_access(user_id.as_ref(), &workspace).await {
            return Err(match e {
                AccessError::NotFound => (close::WORKSPACE_NOT_FOUND, "Workspace not found"),
                AccessError::Denied => (close::ACCESS_DENIED, "Access denied"),
            });
        }
    }

    Ok(user_id)
}

/// Close a socket that never made it past the handshake checks.
async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
