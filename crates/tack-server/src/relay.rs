//! Upstream event relay.
//!
//! Holds one client WebSocket to the main backend, forwards join intents
//! upstream so the backend starts emitting events for those projects, and
//! routes received business events into local rooms by project key.
//!
//! The relay is deliberately non-fatal: it starts disconnected, connects
//! lazily on the first join intent, and keeps retrying on an interval while
//! down. Local clients are unaffected by upstream outages except that no
//! business events arrive.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use tack_core::{EventEnvelope, RoomId};
use tack_settings::RelaySettings;

use crate::metrics::{RELAY_CONNECTED, RELAY_DROPPED_EVENTS_TOTAL, RELAY_EVENTS_TOTAL};
use crate::websocket::broadcast::RoomBroadcaster;
use crate::websocket::registry::ClientRegistry;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event name the upstream backend expects for room subscriptions.
const UPSTREAM_JOIN_EVENT: &str = "join_project";

/// Commands sent from WebSocket sessions to the relay task.
#[derive(Debug)]
pub enum RelayCommand {
    /// A local client joined this room; subscribe upstream.
    JoinRoom(RoomId),
}

/// Cheap handle for notifying the relay task from session handlers.
#[derive(Clone)]
pub struct RelayHandle {
    cmd_tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<RelayCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Tell the relay a room gained its first (or another) member.
    ///
    /// Non-blocking; if the command queue is full the intent is dropped and
    /// the periodic re-join after reconnect covers the room instead.
    pub fn notify_join(&self, room: &RoomId) {
        if let Err(e) = self.cmd_tx.try_send(RelayCommand::JoinRoom(room.clone())) {
            warn!(room = %room, error = %e, "relay command queue unavailable, dropping join intent");
        }
    }
}

/// Relay connection parameters.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// WebSocket URL of the upstream backend.
    pub upstream_url: String,
    /// Timeout for one connect attempt.
    pub connect_timeout: Duration,
    /// Interval between reconnect attempts while disconnected.
    pub retry_interval: Duration,
    /// Capacity of the command queue feeding the relay task.
    pub queue_size: usize,
}

impl RelayConfig {
    /// Build relay parameters from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            upstream_url: settings.upstream_url.clone(),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms.max(1)),
            retry_interval: Duration::from_millis(settings.retry_interval_ms.max(1)),
            queue_size: settings.queue_size.max(1),
        }
    }
}

/// What the relay task woke up for.
enum Step {
    Cancelled,
    Command(Option<RelayCommand>),
    Upstream(Option<Result<WsMessage, WsError>>),
    Retry,
}

/// The relay task's state: the upstream socket plus everything needed to
/// route events into local rooms.
pub struct UpstreamRelay {
    config: RelayConfig,
    broadcaster: Arc<RoomBroadcaster>,
    registry: Arc<ClientRegistry>,
    cmd_rx: mpsc::Receiver<RelayCommand>,
    socket: Option<UpstreamSocket>,
}

impl UpstreamRelay {
    /// Create the relay task state and the handle sessions use to reach it.
    pub fn new(
        config: RelayConfig,
        broadcaster: Arc<RoomBroadcaster>,
        registry: Arc<ClientRegistry>,
    ) -> (Self, RelayHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.queue_size.max(1));
        let relay = Self {
            config,
            broadcaster,
            registry,
            cmd_rx,
            socket: None,
        };
        (relay, RelayHandle::new(cmd_tx))
    }

    /// Run the relay until `cancel` fires or every handle is dropped.
    #[instrument(skip_all, name = "upstream_relay")]
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut retry = tokio::time::interval(self.config.retry_interval);
        let _ = retry.tick().await; // first connect happens lazily, not at startup

        loop {
            let disconnected = self.socket.is_none();
            let step = tokio::select! {
                () = cancel.cancelled() => Step::Cancelled,
                cmd = self.cmd_rx.recv() => Step::Command(cmd),
                msg = next_frame(&mut self.socket) => Step::Upstream(msg),
                _ = retry.tick(), if disconnected => Step::Retry,
            };

            match step {
                Step::Cancelled | Step::Command(None) => break,
                Step::Command(Some(RelayCommand::JoinRoom(room))) => {
                    if self.socket.is_none() {
                        self.try_connect().await;
                    }
                    self.send_join(&room).await;
                }
                Step::Upstream(msg) => self.handle_upstream(msg),
                Step::Retry => self.try_connect().await,
            }
        }

        info!("upstream relay stopped");
    }

    /// One connect attempt, bounded by the configured timeout. On success
    /// the relay re-subscribes every currently populated room so events
    /// keep flowing after a reconnect.
    async fn try_connect(&mut self) {
        let url = self.config.upstream_url.clone();
        match tokio::time::timeout(self.config.connect_timeout, connect_async(&url)).await {
            Ok(Ok((socket, _response))) => {
                info!(url = %url, "connected to upstream");
                gauge!(RELAY_CONNECTED).set(1.0);
                self.socket = Some(socket);
                for room in self.registry.room_keys() {
                    self.send_join(&room).await;
                }
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "upstream connection failed");
            }
            Err(_) => {
                warn!(url = %url, timeout = ?self.config.connect_timeout, "upstream connection timed out");
            }
        }
    }

    /// Forward one join intent upstream. No-op while disconnected; the
    /// reconnect path re-joins all populated rooms anyway.
    async fn send_join(&mut self, room: &RoomId) {
        let Some(socket) = self.socket.as_mut() else {
            debug!(room = %room, "upstream offline, join deferred to reconnect");
            return;
        };
        let frame = json!({"event": UPSTREAM_JOIN_EVENT, "data": room.as_str()});
        if let Err(e) = socket.send(WsMessage::text(frame.to_string())).await {
            warn!(room = %room, error = %e, "failed to send upstream join");
            self.drop_socket();
        } else {
            debug!(room = %room, "subscribed upstream");
        }
    }

    /// React to one upstream read: route text frames, drop the socket on
    /// close or error.
    fn handle_upstream(&mut self, msg: Option<Result<WsMessage, WsError>>) {
        match msg {
            Some(Ok(WsMessage::Text(text))) => self.route_event(text.as_str()),
            Some(Ok(WsMessage::Close(_))) | None => {
                warn!("upstream connection closed");
                self.drop_socket();
            }
            Some(Ok(_)) => {} // ping/pong/binary from upstream carry nothing we route
            Some(Err(e)) => {
                warn!(error = %e, "upstream read error");
                self.drop_socket();
            }
        }
    }

    /// Parse one upstream business event and broadcast it to the room its
    /// project key names. Unparseable or unroutable events are dropped
    /// with a warning.
    fn route_event(&self, raw: &str) {
        let envelope: EventEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "unparseable upstream frame, dropping");
                counter!(RELAY_DROPPED_EVENTS_TOTAL).increment(1);
                return;
            }
        };

        let Some(key) = routing_key(&envelope.data) else {
            warn!(event = %envelope.event, "upstream event carries no project key, cannot route");
            counter!(RELAY_DROPPED_EVENTS_TOTAL).increment(1);
            return;
        };

        counter!(RELAY_EVENTS_TOTAL).increment(1);
        let room = RoomId::from_string(key);
        let sent = self
            .broadcaster
            .publish(&room, &envelope.event, envelope.data);
        debug!(room = %room, event = %envelope.event, sent, "routed upstream event");
    }

    fn drop_socket(&mut self) {
        if self.socket.take().is_some() {
            gauge!(RELAY_CONNECTED).set(0.0);
        }
    }
}

/// Next frame from the upstream socket. Pends forever while disconnected
/// so the select loop keeps serving commands and retry ticks.
async fn next_frame(socket: &mut Option<UpstreamSocket>) -> Option<Result<WsMessage, WsError>> {
    match socket.as_mut() {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}

/// Extract the room routing key from a business event payload.
///
/// Checks `projectId`, `project_id`, then `_id`. Non-empty strings are
/// taken as-is; numbers are stringified; anything else falls through to
/// the next key.
pub fn routing_key(payload: &Value) -> Option<String> {
    const KEYS: [&str; 3] = ["projectId", "project_id", "_id"];
    for key in KEYS {
        match payload.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
