//! Broadcast fan-out to rooms, users, and single connections.
//!
//! Every broadcast serializes its payload exactly once, snapshots the
//! recipient set from the registry, then pushes the shared string onto each
//! recipient's outbound queue without blocking. One slow or dead recipient
//! never prevents delivery to the rest: failed sends are logged, counted,
//! and (when the connection is beyond saving) followed by a registry
//! disconnect after the loop.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tack_core::{ConnectionId, EventEnvelope, RoomId, ServerEvent, UserId};
use tracing::{debug, warn};

use super::connection::{ClientConnection, SendOutcome};
use super::registry::ClientRegistry;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Fans messages out to room members and user connections.
#[derive(Clone)]
pub struct RoomBroadcaster {
    registry: Arc<ClientRegistry>,
}

impl RoomBroadcaster {
    /// Create a broadcaster over the given registry.
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Send a JSON message to every member of a room, optionally excluding
    /// one connection (typically the originator). Returns the number of
    /// recipients the message was queued for.
    ///
    /// Broadcasting to a room that does not exist delivers nothing and
    /// logs a warning.
    pub fn broadcast_to_room(
        &self,
        room: &RoomId,
        message: &Value,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let Some(json) = encode(message) else {
            return 0;
        };
        self.room_fan_out(room, &json, exclude)
    }

    /// Wrap a business event in the standard envelope and broadcast it to
    /// a room. Returns the number of recipients.
    pub fn publish(&self, room: &RoomId, event: &str, payload: Value) -> usize {
        let envelope = EventEnvelope::new(event, payload);
        let Some(json) = encode(&envelope) else {
            return 0;
        };
        let sent = self.room_fan_out(room, &json, None);
        debug!(room = %room, event = %envelope.event, sent, "published event to room");
        sent
    }

    /// Send a protocol event to a single connection. Returns `true` when
    /// the message was queued. A send that marks the connection for
    /// culling triggers its disconnect.
    pub fn send_to_connection(
        &self,
        connection: &Arc<ClientConnection>,
        event: &ServerEvent,
    ) -> bool {
        let Some(json) = encode(event) else {
            return false;
        };
        let outcome = connection.send(json);
        if outcome == SendOutcome::Delivered {
            return true;
        }
        metrics::counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
        warn!(conn_id = %connection.id, ?outcome, "failed to send event to connection");
        if connection.should_cull(outcome) {
            self.registry.disconnect(&connection.id);
        }
        false
    }

    /// Send a JSON message to every connection of one user. Returns the
    /// number of connections the message was queued for.
    pub fn broadcast_to_user(&self, user: &UserId, message: &Value) -> usize {
        let recipients = self.registry.user_connections(user);
        if recipients.is_empty() {
            return 0;
        }
        let Some(json) = encode(message) else {
            return 0;
        };
        self.deliver(&recipients, &json, None)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn room_fan_out(&self, room: &RoomId, json: &Arc<String>, exclude: Option<&ConnectionId>) -> usize {
        let Some(members) = self.registry.room_members(room) else {
            warn!(room = %room, "broadcast to non-existent room");
            return 0;
        };
        self.deliver(&members, json, exclude)
    }

    /// Push the shared payload to each recipient; count deliveries, cull
    /// connections whose sends failed terminally.
    fn deliver(
        &self,
        recipients: &[Arc<ClientConnection>],
        json: &Arc<String>,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let mut sent = 0;
        let mut cull = Vec::new();
        for conn in recipients {
            if exclude == Some(&conn.id) {
                continue;
            }
            match conn.send(Arc::clone(json)) {
                SendOutcome::Delivered => sent += 1,
                outcome => {
                    metrics::counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    warn!(conn_id = %conn.id, ?outcome, "failed to deliver broadcast");
                    if conn.should_cull(outcome) {
                        cull.push(conn.id.clone());
                    }
                }
            }
        }
        for id in cull {
            self.registry.disconnect(&id);
        }
        sent
    }
}

/// Serialize once; a failure is logged and drops the whole broadcast.
fn encode<T: Serialize>(value: &T) -> Option<Arc<String>> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(error = %e, "failed to serialize outbound message");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
