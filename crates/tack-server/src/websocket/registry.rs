//! Connection, room, and user-index state.
//!
//! One registry instance tracks every client connection, the rooms they
//! have joined (keyed by project ID), and a user index mapping user IDs to
//! their open connections. All four maps live behind a single lock so every
//! mutation is transactional: no reader ever observes a half-applied join,
//! leave, or disconnect.
//!
//! Room membership notifications (`room:member_joined` / `room:member_left`)
//! are sent after the lock is released. A failed notification send marks the
//! offending connection for disconnect; the resulting cascade is processed
//! through an iterative worklist rather than recursion.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tack_core::{ConnectionId, RoomId, ServerEvent, UserId};
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// In-memory connection/room/user state behind a single lock.
#[derive(Default)]
struct RegistryInner {
    /// Every registered connection, by ID.
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    /// Rooms each connection has joined (reciprocal of `rooms`).
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
    /// Members of each room. Rooms are created lazily and removed the
    /// moment they become empty; an absent key means no room.
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    /// User ID to that user's open connections. Entries are removed the
    /// instant the last connection closes; no empty sets.
    users: HashMap<UserId, HashSet<ConnectionId>>,
}

/// Per-room fallout of a leave or disconnect, captured under the lock.
struct RoomDeparture {
    room: RoomId,
    user_id: Option<UserId>,
    /// Room size after the departure (0 means the room was deleted).
    room_size: usize,
    /// Members to notify; empty if the room was deleted.
    recipients: Vec<Arc<ClientConnection>>,
}

/// Everything removed for one connection, captured under the lock.
struct Removal {
    connection: Arc<ClientConnection>,
    departures: Vec<RoomDeparture>,
}

/// Registry of client connections, rooms, and online users.
pub struct ClientRegistry {
    inner: RwLock<RegistryInner>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Register a connection, indexing it under its user when present.
    pub fn connect(&self, connection: Arc<ClientConnection>) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let id = connection.id.clone();
        if let Some(user_id) = connection.user_id.clone() {
            let _ = inner.users.entry(user_id).or_default().insert(id.clone());
        }
        let _ = inner.memberships.insert(id.clone(), HashSet::new());
        let _ = inner.connections.insert(id.clone(), connection);
        drop(guard);
        debug!(conn_id = %id, "connection registered");
    }

    /// Remove a connection from every room it is in, the user index, and
    /// the registry itself. Idempotent: disconnecting an unknown or
    /// already-removed connection is a no-op.
    ///
    /// Remaining room members receive `room:member_left`. A failed
    /// notification send schedules that member's own disconnect; the
    /// worklist below drains such cascades without recursion.
    pub fn disconnect(&self, connection_id: &ConnectionId) {
        let mut pending = vec![connection_id.clone()];
        while let Some(id) = pending.pop() {
            let Some(removal) = self.remove_connection(&id) else {
                continue;
            };
            removal.connection.close();
            debug!(
                conn_id = %id,
                rooms = removal.departures.len(),
                "connection disconnected"
            );
            for departure in &removal.departures {
                pending.extend(self.notify_member_left(departure));
            }
        }
    }

    /// Add a connection to a room, creating the room lazily.
    ///
    /// Returns `false` (with a warning) if the connection is not
    /// registered. Existing members are notified with
    /// `room:member_joined`; the joiner is excluded.
    pub fn join_room(&self, connection_id: &ConnectionId, room: &RoomId) -> bool {
        let (user_id, room_size, recipients) = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            if !inner.connections.contains_key(connection_id) {
                warn!(conn_id = %connection_id, room = %room, "join from untracked connection, ignoring");
                return false;
            }
            let user_id = inner
                .connections
                .get(connection_id)
                .and_then(|c| c.user_id.clone());
            let members = inner.rooms.entry(room.clone()).or_default();
            let _ = members.insert(connection_id.clone());
            let room_size = members.len();
            let recipients: Vec<Arc<ClientConnection>> = members
                .iter()
                .filter(|id| *id != connection_id)
                .filter_map(|id| inner.connections.get(id).cloned())
                .collect();
            let _ = inner
                .memberships
                .entry(connection_id.clone())
                .or_default()
                .insert(room.clone());
            (user_id, room_size, recipients)
        };

        debug!(conn_id = %connection_id, room = %room, room_size, "joined room");
        let event = ServerEvent::MemberJoined {
            project_id: room.clone(),
            user_id,
            room_size,
            timestamp: Utc::now(),
        };
        for id in self.fan_out(&event, &recipients) {
            self.disconnect(&id);
        }
        true
    }

    /// Remove a connection from a room.
    ///
    /// Returns `false` if the room does not exist or the connection is not
    /// a member. Deletes the room when it becomes empty; otherwise the
    /// remaining members receive `room:member_left`.
    pub fn leave_room(&self, connection_id: &ConnectionId, room: &RoomId) -> bool {
        let departure = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            let Some(members) = inner.rooms.get_mut(room) else {
                return false;
            };
            if !members.remove(connection_id) {
                return false;
            }
            if let Some(set) = inner.memberships.get_mut(connection_id) {
                let _ = set.remove(room);
            }
            let user_id = inner
                .connections
                .get(connection_id)
                .and_then(|c| c.user_id.clone());
            let room_size = members.len();
            let recipients: Vec<Arc<ClientConnection>> = members
                .iter()
                .filter_map(|id| inner.connections.get(id).cloned())
                .collect();
            if room_size == 0 {
                let _ = inner.rooms.remove(room);
                debug!(room = %room, "room deleted (empty)");
            }
            RoomDeparture {
                room: room.clone(),
                user_id,
                room_size,
                recipients,
            }
        };

        debug!(conn_id = %connection_id, room = %room, room_size = departure.room_size, "left room");
        for id in self.notify_member_left(&departure) {
            self.disconnect(&id);
        }
        true
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Number of connections currently in a room (0 if the room is absent).
    pub fn room_size(&self, room: &RoomId) -> usize {
        self.inner.read().rooms.get(room).map_or(0, HashSet::len)
    }

    /// Distinct user IDs present in a room, sorted. Anonymous members are
    /// skipped.
    pub fn room_users(&self, room: &RoomId) -> Vec<UserId> {
        let inner = self.inner.read();
        let Some(members) = inner.rooms.get(room) else {
            return Vec::new();
        };
        let mut users: Vec<UserId> = members
            .iter()
            .filter_map(|id| inner.connections.get(id))
            .filter_map(|conn| conn.user_id.clone())
            .collect();
        users.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
        users.dedup();
        users
    }

    /// Snapshot of a room's member connections (empty if the room is
    /// absent). Callers iterate the snapshot outside the lock.
    pub fn room_members(&self, room: &RoomId) -> Option<Vec<Arc<ClientConnection>>> {
        let inner = self.inner.read();
        inner.rooms.get(room).map(|members| {
            members
                .iter()
                .filter_map(|id| inner.connections.get(id).cloned())
                .collect()
        })
    }

    /// Snapshot of one user's connections.
    pub fn user_connections(&self, user: &UserId) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.read();
        inner.users.get(user).map_or_else(Vec::new, |ids| {
            ids.iter()
                .filter_map(|id| inner.connections.get(id).cloned())
                .collect()
        })
    }

    /// Total registered connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Number of open connections for a user.
    pub fn user_connection_count(&self, user: &UserId) -> usize {
        self.inner.read().users.get(user).map_or(0, HashSet::len)
    }

    /// Whether a user has at least one open connection.
    pub fn is_user_online(&self, user: &UserId) -> bool {
        self.inner.read().users.contains_key(user)
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.inner.read().rooms.len()
    }

    /// Keys of all currently-populated rooms.
    pub fn room_keys(&self) -> Vec<RoomId> {
        self.inner.read().rooms.keys().cloned().collect()
    }

    /// Point-in-time stats snapshot. Empty rooms never appear: they are
    /// deleted on the last leave, not reported as size 0.
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.read();
        let rooms = inner
            .rooms
            .iter()
            .map(|(room, members)| {
                let users = members
                    .iter()
                    .filter_map(|id| inner.connections.get(id))
                    .filter_map(|conn| conn.user_id.as_ref())
                    .collect::<HashSet<_>>()
                    .len();
                (
                    room.as_str().to_owned(),
                    RoomStats {
                        connections: members.len(),
                        users,
                    },
                )
            })
            .collect();
        RegistryStats {
            total_connections: inner.connections.len(),
            total_users: inner.users.len(),
            total_rooms: inner.rooms.len(),
            rooms,
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Remove one connection from all four maps under a single write lock,
    /// capturing the per-room notifications to send afterwards. Returns
    /// `None` when the connection is unknown (idempotent disconnect).
    fn remove_connection(&self, connection_id: &ConnectionId) -> Option<Removal> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let connection = inner.connections.remove(connection_id)?;
        let rooms = inner.memberships.remove(connection_id).unwrap_or_default();

        let mut departures = Vec::with_capacity(rooms.len());
        for room in rooms {
            let Some(members) = inner.rooms.get_mut(&room) else {
                continue;
            };
            let _ = members.remove(connection_id);
            let room_size = members.len();
            let recipients: Vec<Arc<ClientConnection>> = members
                .iter()
                .filter_map(|id| inner.connections.get(id).cloned())
                .collect();
            if room_size == 0 {
                let _ = inner.rooms.remove(&room);
                debug!(room = %room, "room deleted (empty)");
            }
            departures.push(RoomDeparture {
                room,
                user_id: connection.user_id.clone(),
                room_size,
                recipients,
            });
        }

        if let Some(user_id) = &connection.user_id {
            if let Some(set) = inner.users.get_mut(user_id) {
                let _ = set.remove(connection_id);
                if set.is_empty() {
                    let _ = inner.users.remove(user_id);
                }
            }
        }

        Some(Removal {
            connection,
            departures,
        })
    }

    /// Send `room:member_left` for one departure, returning the IDs of
    /// members whose sends failed badly enough to cull.
    fn notify_member_left(&self, departure: &RoomDeparture) -> Vec<ConnectionId> {
        if departure.recipients.is_empty() {
            return Vec::new();
        }
        let event = ServerEvent::MemberLeft {
            project_id: departure.room.clone(),
            user_id: departure.user_id.clone(),
            room_size: departure.room_size,
            timestamp: Utc::now(),
        };
        self.fan_out(&event, &departure.recipients)
    }

    /// Serialize once and send to every recipient, collecting the IDs of
    /// connections that should be culled. Never called with a lock held.
    fn fan_out(
        &self,
        event: &ServerEvent,
        recipients: &[Arc<ClientConnection>],
    ) -> Vec<ConnectionId> {
        if recipients.is_empty() {
            return Vec::new();
        }
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize room notification");
                return Vec::new();
            }
        };
        let mut failed = Vec::new();
        for conn in recipients {
            let outcome = conn.send(json.clone());
            if conn.should_cull(outcome) {
                warn!(conn_id = %conn.id, ?outcome, "room notification failed, scheduling disconnect");
                failed.push(conn.id.clone());
            }
        }
        failed
    }

    /// Verify the cross-map invariants. Test-only.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let inner = self.inner.read();
        for (room, members) in &inner.rooms {
            assert!(!members.is_empty(), "room {room} is empty but present");
            for id in members {
                assert!(
                    inner.connections.contains_key(id),
                    "room {room} holds unknown connection {id}"
                );
                assert!(
                    inner.memberships.get(id).is_some_and(|set| set.contains(room)),
                    "connection {id} in room {room} without reciprocal membership"
                );
            }
        }
        for (id, rooms) in &inner.memberships {
            assert!(
                inner.connections.contains_key(id),
                "membership set for unknown connection {id}"
            );
            for room in rooms {
                assert!(
                    inner.rooms.get(room).is_some_and(|m| m.contains(id)),
                    "connection {id} claims membership of {room} without reciprocal entry"
                );
            }
        }
        for (user, ids) in &inner.users {
            assert!(!ids.is_empty(), "user {user} has an empty index entry");
            for id in ids {
                let conn = inner
                    .connections
                    .get(id)
                    .unwrap_or_else(|| panic!("user {user} indexes unknown connection {id}"));
                assert_eq!(conn.user_id.as_ref(), Some(user));
            }
        }
        for (id, conn) in &inner.connections {
            assert!(
                inner.memberships.contains_key(id),
                "connection {id} has no membership set"
            );
            if let Some(user) = &conn.user_id {
                assert!(
                    inner.users.get(user).is_some_and(|set| set.contains(id)),
                    "connection {id} of user {user} missing from the user index"
                );
            }
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time registry statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Registered connections.
    pub total_connections: usize,
    /// Users with at least one connection.
    pub total_users: usize,
    /// Rooms with at least one member.
    pub total_rooms: usize,
    /// Per-room breakdown, keyed by room key.
    pub rooms: BTreeMap<String, RoomStats>,
}

/// Per-room statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoomStats {
    /// Member connections.
    pub connections: usize,
    /// Distinct authenticated users among the members.
    pub users: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
