//! Client event dispatch — parses incoming text frames and applies room
//! operations through the registry.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use tack_core::{ClientEvent, RoomId, ServerEvent};

use super::connection::ClientConnection;
use super::registry::ClientRegistry;
use crate::relay::RelayHandle;

/// Handle one inbound frame, returning the reply to send back.
///
/// Protocol violations (bad JSON, missing or unknown event types, absent
/// `project_id`) produce an `error` reply; the connection stays open.
#[instrument(skip_all, fields(conn_id = %connection.id))]
pub fn handle_client_event(
    raw: &str,
    connection: &Arc<ClientConnection>,
    registry: &ClientRegistry,
    relay: Option<&RelayHandle>,
) -> ServerEvent {
    let event = match ClientEvent::parse(raw) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejected client frame");
            return ServerEvent::from(e);
        }
    };

    match event {
        ClientEvent::JoinProjectRoom { project_id } => {
            let room = RoomId::from(project_id);
            if registry.join_room(&connection.id, &room) {
                if let Some(relay) = relay {
                    relay.notify_join(&room);
                }
                ServerEvent::RoomJoined {
                    room_size: registry.room_size(&room),
                    room_users: registry.room_users(&room),
                    project_id: room,
                }
            } else {
                ServerEvent::Error {
                    message: "Failed to join project room".to_owned(),
                }
            }
        }
        ClientEvent::LeaveProjectRoom { project_id } => {
            let room = RoomId::from(project_id);
            if registry.leave_room(&connection.id, &room) {
                debug!(room = %room, "left project room");
                ServerEvent::RoomLeft { project_id: room }
            } else {
                ServerEvent::Error {
                    message: "Failed to leave project room".to_owned(),
                }
            }
        }
        ClientEvent::Ping => ServerEvent::Pong {},
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
