//! Wire protocol: inbound client frames, outbound server frames, and the
//! broadcast envelope for upstream business events.
//!
//! Client frames and server frames share one shape on the wire:
//! `{"type": "<name>", "data": {...}}`. Business events relayed from the
//! upstream backend use the envelope shape `{"event": "<name>", "data": ...}`
//! on both relay legs.

use crate::errors::ProtocolError;
use crate::ids::{ProjectId, RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound frame `type` strings.
pub mod client {
    /// Join the room for a project.
    pub const JOIN_PROJECT_ROOM: &str = "client:join_project_room";
    /// Leave the room for a project.
    pub const LEAVE_PROJECT_ROOM: &str = "client:leave_project_room";
    /// Application-level keepalive.
    pub const PING: &str = "ping";
}

/// Business event names relayed verbatim from the upstream backend.
pub mod business {
    /// A task was created on a board.
    pub const TASK_CREATED: &str = "server:task_created";
    /// A task's fields changed.
    pub const TASK_UPDATED: &str = "server:task_updated";
    /// A task moved between columns (or within one).
    pub const TASK_MOVED: &str = "server:task_moved";
    /// A task was deleted.
    pub const TASK_DELETED: &str = "server:task_deleted";
    /// A comment was added to a task.
    pub const COMMENT_ADDED: &str = "server:comment_added";
    /// Project metadata changed.
    pub const PROJECT_UPDATED: &str = "server:project_updated";
    /// A column was created on a board.
    pub const COLUMN_CREATED: &str = "server:column_created";
    /// A column's fields changed.
    pub const COLUMN_UPDATED: &str = "server:column_updated";
    /// A column was deleted.
    pub const COLUMN_DELETED: &str = "server:column_deleted";
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound frames
// ─────────────────────────────────────────────────────────────────────────────

/// A parsed inbound client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// `client:join_project_room` — subscribe to a project's room.
    JoinProjectRoom {
        /// The project whose room to join.
        project_id: ProjectId,
    },
    /// `client:leave_project_room` — unsubscribe from a project's room.
    LeaveProjectRoom {
        /// The project whose room to leave.
        project_id: ProjectId,
    },
    /// `ping` — keepalive; answered with `pong`.
    Ping,
}

impl ClientEvent {
    /// Parse a raw text frame.
    ///
    /// Error variants map one-to-one onto the `error` replies the gateway
    /// sends: non-JSON input, a missing/empty `type`, an unrecognized
    /// `type`, or a missing `project_id`.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidJson)?;

        let event_type = match value.get("type") {
            None | Some(Value::Null) => return Err(ProtocolError::MissingType),
            Some(Value::String(s)) if s.is_empty() => return Err(ProtocolError::MissingType),
            Some(Value::String(s)) => s.as_str(),
            Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
        };

        let data = value.get("data").unwrap_or(&Value::Null);
        match event_type {
            client::JOIN_PROJECT_ROOM => Ok(Self::JoinProjectRoom {
                project_id: require_project_id(data)?,
            }),
            client::LEAVE_PROJECT_ROOM => Ok(Self::LeaveProjectRoom {
                project_id: require_project_id(data)?,
            }),
            client::PING => Ok(Self::Ping),
            other => Err(ProtocolError::UnknownType(other.to_owned())),
        }
    }
}

/// Extract a non-empty `project_id` from a frame's `data` object.
///
/// Numeric keys are accepted and stringified; anything else is treated as
/// missing.
fn require_project_id(data: &Value) -> Result<ProjectId, ProtocolError> {
    match data.get("project_id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(ProjectId::from(s.as_str())),
        Some(Value::Number(n)) => Ok(ProjectId::from_string(n.to_string())),
        _ => Err(ProtocolError::MissingField("project_id")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound frames
// ─────────────────────────────────────────────────────────────────────────────

/// An outbound server frame, serialized as `{"type": ..., "data": {...}}`.
///
/// `user_id` fields are `None` for anonymous connections (serialized as
/// `null`); deployments that require authentication never produce that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Sent once after a successful connect.
    #[serde(rename = "connection:established")]
    ConnectionEstablished {
        /// The authenticated user, if any.
        user_id: Option<UserId>,
        /// Human-readable greeting.
        message: String,
    },

    /// Ack for a successful room join; includes the post-join roster.
    #[serde(rename = "room:joined")]
    RoomJoined {
        /// The room's project key.
        project_id: RoomId,
        /// Number of connections now in the room.
        room_size: usize,
        /// Distinct user IDs currently in the room.
        room_users: Vec<UserId>,
    },

    /// Ack for a successful room leave.
    #[serde(rename = "room:left")]
    RoomLeft {
        /// The room's project key.
        project_id: RoomId,
    },

    /// Fan-out to existing members when a connection joins their room.
    #[serde(rename = "room:member_joined")]
    MemberJoined {
        /// The room's project key.
        project_id: RoomId,
        /// The joiner's user, if authenticated.
        user_id: Option<UserId>,
        /// Room size after the join.
        room_size: usize,
        /// When the join happened.
        timestamp: DateTime<Utc>,
    },

    /// Fan-out to remaining members when a connection leaves their room.
    #[serde(rename = "room:member_left")]
    MemberLeft {
        /// The room's project key.
        project_id: RoomId,
        /// The leaver's user, if authenticated.
        user_id: Option<UserId>,
        /// Room size after the leave.
        room_size: usize,
        /// When the leave happened.
        timestamp: DateTime<Utc>,
    },

    /// Reply to a client `ping`.
    #[serde(rename = "pong")]
    Pong {},

    /// Structured protocol error; the connection stays open.
    #[serde(rename = "error")]
    Error {
        /// Client-facing description.
        message: String,
    },
}

impl From<ProtocolError> for ServerEvent {
    fn from(err: ProtocolError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Broadcast envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Envelope for business events: `{"event": "<name>", "data": ...}`.
///
/// Inbound relay frames parse into this shape, and room broadcasts of
/// `server:*` events serialize from it, so the payload passes through
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Business event name (`server:*`, or `join_project` upstream).
    pub event: String,
    /// Opaque payload, forwarded untouched.
    pub data: Value,
}

impl EventEnvelope {
    /// Build an envelope from a name and payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn parse_join() {
        let event = ClientEvent::parse(
            r#"{"type":"client:join_project_room","data":{"project_id":"proj-1"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinProjectRoom {
                project_id: ProjectId::from("proj-1")
            }
        );
    }

    #[test]
    fn parse_leave() {
        let event = ClientEvent::parse(
            r#"{"type":"client:leave_project_room","data":{"project_id":"proj-2"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::LeaveProjectRoom {
                project_id: ProjectId::from("proj-2")
            }
        );
    }

    #[test]
    fn parse_ping_without_data() {
        assert_eq!(ClientEvent::parse(r#"{"type":"ping"}"#).unwrap(), ClientEvent::Ping);
        assert_eq!(
            ClientEvent::parse(r#"{"type":"ping","data":{}}"#).unwrap(),
            ClientEvent::Ping
        );
    }

    #[test]
    fn parse_rejects_invalid_json() {
        assert_matches!(
            ClientEvent::parse("not json at all"),
            Err(ProtocolError::InvalidJson)
        );
    }

    #[test]
    fn parse_rejects_missing_type() {
        assert_matches!(
            ClientEvent::parse(r#"{"data":{}}"#),
            Err(ProtocolError::MissingType)
        );
        assert_matches!(
            ClientEvent::parse(r#"{"type":null}"#),
            Err(ProtocolError::MissingType)
        );
        assert_matches!(
            ClientEvent::parse(r#"{"type":""}"#),
            Err(ProtocolError::MissingType)
        );
    }

    #[test]
    fn parse_rejects_non_object_frame() {
        // Valid JSON that is not an object has no type field.
        assert_matches!(ClientEvent::parse("42"), Err(ProtocolError::MissingType));
        assert_matches!(ClientEvent::parse("[1,2]"), Err(ProtocolError::MissingType));
    }

    #[test]
    fn parse_rejects_unknown_type() {
        let err = ClientEvent::parse(r#"{"type":"client:subscribe"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unknown event type: client:subscribe");
    }

    #[test]
    fn parse_rejects_non_string_type() {
        let err = ClientEvent::parse(r#"{"type":3}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unknown event type: 3");
    }

    #[test]
    fn parse_join_requires_project_id() {
        assert_matches!(
            ClientEvent::parse(r#"{"type":"client:join_project_room","data":{}}"#),
            Err(ProtocolError::MissingField("project_id"))
        );
        assert_matches!(
            ClientEvent::parse(
                r#"{"type":"client:join_project_room","data":{"project_id":""}}"#
            ),
            Err(ProtocolError::MissingField("project_id"))
        );
        assert_matches!(
            ClientEvent::parse(r#"{"type":"client:join_project_room"}"#),
            Err(ProtocolError::MissingField("project_id"))
        );
    }

    #[test]
    fn parse_accepts_numeric_project_id() {
        let event = ClientEvent::parse(
            r#"{"type":"client:join_project_room","data":{"project_id":17}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinProjectRoom {
                project_id: ProjectId::from("17")
            }
        );
    }

    #[test]
    fn established_wire_shape() {
        let event = ServerEvent::ConnectionEstablished {
            user_id: Some(UserId::from("user-1")),
            message: "Connected to WebSocket server".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "connection:established",
                "data": {
                    "user_id": "user-1",
                    "message": "Connected to WebSocket server"
                }
            })
        );
    }

    #[test]
    fn room_joined_wire_shape() {
        let event = ServerEvent::RoomJoined {
            project_id: RoomId::from("proj-1"),
            room_size: 2,
            room_users: vec![UserId::from("alice"), UserId::from("bob")],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "room:joined",
                "data": {
                    "project_id": "proj-1",
                    "room_size": 2,
                    "room_users": ["alice", "bob"]
                }
            })
        );
    }

    #[test]
    fn member_joined_wire_shape() {
        let event = ServerEvent::MemberJoined {
            project_id: RoomId::from("proj-1"),
            user_id: Some(UserId::from("alice")),
            room_size: 3,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "room:member_joined",
                "data": {
                    "project_id": "proj-1",
                    "user_id": "alice",
                    "room_size": 3,
                    "timestamp": "2025-01-15T10:30:00Z"
                }
            })
        );
    }

    #[test]
    fn pong_wire_shape() {
        insta::assert_json_snapshot!(ServerEvent::Pong {}, @r###"
        {
          "type": "pong",
          "data": {}
        }
        "###);
    }

    #[test]
    fn error_wire_shape() {
        insta::assert_json_snapshot!(ServerEvent::from(ProtocolError::InvalidJson), @r###"
        {
          "type": "error",
          "data": {
            "message": "Invalid JSON format"
          }
        }
        "###);
    }

    #[test]
    fn server_event_roundtrip() {
        let event = ServerEvent::RoomLeft {
            project_id: RoomId::from("proj-9"),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn envelope_parses_upstream_frame() {
        let envelope: EventEnvelope = serde_json::from_str(
            r#"{"event":"server:task_created","data":{"projectId":"proj-1","title":"Ship it"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.event, business::TASK_CREATED);
        assert_eq!(envelope.data["title"], "Ship it");
    }

    #[test]
    fn envelope_serializes_payload_verbatim() {
        let envelope = EventEnvelope::new(
            business::TASK_MOVED,
            json!({"project_id": "proj-1", "from": "todo", "to": "doing"}),
        );
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "event": "server:task_moved",
                "data": {"project_id": "proj-1", "from": "todo", "to": "doing"}
            })
        );
    }
}
