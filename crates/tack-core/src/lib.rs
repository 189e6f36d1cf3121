//! # tack-core
//!
//! Foundation types, branded IDs, and the wire protocol for the tack
//! real-time gateway.
//!
//! This crate provides the shared vocabulary the other tack crates depend on:
//!
//! - **Branded IDs**: `ConnectionId`, `UserId`, `ProjectId`, `RoomId`,
//!   `WorkspaceId` as newtypes for type safety
//! - **Client frames**: `ClientEvent` parsing with structured protocol errors
//! - **Server frames**: `ServerEvent` tagged `type`/`data` wire events
//! - **Broadcast envelope**: `EventEnvelope` wrapping `server:*` business events
//! - **Errors**: `ProtocolError` carrying the client-facing error messages
//! - **Close codes**: application WebSocket close codes for gateway rejections

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod ids;

pub use errors::ProtocolError;
pub use events::{ClientEvent, EventEnvelope, ServerEvent};
pub use ids::{ConnectionId, ProjectId, RoomId, UserId, WorkspaceId};
