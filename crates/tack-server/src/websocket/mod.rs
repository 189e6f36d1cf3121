//! WebSocket connection state, room registry, event dispatch, broadcasting,
//! and the per-socket session loop.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod registry;
pub mod session;
