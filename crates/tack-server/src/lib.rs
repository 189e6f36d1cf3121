//! # tack-server
//!
//! Axum HTTP + `WebSocket` gateway and room event broadcasting.
//!
//! - HTTP endpoints: health check, per-room stats, Prometheus metrics
//! - `WebSocket` gateway: token auth, room membership, heartbeat, message dispatch
//! - Room broadcasting over bounded per-connection queues (serialize once, fan out)
//! - Upstream relay routing `server:*` business events into project rooms
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, TackServer};
