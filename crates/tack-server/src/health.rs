//! Health check endpoint payload.

use std::time::Instant;

use serde::Serialize;

use crate::websocket::registry::RegistryStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "ok" when the server is responding.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Currently registered connections.
    pub total_connections: usize,
    /// Distinct users currently online.
    pub total_users: usize,
    /// Rooms with at least one member.
    pub total_rooms: usize,
}

/// Build a health check response from the server start time and a registry
/// snapshot.
pub fn health_check(start_time: Instant, stats: &RegistryStats) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        uptime_secs: start_time.elapsed().as_secs(),
        total_connections: stats.total_connections,
        total_users: stats.total_users,
        total_rooms: stats.total_rooms,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tack_core::{ConnectionId, RoomId, UserId};
    use tokio::sync::mpsc;

    use crate::websocket::connection::ClientConnection;
    use crate::websocket::registry::ClientRegistry;

    fn empty_stats() -> RegistryStats {
        ClientRegistry::new().stats()
    }

    #[test]
    fn status_is_ok() {
        let response = health_check(Instant::now(), &empty_stats());
        assert_eq!(response.status, "ok");
    }

    #[test]
    fn uptime_starts_at_zero() {
        let response = health_check(Instant::now(), &empty_stats());
        assert_eq!(response.uptime_secs, 0);
    }

    #[test]
    fn uptime_reflects_start_time() {
        let started = Instant::now()
            .checked_sub(Duration::from_secs(90))
            .expect("clock supports subtraction");
        let response = health_check(started, &empty_stats());
        assert!(response.uptime_secs >= 90);
    }

    #[tokio::test]
    async fn counts_follow_the_registry() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new(
            ConnectionId::new(),
            Some(UserId::from("alice")),
            tx,
        ));
        registry.connect(Arc::clone(&conn));
        assert!(registry.join_room(&conn.id, &RoomId::from("p1")));

        let response = health_check(Instant::now(), &registry.stats());
        assert_eq!(response.total_connections, 1);
        assert_eq!(response.total_users, 1);
        assert_eq!(response.total_rooms, 1);
    }

    #[test]
    fn serializes_expected_fields() {
        let response = health_check(Instant::now(), &empty_stats());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].is_u64());
        assert_eq!(json["total_connections"], 0);
        assert_eq!(json["total_users"], 0);
        assert_eq!(json["total_rooms"], 0);
    }
}
