//! Graceful shutdown coordination via `CancellationToken`.
//!
//! One coordinator is shared by the HTTP serve task, every WebSocket
//! session, and the upstream relay. Cancelling it stops accepting new
//! work; [`ShutdownCoordinator::graceful_shutdown`] then waits for the
//! long-running tasks to drain.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for tasks to drain before giving up.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates graceful shutdown across all server tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token to hand to a task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token and wait up to `timeout` for the given tasks to
    /// finish. Tasks still running after the timeout are left to die with
    /// the process.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let drain = futures::future::join_all(handles);

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert!(!ShutdownCoordinator::default().is_shutting_down());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn every_handed_out_token_observes_shutdown() {
        let coord = ShutdownCoordinator::new();
        let session_token = coord.token();
        let relay_token = coord.token();
        assert!(!session_token.is_cancelled());
        coord.shutdown();
        assert!(session_token.is_cancelled());
        assert!(relay_token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_on_shutdown() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();

        let task = tokio::spawn(async move {
            token.cancelled().await;
        });

        coord.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn graceful_shutdown_drains_cooperative_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();

        let task = tokio::spawn(async move {
            token.cancelled().await;
        });

        coord.graceful_shutdown(vec![task], None).await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_gives_up_on_stuck_tasks() {
        let coord = ShutdownCoordinator::new();

        // Ignores cancellation entirely.
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        coord
            .graceful_shutdown(vec![stuck], Some(Duration::from_millis(50)))
            .await;
        assert!(coord.is_shutting_down());
    }
}
