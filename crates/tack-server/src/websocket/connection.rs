//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tack_core::{ConnectionId, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Total queue-full drops after which a connection is considered too slow
/// to keep and is culled from the registry.
pub const MAX_TOTAL_DROPS: u64 = 100;

/// Result of a non-blocking send to a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for delivery.
    Delivered,
    /// Dropped: the outbound queue was full.
    QueueFull,
    /// The connection's writer task is gone.
    Closed,
}

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// The authenticated user, if any. Anonymous connections carry `None`
    /// and never appear in the user index.
    pub user_id: Option<UserId>,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded to the last ping.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to full channel.
    pub dropped_messages: AtomicU64,
    /// Cancelled when the registry removes this connection, telling the
    /// session tasks to close the socket.
    closing: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, user_id: Option<UserId>, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            user_id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closing: CancellationToken::new(),
        }
    }

    /// Signal the session tasks to close the underlying socket. Called by
    /// the registry when the connection is removed.
    pub fn close(&self) {
        self.closing.cancel();
    }

    /// Token cancelled once this connection is removed from the registry.
    pub fn closing(&self) -> &CancellationToken {
        &self.closing
    }

    /// Send a text message to the client without blocking.
    ///
    /// A `QueueFull` outcome increments the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> SendOutcome {
        match self.tx.try_send(message) {
            Ok(()) => SendOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::QueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Whether a send outcome means this connection should be culled from
    /// the registry. Closed channels cull immediately; full queues cull
    /// once total drops reach [`MAX_TOTAL_DROPS`].
    pub fn should_cull(&self, outcome: SendOutcome) -> bool {
        match outcome {
            SendOutcome::Delivered => false,
            SendOutcome::Closed => true,
            SendOutcome::QueueFull => self.drop_count() >= MAX_TOTAL_DROPS,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
