//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Track connection state (Connecting → Authenticating → Active → Closing → Closed)
//! - Generate unique connection IDs for backend correlation
//! - Enforce the session limit and count live sessions for shutdown

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;

/// Source of connection IDs. Relaxed: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier of a chat session, unique within the process.
///
/// Sent to the backend with every call, never echoed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade accepted, session not started yet.
    Connecting,
    /// Waiting for `authorize_connection` to complete.
    Authenticating,
    /// Hello sent; client calls are routed.
    Active,
    /// Close frame queued; no more frames are read.
    Closing,
    /// Socket gone.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Active => "active",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Tracks live sessions for backpressure and graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Current count of live sessions.
    active_count: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a session slot. Returns `None` when `limit` sessions are already live.
    ///
    /// The slot is released when the returned guard is dropped.
    pub fn try_track(&self, limit: usize) -> Option<ConnectionGuard> {
        let mut prev = self.active_count.load(Ordering::Relaxed);
        loop {
            if prev >= limit {
                return None;
            }
            match self.active_count.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        metrics::record_connection_opened();
        Some(ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        })
    }

    /// Get current live session count.
    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all sessions are closed or the deadline passes.
    ///
    /// Returns `true` if every session finished in time.
    pub async fn wait_for_drain(&self, deadline: Duration) -> bool {
        let drained = async {
            while self.active_count.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Guard that tracks a session's lifetime.
/// Decrements the live count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicUsize>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::record_connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.as_str().parse::<u64>().is_ok());
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.try_track(10).unwrap();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.try_track(10).unwrap();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn connection_tracker_enforces_limit() {
        let tracker = ConnectionTracker::new();
        let _g1 = tracker.try_track(2).unwrap();
        let g2 = tracker.try_track(2).unwrap();
        assert!(tracker.try_track(2).is_none());

        drop(g2);
        assert!(tracker.try_track(2).is_some());
    }

    #[tokio::test]
    async fn drain_completes_when_guards_drop() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.try_track(1).unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });
        assert!(tracker.wait_for_drain(Duration::from_secs(2)).await);
    }
}
