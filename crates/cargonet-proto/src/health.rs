//! Connection-state and liveness tracking.
//!
//! Health is derived from recent successes/failures, not raw socket state —
//! a TCP connection can be technically open while the peer has stopped
//! answering. Mirrors the reactor client's own health tracker, generalized
//! from a single DEALER socket to one tracker per AMQP connection half.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Connection state machine.
///
/// `Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected`,
/// with reconnection re-entering at `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        }
    }
}

/// Atomic health tracker for one transport half (send or receive).
pub struct HealthTracker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    last_success: RwLock<Option<Instant>>,
    max_failures: u32,
}

impl HealthTracker {
    pub fn new(max_failures: u32) -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            consecutive_failures: AtomicU32::new(0),
            last_success: RwLock::new(None),
            max_failures,
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub async fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.last_success.write().await = Some(Instant::now());
        self.set_state(ConnectionState::Connected);
    }

    /// Returns true if this failure pushed the tracker past `max_failures`,
    /// i.e. the connection half should be considered dead and reconnected.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.max_failures {
            self.set_state(ConnectionState::Disconnecting);
            true
        } else {
            false
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn reset_failures(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    pub async fn last_success(&self) -> Option<Instant> {
        *self.last_success.read().await
    }

    pub async fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "state": self.state().as_str(),
            "consecutiveFailures": self.consecutive_failures(),
            "hasEverSucceeded": self.last_success().await.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_resets_failures_and_marks_connected() {
        let tracker = HealthTracker::new(3);
        tracker.record_failure();
        tracker.record_failure();
        tracker.record_success().await;
        assert_eq!(tracker.consecutive_failures(), 0);
        assert_eq!(tracker.state(), ConnectionState::Connected);
    }

    #[test]
    fn max_failures_marks_disconnecting() {
        let tracker = HealthTracker::new(3);
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(tracker.record_failure());
        assert_eq!(tracker.state(), ConnectionState::Disconnecting);
    }
}
