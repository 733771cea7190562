//! Command tracker: maps a command's correlation id to a pending
//! completion slot, with a periodic sweep that times out entries whose
//! deadline has elapsed.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 1_800_000;

/// The result of a tracked command, delivered either by a matching reply
/// or by a synthesized failure on timeout/reset.
#[derive(Debug, Clone)]
pub struct CommandReply {
    pub success: bool,
    pub payload: Value,
}

impl CommandReply {
    fn timed_out() -> Self {
        Self {
            success: false,
            payload: serde_json::json!({"error": "timeout"}),
        }
    }

    fn reset() -> Self {
        Self {
            success: false,
            payload: serde_json::json!({"error": "reset"}),
        }
    }
}

struct PendingEntry {
    sender: oneshot::Sender<CommandReply>,
    deadline: Instant,
}

/// Tracks in-flight commands by correlation id: every live command has a
/// unique id, and this map enforces that at `track`.
pub struct CommandTracker {
    pending: Mutex<HashMap<String, PendingEntry>>,
    default_timeout: Duration,
}

impl CommandTracker {
    pub fn new(default_timeout_ms: u64) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            default_timeout: Duration::from_millis(default_timeout_ms),
        }
    }

    /// Begin tracking `command_id`, scheduling a timeout. Returns a
    /// receiver that resolves on `reply`, on sweep timeout, or on `reset`.
    pub async fn track(
        &self,
        command_id: String,
        timeout_ms: Option<u64>,
    ) -> oneshot::Receiver<CommandReply> {
        let timeout = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            sender: tx,
            deadline: Instant::now() + timeout,
        };
        self.pending.lock().await.insert(command_id, entry);
        rx
    }

    /// Deliver a reply for `command_id`. Returns false if the id was not
    /// (or is no longer) tracked — e.g. it already timed out.
    pub async fn reply(&self, command_id: &str, success: bool, payload: Value) -> bool {
        let entry = self.pending.lock().await.remove(command_id);
        match entry {
            Some(entry) => {
                let _ = entry.sender.send(CommandReply { success, payload });
                true
            }
            None => false,
        }
    }

    /// Remove and fail every entry whose deadline has elapsed. Returns the
    /// number of entries timed out.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut pending = self.pending.lock().await;
        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(entry) = pending.remove(id) {
                let _ = entry.sender.send(CommandReply::timed_out());
            }
        }
        expired.len()
    }

    /// Fail every pending command, as a reset must. The id counter itself lives with the caller
    /// and may be reused freely once this returns.
    pub async fn fail_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, entry) in pending.drain() {
            let _ = entry.sender.send(CommandReply::reset());
        }
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Spawn a background sweeper that periodically times out expired entries.
/// Mirrors the reactor task's own `cleanup_interval.tick()` loop, pulled out
/// into a standalone task since the tracker here is not bound to one socket.
pub fn spawn_sweeper(tracker: Arc<CommandTracker>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let expired = tracker.sweep().await;
            if expired > 0 {
                tracing::debug!(count = expired, "swept expired commands");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reply_resolves_tracked_receiver() {
        let tracker = CommandTracker::new(DEFAULT_COMMAND_TIMEOUT_MS);
        let rx = tracker.track("cmd-1".to_string(), None).await;
        assert!(tracker.reply("cmd-1", true, serde_json::json!({"ok": true})).await);
        let reply = rx.await.unwrap();
        assert!(reply.success);
    }

    #[tokio::test]
    async fn reply_to_unknown_id_is_a_noop() {
        let tracker = CommandTracker::new(DEFAULT_COMMAND_TIMEOUT_MS);
        assert!(!tracker.reply("missing", true, serde_json::json!(null)).await);
    }

    #[tokio::test]
    async fn sweep_times_out_expired_entries() {
        let tracker = CommandTracker::new(10);
        let rx = tracker.track("cmd-2".to_string(), Some(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let swept = tracker.sweep().await;
        assert_eq!(swept, 1);
        let reply = rx.await.unwrap();
        assert!(!reply.success);
    }

    #[tokio::test]
    async fn fail_all_resolves_every_pending_entry() {
        let tracker = CommandTracker::new(DEFAULT_COMMAND_TIMEOUT_MS);
        let rx1 = tracker.track("a".to_string(), None).await;
        let rx2 = tracker.track("b".to_string(), None).await;
        tracker.fail_all().await;
        assert!(!rx1.await.unwrap().success);
        assert!(!rx2.await.unwrap().success);
        assert!(tracker.is_empty().await);
    }
}
