//! Per-client event registry: a map from normalized
//! event name to the latest payload observed for that name, plus a
//! condition variable equivalent (`tokio::sync::Notify`) that waiters
//! re-check against.

use crate::wire::normalize_event_name;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

pub struct EventRegistry {
    slots: Mutex<HashMap<String, Value>>,
    notify: Notify,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Write name -> payload and wake every waiter.
    pub async fn register(&self, name: &str, payload: Value) {
        let key = normalize_event_name(name);
        self.slots.lock().await.insert(key, payload);
        self.notify.notify_waiters();
    }

    pub async fn has(&self, name: &str) -> bool {
        self.slots.lock().await.contains_key(&normalize_event_name(name))
    }

    pub async fn get(&self, name: &str) -> Option<Value> {
        self.slots.lock().await.get(&normalize_event_name(name)).cloned()
    }

    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }

    pub async fn clear_names(&self, names: &[String]) {
        let mut slots = self.slots.lock().await;
        for name in names {
            slots.remove(&normalize_event_name(name));
        }
    }

    async fn take_any(&self, normalized_names: &[String]) -> Option<Value> {
        let mut slots = self.slots.lock().await;
        for name in normalized_names {
            if let Some(v) = slots.remove(name) {
                return Some(v);
            }
        }
        None
    }

    /// Wait for any of `names` to be registered.
    ///
    /// On entry, the slots for each expected name were already cleared by
    /// the caller (`sendCommandAndWait` step 2) so this only ever observes
    /// events registered *after* the wait began.
    ///
    /// `timeout_ms < 0` waits indefinitely. `timeout_ms == 0` returns
    /// immediately unless an expected event is already present.
    pub async fn wait(&self, names: &[String], timeout_ms: i64) -> bool {
        self.wait_capture(names, timeout_ms).await.is_some()
    }

    /// Like [`Self::wait`], but returns the payload of whichever expected
    /// name satisfied the wait, since the slot is consumed (removed) the
    /// moment it matches and a bare boolean would discard it.
    pub async fn wait_capture(&self, names: &[String], timeout_ms: i64) -> Option<Value> {
        if names.is_empty() {
            return None;
        }
        let normalized: Vec<String> = names.iter().map(|n| normalize_event_name(n)).collect();

        loop {
            // Register interest before checking, so a register() racing
            // with this check is never lost (tokio::sync::Notify's
            // documented check-then-wait pattern).
            let notified = self.notify.notified();
            tokio::pin!(notified);

            if let Some(v) = self.take_any(&normalized).await {
                return Some(v);
            }

            if timeout_ms == 0 {
                return None;
            }

            if timeout_ms < 0 {
                notified.await;
                continue;
            }

            let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, notified).await.is_err() {
                // Deadline elapsed; one last check in case the event landed
                // in the instant between the timeout firing and now.
                return self.take_any(&normalized).await;
            }
        }
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_true_for_already_present_event() {
        let reg = EventRegistry::new();
        reg.register("shipReachedDestination", serde_json::json!({"ok": true}))
            .await;
        let ok = reg
            .wait(&["ShipReachedDestination".to_string()], 0)
            .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn timeout_zero_returns_false_when_absent() {
        let reg = EventRegistry::new();
        let ok = reg.wait(&["nothingYet".to_string()], 0).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn empty_expected_events_returns_false() {
        let reg = EventRegistry::new();
        let ok = reg.wait(&[], 1000).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn wait_wakes_on_later_register() {
        let reg = std::sync::Arc::new(EventRegistry::new());
        let reg2 = reg.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            reg2.register("simulationCreated", serde_json::json!({})).await;
        });
        let ok = reg
            .wait(&["simulationCreated".to_string()], 2_000)
            .await;
        assert!(ok);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn wait_times_out_without_matching_event() {
        let reg = EventRegistry::new();
        let ok = reg.wait(&["neverComes".to_string()], 30).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn clear_names_drops_only_named_slots() {
        let reg = EventRegistry::new();
        reg.register("a", serde_json::json!(1)).await;
        reg.register("b", serde_json::json!(2)).await;
        reg.clear_names(&["a".to_string()]).await;
        assert!(!reg.has("a").await);
        assert!(reg.has("b").await);
    }
}
