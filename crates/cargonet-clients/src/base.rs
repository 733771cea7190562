//! Client base: composes transport, event registry and
//! command tracker for the JSON-dialect clients (ship/train/terminal).
//! The truck client speaks a different wire dialect and is built directly
//! on [`cargonet_proto::transport`] in `truck.rs` instead of on this type.
//!
//! `initialize` wires the transport's inbound frames to a dedicated
//! dispatch task, mirroring the source's `initializeClient` two-phase
//! construction (bare shell, then signal wiring) without the circular
//! ownership a "client is its own dispatcher" design would require: the
//! transport is handed a trivial channel-forwarding dispatcher at
//! construction, and the real per-client-kind side effects are wired in
//! by `initialize`, which owns the only task that ever reads that channel.

use async_trait::async_trait;
use cargonet_config::ClientDefaults;
use cargonet_proto::{
    normalize_event_name, AmqpTransport, ClientKind, CommandEnvelope, CommandTracker,
    EventRegistry, InboundMessage, MessageDispatcher, RetryPolicy, TransportConfig,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::error::ClientError;
use crate::notify::{ClientNotification, NOTIFICATION_CHANNEL_CAPACITY};

/// Per-client-kind side effects run after `processMessage` has updated the
/// registry/tracker. Implemented by `ship::ShipSink`, `train::TrainSink`
/// and `terminal::TerminalSink`; never a trait object stored for dynamic
/// dispatch across kinds — each specialization owns exactly one concrete
/// sink, a tagged union with one `handle(event)` per kind rather than a
/// shared dynamic dispatch surface.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event(&self, base: &Arc<JsonClientBase>, name: &str, payload: &Value);
}

struct ChannelDispatcher(mpsc::UnboundedSender<InboundMessage>);

#[async_trait]
impl MessageDispatcher for ChannelDispatcher {
    async fn dispatch(&self, message: InboundMessage) {
        let _ = self.0.send(message);
    }
}

/// Shared base for the JSON-dialect client kinds.
pub struct JsonClientBase {
    pub kind: ClientKind,
    pub name: String,
    pub transport: Arc<AmqpTransport>,
    pub registry: Arc<EventRegistry>,
    pub tracker: Arc<CommandTracker>,
    /// Per-client serialization lock, held for the entire send+wait
    /// critical section of `sendCommandAndWait`.
    serialize: Mutex<()>,
    notify_tx: broadcast::Sender<ClientNotification>,
    default_timeout_ms: u64,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
}

impl JsonClientBase {
    pub fn new(
        kind: ClientKind,
        name: impl Into<String>,
        transport_config: TransportConfig,
        defaults: &ClientDefaults,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(ChannelDispatcher(tx));
        let transport = Arc::new(AmqpTransport::new(transport_config, dispatcher));
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);

        Arc::new(Self {
            kind,
            name: name.into(),
            transport,
            registry: Arc::new(EventRegistry::new()),
            tracker: Arc::new(CommandTracker::new(defaults.command_timeout_ms)),
            serialize: Mutex::new(()),
            notify_tx,
            default_timeout_ms: defaults.command_timeout_ms,
            inbound_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientNotification> {
        self.notify_tx.subscribe()
    }

    fn notify(&self, notification: ClientNotification) {
        let _ = self.notify_tx.send(notification);
    }

    /// Wires the transport's inbound frames to `sink`, spawning the single
    /// task that owns this client's inbound channel receiver. Idempotent:
    /// a second call is a no-op, since the receiver is taken exactly once.
    pub async fn initialize(self: &Arc<Self>, sink: Arc<dyn EventSink>) {
        let Some(mut rx) = self.inbound_rx.lock().await.take() else {
            return;
        };
        let base = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                base.process_message(message, &sink).await;
            }
        });
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.transport.open().await?;
        self.notify(ClientNotification::ConnectionStateChanged(
            self.transport.state(),
        ));
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move { transport.consume_loop().await });
        cargonet_proto::tracker::spawn_sweeper(Arc::clone(&self.tracker), std::time::Duration::from_secs(5));
        Ok(())
    }

    /// After reset every pending command fails and every registered event
    /// slot is dropped. The command-id counter
    /// needs no bookkeeping here since ids are UUIDs, not a reusable
    /// sequence.
    pub async fn reset(&self) {
        self.tracker.fail_all().await;
        self.registry.clear().await;
    }

    pub async fn start_heartbeat(&self, interval_secs: u64) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move { transport.start_heartbeat(interval_secs).await });
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.transport.close().await?;
        self.notify(ClientNotification::ConnectionStateChanged(
            self.transport.state(),
        ));
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.transport.state() == cargonet_proto::ConnectionState::Connected
    }

    /// Builds `{command, timestamp, clientType, commandId, params?}`,
    /// publishes it, and emits `CommandSent`/`Error` — does not wait.
    pub async fn send_command(
        &self,
        command: &str,
        params: Option<Value>,
        routing_key: Option<&str>,
    ) -> Result<String, ClientError> {
        let envelope = CommandEnvelope::new(command, self.kind, params);
        let command_id = envelope.command_id.clone();
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| ClientError::ProtocolError { detail: e.to_string() })?;

        // Tracked independently of the registry wait below: this is what
        // lets `reset` fail every in-flight command even when nobody is
        // actively waiting on it.
        let _ = self.tracker.track(command_id.clone(), None).await;

        match self
            .transport
            .publish(&bytes, "application/json", Some(command_id.clone()), routing_key)
            .await
        {
            Ok(()) => {
                self.notify(ClientNotification::CommandSent {
                    command_id: command_id.clone(),
                    command: command.to_string(),
                });
                Ok(command_id)
            }
            Err(e) => {
                self.notify(ClientNotification::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// SPEC_FULL.md 4.4 `sendCommandAndWait`: acquire the serialization
    /// lock, clear the expected-event slots, send, and wait. The lock is
    /// held for the whole critical section (Invariant 3). Returns the
    /// payload of whichever expected event satisfied the wait.
    pub async fn send_command_and_wait(
        &self,
        command: &str,
        params: Option<Value>,
        expected_events: &[String],
        timeout_ms: Option<i64>,
        routing_key: Option<&str>,
    ) -> Result<Value, ClientError> {
        if expected_events.is_empty() {
            tracing::warn!(command, "cannot wait for empty expected events list");
            return Err(ClientError::ProtocolError {
                detail: "expected_events must not be empty".to_string(),
            });
        }

        let _guard = self.serialize.lock().await;

        self.registry.clear_names(expected_events).await;

        self.send_command(command, params, routing_key).await?;

        let timeout_ms = timeout_ms.unwrap_or(self.default_timeout_ms as i64);
        match self.registry.wait_capture(expected_events, timeout_ms).await {
            Some(payload) => Ok(payload),
            None => {
                tracing::warn!(command, "timed out waiting for expected events");
                Err(ClientError::Timeout)
            }
        }
    }

    /// Runs `f` under the serialization lock, after validating the client
    /// is ready, matching `executeSerialized`'s "not ready" guard.
    pub async fn execute_serialized<F, Fut, T>(&self, f: F) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let _guard = self.serialize.lock().await;
        f().await
    }

    /// Dispatcher entry point (SPEC_FULL.md 4.4 `processMessage`): parses
    /// the JSON envelope, writes to the registry/tracker, and delegates to
    /// the client-kind sink for state-store side effects.
    async fn process_message(self: &Arc<Self>, message: InboundMessage, sink: &Arc<dyn EventSink>) {
        let value: Value = match serde_json::from_slice(&message.body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse inbound message body");
                self.notify(ClientNotification::Error(format!(
                    "protocol error: {e}"
                )));
                return;
            }
        };

        if let Some(event_name) = value.get("event").and_then(Value::as_str) {
            let normalized = normalize_event_name(event_name);
            self.registry.register(&normalized, value.clone()).await;
            self.notify(ClientNotification::Event {
                name: normalized.clone(),
                payload: value.clone(),
            });
        }

        if let Some(command_id) = value.get("commandId").and_then(Value::as_str) {
            let success = value.get("success").and_then(Value::as_bool).unwrap_or(false);
            self.tracker.reply(command_id, success, value.clone()).await;
            self.notify(ClientNotification::CommandResult {
                command_id: command_id.to_string(),
                success,
                payload: value.clone(),
            });
            if !success {
                if let Some(error) = value.get("error").and_then(Value::as_str) {
                    self.notify(ClientNotification::Error(error.to_string()));
                }
            }
        }

        if let Some(event_name) = value.get("event").and_then(Value::as_str) {
            let normalized = normalize_event_name(event_name);
            sink.on_event(self, &normalized, &value).await;
        }
    }
}

/// Retry policy used by every call site in this crate outside
/// `cargonet-proto` itself (SPEC_FULL.md 4.1.1): connection-shaped retries
/// for client-level reconnect helpers.
pub fn client_retry_policy() -> RetryPolicy {
    RetryPolicy::connection()
}
