//! Truck client: the one client kind that does not use [`crate::base`],
//! since its wire dialect (`cargonet_proto::truck_wire`) is slash-delimited
//! rather than the JSON envelope the other three kinds share.
//!
//! Grounded on `TruckSimulationClient`/`AsyncTripManager`: a dedicated
//! trip-id space starting at 10,000, resolved by `TRIPS_INFO`/`TRIP_END`
//! messages via a pending-trip map of oneshot completions, with
//! `TRIPS_INFO`/`TRIP_INFO` updating state only (no resolution). The
//! per-client worker thread and `"*"` expansion this feeds into lives in
//! `manager.rs`.

use async_trait::async_trait;
use cargonet_proto::{AmqpTransport, InboundMessage, MessageDispatcher, TransportConfig};
use cargonet_proto::truck_wire::{TruckMessage, TruckMessageKind, TripInfoPayload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Mutex, Notify, RwLock};

use crate::error::ClientError;
use crate::sim_process::{self, SimProcessConfig};

const FIRST_TRIP_ID: i64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRequest {
    pub network_name: String,
    pub origin_id: String,
    pub destination_id: String,
    pub containers: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripResult {
    pub trip_id: i64,
    pub network_name: String,
    pub origin_id: String,
    pub destination_id: String,
    pub distance: f64,
    pub fuel_consumption: f64,
    pub travel_time: f64,
    pub successful: bool,
    pub error_message: Option<String>,
}

impl TripResult {
    fn from_payload(trip_id: i64, network_name: &str, payload: &TripInfoPayload) -> Self {
        Self {
            trip_id,
            network_name: network_name.to_string(),
            origin_id: payload.origin.clone(),
            destination_id: payload.destination.clone(),
            distance: payload.trip_distance,
            fuel_consumption: payload.fuel_consumption,
            travel_time: payload.travel_time,
            successful: true,
            error_message: None,
        }
    }

    fn failed(trip_id: i64, network_name: &str, message: impl Into<String>) -> Self {
        Self {
            trip_id,
            network_name: network_name.to_string(),
            origin_id: String::new(),
            destination_id: String::new(),
            distance: 0.0,
            fuel_consumption: 0.0,
            travel_time: 0.0,
            successful: false,
            error_message: Some(message.into()),
        }
    }
}

/// Tracks in-flight asynchronous trips, the same role `AsyncTripManager`
/// plays in the original: a trip-id counter and a map from trip id to the
/// completion side of a oneshot channel.
#[derive(Default)]
struct TripManager {
    next_id: AtomicI64,
    pending: Mutex<HashMap<i64, (String, oneshot::Sender<TripResult>)>>,
}

impl TripManager {
    fn new() -> Self {
        Self { next_id: AtomicI64::new(FIRST_TRIP_ID), pending: Mutex::new(HashMap::new()) }
    }

    async fn register(&self, network_name: &str) -> (i64, oneshot::Receiver<TripResult>) {
        let trip_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(trip_id, (network_name.to_string(), tx));
        (trip_id, rx)
    }

    async fn resolve(&self, trip_id: i64, result: TripResult) {
        if let Some((_, tx)) = self.pending.lock().await.remove(&trip_id) {
            let _ = tx.send(result);
        }
    }

    async fn fail_all(&self, message: &str) {
        let mut pending = self.pending.lock().await;
        for (trip_id, (network_name, tx)) in pending.drain() {
            let _ = tx.send(TripResult::failed(trip_id, &network_name, message));
        }
    }
}

/// Last-known sync state from the simulator, polled by
/// `manager::TruckClientManager::sync_go_once`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncState {
    pub time: f64,
    pub horizon: f64,
}

#[derive(Default)]
pub struct TruckStateStore {
    pub sync: RwLock<Option<SyncState>>,
    pub trips_in_progress: RwLock<HashMap<String, TripInfoPayload>>,
}

struct ChannelDispatcher(mpsc::UnboundedSender<InboundMessage>);

#[async_trait]
impl MessageDispatcher for ChannelDispatcher {
    async fn dispatch(&self, message: InboundMessage) {
        let _ = self.0.send(message);
    }
}

pub struct TruckClient {
    pub name: String,
    transport: Arc<AmqpTransport>,
    trips: Arc<TripManager>,
    store: Arc<TruckStateStore>,
    sync_notify: Arc<Notify>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundMessage>>>,
    sim_process_config: Option<SimProcessConfig>,
    sim_process: Mutex<Option<Child>>,
}

impl TruckClient {
    pub fn new(name: impl Into<String>, transport_config: TransportConfig) -> Arc<Self> {
        Self::with_sim_process(name, transport_config, None)
    }

    /// Like [`Self::new`], additionally owning a spawned simulator process
    /// staged next to `sim_process_config.master_file_path` on `connect()`
    /// (SPEC_FULL.md §4.5 "each truck client owns a spawned simulator
    /// process").
    pub fn with_sim_process(
        name: impl Into<String>,
        transport_config: TransportConfig,
        sim_process_config: Option<SimProcessConfig>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(ChannelDispatcher(tx));
        let transport = Arc::new(AmqpTransport::new(transport_config, dispatcher));

        Arc::new(Self {
            name: name.into(),
            transport,
            trips: Arc::new(TripManager::new()),
            store: Arc::new(TruckStateStore::default()),
            sync_notify: Arc::new(Notify::new()),
            inbound_rx: Mutex::new(Some(rx)),
            sim_process_config,
            sim_process: Mutex::new(None),
        })
    }

    pub fn store(&self) -> Arc<TruckStateStore> {
        Arc::clone(&self.store)
    }

    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        self.transport.open().await?;

        if let Some(config) = &self.sim_process_config {
            let child = sim_process::spawn_truck_simulator(config).await?;
            *self.sim_process.lock().await = Some(child);
        }

        let Some(mut rx) = self.inbound_rx.lock().await.take() else {
            return Ok(());
        };
        let client = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                client.process_message(message).await;
            }
        });

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move { transport.consume_loop().await });
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.transport.close().await?;
        if let Some(mut child) = self.sim_process.lock().await.take() {
            sim_process::kill_best_effort(&mut child).await;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.transport.state() == cargonet_proto::ConnectionState::Connected
    }

    /// Answers a `SYNC_REQ` by publishing a `GO` for the given time,
    /// letting the simulator advance past the sync barrier.
    pub async fn send_go(&self, time: f64) -> Result<(), ClientError> {
        let body = TruckMessage::build("SYNC", "GO", &time.to_string());
        self.transport.publish(body.as_bytes(), "text/plain", None, None).await?;
        Ok(())
    }

    /// Fire-and-forget trip request — no completion future, used for
    /// trips the caller does not need to await.
    pub async fn add_trip(&self, request: &TripRequest) -> Result<(), ClientError> {
        let body = TruckMessage::build(
            "TRIPS_INFO",
            "ADD_TRIP",
            &serde_json::to_string(request).map_err(|e| ClientError::ProtocolError { detail: e.to_string() })?,
        );
        self.transport.publish(body.as_bytes(), "text/plain", None, None).await?;
        Ok(())
    }

    /// Registers a pending trip and returns a future that resolves when a
    /// matching `TRIP_END` message arrives, the same contract
    /// `addTripAsync` exposed via `QFuture<TripResult>`.
    pub async fn add_trip_async(&self, request: TripRequest) -> Result<oneshot::Receiver<TripResult>, ClientError> {
        let (trip_id, rx) = self.trips.register(&request.network_name).await;
        let mut envelope = serde_json::to_value(&request)
            .map_err(|e| ClientError::ProtocolError { detail: e.to_string() })?;
        if let Some(obj) = envelope.as_object_mut() {
            obj.insert("tripId".to_string(), serde_json::json!(trip_id));
        }
        let body = TruckMessage::build("TRIPS_INFO", "ADD_TRIP", &envelope.to_string());
        self.transport.publish(body.as_bytes(), "text/plain", None, None).await?;
        Ok(rx)
    }

    /// Force-kills the owned simulator process (best-effort, per
    /// `resetServer`'s "exceptions swallowed"), fails every pending trip
    /// future, and clears local state.
    pub async fn reset(&self) {
        if let Some(mut child) = self.sim_process.lock().await.take() {
            sim_process::kill_best_effort(&mut child).await;
        }
        self.trips.fail_all("server reset").await;
        *self.store.sync.write().await = None;
        self.store.trips_in_progress.write().await.clear();
    }

    pub async fn current_sync(&self) -> Option<SyncState> {
        *self.store.sync.read().await
    }

    /// Blocks until the simulator reports a new sync state, used by
    /// `manager::TruckClientManager::sync_go_once` instead of polling.
    pub async fn wait_for_sync(&self) {
        self.sync_notify.notified().await;
    }

    async fn process_message(&self, message: InboundMessage) {
        let body = match std::str::from_utf8(&message.body) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "truck message body was not utf-8");
                return;
            }
        };

        let parsed = match TruckMessage::parse(body) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse truck message");
                return;
            }
        };

        match parsed.classify() {
            Ok(TruckMessageKind::Sync { time, horizon }) | Ok(TruckMessageKind::SyncRequest { time, horizon }) => {
                *self.store.sync.write().await = Some(SyncState { time, horizon });
                self.sync_notify.notify_waiters();
            }
            Ok(TruckMessageKind::TripEnd(payload)) => {
                if let Ok(trip_id) = payload.trip_id.parse::<i64>() {
                    let result = TripResult::from_payload(trip_id, &self.name, &payload);
                    self.trips.resolve(trip_id, result).await;
                }
                self.store.trips_in_progress.write().await.remove(&payload.trip_id);
            }
            Ok(TruckMessageKind::TripInfo(payload)) => {
                self.store.trips_in_progress.write().await.insert(payload.trip_id.clone(), payload);
            }
            Ok(TruckMessageKind::Other { msg_type, msg_code }) => {
                tracing::trace!(msg_type, msg_code, "unhandled truck message");
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not classify truck message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trip_manager_ids_start_at_ten_thousand() {
        let manager = TripManager::new();
        let (id1, _rx1) = manager.register("net").await;
        let (id2, _rx2) = manager.register("net").await;
        assert_eq!(id1, FIRST_TRIP_ID);
        assert_eq!(id2, FIRST_TRIP_ID + 1);
    }

    #[tokio::test]
    async fn resolve_completes_the_matching_future() {
        let manager = TripManager::new();
        let (trip_id, rx) = manager.register("net").await;
        let result = TripResult::from_payload(
            trip_id,
            "net",
            &TripInfoPayload {
                trip_id: trip_id.to_string(),
                origin: "A".into(),
                destination: "B".into(),
                trip_distance: 10.0,
                fuel_consumption: 1.0,
                travel_time: 100.0,
            },
        );
        manager.resolve(trip_id, result).await;
        let got = rx.await.unwrap();
        assert!(got.successful);
        assert_eq!(got.destination_id, "B");
    }

    #[tokio::test]
    async fn fail_all_resolves_pending_trips_with_failure() {
        let manager = TripManager::new();
        let (_trip_id, rx) = manager.register("net").await;
        manager.fail_all("server reset").await;
        let got = rx.await.unwrap();
        assert!(!got.successful);
        assert_eq!(got.error_message.as_deref(), Some("server reset"));
    }
}
