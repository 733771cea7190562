//! Ship client specialization.
//!
//! Grounded on `ShipSimulationClient.cpp`'s event switch and its
//! `onShipReachedDestination` handler, which took its data mutex, unlocked
//! it mid-handler to issue a cascaded unload command, then relocked it
//! before returning. Here the equivalent cascade drops the write guard by
//! scope instead of by hand: the guard's block ends before
//! `execute_serialized` is ever called, so there is no way to reach the
//! cascaded call while still holding the lock.

use async_trait::async_trait;
use cargonet_config::ClientDefaults;
use cargonet_proto::{ClientKind, TransportConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::base::{EventSink, JsonClientBase};
use crate::error::ClientError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipState {
    pub ship_id: String,
    pub network_name: String,
    pub position: Value,
    pub containers_onboard: i64,
    pub destination_terminal: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationSummaryData {
    pub network_name: String,
    pub total_ships: i64,
    pub ships_arrived: i64,
    pub average_travel_time: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationResults {
    pub network_name: String,
    pub summary: SimulationSummaryData,
    pub raw: Value,
}

/// State accumulated from ship events, keyed by network name and ship id,
/// the way `ShipSimulationClient` kept `QMap<QString, ShipState>` members
/// per network rather than a single flat table.
#[derive(Debug, Default)]
pub struct ShipStateStore {
    pub networks: RwLock<Vec<String>>,
    pub ships: RwLock<HashMap<String, HashMap<String, ShipState>>>,
    pub simulator_running: RwLock<HashMap<String, bool>>,
    pub results: RwLock<HashMap<String, SimulationResults>>,
}

impl ShipStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn ship_state(&self, network: &str, ship_id: &str) -> Option<ShipState> {
        self.ships
            .read()
            .await
            .get(network)
            .and_then(|m| m.get(ship_id))
            .cloned()
    }

    pub async fn is_running(&self, network: &str) -> bool {
        *self.simulator_running.read().await.get(network).unwrap_or(&false)
    }

    pub async fn results(&self, network: &str) -> Option<SimulationResults> {
        self.results.read().await.get(network).cloned()
    }

    async fn reset(&self) {
        self.networks.write().await.clear();
        self.ships.write().await.clear();
        self.simulator_running.write().await.clear();
        self.results.write().await.clear();
    }
}

pub struct ShipSink {
    store: Arc<ShipStateStore>,
}

#[async_trait]
impl EventSink for ShipSink {
    async fn on_event(&self, base: &Arc<JsonClientBase>, name: &str, payload: &Value) {
        match name {
            "shipstate" => self.on_ship_state(payload).await,
            "simulatorstate" => self.on_simulator_state(payload).await,
            "simulationresultsavailable" => self.on_results_available(payload).await,
            "shipreacheddestination" => self.on_ship_reached_destination(base, payload).await,
            "allshipsreacheddestination" => {
                tracing::info!(payload = %payload, "all ships reached destination");
            }
            "containersaddedtoship" | "containersunloaded" | "shipreachedseaport" => {
                tracing::debug!(event = name, "ship container event");
            }
            "erroroccurred" => {
                if let Some(msg) = payload.get("error").and_then(Value::as_str) {
                    tracing::warn!(error = msg, "ship simulator reported an error");
                }
            }
            "serverreset" => self.store.reset().await,
            "simulationpaused" | "simulationresumed" | "simulationrestarted" => {
                tracing::debug!(event = name, "ship simulator lifecycle event");
            }
            _ => tracing::trace!(event = name, "unhandled ship event"),
        }
    }
}

impl ShipSink {
    async fn on_ship_state(&self, payload: &Value) {
        let Some(network) = payload.get("networkName").and_then(Value::as_str) else { return };
        let Some(ship_id) = payload.get("shipId").and_then(Value::as_str) else { return };

        let state = ShipState {
            ship_id: ship_id.to_string(),
            network_name: network.to_string(),
            position: payload.get("position").cloned().unwrap_or(Value::Null),
            containers_onboard: payload
                .get("containersOnboard")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            destination_terminal: payload
                .get("destinationTerminal")
                .and_then(Value::as_str)
                .map(String::from),
        };

        let mut ships = self.store.ships.write().await;
        ships.entry(network.to_string()).or_default().insert(ship_id.to_string(), state);
    }

    async fn on_simulator_state(&self, payload: &Value) {
        let Some(network) = payload.get("networkName").and_then(Value::as_str) else { return };
        let running = payload.get("running").and_then(Value::as_bool).unwrap_or(false);
        self.store
            .simulator_running
            .write()
            .await
            .insert(network.to_string(), running);
    }

    async fn on_results_available(&self, payload: &Value) {
        let Some(network) = payload.get("networkName").and_then(Value::as_str) else { return };
        let summary: SimulationSummaryData = payload
            .get("summary")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let results = SimulationResults {
            network_name: network.to_string(),
            summary,
            raw: payload.clone(),
        };
        self.store.results.write().await.insert(network.to_string(), results);
    }

    /// Mirrors `onShipReachedDestination`'s cascade: update the ship's
    /// recorded state, then — if it has containers bound for a terminal —
    /// issue the unload command as a separate serialized round trip. The
    /// write guard is dropped (by falling out of its block) before that
    /// cascaded call, so this can never deadlock against the lock the
    /// cascaded command's own reply handler might want.
    async fn on_ship_reached_destination(&self, base: &Arc<JsonClientBase>, payload: &Value) {
        let Some(network) = payload.get("networkName").and_then(Value::as_str).map(String::from)
        else {
            return;
        };
        let Some(ship_id) = payload.get("shipId").and_then(Value::as_str).map(String::from)
        else {
            return;
        };

        let pending_unload = {
            let mut ships = self.store.ships.write().await;
            let entry = ships.entry(network.clone()).or_default().entry(ship_id.clone()).or_default();
            entry.destination_terminal = payload
                .get("destinationTerminal")
                .and_then(Value::as_str)
                .map(String::from);
            entry.containers_onboard > 0 && entry.destination_terminal.is_some()
        };

        if !pending_unload {
            return;
        }

        let network_for_cmd = network.clone();
        let ship_for_cmd = ship_id.clone();
        let base_for_cmd = Arc::clone(base);
        let result = base
            .execute_serialized(move || async move {
                base_for_cmd
                    .send_command(
                        "unloadContainersFromShipAtTerminal",
                        Some(json!({ "networkName": network_for_cmd, "shipId": ship_for_cmd })),
                        None,
                    )
                    .await
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, network, ship_id, "cascaded unload command failed");
        }
    }
}

/// Thin typed wrapper over [`JsonClientBase`] for the ship simulator
/// dialect, matching `ShipSimulationClient`'s public surface.
pub struct ShipClient {
    base: Arc<JsonClientBase>,
    store: Arc<ShipStateStore>,
}

impl ShipClient {
    pub fn new(name: impl Into<String>, transport_config: TransportConfig, defaults: &ClientDefaults) -> Arc<Self> {
        let base = JsonClientBase::new(ClientKind::Ship, name, transport_config, defaults);
        Arc::new(Self { base, store: ShipStateStore::new() })
    }

    pub async fn initialize(self: &Arc<Self>) {
        let sink = Arc::new(ShipSink { store: Arc::clone(&self.store) });
        self.base.initialize(sink).await;
    }

    pub fn store(&self) -> Arc<ShipStateStore> {
        Arc::clone(&self.store)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::notify::ClientNotification> {
        self.base.subscribe()
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.base.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.base.disconnect().await
    }

    pub async fn define_simulator(&self, network_name: &str, config: Value) -> Result<Value, ClientError> {
        self.base
            .send_command_and_wait(
                "defineSimulator",
                Some(json!({ "networkName": network_name, "config": config })),
                &["simulatorDefined".to_string()],
                None,
                None,
            )
            .await
    }

    pub async fn run_simulator(&self, network_names: &[String]) -> Result<Value, ClientError> {
        self.base
            .send_command_and_wait(
                "runSimulator",
                Some(json!({ "networkNames": network_names })),
                &["allShipsReachedDestination".to_string()],
                None,
                None,
            )
            .await
    }

    pub async fn end_simulator(&self, network_name: &str) -> Result<(), ClientError> {
        self.base
            .send_command("endSimulator", Some(json!({ "networkName": network_name })), None)
            .await?;
        Ok(())
    }

    pub async fn add_ship(&self, network_name: &str, ship: Value) -> Result<Value, ClientError> {
        self.base
            .send_command_and_wait(
                "addShipToSimulator",
                Some(json!({ "networkName": network_name, "ship": ship })),
                &["shipAddedToSimulator".to_string()],
                None,
                None,
            )
            .await
    }

    pub async fn add_containers(&self, network_name: &str, ship_id: &str, containers: Value) -> Result<Value, ClientError> {
        self.base
            .send_command_and_wait(
                "addContainersToShip",
                Some(json!({ "networkName": network_name, "shipId": ship_id, "containers": containers })),
                &["containersAddedToShip".to_string()],
                None,
                None,
            )
            .await
    }

    pub async fn reset(&self) {
        self.base.reset().await;
        self.store.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ship_state_event_updates_store() {
        let store = ShipStateStore::new();
        let sink = ShipSink { store: store.clone() };
        let payload = json!({
            "networkName": "net-1",
            "shipId": "ship-1",
            "position": {"x": 1, "y": 2},
            "containersOnboard": 3,
        });
        sink.on_ship_state(&payload).await;

        let state = store.ship_state("net-1", "ship-1").await.unwrap();
        assert_eq!(state.containers_onboard, 3);
    }

    #[tokio::test]
    async fn simulator_state_tracks_running_flag() {
        let store = ShipStateStore::new();
        let sink = ShipSink { store: store.clone() };
        sink.on_simulator_state(&json!({"networkName": "net-1", "running": true})).await;
        assert!(store.is_running("net-1").await);
        sink.on_simulator_state(&json!({"networkName": "net-1", "running": false})).await;
        assert!(!store.is_running("net-1").await);
    }

    #[tokio::test]
    async fn server_reset_clears_all_state() {
        let store = ShipStateStore::new();
        let sink = ShipSink { store: store.clone() };
        sink.on_ship_state(&json!({"networkName": "net-1", "shipId": "s1"})).await;
        sink.store.reset().await;
        assert!(store.ship_state("net-1", "s1").await.is_none());
    }
}
