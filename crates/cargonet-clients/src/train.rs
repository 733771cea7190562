//! Train client specialization, mirroring [`crate::ship`] for the train
//! simulator dialect. Grounded on the same `SimulationClientBase` contract,
//! specialized to `TrainSimulationClient`'s event names and the two
//! terminal-arrival events it distinguishes (`trainReachedTerminal`, an
//! intermediate stop, vs `trainReachedDestination`, the final one).

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
pub struct TrainState {
    pub train_id: String,
    pub network_name: String,
    pub position: Value,
    pub containers_onboard: i64,
    pub current_terminal: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainSimulationSummaryData {
    pub network_name: String,
    pub total_trains: i64,
    pub trains_arrived: i64,
    pub average_travel_time: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainSimulationResults {
    pub network_name: String,
    pub summary: TrainSimulationSummaryData,
    pub raw: Value,
}

#[derive(Debug, Default)]
pub struct TrainStateStore {
    pub networks: RwLock<Vec<String>>,
    pub trains: RwLock<HashMap<String, HashMap<String, TrainState>>>,
    pub simulator_running: RwLock<HashMap<String, bool>>,
    pub results: RwLock<HashMap<String, TrainSimulationResults>>,
}

impl TrainStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn train_state(&self, network: &str, train_id: &str) -> Option<TrainState> {
        self.trains
            .read()
            .await
            .get(network)
            .and_then(|m| m.get(train_id))
            .cloned()
    }

    pub async fn is_running(&self, network: &str) -> bool {
        *self.simulator_running.read().await.get(network).unwrap_or(&false)
    }

    pub async fn results(&self, network: &str) -> Option<TrainSimulationResults> {
        self.results.read().await.get(network).cloned()
    }

    async fn reset(&self) {
        self.networks.write().await.clear();
        self.trains.write().await.clear();
        self.simulator_running.write().await.clear();
        self.results.write().await.clear();
    }
}

pub struct TrainSink {
    store: Arc<TrainStateStore>,
}

#[async_trait]
impl EventSink for TrainSink {
    async fn on_event(&self, base: &Arc<JsonClientBase>, name: &str, payload: &Value) {
        match name {
            "trainstate" => self.on_train_state(payload).await,
            "simulatorstate" => self.on_simulator_state(payload).await,
            "simulationresultsavailable" => self.on_results_available(payload).await,
            "trainreachedterminal" => self.on_train_reached_terminal(payload).await,
            "trainreacheddestination" => self.on_train_reached_destination(base, payload).await,
            "containersaddedtotrain" | "containersunloaded" => {
                tracing::debug!(event = name, "train container event");
            }
            "erroroccurred" => {
                if let Some(msg) = payload.get("error").and_then(Value::as_str) {
                    tracing::warn!(error = msg, "train simulator reported an error");
                }
            }
            "serverreset" => self.store.reset().await,
            "simulationpaused" | "simulationresumed" | "simulationrestarted" => {
                tracing::debug!(event = name, "train simulator lifecycle event");
            }
            _ => tracing::trace!(event = name, "unhandled train event"),
        }
    }
}

impl TrainSink {
    async fn on_train_state(&self, payload: &Value) {
        let Some(network) = payload.get("networkName").and_then(Value::as_str) else { return };
        let Some(train_id) = payload.get("trainId").and_then(Value::as_str) else { return };

        let state = TrainState {
            train_id: train_id.to_string(),
            network_name: network.to_string(),
            position: payload.get("position").cloned().unwrap_or(Value::Null),
            containers_onboard: payload
                .get("containersOnboard")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            current_terminal: payload
                .get("currentTerminal")
                .and_then(Value::as_str)
                .map(String::from),
        };

        let mut trains = self.store.trains.write().await;
        trains.entry(network.to_string()).or_default().insert(train_id.to_string(), state);
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
        let summary: TrainSimulationSummaryData = payload
            .get("summary")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let results = TrainSimulationResults {
            network_name: network.to_string(),
            summary,
            raw: payload.clone(),
        };
        self.store.results.write().await.insert(network.to_string(), results);
    }

    /// An intermediate stop: state-only, no cascaded command (unlike the
    /// final `trainReachedDestination`, which may trigger unload).
    async fn on_train_reached_terminal(&self, payload: &Value) {
        let Some(network) = payload.get("networkName").and_then(Value::as_str) else { return };
        let Some(train_id) = payload.get("trainId").and_then(Value::as_str) else { return };
        let mut trains = self.store.trains.write().await;
        if let Some(state) = trains.get_mut(network).and_then(|m| m.get_mut(train_id)) {
            state.current_terminal = payload
                .get("terminalName")
                .and_then(Value::as_str)
                .map(String::from);
        }
    }

    /// Same lock-then-drop-then-cascade shape as
    /// [`crate::ship::ShipSink::on_ship_reached_destination`].
    async fn on_train_reached_destination(&self, base: &Arc<JsonClientBase>, payload: &Value) {
        let Some(network) = payload.get("networkName").and_then(Value::as_str).map(String::from)
        else {
            return;
        };
        let Some(train_id) = payload.get("trainId").and_then(Value::as_str).map(String::from)
        else {
            return;
        };

        let pending_unload = {
            let mut trains = self.store.trains.write().await;
            let entry = trains.entry(network.clone()).or_default().entry(train_id.clone()).or_default();
            entry.current_terminal = payload
                .get("terminalName")
                .and_then(Value::as_str)
                .map(String::from);
            entry.containers_onboard > 0 && entry.current_terminal.is_some()
        };

        if !pending_unload {
            return;
        }

        let network_for_cmd = network.clone();
        let train_for_cmd = train_id.clone();
        let base_for_cmd = Arc::clone(base);
        let result = base
            .execute_serialized(move || async move {
                base_for_cmd
                    .send_command(
                        "unloadContainersFromTrainAtTerminal",
                        Some(json!({ "networkName": network_for_cmd, "trainId": train_for_cmd })),
                        None,
                    )
                    .await
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, network, train_id, "cascaded unload command failed");
        }
    }
}

pub struct TrainClient {
    base: Arc<JsonClientBase>,
    store: Arc<TrainStateStore>,
}

impl TrainClient {
    pub fn new(name: impl Into<String>, transport_config: TransportConfig, defaults: &ClientDefaults) -> Arc<Self> {
        let base = JsonClientBase::new(ClientKind::Train, name, transport_config, defaults);
        Arc::new(Self { base, store: TrainStateStore::new() })
    }

    pub async fn initialize(self: &Arc<Self>) {
        let sink = Arc::new(TrainSink { store: Arc::clone(&self.store) });
        self.base.initialize(sink).await;
    }

    pub fn store(&self) -> Arc<TrainStateStore> {
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
                &["allTrainsReachedDestination".to_string()],
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

    pub async fn add_train(&self, network_name: &str, train: Value) -> Result<Value, ClientError> {
        self.base
            .send_command_and_wait(
                "addTrainToSimulator",
                Some(json!({ "networkName": network_name, "train": train })),
                &["trainAddedToSimulator".to_string()],
                None,
                None,
            )
            .await
    }

    pub async fn add_containers(&self, network_name: &str, train_id: &str, containers: Value) -> Result<Value, ClientError> {
        self.base
            .send_command_and_wait(
                "addContainersToTrain",
                Some(json!({ "networkName": network_name, "trainId": train_id, "containers": containers })),
                &["containersAddedToTrain".to_string()],
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
    async fn train_state_event_updates_store() {
        let store = TrainStateStore::new();
        let sink = TrainSink { store: store.clone() };
        let payload = json!({
            "networkName": "net-1",
            "trainId": "train-1",
            "containersOnboard": 5,
        });
        sink.on_train_state(&payload).await;

        let state = store.train_state("net-1", "train-1").await.unwrap();
        assert_eq!(state.containers_onboard, 5);
    }

    #[tokio::test]
    async fn reached_terminal_does_not_clear_onboard_count() {
        let store = TrainStateStore::new();
        let sink = TrainSink { store: store.clone() };
        sink.on_train_state(&json!({"networkName": "n", "trainId": "t", "containersOnboard": 2})).await;
        sink.on_train_reached_terminal(&json!({"networkName": "n", "trainId": "t", "terminalName": "X"})).await;
        let state = store.train_state("n", "t").await.unwrap();
        assert_eq!(state.containers_onboard, 2);
        assert_eq!(state.current_terminal.as_deref(), Some("X"));
    }
}
