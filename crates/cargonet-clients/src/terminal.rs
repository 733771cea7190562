//! Terminal client specialization.
//!
//! Grounded on `TerminalSimulationClient.cpp`'s `setCostFunctionParameters`
//! (mode/attribute defaulting) and on the `PathSegment`/`Route` model
//! shapes for the local path cache backed by [`crate::graph::TerminalGraph`].

use async_trait::async_trait;
use cargonet_config::ClientDefaults;
use cargonet_proto::{ClientKind, TransportConfig};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::base::{EventSink, JsonClientBase};
use crate::error::ClientError;
use crate::graph::{Path, PathSegment, TerminalGraph};

/// `TransportationMode` numbering from the original's
/// `TransportationMode.h`: Ship=0, Truck=1, Train=2. Deliberately distinct
/// from [`cargonet_proto::ClientKind`]'s own numbering (Ship=0, Train=1,
/// Truck=2, Terminal=3) — the two enums are never interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportationMode {
    Ship = 0,
    Truck = 1,
    Train = 2,
}

impl TransportationMode {
    fn as_i32(self) -> i32 {
        self as i32
    }
}

const REQUIRED_ATTRS: &[&str] = &[
    "cost",
    "travelTime",
    "distance",
    "carbonEmissions",
    "risk",
    "energyConsumption",
    "terminalDelay",
    "terminalCost",
];

const DEFAULT_ATTR_VALUE: f64 = 1.0;

/// Fills in every required mode (`default`, plus every `TransportationMode`
/// keyed by its stringified integer) and every required attribute within
/// each mode, defaulting any missing numeric value to `1.0` — the same
/// defaulting `setCostFunctionParameters` applies before forwarding
/// parameters to the server. Modes are keyed by the stringified mode
/// integer (`"0"`/`"1"`/`"2"`), not by name, matching how the original
/// builds the wire payload (`QString::number(static_cast<int>(mode))`).
pub fn fill_cost_function_defaults(mut params: Value) -> Value {
    let obj = params.as_object_mut().map(std::mem::take).unwrap_or_default();
    let mut filled = Map::new();

    let modes: &[(String, Option<TransportationMode>)] = &[
        ("default".to_string(), None),
        (TransportationMode::Ship.as_i32().to_string(), Some(TransportationMode::Ship)),
        (TransportationMode::Truck.as_i32().to_string(), Some(TransportationMode::Truck)),
        (TransportationMode::Train.as_i32().to_string(), Some(TransportationMode::Train)),
    ];

    for (key, _) in modes {
        let mode_obj = obj
            .get(key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut filled_mode = Map::new();
        for attr in REQUIRED_ATTRS {
            let value = mode_obj
                .get(*attr)
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_ATTR_VALUE);
            filled_mode.insert(attr.to_string(), json!(value));
        }
        filled.insert(key.clone(), Value::Object(filled_mode));
    }

    params = Value::Object(filled);
    params
}

#[derive(Debug, Clone, Default)]
pub struct TerminalInfo {
    pub name: String,
    pub aliases: Vec<String>,
    pub capacity: Option<i64>,
}

#[derive(Debug, Default)]
pub struct TerminalStateStore {
    pub terminals: RwLock<HashMap<String, TerminalInfo>>,
    pub cost_function_params: RwLock<Value>,
    pub graph: RwLock<TerminalGraph>,
}

impl TerminalStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn terminal(&self, name: &str) -> Option<TerminalInfo> {
        self.terminals.read().await.get(name).cloned()
    }

    async fn reset(&self) {
        self.terminals.write().await.clear();
        *self.cost_function_params.write().await = Value::Null;
        self.graph.write().await.clear();
    }
}

pub struct TerminalSink {
    store: Arc<TerminalStateStore>,
}

#[async_trait]
impl EventSink for TerminalSink {
    async fn on_event(&self, _base: &Arc<JsonClientBase>, name: &str, payload: &Value) {
        match name {
            "terminaladded" => self.on_terminal_added(payload).await,
            "aliasadded" => self.on_alias_added(payload).await,
            "routeadded" => self.on_route_added(payload).await,
            "costfunctionupdated" => self.on_cost_function_params_set(payload).await,
            "erroroccurred" => {
                if let Some(msg) = payload.get("error").and_then(Value::as_str) {
                    tracing::warn!(error = msg, "terminal simulator reported an error");
                }
            }
            "serverreset" => self.store.reset().await,
            _ => tracing::trace!(event = name, "unhandled terminal event"),
        }
    }
}

impl TerminalSink {
    async fn on_terminal_added(&self, payload: &Value) {
        let Some(name) = payload.get("terminalName").and_then(Value::as_str) else { return };
        let info = TerminalInfo {
            name: name.to_string(),
            aliases: Vec::new(),
            capacity: payload.get("capacity").and_then(Value::as_i64),
        };
        self.store.terminals.write().await.insert(name.to_string(), info);
        self.store.graph.write().await.add_terminal(name);
    }

    async fn on_alias_added(&self, payload: &Value) {
        let Some(name) = payload.get("terminalName").and_then(Value::as_str) else { return };
        let Some(alias) = payload.get("alias").and_then(Value::as_str) else { return };
        let mut terminals = self.store.terminals.write().await;
        if let Some(info) = terminals.get_mut(name) {
            info.aliases.push(alias.to_string());
        }
    }

    async fn on_route_added(&self, payload: &Value) {
        let Some(segment_id) = payload.get("segmentId").and_then(Value::as_str) else { return };
        let Some(start) = payload.get("start").and_then(Value::as_str) else { return };
        let Some(end) = payload.get("end").and_then(Value::as_str) else { return };
        let mode = payload.get("mode").and_then(Value::as_i64).unwrap_or(0) as i32;
        let cost = payload.get("cost").and_then(Value::as_f64).unwrap_or(DEFAULT_ATTR_VALUE);

        self.store.graph.write().await.add_route(PathSegment {
            segment_id: segment_id.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            mode,
            cost,
        });
    }

    async fn on_cost_function_params_set(&self, payload: &Value) {
        *self.store.cost_function_params.write().await = payload.clone();
    }
}

pub struct TerminalClient {
    base: Arc<JsonClientBase>,
    store: Arc<TerminalStateStore>,
}

impl TerminalClient {
    pub fn new(name: impl Into<String>, transport_config: TransportConfig, defaults: &ClientDefaults) -> Arc<Self> {
        let base = JsonClientBase::new(ClientKind::Terminal, name, transport_config, defaults);
        Arc::new(Self { base, store: TerminalStateStore::new() })
    }

    pub async fn initialize(self: &Arc<Self>) {
        let sink = Arc::new(TerminalSink { store: Arc::clone(&self.store) });
        self.base.initialize(sink).await;
    }

    pub fn store(&self) -> Arc<TerminalStateStore> {
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

    pub async fn add_terminal(&self, name: &str, config: Value) -> Result<Value, ClientError> {
        self.base
            .send_command_and_wait(
                "addTerminal",
                Some(json!({ "terminalName": name, "config": config })),
                &["terminalAdded".to_string()],
                None,
                None,
            )
            .await
    }

    pub async fn add_alias(&self, name: &str, alias: &str) -> Result<Value, ClientError> {
        self.base
            .send_command_and_wait(
                "addAlias",
                Some(json!({ "terminalName": name, "alias": alias })),
                &["aliasAdded".to_string()],
                None,
                None,
            )
            .await
    }

    pub async fn add_route(&self, segment_id: &str, start: &str, end: &str, mode: i32, cost: f64) -> Result<Value, ClientError> {
        self.base
            .send_command_and_wait(
                "addRoute",
                Some(json!({
                    "segmentId": segment_id,
                    "start": start,
                    "end": end,
                    "mode": mode,
                    "cost": cost,
                })),
                &["routeAdded".to_string()],
                None,
                None,
            )
            .await
    }

    /// Fills defaults locally (so callers never need to supply every mode
    /// and attribute themselves) before sending to the server.
    pub async fn set_cost_function_parameters(&self, params: Value) -> Result<Value, ClientError> {
        let filled = fill_cost_function_defaults(params);
        self.base
            .send_command_and_wait(
                "setCostFunctionParameters",
                Some(filled),
                &["costFunctionUpdated".to_string()],
                None,
                None,
            )
            .await
    }

    /// Answered from the local graph cache; never a server round trip.
    pub async fn find_shortest_path(&self, start: &str, end: &str, mode: TransportationMode) -> Option<Path> {
        self.store.graph.read().await.shortest_path(start, end, mode.as_i32())
    }

    pub async fn find_top_paths(&self, start: &str, end: &str, mode: TransportationMode, k: usize) -> Vec<Path> {
        self.store.graph.read().await.k_shortest_paths(start, end, mode.as_i32(), k)
    }

    pub async fn serialize_graph(&self) -> Result<String, ClientError> {
        serde_json::to_string(&*self.store.graph.read().await)
            .map_err(|e| ClientError::ProtocolError { detail: e.to_string() })
    }

    pub async fn deserialize_graph(&self, json: &str) -> Result<(), ClientError> {
        let graph: TerminalGraph = serde_json::from_str(json)
            .map_err(|e| ClientError::ProtocolError { detail: e.to_string() })?;
        *self.store.graph.write().await = graph;
        Ok(())
    }

    pub async fn reset(&self) {
        self.base.reset().await;
        self.store.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_function_defaults_fill_every_mode_and_attr() {
        let params = json!({ "0": { "cost": 5.0 } });
        let filled = fill_cost_function_defaults(params);

        for mode in ["default", "0", "1", "2"] {
            let mode_obj = filled.get(mode).unwrap();
            for attr in REQUIRED_ATTRS {
                assert!(mode_obj.get(*attr).is_some(), "missing {attr} in {mode}");
            }
        }
        assert_eq!(filled["0"]["cost"], json!(5.0));
        assert_eq!(filled["1"]["cost"], json!(DEFAULT_ATTR_VALUE));
    }

    #[test]
    fn cost_function_defaults_handle_entirely_empty_input() {
        let filled = fill_cost_function_defaults(json!({}));
        assert_eq!(filled["default"]["terminalDelay"], json!(DEFAULT_ATTR_VALUE));
        assert_eq!(filled["2"]["terminalCost"], json!(DEFAULT_ATTR_VALUE));
    }

    #[tokio::test]
    async fn route_added_event_populates_graph() {
        let store = TerminalStateStore::new();
        let sink = TerminalSink { store: store.clone() };
        sink.on_route_added(&json!({
            "segmentId": "s1", "start": "A", "end": "B", "mode": 0, "cost": 2.0
        }))
        .await;

        let graph = store.graph.read().await;
        assert_eq!(graph.shortest_path("A", "B", 0).unwrap().total_cost, 2.0);
    }
}
