//! JSON wire format for ship/train/terminal clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Mirrors the original `ClientType::Value` enumeration so `clientType`
/// round-trips on the wire with the same integers the simulators expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ClientKind {
    Ship = 0,
    Train = 1,
    Truck = 2,
    Terminal = 3,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Ship => "ShipClient",
            ClientKind::Train => "TrainClient",
            ClientKind::Truck => "TruckClient",
            ClientKind::Terminal => "TerminalClient",
        }
    }
}

/// Outbound command envelope: `{ command, timestamp, clientType, commandId, params? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "clientType")]
    pub client_type: ClientKind,
    #[serde(rename = "commandId")]
    pub command_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl CommandEnvelope {
    pub fn new(command: impl Into<String>, client_type: ClientKind, params: Option<Value>) -> Self {
        Self {
            command: command.into(),
            timestamp: chrono::Utc::now(),
            client_type,
            command_id: Uuid::new_v4().to_string(),
            params,
        }
    }
}

/// Inbound event envelope: `{ event, ...fields..., commandId?, success?, error? }`.
///
/// Modeled as a thin wrapper over the raw JSON object rather than a closed
/// struct, since event-specific fields vary per event name and are parsed
/// by the client-kind specialization that owns that event, not by this
/// crate.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(rename = "commandId", default)]
    pub command_id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Value,
}

impl EventEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Normalized event name, if this envelope carries one.
    pub fn normalized_event(&self) -> Option<String> {
        self.event.as_deref().map(normalize_event_name)
    }
}

/// Lowercase, strip whitespace (including internal spaces).
///
/// `"Ship Reached Destination"`, `"shipreacheddestination"` and
/// `" shipReachedDestination "` all normalize to the same key.
pub fn normalize_event_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_case_and_whitespace() {
        assert_eq!(
            normalize_event_name("Ship Reached Destination"),
            normalize_event_name("shipreacheddestination")
        );
        assert_eq!(
            normalize_event_name(" shipReachedDestination "),
            normalize_event_name("ShipReachedDestination")
        );
    }

    #[test]
    fn command_envelope_round_trips() {
        let env = CommandEnvelope::new(
            "defineSimulator",
            ClientKind::Ship,
            Some(serde_json::json!({"network": "N"})),
        );
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"command\":\"defineSimulator\""));
        assert!(json.contains("\"clientType\":0"));
    }

    #[test]
    fn event_envelope_parses_reply_fields() {
        let body = br#"{"event":"simulationCreated","commandId":"abc-123","success":true,"network":"N"}"#;
        let env = EventEnvelope::parse(body).unwrap();
        assert_eq!(env.normalized_event().unwrap(), "simulationcreated");
        assert_eq!(env.command_id.as_deref(), Some("abc-123"));
        assert_eq!(env.success, Some(true));
    }
}
