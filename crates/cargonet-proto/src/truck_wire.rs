//! Slash-delimited wire format for the truck client.
//!
//! Fields are separated by `/`; positions 2 and 3 hold message type and
//! code, position 8 carries the payload. This is the one client-kind that
//! does not speak the JSON envelope in `wire.rs`.

use crate::error::TransportError;
use serde::{Deserialize, Serialize};

pub const MIN_FIELDS: usize = 9;

/// A parsed truck-dialect message.
#[derive(Debug, Clone)]
pub struct TruckMessage {
    pub fields: Vec<String>,
}

impl TruckMessage {
    pub fn parse(body: &str) -> Result<Self, TransportError> {
        let fields: Vec<String> = body.split('/').map(|s| s.to_string()).collect();
        if fields.len() < MIN_FIELDS {
            return Err(TransportError::InvalidBody(format!(
                "truck message has {} fields, need at least {MIN_FIELDS}",
                fields.len()
            )));
        }
        Ok(Self { fields })
    }

    pub fn msg_type(&self) -> &str {
        &self.fields[2]
    }

    pub fn msg_code(&self) -> &str {
        &self.fields[3]
    }

    fn field(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).map(String::as_str)
    }

    /// Classify into the subset of the dialect this core understands.
    pub fn classify(&self) -> Result<TruckMessageKind, TransportError> {
        match (self.msg_type(), self.msg_code()) {
            ("SYNC", "SYNC_REQ") | ("SYNC", "SYNC") => {
                let time = self.parse_f64_field(8)?;
                let horizon = self.parse_f64_field(9)?;
                if self.msg_code() == "SYNC_REQ" {
                    Ok(TruckMessageKind::SyncRequest { time, horizon })
                } else {
                    Ok(TruckMessageKind::Sync { time, horizon })
                }
            }
            ("TRIPS_INFO", "TRIP_END") => {
                let payload = self.parse_trip_payload()?;
                Ok(TruckMessageKind::TripEnd(payload))
            }
            ("TRIPS_INFO", "TRIP_INFO") => {
                let payload = self.parse_trip_payload()?;
                Ok(TruckMessageKind::TripInfo(payload))
            }
            (t, c) => Ok(TruckMessageKind::Other {
                msg_type: t.to_string(),
                msg_code: c.to_string(),
            }),
        }
    }

    fn parse_f64_field(&self, idx: usize) -> Result<f64, TransportError> {
        self.field(idx)
            .ok_or_else(|| TransportError::InvalidBody(format!("missing field {idx}")))?
            .parse::<f64>()
            .map_err(|e| TransportError::InvalidBody(format!("field {idx} not numeric: {e}")))
    }

    fn parse_trip_payload(&self) -> Result<TripInfoPayload, TransportError> {
        let raw = self
            .field(8)
            .ok_or_else(|| TransportError::InvalidBody("missing trip payload field".into()))?;
        serde_json::from_str(raw)
            .map_err(|e| TransportError::InvalidBody(format!("invalid trip payload json: {e}")))
    }

    /// Build a slash-delimited message from a type/code/payload, leaving
    /// fields 0/1/4..7 as empty placeholders the way the wire format
    /// reserves them for routing metadata this core does not interpret.
    pub fn build(msg_type: &str, msg_code: &str, payload: &str) -> String {
        let mut fields = vec![String::new(); MIN_FIELDS];
        fields[2] = msg_type.to_string();
        fields[3] = msg_code.to_string();
        fields[8] = payload.to_string();
        fields.join("/")
    }
}

/// The payload carried by `TRIPS_INFO` messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripInfoPayload {
    #[serde(rename = "Trip_ID")]
    pub trip_id: String,
    #[serde(rename = "Origin")]
    pub origin: String,
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Trip_Distance")]
    pub trip_distance: f64,
    #[serde(rename = "Fuel_Consumption")]
    pub fuel_consumption: f64,
    #[serde(rename = "Travel_Time")]
    pub travel_time: f64,
}

/// Messages this core acts on; anything else is passed through as `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum TruckMessageKind {
    /// Simulator reporting its current time/horizon.
    Sync { time: f64, horizon: f64 },
    /// Simulator asking the manager to advance (`syncGoOnce` target).
    SyncRequest { time: f64, horizon: f64 },
    /// Final trip completion — resolves a pending `addTripAsync` future.
    TripEnd(TripInfoPayload),
    /// Incremental trip state update — state-store only, no future resolution.
    TripInfo(TripInfoPayload),
    Other { msg_type: String, msg_code: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_req_body() -> String {
        // fields 0..8, with SYNC/SYNC_REQ at 2/3 and time/horizon at 8/9
        "h/c/SYNC/SYNC_REQ/f4/f5/f6/f7/120.5/3600".to_string()
    }

    #[test]
    fn parses_sync_req_time_and_horizon() {
        let msg = TruckMessage::parse(&sync_req_body()).unwrap();
        assert_eq!(msg.msg_type(), "SYNC");
        assert_eq!(msg.msg_code(), "SYNC_REQ");
        match msg.classify().unwrap() {
            TruckMessageKind::SyncRequest { time, horizon } => {
                assert_eq!(time, 120.5);
                assert_eq!(horizon, 3600.0);
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn rejects_too_few_fields() {
        let err = TruckMessage::parse("a/b/c").unwrap_err();
        assert!(matches!(err, TransportError::InvalidBody(_)));
    }

    #[test]
    fn parses_trip_end_payload() {
        let payload = serde_json::json!({
            "Trip_ID": "10001",
            "Origin": "5",
            "Destination": "9",
            "Trip_Distance": 42.0,
            "Fuel_Consumption": 3.1,
            "Travel_Time": 900.0,
        })
        .to_string();
        let body = format!("h/c/TRIPS_INFO/TRIP_END/f4/f5/f6/f7/{payload}");
        let msg = TruckMessage::parse(&body).unwrap();
        match msg.classify().unwrap() {
            TruckMessageKind::TripEnd(info) => {
                assert_eq!(info.trip_id, "10001");
                assert_eq!(info.destination, "9");
                assert!(info.travel_time > 0.0);
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn trip_info_does_not_classify_as_trip_end() {
        let payload = serde_json::json!({
            "Trip_ID": "10002",
            "Origin": "1",
            "Destination": "2",
            "Trip_Distance": 1.0,
            "Fuel_Consumption": 0.1,
            "Travel_Time": 10.0,
        })
        .to_string();
        let body = format!("h/c/TRIPS_INFO/TRIP_INFO/f4/f5/f6/f7/{payload}");
        let msg = TruckMessage::parse(&body).unwrap();
        assert!(matches!(msg.classify().unwrap(), TruckMessageKind::TripInfo(_)));
    }

    #[test]
    fn build_round_trips_through_parse() {
        let body = TruckMessage::build("SYNC", "SYNC_REQ", "unused");
        let msg = TruckMessage::parse(&body).unwrap();
        assert_eq!(msg.msg_type(), "SYNC");
        assert_eq!(msg.msg_code(), "SYNC_REQ");
    }
}
