//! Subscriber envelopes and history entries

use serde::Serialize;

use super::Record;

/// Message delivered to live subscribers.
///
/// Serializes with a `type` tag: `{"type":"telemetry", ...record}`,
/// `{"type":"ping"}` or `{"type":"error","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// An accepted record
    Telemetry(Record),
    /// Keepalive so consumers can spot idle or half-open connections
    Ping,
    /// Something the operator should see (e.g. a dropped uplink command)
    Error { message: String },
}

impl Envelope {
    /// Build an error envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error { message: message.into() }
    }

    /// JSON text for transports that speak text frames.
    pub fn to_json(&self) -> String {
        // Maps with string keys and finite numbers always serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One event retained in the bounded history ring.
///
/// Serializes as `{"telemetry": {...}}`, `{"uplink": "..."}` or `{"bad_line": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEntry {
    Telemetry(Record),
    Uplink(String),
    BadLine(String),
}

impl HistoryEntry {
    /// JSON text of this entry.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Value};
    use chrono::Utc;
    use std::sync::Arc;

    #[test]
    fn control_envelopes() {
        assert_eq!(Envelope::Ping.to_json(), r#"{"type":"ping"}"#);
        assert_eq!(Envelope::error("boom").to_json(), r#"{"type":"error","message":"boom"}"#);
    }

    #[test]
    fn telemetry_envelope_is_tagged_and_flat() {
        let record = Record {
            fields: vec![Field { key: "seq".into(), value: Value::Int(7) }],
            received_at: Utc::now(),
            rx_count: 1,
            loss_total: 0,
            raw_line: Arc::from("7"),
        };
        let json: serde_json::Value = serde_json::from_str(&Envelope::Telemetry(record).to_json()).unwrap();
        assert_eq!(json["type"], "telemetry");
        assert_eq!(json["seq"], 7);
        assert_eq!(json["gs_raw_line"], "7");
    }

    #[test]
    fn history_entries_are_externally_tagged() {
        assert_eq!(HistoryEntry::Uplink("CMD,1043,CX,ON".into()).to_json(), r#"{"uplink":"CMD,1043,CX,ON"}"#);
        assert_eq!(HistoryEntry::BadLine("1,1".into()).to_json(), r#"{"bad_line":"1,1"}"#);
    }
}
