//! Accepted telemetry record

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

use super::{Field, Value};

/// One accepted telemetry line, typed against the schema.
///
/// Holds exactly one field per non-skip column plus the ground-side receipt
/// data. Records are transient: built by the pipeline, recorded, broadcast,
/// then dropped (the history ring keeps its own copy).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Typed fields in schema order
    pub fields: Vec<Field>,
    /// Ground receipt time
    pub received_at: DateTime<Utc>,
    /// Accepted lines so far, including this one
    pub rx_count: u64,
    /// Cumulative sequence loss at receipt
    pub loss_total: u64,
    /// Line exactly as received
    pub raw_line: Arc<str>,
}

impl Record {
    /// Look up a field by internal key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    /// Integer field by key.
    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    /// Float field by key.
    pub fn float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_float)
    }

    /// Text field by key.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 4))?;
        for field in &self.fields {
            map.serialize_entry(&field.key, &field.value)?;
        }
        map.serialize_entry("gs_ts_utc", &self.received_at.to_rfc3339_opts(SecondsFormat::Micros, false))?;
        map.serialize_entry("gs_rx_count", &self.rx_count)?;
        map.serialize_entry("gs_loss_total", &self.loss_total)?;
        map.serialize_entry("gs_raw_line", &*self.raw_line)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Record {
        Record {
            fields: vec![
                Field { key: "team".into(), value: Value::Int(1043) },
                Field { key: "alt".into(), value: Value::Float(12.5) },
                Field { key: "state".into(), value: Value::Text("ASCENT".into()) },
            ],
            received_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            rx_count: 3,
            loss_total: 1,
            raw_line: Arc::from("1043,12.5,ASCENT"),
        }
    }

    #[test]
    fn typed_lookups() {
        let record = sample();
        assert_eq!(record.int("team"), Some(1043));
        assert_eq!(record.float("alt"), Some(12.5));
        assert_eq!(record.text("state"), Some("ASCENT"));
        assert_eq!(record.int("alt"), None);
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn serializes_fields_and_ground_data() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["team"], 1043);
        assert_eq!(json["alt"], 12.5);
        assert_eq!(json["state"], "ASCENT");
        assert_eq!(json["gs_rx_count"], 3);
        assert_eq!(json["gs_loss_total"], 1);
        assert_eq!(json["gs_raw_line"], "1043,12.5,ASCENT");
        assert!(json["gs_ts_utc"].as_str().unwrap().starts_with("2025-06-01T12:00:00"));
    }
}
