//! Column schema for delimited telemetry lines

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::{Result, StationError};

/// Declared type of a telemetry column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Signed integer, zero when empty or unparsable
    Int,
    /// Finite float, zero when empty or unparsable
    Float,
    /// Trimmed text
    String,
    /// Present on the wire but never parsed; written back as an empty field
    Skip,
}

/// One column of the schema, in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Header label used for the durable log (e.g. `GPS_LATITUDE`)
    pub name: String,
    /// Internal key used in records and envelopes (e.g. `gps_lat`)
    pub key: String,
    /// Value type
    #[serde(rename = "type")]
    pub kind: ColumnType,
    /// Whether the line may end before this column
    #[serde(default)]
    pub optional: bool,
}

impl Column {
    /// Create a required column.
    pub fn new(name: impl Into<String>, key: impl Into<String>, kind: ColumnType) -> Self {
        Self { name: name.into(), key: key.into(), kind, optional: false }
    }

    /// Create an optional trailing column.
    pub fn optional(name: impl Into<String>, key: impl Into<String>, kind: ColumnType) -> Self {
        Self { optional: true, ..Self::new(name, key, kind) }
    }

    /// Fixed number of decimals used when this column is a float.
    ///
    /// Latitude/longitude keys keep 5 decimals, pressure keys 3, everything else 2.
    pub fn float_precision(&self) -> usize {
        let key = self.key.to_ascii_lowercase();
        let mut precision = 2;
        for segment in key.split(|c: char| !c.is_ascii_alphanumeric()) {
            if segment.starts_with("lat") || segment.starts_with("lon") {
                return 5;
            }
            if segment.starts_with("press") {
                precision = 3;
            }
        }
        precision
    }
}

/// On-disk representation of a schema before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaFile {
    columns: Vec<Column>,
    sequence_key: String,
    #[serde(default = "default_delimiter")]
    delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

/// Immutable, validated column schema.
///
/// Drives both parsing and canonical formatting. Build it once at startup and
/// share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
    sequence_key: String,
    sequence_index: usize,
    delimiter: char,
    min_required: usize,
}

impl Schema {
    /// Create a new schema with validation.
    pub fn new(columns: Vec<Column>, sequence_key: impl Into<String>, delimiter: char) -> Result<Self> {
        let sequence_key = sequence_key.into();

        if columns.is_empty() {
            return Err(StationError::schema("schema has no columns"));
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if column.key.trim().is_empty() {
                return Err(StationError::schema(format!("column '{}' has an empty key", column.name)));
            }
            if !seen.insert(column.key.as_str()) {
                return Err(StationError::schema(format!("duplicate column key '{}'", column.key)));
            }
        }

        // Optional columns may only trail the required ones
        if let Some(first_optional) = columns.iter().position(|c| c.optional) {
            if let Some(late) = columns[first_optional..].iter().find(|c| !c.optional) {
                return Err(StationError::schema(format!(
                    "required column '{}' follows an optional column",
                    late.key
                )));
            }
        }

        let sequence_index = columns
            .iter()
            .position(|c| c.key == sequence_key)
            .ok_or_else(|| StationError::schema(format!("sequence key '{}' is not a column", sequence_key)))?;
        if columns[sequence_index].kind != ColumnType::Int {
            return Err(StationError::schema(format!("sequence key '{}' must be an int column", sequence_key)));
        }

        let min_required = columns.iter().filter(|c| !c.optional).count();

        Ok(Self { columns, sequence_key, sequence_index, delimiter, min_required })
    }

    /// Parse a schema from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: SchemaFile = serde_yaml_ng::from_str(yaml)
            .map_err(|e| StationError::schema(format!("invalid schema YAML: {}", e)))?;
        Self::new(file.columns, file.sequence_key, file.delimiter)
    }

    /// Load a schema from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| StationError::file_error(path, e))?;
        Self::from_yaml_str(&yaml)
    }

    /// The built-in CanSat flight schema (22 required columns and a trailing heading).
    pub fn flight() -> Self {
        use ColumnType::{Float, Int, String};

        let columns = vec![
            Column::new("TEAM_ID", "team_id", Int),
            Column::new("MISSION_TIME", "mission_time", String),
            Column::new("PACKET_COUNT", "packet_count", Int),
            Column::new("MODE", "mode", String),
            Column::new("STATE", "state", String),
            Column::new("ALTITUDE", "altitude_m", Float),
            Column::new("TEMPERATURE", "temperature_c", Float),
            Column::new("PRESSURE", "pressure_kpa", Float),
            Column::new("VOLTAGE", "voltage_v", Float),
            Column::new("CURRENT", "current_a", Float),
            Column::new("GYRO_R", "gyro_r_dps", Float),
            Column::new("GYRO_P", "gyro_p_dps", Float),
            Column::new("GYRO_Y", "gyro_y_dps", Float),
            Column::new("ACCEL_R", "accel_r_dps2", Float),
            Column::new("ACCEL_P", "accel_p_dps2", Float),
            Column::new("ACCEL_Y", "accel_y_dps2", Float),
            Column::new("GPS_TIME", "gps_time", String),
            Column::new("GPS_ALTITUDE", "gps_altitude_m", Float),
            Column::new("GPS_LATITUDE", "gps_lat", Float),
            Column::new("GPS_LONGITUDE", "gps_lon", Float),
            Column::new("GPS_SATS", "gps_sats", Int),
            Column::new("CMD_ECHO", "cmd_echo", String),
            Column::optional("HEADING", "heading", Float),
        ];

        Self {
            min_required: columns.iter().filter(|c| !c.optional).count(),
            sequence_index: 2,
            sequence_key: "packet_count".to_string(),
            delimiter: ',',
            columns,
        }
    }

    /// Columns in wire order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Key of the int column carrying the packet sequence number.
    pub fn sequence_key(&self) -> &str {
        &self.sequence_key
    }

    /// Wire index of the sequence column.
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// Field delimiter.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Number of non-optional columns a line must carry.
    pub fn min_required(&self) -> usize {
        self.min_required
    }

    /// Header row for durable files.
    pub fn header(&self) -> String {
        let mut header = String::new();
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                header.push(self.delimiter);
            }
            header.push_str(&column.name);
        }
        header
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::flight()
    }
}
