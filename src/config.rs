//! Station configuration
//!
//! Every field has a default, so an empty YAML document is a valid config:
//!
//! ```rust
//! use groundlink::StationConfig;
//!
//! let config = StationConfig::from_yaml_str("team_id: 7\nlink:\n  speed: 57600\n").unwrap();
//! assert_eq!(config.team_id, 7);
//! assert_eq!(config.link.speed, 57600);
//! assert_eq!(config.log_file_name(), "Flight_0007.csv");
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::recorder::flight_file_name;
use crate::types::{LinkConfig, Schema};
use crate::{Result, StationError};

/// Default team identifier.
pub const DEFAULT_TEAM_ID: u16 = 1043;

/// Top-level station configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Team identifier used in command prefixes and file names
    pub team_id: u16,
    /// Physical link settings
    pub link: LinkSettings,
    /// Directory for the durable log and snapshots
    pub data_dir: PathBuf,
    /// Durable log file name; defaults to `Flight_<team>.csv`
    pub log_file: Option<String>,
    /// Bounded history ring capacity
    pub history_capacity: usize,
    /// Keepalive ping interval
    pub keepalive_ms: u64,
    /// Link retry and read timing
    pub link_timing: LinkTiming,
    /// Synthetic feed timing
    pub feed_timing: FeedTiming,
    /// Optional YAML schema; the built-in flight schema otherwise
    pub schema_path: Option<PathBuf>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            team_id: DEFAULT_TEAM_ID,
            link: LinkSettings::default(),
            data_dir: PathBuf::from("data"),
            log_file: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            keepalive_ms: 10_000,
            link_timing: LinkTiming::default(),
            feed_timing: FeedTiming::default(),
            schema_path: None,
        }
    }
}

impl StationConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| StationError::config(format!("invalid config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| StationError::file_error(path, e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<()> {
        self.link.config().validate()?;
        if self.keepalive_ms == 0 {
            return Err(StationError::config("keepalive_ms must be greater than zero"));
        }
        if self.feed_timing.cadence_ms == 0 || self.feed_timing.generator_period_ms == 0 {
            return Err(StationError::config("feed periods must be greater than zero"));
        }
        Ok(())
    }

    /// Resolve the schema: the configured file, or the built-in flight schema.
    pub fn schema(&self) -> Result<Schema> {
        match &self.schema_path {
            Some(path) => Schema::load(path),
            None => Ok(Schema::flight()),
        }
    }

    /// Name of the durable log file.
    pub fn log_file_name(&self) -> String {
        self.log_file.clone().unwrap_or_else(|| flight_file_name(self.team_id))
    }

    /// Keepalive interval.
    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }
}

/// Link address, speed, and whether the station drives the link itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub address: String,
    pub speed: u32,
    /// When false the station never opens hardware; lines arrive via manual ingest
    pub enabled: bool,
}

impl LinkSettings {
    /// Address and speed as a [`LinkConfig`].
    pub fn config(&self) -> LinkConfig {
        LinkConfig { address: self.address.clone(), speed: self.speed }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        let LinkConfig { address, speed } = LinkConfig::default();
        Self { address, speed, enabled: true }
    }
}

/// Timing of the link lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkTiming {
    /// Wait before re-enumerating when the configured address is absent
    pub absent_retry_ms: u64,
    /// Wait before retrying after an open failure
    pub open_retry_ms: u64,
    /// Read timeout; also bounds how long shutdown waits for the reader
    pub read_timeout_ms: u64,
}

impl LinkTiming {
    pub fn absent_retry(&self) -> Duration {
        Duration::from_millis(self.absent_retry_ms)
    }

    pub fn open_retry(&self) -> Duration {
        Duration::from_millis(self.open_retry_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self { absent_retry_ms: 5_000, open_retry_ms: 2_000, read_timeout_ms: 100 }
    }
}

/// Timing of the synthetic feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedTiming {
    /// Pause after each replay handshake command
    pub settle_ms: u64,
    /// Replay line cadence
    pub cadence_ms: u64,
    /// Generator line period
    pub generator_period_ms: u64,
    /// Fixed generator seed for reproducible runs
    pub generator_seed: Option<u64>,
}

impl FeedTiming {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn generator_period(&self) -> Duration {
        Duration::from_millis(self.generator_period_ms)
    }
}

impl Default for FeedTiming {
    fn default() -> Self {
        Self { settle_ms: 200, cadence_ms: 1_000, generator_period_ms: 1_000, generator_seed: None }
    }
}
