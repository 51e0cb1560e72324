//! Link configuration and status types

use serde::{Deserialize, Serialize};

use crate::{Result, StationError};

/// Link speeds the ground radio may be configured for.
pub const SPEED_PRESETS: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 250000, 460800, 921600];

/// Default link speed.
pub const DEFAULT_SPEED: u32 = 115200;

/// Address and speed of the physical link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Peripheral name as enumerated by the OS (e.g. `/dev/ttyUSB0`, `COM5`)
    pub address: String,
    /// Baud rate
    pub speed: u32,
}

impl LinkConfig {
    /// Create a config, validating the speed against [`SPEED_PRESETS`].
    pub fn new(address: impl Into<String>, speed: u32) -> Result<Self> {
        let config = Self { address: address.into(), speed };
        config.validate()?;
        Ok(config)
    }

    /// Check the speed is in the allow-list.
    pub fn validate(&self) -> Result<()> {
        if SPEED_PRESETS.contains(&self.speed) {
            Ok(())
        } else {
            Err(StationError::InvalidSpeed { speed: self.speed, allowed: SPEED_PRESETS })
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self { address: default_address().to_string(), speed: DEFAULT_SPEED }
    }
}

fn default_address() -> &'static str {
    if cfg!(windows) { "COM5" } else { "/dev/ttyUSB0" }
}

/// Lifecycle state of the physical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// A peripheral reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Name to put in [`LinkConfig::address`]
    pub port: String,
    /// Human-readable description (product, vendor/product ids)
    pub info: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_allow_list() {
        assert!(LinkConfig::new("/dev/ttyUSB0", 115200).is_ok());
        assert!(LinkConfig::new("/dev/ttyUSB0", 921600).is_ok());
        let err = LinkConfig::new("/dev/ttyUSB0", 12345).unwrap_err();
        assert!(matches!(err, StationError::InvalidSpeed { speed: 12345, .. }));
    }

    #[test]
    fn default_is_valid() {
        let config = LinkConfig::default();
        assert_eq!(config.speed, DEFAULT_SPEED);
        assert!(config.validate().is_ok());
    }
}
