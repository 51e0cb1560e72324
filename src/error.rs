//! Error types for the ground station core.
//!
//! Almost every failure in the pipeline is handled where it happens and only
//! surfaces as a log record or a subscriber notification. The variants here are
//! what the public operations can actually return, plus the link failures that
//! the link manager logs and retries.
//!
//! ## Error Categories
//!
//! - **Link Errors**: the configured peripheral is missing, cannot be opened,
//!   or access was denied
//! - **File Errors**: durable log, snapshot, replay or config file I/O
//! - **Configuration Errors**: bad YAML, invalid schema, disallowed speed
//! - **Input Errors**: empty snapshot, blank manual ingest
//! - **Shutdown**: the pipeline task is gone
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use groundlink::StationError;
//!
//! let error = StationError::link_open_failed("/dev/ttyUSB0", "device busy");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ground station operations.
pub type Result<T, E = StationError> = std::result::Result<T, E>;

/// Main error type for ground station operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StationError {
    #[error("Failed to open link {address}: {reason}")]
    LinkOpen {
        address: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Permission denied opening link {address}")]
    LinkPermissionDenied { address: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Schema error: {reason}")]
    Schema { reason: String },

    #[error("Link speed {speed} is not allowed (allowed: {allowed:?})")]
    InvalidSpeed { speed: u32, allowed: &'static [u32] },

    #[error("Snapshot requires at least one row")]
    EmptyInput,

    #[error("Telemetry line is empty")]
    EmptyLine,

    #[error("Pipeline channel closed: {context}")]
    ChannelClosed { context: String },
}

impl StationError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StationError::LinkOpen { .. } => true,
            StationError::LinkPermissionDenied { .. } => true,
            StationError::File { .. } => false,
            StationError::Config { .. } => false,
            StationError::Schema { .. } => false,
            StationError::InvalidSpeed { .. } => false,
            StationError::EmptyInput => false,
            StationError::EmptyLine => false,
            StationError::ChannelClosed { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StationError::LinkOpen { .. } => vec![
                "Check the radio is plugged in",
                "Verify the configured port name",
                "Close other programs holding the port",
            ],
            StationError::LinkPermissionDenied { .. } => vec![
                "Add the user to the dialout (or uucp) group",
                "Check udev rules for the adapter",
                "Close other programs holding the port",
            ],
            StationError::File { .. } => vec![
                "Check the file exists and is readable",
                "Ensure the data directory is writable",
                "Ensure sufficient disk space",
            ],
            StationError::Config { .. } => vec![
                "Check the YAML syntax",
                "Compare against the documented configuration keys",
            ],
            StationError::Schema { .. } => vec![
                "Check every column has a unique key",
                "Make the sequence key an int column",
                "Keep optional columns at the end of the row",
            ],
            StationError::InvalidSpeed { .. } => {
                vec!["Pick one of the preset speeds", "Match the radio's configured baud rate"]
            }
            StationError::EmptyInput => vec!["Send at least one row to save"],
            StationError::EmptyLine => vec!["Send a non-blank telemetry line"],
            StationError::ChannelClosed { .. } => {
                vec!["Create a new station; this one has shut down"]
            }
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StationError::File { path: path.into(), source }
    }

    /// Helper constructor for link open failures.
    pub fn link_open_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        StationError::LinkOpen { address: address.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for link open failures with source.
    pub fn link_open_failed_with_source(
        address: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StationError::LinkOpen { address: address.into(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        StationError::Config { reason: reason.into() }
    }

    /// Helper constructor for schema errors.
    pub fn schema(reason: impl Into<String>) -> Self {
        StationError::Schema { reason: reason.into() }
    }

    /// Helper constructor for a closed pipeline channel.
    pub fn channel_closed(context: impl Into<String>) -> Self {
        StationError::ChannelClosed { context: context.into() }
    }
}

impl From<std::io::Error> for StationError {
    fn from(err: std::io::Error) -> Self {
        StationError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

/// Why a received line did not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("line has {found} fields, schema requires {required}")]
    TooShort { found: usize, required: usize },
}

/// Why a dequeued uplink command was dropped.
#[derive(Debug, Error)]
pub enum UplinkFailure {
    #[error("No serial port.")]
    NoConnection,

    #[error(transparent)]
    Write(#[from] std::io::Error),
}
