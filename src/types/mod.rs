//! Core types for the ground station pipeline.
//!
//! - [`Schema`] / [`Column`] describe the delimited wire format and drive parsing
//! - [`Value`] / [`Field`] hold typed column values
//! - [`Record`] is one accepted line plus ground receipt data
//! - [`Envelope`] is what live subscribers receive
//! - [`HistoryEntry`] is what the bounded history ring keeps
//! - [`LinkConfig`] / [`LinkStatus`] describe the physical link
//!
//! ## Usage Example
//!
//! ```rust
//! use groundlink::types::{Column, ColumnType, Schema};
//!
//! let schema = Schema::new(
//!     vec![
//!         Column::new("TEAM", "team", ColumnType::Int),
//!         Column::new("SEQ", "seq", ColumnType::Int),
//!         Column::new("ALT", "alt", ColumnType::Float),
//!     ],
//!     "seq",
//!     ',',
//! )
//! .unwrap();
//!
//! assert_eq!(schema.min_required(), 3);
//! assert_eq!(schema.header(), "TEAM,SEQ,ALT");
//! ```

mod envelope;
mod link;
mod record;
mod schema;
mod value;

pub use envelope::{Envelope, HistoryEntry};
pub use link::{DEFAULT_SPEED, LinkConfig, LinkStatus, PortInfo, SPEED_PRESETS};
pub use record::Record;
pub use schema::{Column, ColumnType, Schema};
pub use value::{Field, Value};
