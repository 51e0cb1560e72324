//! Ground station core for serial telemetry links.
//!
//! Groundlink ingests delimited telemetry lines from a remote device over a
//! reconnecting serial link, validates them against a column schema, tracks
//! sequence loss, appends every accepted record to a durable log, fans it out
//! to live subscribers, and carries commands back over the same link.
//!
//! # Features
//!
//! - **Resilient link**: reconnects forever, survives unplugging and reconfiguration
//! - **Schema-driven parsing**: bad fields default to zero, never reject a record
//! - **Ordered durability**: each line is appended and flushed before it is broadcast
//! - **Single-writer uplink**: commands never interleave on the wire
//! - **Synthetic feeds**: profile replay and a procedural flight generator
//!
//! # Architecture
//!
//! One pipeline task owns all ingestion state. The blocking serial read loop
//! runs on its own thread and hands each line to the pipeline over a channel.
//! One uplink task owns write access to the link.
//!
//! ## Example
//!
//! ```rust,no_run
//! use groundlink::{GroundStation, StationConfig, Envelope};
//!
//! #[tokio::main]
//! async fn main() -> groundlink::Result<()> {
//!     groundlink::logging::init();
//!
//!     let station = GroundStation::spawn(StationConfig::default())?;
//!     let mut live = station.subscribe().await?;
//!
//!     while let Some(envelope) = live.recv().await {
//!         if let Envelope::Telemetry(record) = &*envelope {
//!             println!("packet {:?}: {:?} m", record.int("packet_count"), record.float("altitude_m"));
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Pipeline stages
pub mod broadcast;
pub mod history;
pub mod parser;
pub mod recorder;
pub mod sequence;

// Producers and the link
mod driver;
pub mod feed;
pub mod feeds;
pub mod link;
mod pipeline;
pub mod uplink;

// Ambient
pub mod config;
pub mod logging;
mod station;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use broadcast::{SubscriberId, Subscription};
pub use config::StationConfig;
pub use feed::{Feed, FeedAction, FeedKind};
pub use link::{LinkBackend, LinkControl, LinkPort, SerialBackend};
pub use parser::{FrameParser, ParsedFrame};
pub use pipeline::PipelineCounters;
pub use station::{DEFAULT_REPLAY_FILE, GroundStation, StationHealth};
pub use uplink::UplinkQueue;
