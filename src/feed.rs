//! Feed trait for synthetic producers

use serde::Serialize;

use crate::Result;

/// Which synthetic producer a feed is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Replays a pressure profile to the device as uplink commands
    Replay,
    /// Synthesizes downlink telemetry locally
    Generator,
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKind::Replay => f.write_str("replay"),
            FeedKind::Generator => f.write_str("generator"),
        }
    }
}

/// One step produced by a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedAction {
    /// A telemetry line to ingest as if it arrived over the link
    Downlink(String),
    /// A fully formed command for the uplink queue
    Uplink(String),
}

/// Trait for synthetic data sources
///
/// Feeds handle their own pacing: `next_action` waits until the next step is
/// due. The driver owns the feed and routes each action into the station.
#[async_trait::async_trait]
pub trait Feed: Send + 'static {
    /// Get the next action
    ///
    /// Returns:
    /// - `Ok(Some(action))` - Next step is due
    /// - `Ok(None)` - Feed finished (normal termination)
    /// - `Err(e)` - Error occurred
    async fn next_action(&mut self) -> Result<Option<FeedAction>>;

    /// Which producer this is
    fn kind(&self) -> FeedKind;
}
