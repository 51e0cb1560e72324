//! Replay feed: streams a pressure profile to the device in simulation mode

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::time::{Duration, Interval, MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info};

use crate::Result;
use crate::feed::{Feed, FeedAction, FeedKind};
use crate::uplink::format_command;

/// Marker for comment lines in a profile file.
const COMMENT_MARKER: char = '#';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Enable,
    Activate,
    Load,
    Stream,
    Done,
}

/// Replay feed that drives the device's simulation mode from a file.
///
/// Sends `SIM,ENABLE` and `SIM,ACTIVATE` (each followed by a settling pause),
/// then one `SIMP,<value>` command per data line at a fixed cadence.
pub struct ReplayFeed {
    path: PathBuf,
    team_id: u16,
    settle: Duration,
    cadence: Duration,
    stage: Stage,
    lines: VecDeque<String>,
    interval: Option<Interval>,
    sent: usize,
}

impl ReplayFeed {
    /// Create a replay feed. The file is read after the handshake.
    pub fn new(path: impl Into<PathBuf>, team_id: u16, settle: Duration, cadence: Duration) -> Self {
        Self {
            path: path.into(),
            team_id,
            settle,
            cadence,
            stage: Stage::Enable,
            lines: VecDeque::new(),
            interval: None,
            sent: 0,
        }
    }

    /// Profile file being replayed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data lines sent so far
    pub fn sent(&self) -> usize {
        self.sent
    }

    fn command(&self, body: &str) -> FeedAction {
        FeedAction::Uplink(format_command(self.team_id, body))
    }
}

/// Data lines of a profile: trimmed, without blanks or comments.
fn data_lines(text: &str) -> VecDeque<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .map(str::to_string)
        .collect()
}

#[async_trait::async_trait]
impl Feed for ReplayFeed {
    async fn next_action(&mut self) -> Result<Option<FeedAction>> {
        loop {
            match self.stage {
                Stage::Enable => {
                    info!(event = "sim_start", file = %self.path.display());
                    self.stage = Stage::Activate;
                    return Ok(Some(self.command("SIM,ENABLE")));
                }
                Stage::Activate => {
                    sleep(self.settle).await;
                    self.stage = Stage::Load;
                    return Ok(Some(self.command("SIM,ACTIVATE")));
                }
                Stage::Load => {
                    sleep(self.settle).await;
                    match tokio::fs::read(&self.path).await {
                        Ok(bytes) => {
                            self.lines = data_lines(&String::from_utf8_lossy(&bytes));
                            debug!(lines = self.lines.len(), "Loaded replay profile");

                            let mut ticker = interval(self.cadence);
                            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            self.interval = Some(ticker);
                            self.stage = Stage::Stream;
                        }
                        Err(e) => {
                            error!(event = "sim_file_missing", file = %self.path.display(), error = %e);
                            self.stage = Stage::Done;
                            return Ok(None);
                        }
                    }
                }
                Stage::Stream => {
                    let Some(line) = self.lines.pop_front() else {
                        info!(event = "sim_complete", file = %self.path.display(), sent = self.sent);
                        self.stage = Stage::Done;
                        return Ok(None);
                    };
                    if let Some(ticker) = self.interval.as_mut() {
                        ticker.tick().await;
                    }
                    self.sent += 1;
                    return Ok(Some(self.command(&format!("SIMP,{}", line))));
                }
                Stage::Done => return Ok(None),
            }
        }
    }

    fn kind(&self) -> FeedKind {
        FeedKind::Replay
    }
}
