//! The ground station handle
//!
//! [`GroundStation`] wires the pieces together: the pipeline task, the uplink
//! writer task and the link reader thread. The handle is cheap to clone; when
//! the last clone is dropped every task is cancelled.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::{SubscriberId, Subscription};
use crate::config::StationConfig;
use crate::driver::FeedSink;
use crate::feed::{Feed, FeedKind};
use crate::feeds::{GeneratorFeed, ReplayFeed};
use crate::history::HistoryRing;
use crate::link::{LinkBackend, LinkControl, LinkManager, SerialBackend};
use crate::parser::FrameParser;
use crate::pipeline::{LineOrigin, Pipeline, PipelineEvent};
use crate::recorder::Recorder;
use crate::types::{HistoryEntry, LinkConfig, LinkStatus, PortInfo, SPEED_PRESETS, Schema};
use crate::uplink::{self, UplinkQueue, format_command};
use crate::{Result, StationError};


/// Profile replayed when no file is named.
pub const DEFAULT_REPLAY_FILE: &str = "sim_pressure.csv";

/// Snapshot of the station's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationHealth {
    /// Configured link address and speed
    pub link: LinkConfig,
    /// Current link lifecycle state
    pub status: LinkStatus,
    /// Whether this process drives the link itself
    pub server_link: bool,
    /// Durable log destination
    pub log_path: PathBuf,
    /// Accepted lines
    pub received: u64,
    /// Lines rejected as too short
    pub rejected: u64,
    /// Cumulative sequence loss
    pub lost: u64,
    /// Last command sent through [`GroundStation::send_command`]
    pub last_command: Option<String>,
}

struct StationInner {
    config: StationConfig,
    schema: Arc<Schema>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    uplink: UplinkQueue,
    link: LinkControl,
    log_path: PathBuf,
    cancel: CancellationToken,
    reader: Mutex<Option<thread::JoinHandle<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for StationInner {
    fn drop(&mut self) {
        // Stops the reader thread and every task without waiting for them
        self.cancel.cancel();
    }
}

/// Handle to a running ground station.
///
/// # Example
///
/// ```rust,no_run
/// use groundlink::{GroundStation, StationConfig};
///
/// #[tokio::main]
/// async fn main() -> groundlink::Result<()> {
///     let station = GroundStation::spawn(StationConfig::load("station.yaml")?)?;
///     let mut live = station.subscribe().await?;
///
///     station.send_command("CX,ON")?;
///     while let Some(envelope) = live.recv().await {
///         println!("{}", envelope.to_json());
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct GroundStation {
    inner: Arc<StationInner>,
}

impl GroundStation {
    /// Start a station on the host's serial ports.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: StationConfig) -> Result<Self> {
        Self::spawn_with_backend(config, Arc::new(SerialBackend))
    }

    /// Start a station on a custom link backend.
    pub fn spawn_with_backend(config: StationConfig, backend: Arc<dyn LinkBackend>) -> Result<Self> {
        config.validate()?;
        let schema = Arc::new(config.schema()?);
        let cancel = CancellationToken::new();

        let (events, inbox) = mpsc::unbounded_channel();
        let (uplink, commands) = UplinkQueue::new();

        let recorder = Recorder::new(
            config.data_dir.clone(),
            &config.log_file_name(),
            schema.header(),
            schema.delimiter(),
            config.team_id,
        );
        let log_path = recorder.path().to_path_buf();

        let (manager, link, writer) =
            LinkManager::new(backend, config.link.config(), config.link_timing.clone(), cancel.clone());

        let reader = if config.link.enabled {
            let handle = manager.spawn(events.clone()).map_err(|e| {
                StationError::link_open_failed_with_source(&config.link.address, "could not start reader", Box::new(e))
            })?;
            Some(handle)
        } else {
            info!(event = "server_link_disabled", "Link disabled; lines arrive through ingest only");
            None
        };

        let pipeline = Pipeline::new(
            FrameParser::new(Arc::clone(&schema)),
            recorder,
            HistoryRing::new(config.history_capacity),
            FeedSink { events: events.clone(), uplink: uplink.clone() },
            cancel.clone(),
        );
        let tasks = vec![
            tokio::spawn(pipeline.run(inbox, config.keepalive())),
            tokio::spawn(uplink::run_writer(writer, commands, events.clone(), cancel.clone())),
        ];

        info!(
            event = "station_started",
            team = config.team_id,
            address = %config.link.address,
            speed = config.link.speed,
            log = %log_path.display()
        );

        Ok(Self {
            inner: Arc::new(StationInner {
                config,
                schema,
                events,
                uplink,
                link,
                log_path,
                cancel,
                reader: Mutex::new(reader),
                tasks: Mutex::new(tasks),
            }),
        })
    }

    fn send(&self, event: PipelineEvent) -> Result<()> {
        self.inner.events.send(event).map_err(|_| StationError::channel_closed("pipeline"))
    }

    async fn request<T>(&self, event: impl FnOnce(oneshot::Sender<T>) -> PipelineEvent) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(event(reply))?;
        rx.await.map_err(|_| StationError::channel_closed("pipeline reply"))
    }

    /// Schema lines are parsed against.
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Feed a line received by some other means into the pipeline.
    pub fn ingest(&self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Err(StationError::EmptyLine);
        }
        self.send(PipelineEvent::Line { raw: line.to_string(), origin: LineOrigin::Manual })
    }

    /// Queue a fully formed uplink command.
    pub fn enqueue(&self, command: impl Into<String>) -> Result<()> {
        self.inner.uplink.enqueue(command)
    }

    /// Prefix `body` with the team header, remember it, and queue it.
    ///
    /// Returns the command as it will go on the wire.
    pub fn send_command(&self, body: &str) -> Result<String> {
        let command = format_command(self.inner.config.team_id, body);
        self.send(PipelineEvent::CommandIssued(command.clone()))?;
        self.enqueue(command.clone())?;
        Ok(command)
    }

    /// Join the live broadcast.
    pub async fn subscribe(&self) -> Result<Subscription> {
        self.request(PipelineEvent::Subscribe).await
    }

    /// Leave the live broadcast. Returns whether the subscriber was active.
    pub async fn unsubscribe(&self, id: SubscriberId) -> Result<bool> {
        self.request(|reply| PipelineEvent::Unsubscribe { id, reply }).await
    }

    /// The most recent `limit` history entries, oldest first (clamped to 1..=5000).
    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.request(|reply| PipelineEvent::History { limit, reply }).await
    }

    /// Link state, log destination and counters.
    pub async fn health(&self) -> Result<StationHealth> {
        let counters = self.request(PipelineEvent::Counters).await?;
        Ok(StationHealth {
            link: self.inner.link.config(),
            status: self.inner.link.status(),
            server_link: self.inner.config.link.enabled,
            log_path: self.inner.log_path.clone(),
            received: counters.received,
            rejected: counters.rejected,
            lost: counters.lost,
            last_command: counters.last_command,
        })
    }

    /// Write `rows` to a new snapshot file next to the durable log.
    pub async fn save_snapshot(&self, rows: Vec<String>) -> Result<PathBuf> {
        if rows.is_empty() {
            return Err(StationError::EmptyInput);
        }
        self.request(|reply| PipelineEvent::Snapshot { rows, reply }).await?
    }

    /// Current link address and speed.
    pub fn link_config(&self) -> LinkConfig {
        self.inner.link.config()
    }

    /// Change link address and speed and force a reconnect.
    pub fn set_link_config(&self, address: impl Into<String>, speed: u32) -> Result<()> {
        self.inner.link.set_config(LinkConfig { address: address.into(), speed })
    }

    /// Current link lifecycle state.
    pub fn link_status(&self) -> LinkStatus {
        self.inner.link.status()
    }

    /// Observe link lifecycle changes.
    pub fn watch_link_status(&self) -> watch::Receiver<LinkStatus> {
        self.inner.link.watch_status()
    }

    /// Link lifecycle changes as a stream, starting with the current state.
    pub fn link_status_stream(&self) -> WatchStream<LinkStatus> {
        WatchStream::new(self.inner.link.watch_status())
    }

    /// Peripherals the backend can see right now.
    pub fn available_ports(&self) -> Result<Vec<PortInfo>> {
        self.inner.link.available_ports()
    }

    /// Speeds accepted by [`set_link_config`](Self::set_link_config).
    pub fn speed_presets(&self) -> &'static [u32] {
        SPEED_PRESETS
    }

    async fn start_feed(&self, feed: Box<dyn Feed>) -> Result<bool> {
        self.request(|reply| PipelineEvent::StartFeed { feed, reply }).await
    }

    async fn stop_feed(&self, kind: FeedKind) -> Result<bool> {
        self.request(|reply| PipelineEvent::StopFeed { kind, reply }).await
    }

    /// Start replaying a pressure profile to the device.
    ///
    /// Returns `false` without starting anything if a replay is already running.
    pub async fn start_replay(&self, path: Option<&Path>) -> Result<bool> {
        let timing = &self.inner.config.feed_timing;
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_REPLAY_FILE));
        let feed = ReplayFeed::new(path, self.inner.config.team_id, timing.settle(), timing.cadence());
        self.start_feed(Box::new(feed)).await
    }

    /// Stop the replay. Returns `false` if none was running.
    pub async fn stop_replay(&self) -> Result<bool> {
        self.stop_feed(FeedKind::Replay).await
    }

    /// Start the procedural generator.
    ///
    /// Returns `false` without starting anything if it is already running.
    pub async fn start_generator(&self) -> Result<bool> {
        let timing = &self.inner.config.feed_timing;
        let feed = GeneratorFeed::new(self.inner.config.team_id, timing.generator_period(), timing.generator_seed);
        self.start_feed(Box::new(feed)).await
    }

    /// Stop the generator. Returns `false` if it was not running.
    pub async fn stop_generator(&self) -> Result<bool> {
        self.stop_feed(FeedKind::Generator).await
    }

    /// Stop everything and wait for the tasks and the reader thread to exit.
    ///
    /// The reader exits after at most one read timeout. Subscribers see their
    /// streams end. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!(event = "station_stopping");
        self.inner.cancel.cancel();

        let tasks = std::mem::take(&mut *self.inner.tasks.lock().unwrap_or_else(|p| p.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Station task ended abnormally");
            }
        }

        let reader = self.inner.reader.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(reader) = reader {
            match tokio::task::spawn_blocking(move || reader.join()).await {
                Ok(Ok(())) => debug!("Reader thread joined"),
                _ => warn!("Reader thread ended abnormally"),
            }
        }
        info!(event = "station_stopped");
    }
}
