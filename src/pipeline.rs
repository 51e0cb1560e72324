//! The pipeline task: sole owner of all ingestion state
//!
//! Every producer (link reader, feeds, manual ingest, uplink writer, public
//! calls) talks to this task through one unbounded inbox. Lines are processed
//! strictly in arrival order: parse, sequence accounting, durable append,
//! broadcast, history.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::Result;
use crate::broadcast::{Broadcaster, SubscriberId, Subscription};
use crate::driver::{FeedDriver, FeedSink};
use crate::feed::{Feed, FeedKind};
use crate::history::HistoryRing;
use crate::parser::FrameParser;
use crate::recorder::Recorder;
use crate::sequence::SequenceTracker;
use crate::types::{Envelope, HistoryEntry, Record};

/// Where a raw line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineOrigin {
    Link,
    Manual,
    Feed(FeedKind),
}

impl std::fmt::Display for LineOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineOrigin::Link => f.write_str("link"),
            LineOrigin::Manual => f.write_str("manual"),
            LineOrigin::Feed(kind) => write!(f, "{}", kind),
        }
    }
}

/// Messages accepted by the pipeline task.
pub(crate) enum PipelineEvent {
    Line { raw: String, origin: LineOrigin },
    UplinkDelivered(String),
    UplinkFailed { command: String, reason: String },
    CommandIssued(String),
    Subscribe(oneshot::Sender<Subscription>),
    Unsubscribe { id: SubscriberId, reply: oneshot::Sender<bool> },
    History { limit: usize, reply: oneshot::Sender<Vec<HistoryEntry>> },
    Counters(oneshot::Sender<PipelineCounters>),
    Snapshot { rows: Vec<String>, reply: oneshot::Sender<Result<PathBuf>> },
    StartFeed { feed: Box<dyn Feed>, reply: oneshot::Sender<bool> },
    StopFeed { kind: FeedKind, reply: oneshot::Sender<bool> },
    FeedFinished { kind: FeedKind, generation: u64 },
}

/// Counters reported in the station health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounters {
    /// Lines accepted as records
    pub received: u64,
    /// Lines rejected as too short
    pub rejected: u64,
    /// Cumulative sequence loss
    pub lost: u64,
    /// Last command issued through the command helper
    pub last_command: Option<String>,
}

struct RunningFeed {
    generation: u64,
    cancel: CancellationToken,
}

/// Pipeline state. Lives inside one task; never shared.
pub(crate) struct Pipeline {
    parser: FrameParser,
    tracker: SequenceTracker,
    recorder: Recorder,
    broadcaster: Broadcaster,
    history: HistoryRing,
    counters: PipelineCounters,
    feeds: HashMap<FeedKind, RunningFeed>,
    feed_generation: u64,
    sink: FeedSink,
    cancel: CancellationToken,
}

impl Pipeline {
    pub(crate) fn new(
        parser: FrameParser,
        recorder: Recorder,
        history: HistoryRing,
        sink: FeedSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            parser,
            tracker: SequenceTracker::new(),
            recorder,
            broadcaster: Broadcaster::new(),
            history,
            counters: PipelineCounters::default(),
            feeds: HashMap::new(),
            feed_generation: 0,
            sink,
            cancel,
        }
    }

    /// Process events until cancelled, emitting a keepalive ping every `keepalive`.
    pub(crate) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<PipelineEvent>, keepalive: Duration) {
        info!("Pipeline started");
        let mut ping = interval_at(Instant::now() + keepalive, keepalive);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = inbox.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = ping.tick() => {
                    let delivered = self.broadcaster.broadcast(Arc::new(Envelope::Ping));
                    trace!(event = "ping", delivered);
                }
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        for (kind, feed) in self.feeds.drain() {
            debug!(feed = %kind, "Cancelling feed");
            feed.cancel.cancel();
        }
        // Subscribers see their stream end; nothing in flight is flushed
        self.broadcaster.clear();
        info!(
            received = self.counters.received,
            rejected = self.counters.rejected,
            lost = self.counters.lost,
            "Pipeline stopped"
        );
    }

    pub(crate) fn handle(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Line { raw, origin } => self.handle_line(raw, origin),
            PipelineEvent::UplinkDelivered(command) => self.history.push(HistoryEntry::Uplink(command)),
            PipelineEvent::UplinkFailed { command, reason } => {
                let message = format!("UPLINK FAILED for '{}': {}", command, reason);
                self.broadcaster.broadcast(Arc::new(Envelope::error(message)));
            }
            PipelineEvent::CommandIssued(command) => self.counters.last_command = Some(command),
            PipelineEvent::Subscribe(reply) => {
                let _ = reply.send(self.broadcaster.subscribe());
            }
            PipelineEvent::Unsubscribe { id, reply } => {
                let _ = reply.send(self.broadcaster.unsubscribe(id));
            }
            PipelineEvent::History { limit, reply } => {
                let _ = reply.send(self.history.recent(limit));
            }
            PipelineEvent::Counters(reply) => {
                let _ = reply.send(self.counters.clone());
            }
            PipelineEvent::Snapshot { rows, reply } => {
                let _ = reply.send(self.recorder.save_snapshot(&rows));
            }
            PipelineEvent::StartFeed { feed, reply } => {
                let _ = reply.send(self.start_feed(feed));
            }
            PipelineEvent::StopFeed { kind, reply } => {
                let _ = reply.send(self.stop_feed(kind));
            }
            PipelineEvent::FeedFinished { kind, generation } => {
                if self.feeds.get(&kind).is_some_and(|f| f.generation == generation) {
                    self.feeds.remove(&kind);
                    debug!(feed = %kind, "Feed slot released");
                }
            }
        }
    }

    fn handle_line(&mut self, raw: String, origin: LineOrigin) {
        let frame = match self.parser.parse(&raw) {
            Ok(frame) => frame,
            Err(reason) => {
                self.counters.rejected += 1;
                warn!(event = "bad_line", origin = %origin, reason = %reason, line = %raw);
                self.history.push(HistoryEntry::BadLine(raw));
                return;
            }
        };

        self.counters.received += 1;
        self.tracker.accept(frame.sequence);
        self.counters.lost = self.tracker.cumulative_loss();

        if let Err(e) = self.recorder.append(&frame.canonical) {
            error!(event = "csv_write_failed", error = %e);
        }

        let record = Record {
            fields: frame.fields,
            received_at: Utc::now(),
            rx_count: self.counters.received,
            loss_total: self.counters.lost,
            raw_line: Arc::from(raw),
        };
        trace!(origin = %origin, sequence = frame.sequence, "Accepted record");

        self.history.push(HistoryEntry::Telemetry(record.clone()));
        self.broadcaster.broadcast(Arc::new(Envelope::Telemetry(record)));
    }

    fn start_feed(&mut self, feed: Box<dyn Feed>) -> bool {
        let kind = feed.kind();
        if self.feeds.contains_key(&kind) {
            info!(feed = %kind, "Feed already running");
            return false;
        }

        self.feed_generation += 1;
        let generation = self.feed_generation;
        let cancel = self.cancel.child_token();
        FeedDriver::spawn(feed, self.sink.clone(), cancel.clone(), generation);
        self.feeds.insert(kind, RunningFeed { generation, cancel });
        info!(feed = %kind, "Feed started");
        true
    }

    fn stop_feed(&mut self, kind: FeedKind) -> bool {
        match self.feeds.remove(&kind) {
            Some(feed) => {
                feed.cancel.cancel();
                info!(feed = %kind, "Feed stopped");
                true
            }
            None => {
                info!(feed = %kind, "Feed not running");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scenario_schema;
    use crate::uplink::UplinkQueue;
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir) -> (Pipeline, mpsc::UnboundedReceiver<PipelineEvent>) {
        let schema = Arc::new(scenario_schema());
        let recorder = Recorder::new(dir.path(), "flight.csv", schema.header(), schema.delimiter(), 1);
        let (events, rx) = mpsc::unbounded_channel();
        let (uplink, _uplink_rx) = UplinkQueue::new();
        let pipeline = Pipeline::new(
            FrameParser::new(schema),
            recorder,
            HistoryRing::new(16),
            FeedSink { events, uplink },
            CancellationToken::new(),
        );
        (pipeline, rx)
    }

    fn line(raw: &str) -> PipelineEvent {
        PipelineEvent::Line { raw: raw.to_string(), origin: LineOrigin::Manual }
    }

    #[test]
    fn accepted_lines_are_logged_broadcast_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _rx) = pipeline(&dir);
        let mut sub = pipeline.broadcaster.subscribe();

        pipeline.handle(line("1,1,10"));
        pipeline.handle(line("1,4,  40.5 "));

        assert_eq!(pipeline.counters.received, 2);
        assert_eq!(pipeline.counters.lost, 2);

        let written = std::fs::read_to_string(dir.path().join("flight.csv")).unwrap();
        assert_eq!(written, "TEAM,SEQ,ALT\r\n1,1,10.00\r\n1,4,40.50\r\n");

        match sub.try_recv().as_deref() {
            Some(Envelope::Telemetry(record)) => {
                assert_eq!(record.rx_count, 1);
                assert_eq!(&*record.raw_line, "1,1,10");
            }
            other => panic!("unexpected {other:?}"),
        }
        match sub.try_recv().as_deref() {
            Some(Envelope::Telemetry(record)) => assert_eq!(record.loss_total, 2),
            other => panic!("unexpected {other:?}"),
        }

        let history = pipeline.history.recent(10);
        assert_eq!(history.len(), 2);
        assert!(matches!(&history[1], HistoryEntry::Telemetry(r) if r.int("seq") == Some(4)));
    }

    #[test]
    fn rejected_line_is_counted_not_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _rx) = pipeline(&dir);

        pipeline.handle(line("1,1"));

        assert_eq!(pipeline.counters.rejected, 1);
        assert_eq!(pipeline.counters.received, 0);
        assert_eq!(pipeline.history.recent(10), vec![HistoryEntry::BadLine("1,1".into())]);
        assert!(!dir.path().join("flight.csv").exists());
    }

    #[test]
    fn uplink_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _rx) = pipeline(&dir);
        let mut sub = pipeline.broadcaster.subscribe();

        pipeline.handle(PipelineEvent::UplinkDelivered("CMD,0001,CX,ON".into()));
        pipeline.handle(PipelineEvent::UplinkFailed {
            command: "CMD,0001,CX,OFF".into(),
            reason: "No serial port.".into(),
        });

        assert_eq!(pipeline.history.recent(10), vec![HistoryEntry::Uplink("CMD,0001,CX,ON".into())]);
        assert_eq!(
            sub.try_recv().as_deref(),
            Some(&Envelope::error("UPLINK FAILED for 'CMD,0001,CX,OFF': No serial port."))
        );
    }

    #[test]
    fn stale_feed_finish_keeps_new_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _rx) = pipeline(&dir);
        pipeline.feeds.insert(FeedKind::Replay, RunningFeed { generation: 2, cancel: CancellationToken::new() });

        pipeline.handle(PipelineEvent::FeedFinished { kind: FeedKind::Replay, generation: 1 });
        assert!(pipeline.feeds.contains_key(&FeedKind::Replay));

        pipeline.handle(PipelineEvent::FeedFinished { kind: FeedKind::Replay, generation: 2 });
        assert!(!pipeline.feeds.contains_key(&FeedKind::Replay));
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_pings_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, _rx) = pipeline(&dir);
        let mut sub = pipeline.broadcaster.subscribe();
        let cancel = pipeline.cancel.clone();

        let (_tx, inbox) = mpsc::unbounded_channel();
        let task = tokio::spawn(pipeline.run(inbox, Duration::from_secs(10)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(sub.try_recv().is_none(), "no ping before the first interval");

        assert_eq!(sub.recv().await.as_deref(), Some(&Envelope::Ping));
        cancel.cancel();
        task.await.unwrap();
        assert!(sub.recv().await.is_none());
    }
}
