//! Driver runs a synthetic feed and routes its actions into the station

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::feed::{Feed, FeedAction, FeedKind};
use crate::pipeline::{LineOrigin, PipelineEvent};
use crate::uplink::UplinkQueue;

/// Consecutive errors tolerated before a feed is abandoned.
const MAX_ERRORS: u32 = 10;

/// Where a running feed sends its actions.
#[derive(Clone)]
pub(crate) struct FeedSink {
    /// Downlink lines go straight into the pipeline
    pub events: mpsc::UnboundedSender<PipelineEvent>,
    /// Uplink commands join the shared FIFO
    pub uplink: UplinkQueue,
}

/// Driver spawns and manages one feed task
///
/// The task owns the feed. When it ends, for any reason, it reports
/// `FeedFinished` so the pipeline can free the slot.
pub(crate) struct FeedDriver;

impl FeedDriver {
    /// Spawn a task that runs `feed` until it ends or `cancel` fires.
    pub(crate) fn spawn(
        feed: Box<dyn Feed>,
        sink: FeedSink,
        cancel: CancellationToken,
        generation: u64,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let kind = feed.kind();
            Self::feed_task(feed, &sink, cancel).await;
            let _ = sink.events.send(PipelineEvent::FeedFinished { kind, generation });
        })
    }

    async fn feed_task(mut feed: Box<dyn Feed>, sink: &FeedSink, cancel: CancellationToken) {
        let kind = feed.kind();
        info!(feed = %kind, "Feed task started");
        let mut action_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(feed = %kind, "Feed cancelled");
                    break;
                }
                result = feed.next_action() => result,
            };

            match result {
                Ok(Some(action)) => {
                    action_count += 1;
                    error_count = 0;
                    if !Self::route(kind, action, sink) {
                        debug!(feed = %kind, "Station gone, stopping feed");
                        break;
                    }
                }
                Ok(None) => {
                    info!(feed = %kind, "Feed ended after {} actions", action_count);
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!(feed = %kind, "Feed error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if !e.is_retryable() || error_count >= MAX_ERRORS {
                        error!(feed = %kind, "Giving up on feed");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = std::time::Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        info!(feed = %kind, "Feed task ended (routed {} actions)", action_count);
    }

    /// Returns false once the receiving side is gone.
    fn route(kind: FeedKind, action: FeedAction, sink: &FeedSink) -> bool {
        match action {
            FeedAction::Downlink(raw) => {
                trace!(feed = %kind, line = %raw, "Feed downlink");
                sink.events.send(PipelineEvent::Line { raw, origin: LineOrigin::Feed(kind) }).is_ok()
            }
            FeedAction::Uplink(command) => sink.uplink.enqueue(command).is_ok(),
        }
    }
}
