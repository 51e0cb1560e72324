//! Outbound command queue and its single writer
//!
//! Any number of producers hold an [`UplinkQueue`]; exactly one writer task
//! drains it. The writer owns the only [`LinkWriter`], so command bytes can
//! never interleave on the wire.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::link::LinkWriter;
use crate::pipeline::PipelineEvent;
use crate::{Result, StationError};

/// Prefix `body` with the team command header: `CMD,<team:04>,<body>`.
pub fn format_command(team_id: u16, body: &str) -> String {
    format!("CMD,{:04},{}", team_id, body.trim())
}

/// Producer side of the uplink FIFO. Cheap to clone, never blocks.
#[derive(Debug, Clone)]
pub struct UplinkQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl UplinkQueue {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a fully formed command.
    ///
    /// Fails only once the writer has shut down.
    pub fn enqueue(&self, command: impl Into<String>) -> Result<()> {
        let command = command.into();
        debug!(event = "uplink_enqueued", command = %command);
        self.tx.send(command).map_err(|_| StationError::channel_closed("uplink queue"))
    }
}

/// Drain the queue one command at a time until cancelled.
///
/// Outcomes go back to the pipeline, which records successes in history and
/// broadcasts failures.
pub(crate) async fn run_writer(
    writer: LinkWriter,
    mut commands: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    cancel: CancellationToken,
) {
    info!("Uplink writer started");

    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let event = match writer.write_line(&command).await {
            Ok(()) => {
                info!(event = "uplink_sent", command = %command);
                PipelineEvent::UplinkDelivered(command)
            }
            Err(e) => {
                warn!(event = "uplink_failed", command = %command, error = %e);
                PipelineEvent::UplinkFailed { command, reason: e.to_string() }
            }
        };

        if events.send(event).is_err() {
            debug!("Pipeline gone, stopping uplink writer");
            break;
        }
    }

    info!("Uplink writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_prefix_pads_team() {
        assert_eq!(format_command(1043, " CX,ON "), "CMD,1043,CX,ON");
        assert_eq!(format_command(7, "ST,GPS"), "CMD,0007,ST,GPS");
    }

    #[test]
    fn enqueue_preserves_order() {
        let (queue, mut rx) = UplinkQueue::new();
        let other = queue.clone();
        queue.enqueue("a").unwrap();
        other.enqueue("b").unwrap();
        queue.enqueue("c").unwrap();

        let drained: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(drained, vec!["a", "b", "c"]);
    }

    #[test]
    fn enqueue_after_shutdown_fails() {
        let (queue, rx) = UplinkQueue::new();
        drop(rx);
        assert!(matches!(queue.enqueue("x"), Err(StationError::ChannelClosed { .. })));
    }
}
