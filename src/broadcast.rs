//! Best-effort fan-out to live subscribers
//!
//! Every subscriber owns the receiving half of an unbounded channel, so a
//! send only fails once that receiver is gone. A failed send removes the
//! subscriber; there is no retry and nothing is pushed back to the producer.

use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::types::Envelope;

/// Opaque identity of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving side of a live subscription.
///
/// Dropping it is a disconnect: the next broadcast notices and removes it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<Arc<Envelope>>,
}

impl Subscription {
    /// This subscriber's identity (for explicit unsubscribe).
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next envelope; `None` once the station shuts down.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.recv().await
    }

    /// Take an envelope if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Arc<Envelope>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<Arc<Envelope>>,
}

/// Active subscriber set. Owned by the pipeline task.
#[derive(Debug, Default)]
pub struct Broadcaster {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber and hand back its receiving side.
    pub fn subscribe(&mut self) -> Subscription {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(Subscriber { id, tx });
        debug!(event = "subscriber_added", subscriber = %id, active = self.subscribers.len());

        Subscription { id, rx }
    }

    /// Remove a subscriber. Returns whether it was still active.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        let removed = self.subscribers.len() != before;
        if removed {
            debug!(event = "subscriber_removed", subscriber = %id, active = self.subscribers.len());
        }
        removed
    }

    /// Send to every subscriber present when the call starts.
    ///
    /// Subscribers whose channel is closed are dropped from the set. Returns
    /// how many subscribers received the envelope.
    pub fn broadcast(&mut self, envelope: Arc<Envelope>) -> usize {
        let snapshot: Vec<SubscriberId> = self.subscribers.iter().map(|s| s.id).collect();
        trace!(event = "broadcast", clients = ?snapshot);

        let mut delivered = 0;
        let mut dead = Vec::new();
        for subscriber in &self.subscribers {
            match subscriber.tx.send(Arc::clone(&envelope)) {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(subscriber.id),
            }
        }

        for id in dead {
            debug!(event = "subscriber_send_failed", subscriber = %id, "Dropping subscriber");
            self.subscribers.retain(|s| s.id != id);
        }

        delivered
    }

    /// Number of active subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Drop every subscriber without flushing.
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}
