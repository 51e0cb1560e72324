//! Packet sequence continuity and loss accounting

use tracing::debug;

/// Tracks the last sequence number and the cumulative loss.
///
/// Only forward gaps count as loss. A sequence number that repeats or goes
/// backwards (device restart, replay) simply becomes the new reference point;
/// it never changes the loss count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    last: Option<i64>,
    cumulative_loss: u64,
}

impl SequenceTracker {
    /// Create a tracker with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one accepted sequence number and return the loss it revealed.
    pub fn accept(&mut self, sequence: i64) -> u64 {
        let delta = match self.last {
            Some(previous) if i128::from(sequence) > i128::from(previous) + 1 => {
                (i128::from(sequence) - i128::from(previous) - 1) as u64
            }
            _ => 0,
        };

        if delta > 0 {
            debug!(previous = ?self.last, sequence, lost = delta, "sequence gap");
        }

        self.cumulative_loss = self.cumulative_loss.saturating_add(delta);
        self.last = Some(sequence);
        delta
    }

    /// Last accepted sequence number.
    pub fn last(&self) -> Option<i64> {
        self.last
    }

    /// Total packets inferred missing so far.
    pub fn cumulative_loss(&self) -> u64 {
        self.cumulative_loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn forward_gap_counts() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.accept(1), 0);
        assert_eq!(tracker.accept(2), 0);
        assert_eq!(tracker.accept(5), 2);
        assert_eq!(tracker.cumulative_loss(), 2);
        assert_eq!(tracker.last(), Some(5));
    }

    #[test]
    fn first_packet_never_counts() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.accept(1000), 0);
        assert_eq!(tracker.cumulative_loss(), 0);
    }

    #[test]
    fn backwards_and_duplicates_reset_reference() {
        let mut tracker = SequenceTracker::new();
        tracker.accept(10);
        assert_eq!(tracker.accept(10), 0);
        assert_eq!(tracker.accept(3), 0);
        assert_eq!(tracker.last(), Some(3));
        // Gap is now measured from 3, not 10
        assert_eq!(tracker.accept(6), 2);
        assert_eq!(tracker.cumulative_loss(), 2);
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let mut tracker = SequenceTracker::new();
        tracker.accept(i64::MIN);
        assert_eq!(tracker.accept(i64::MAX), u64::MAX - 1);
    }

    proptest! {
        #[test]
        fn loss_is_sum_of_forward_gaps(seqs in prop::collection::vec(-1000i64..1000, 0..64)) {
            let mut tracker = SequenceTracker::new();
            let mut expected = 0u64;
            for (i, seq) in seqs.iter().enumerate() {
                let before = tracker.cumulative_loss();
                tracker.accept(*seq);
                if i > 0 {
                    let prev = seqs[i - 1];
                    if *seq > prev + 1 {
                        expected += (*seq - prev - 1) as u64;
                    } else {
                        prop_assert_eq!(tracker.cumulative_loss(), before);
                    }
                }
            }
            prop_assert_eq!(tracker.cumulative_loss(), expected);
        }
    }
}
