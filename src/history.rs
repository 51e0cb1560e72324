//! Bounded in-memory history of recent pipeline events

use std::collections::VecDeque;

use crate::types::HistoryEntry;

/// Default ring capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Smallest number of entries a history query returns.
pub const HISTORY_QUERY_MIN: usize = 1;

/// Largest number of entries a history query returns.
pub const HISTORY_QUERY_MAX: usize = 5_000;

/// Fixed-capacity ring; the oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryRing {
    /// Create a ring holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity.min(1024)), capacity }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The most recent `n` entries, oldest first.
    ///
    /// `n` is clamped to `[HISTORY_QUERY_MIN, HISTORY_QUERY_MAX]`.
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        let n = n.clamp(HISTORY_QUERY_MIN, HISTORY_QUERY_MAX);
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uplink(i: usize) -> HistoryEntry {
        HistoryEntry::Uplink(format!("CMD,{}", i))
    }

    #[test]
    fn evicts_oldest() {
        let mut ring = HistoryRing::new(3);
        for i in 0..5 {
            ring.push(uplink(i));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.recent(10), vec![uplink(2), uplink(3), uplink(4)]);
    }

    #[test]
    fn query_is_clamped() {
        let mut ring = HistoryRing::new(10_000);
        for i in 0..6_000 {
            ring.push(uplink(i));
        }
        assert_eq!(ring.recent(0), vec![uplink(5_999)]);
        assert_eq!(ring.recent(usize::MAX).len(), HISTORY_QUERY_MAX);
        assert_eq!(ring.recent(2), vec![uplink(5_998), uplink(5_999)]);
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let mut ring = HistoryRing::new(0);
        ring.push(uplink(1));
        ring.push(uplink(2));
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.recent(5), vec![uplink(2)]);
    }
}
