//! Per-partition commit watermark
//!
//! Messages are fanned out concurrently and finish in any order, but a
//! partition offset may only be committed once every earlier offset on
//! that partition has completed successfully. `OffsetTracker` keeps the
//! in-flight and failed offsets of each partition and reports how far the
//! committed position can safely advance.

use std::collections::{BTreeSet, HashMap};

/// Position of one consumed message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessagePosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A commit request: everything below `next_offset` is done
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOffset {
    pub topic: String,
    pub partition: i32,
    pub next_offset: i64,
}

#[derive(Debug, Default)]
struct PartitionState {
    /// Dispatched and not yet completed successfully (includes failures)
    pending: BTreeSet<i64>,
    highest_done: Option<i64>,
    committed: Option<i64>,
}

impl PartitionState {
    fn watermark(&self) -> Option<i64> {
        match self.pending.iter().next() {
            Some(lowest_pending) => Some(*lowest_pending),
            None => self.highest_done.map(|done| done + 1),
        }
    }
}

#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<(String, i32), PartitionState>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message as in flight.
    pub fn begin(&mut self, position: &MessagePosition) {
        self.state(position).pending.insert(position.offset);
    }

    /// Mark a message as successfully processed.
    pub fn complete(&mut self, position: &MessagePosition) {
        let state = self.state(position);
        state.pending.remove(&position.offset);
        state.highest_done = Some(
            state
                .highest_done
                .map_or(position.offset, |done| done.max(position.offset)),
        );
    }

    /// Offsets that failed stay pending, pinning the watermark below them
    /// until the broker redelivers.
    pub fn fail(&mut self, position: &MessagePosition) {
        self.state(position).pending.insert(position.offset);
    }

    /// Number of offsets in flight or failed across all partitions
    pub fn pending(&self) -> usize {
        self.partitions.values().map(|s| s.pending.len()).sum()
    }

    /// Commits that would advance some partition, marking them as committed.
    pub fn take_commits(&mut self) -> Vec<CommitOffset> {
        let mut commits = Vec::new();
        for ((topic, partition), state) in self.partitions.iter_mut() {
            let Some(next_offset) = state.watermark() else {
                continue;
            };
            if state.committed.map_or(true, |committed| next_offset > committed) {
                state.committed = Some(next_offset);
                commits.push(CommitOffset {
                    topic: topic.clone(),
                    partition: *partition,
                    next_offset,
                });
            }
        }
        commits.sort_by(|a, b| (&a.topic, a.partition).cmp(&(&b.topic, b.partition)));
        commits
    }

    fn state(&mut self, position: &MessagePosition) -> &mut PartitionState {
        self.partitions
            .entry((position.topic.clone(), position.partition))
            .or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(partition: i32, offset: i64) -> MessagePosition {
        MessagePosition {
            topic: "posts.created".to_string(),
            partition,
            offset,
        }
    }

    #[test]
    fn test_in_order_completion_advances() {
        let mut tracker = OffsetTracker::new();
        tracker.begin(&pos(0, 10));
        tracker.begin(&pos(0, 11));
        tracker.complete(&pos(0, 10));

        let commits = tracker.take_commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].next_offset, 11);

        tracker.complete(&pos(0, 11));
        assert_eq!(tracker.take_commits()[0].next_offset, 12);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_out_of_order_completion_waits_for_gap() {
        let mut tracker = OffsetTracker::new();
        for offset in 5..8 {
            tracker.begin(&pos(0, offset));
        }
        tracker.complete(&pos(0, 7));
        tracker.complete(&pos(0, 6));

        // 5 is still in flight; its offset is the first uncommitted one
        let commits = tracker.take_commits();
        assert_eq!(commits[0].next_offset, 5);
        assert!(tracker.take_commits().is_empty());

        tracker.complete(&pos(0, 5));
        assert_eq!(tracker.take_commits()[0].next_offset, 8);
    }

    #[test]
    fn test_failed_offset_blocks_watermark() {
        let mut tracker = OffsetTracker::new();
        tracker.begin(&pos(0, 1));
        tracker.begin(&pos(0, 2));
        tracker.complete(&pos(0, 1));
        tracker.fail(&pos(0, 2));

        assert_eq!(tracker.take_commits()[0].next_offset, 2);

        tracker.begin(&pos(0, 3));
        tracker.complete(&pos(0, 3));
        assert!(tracker.take_commits().is_empty());
        assert_eq!(tracker.pending(), 1);
    }

    #[test]
    fn test_partitions_are_independent() {
        let mut tracker = OffsetTracker::new();
        tracker.begin(&pos(0, 100));
        tracker.begin(&pos(1, 7));
        tracker.fail(&pos(0, 100));
        tracker.complete(&pos(1, 7));

        let commits = tracker.take_commits();
        let p1 = commits.iter().find(|c| c.partition == 1).unwrap();
        assert_eq!(p1.next_offset, 8);
    }

    #[test]
    fn test_nothing_to_commit_before_any_completion() {
        let mut tracker = OffsetTracker::new();
        assert!(tracker.take_commits().is_empty());
    }
}
