//! Due-time scheduler: a keyed min-heap with lazy invalidation.
//!
//! Each key has at most one pending due time. Rescheduling pushes a fresh
//! heap entry and records its sequence number in the `pending` map; the old
//! entry stays in the heap and is discarded when popped because its
//! sequence no longer matches. When stale entries outnumber live ones by
//! more than the configured slack the heap is rebuilt from `pending`.
//!
//! Ordering is `(due, seq)`: equal due times fire in insertion order.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::time::Duration;

use crate::types::WorldTime;

/// One heap entry. Only `(due, seq)` take part in ordering.
#[derive(Debug, Clone, Copy)]
struct Entry<K> {
    due: WorldTime,
    seq: u64,
    key: K,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    due: WorldTime,
    seq: u64,
}

/// Statistics about the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Keys with a live due time.
    pub pending: usize,
    /// Heap entries, live and stale.
    pub heap_entries: usize,
    /// Times the heap has been rebuilt.
    pub compactions: u64,
}

/// Keyed priority queue of due times.
#[derive(Debug)]
pub struct Scheduler<K> {
    heap: BinaryHeap<Reverse<Entry<K>>>,
    pending: HashMap<K, Pending>,
    next_seq: u64,
    compaction_slack: usize,
    compactions: u64,
}

impl<K: Copy + Eq + Hash> Default for Scheduler<K> {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl<K: Copy + Eq + Hash> Scheduler<K> {
    /// Create an empty scheduler tolerating `compaction_slack` stale entries
    /// beyond the live count before rebuilding.
    #[must_use]
    pub fn new(compaction_slack: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_seq: 0,
            compaction_slack,
            compactions: 0,
        }
    }

    /// Set or replace the due time for `key`. Returns the replaced due time.
    pub fn schedule(&mut self, key: K, due: WorldTime) -> Option<WorldTime> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let previous = self.pending.insert(key, Pending { due, seq }).map(|p| p.due);
        self.heap.push(Reverse(Entry { due, seq, key }));
        self.maybe_compact();
        previous
    }

    /// Schedule `key` to fire `delay` after `now`.
    pub fn schedule_in(&mut self, key: K, now: WorldTime, delay: Duration) -> Option<WorldTime> {
        self.schedule(key, now + delay)
    }

    /// Move the due time of `key` later only; schedules if nothing is pending.
    ///
    /// Returns `true` if the due time changed.
    pub fn reschedule_if_longer(&mut self, key: K, due: WorldTime) -> bool {
        if self.pending.get(&key).is_some_and(|p| p.due >= due) {
            return false;
        }
        self.schedule(key, due);
        true
    }

    /// Remove the pending due time for `key`, if any.
    pub fn cancel(&mut self, key: &K) -> Option<WorldTime> {
        self.pending.remove(key).map(|p| p.due)
    }

    /// The pending due time for `key`.
    #[must_use]
    pub fn due_at(&self, key: &K) -> Option<WorldTime> {
        self.pending.get(key).map(|p| p.due)
    }

    /// Whether `key` has a pending due time.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Time left until `key` fires, saturating at zero.
    #[must_use]
    pub fn remaining(&self, key: &K, now: WorldTime) -> Option<Duration> {
        self.due_at(key).map(|due| due.since(now))
    }

    /// Earliest pending due time.
    #[must_use]
    pub fn next_due(&self) -> Option<WorldTime> {
        self.pending.values().map(|p| p.due).min()
    }

    /// Remove and return every key due at or before `now`, in `(due, seq)`
    /// order. Keys scheduled after this call are not included, even with a
    /// due time in the past.
    pub fn take_due(&mut self, now: WorldTime) -> Vec<K> {
        let mut due = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek() {
            if top.due > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            match self.pending.get(&entry.key) {
                Some(p) if p.seq == entry.seq => {
                    self.pending.remove(&entry.key);
                    due.push(entry.key);
                }
                _ => {} // superseded or cancelled
            }
        }
        due
    }

    /// Keys with a live due time.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            pending: self.pending.len(),
            heap_entries: self.heap.len(),
            compactions: self.compactions,
        }
    }

    fn maybe_compact(&mut self) {
        if self.heap.len() <= self.pending.len() * 2 + self.compaction_slack {
            return;
        }
        self.heap = self
            .pending
            .iter()
            .map(|(&key, p)| Reverse(Entry { due: p.due, seq: p.seq, key }))
            .collect();
        self.compactions += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: u64) -> WorldTime {
        WorldTime(ms)
    }

    #[test]
    fn fires_in_due_order() {
        let mut s = Scheduler::default();
        s.schedule('c', t(300));
        s.schedule('a', t(100));
        s.schedule('b', t(200));
        assert_eq!(s.take_due(t(1000)), vec!['a', 'b', 'c']);
        assert!(s.is_empty());
    }

    #[test]
    fn equal_due_times_keep_insertion_order() {
        let mut s = Scheduler::default();
        for k in [5, 1, 4, 2] {
            s.schedule(k, t(50));
        }
        assert_eq!(s.take_due(t(50)), vec![5, 1, 4, 2]);
    }

    #[test]
    fn not_yet_due_stays_pending() {
        let mut s = Scheduler::default();
        s.schedule(1, t(100));
        assert!(s.take_due(t(99)).is_empty());
        assert_eq!(s.due_at(&1), Some(t(100)));
        assert_eq!(s.remaining(&1, t(40)), Some(Duration::from_millis(60)));
    }

    #[test]
    fn reschedule_replaces() {
        let mut s = Scheduler::default();
        s.schedule(1, t(100));
        assert_eq!(s.schedule(1, t(500)), Some(t(100)));
        assert!(s.take_due(t(200)).is_empty());
        assert_eq!(s.take_due(t(500)), vec![1]);
        // The superseded entry must not fire a second time.
        assert!(s.take_due(t(10_000)).is_empty());
    }

    #[test]
    fn reschedule_earlier_also_replaces() {
        let mut s = Scheduler::default();
        s.schedule(1, t(500));
        s.schedule(1, t(100));
        assert_eq!(s.take_due(t(100)), vec![1]);
        assert!(s.take_due(t(500)).is_empty());
    }

    #[test]
    fn reschedule_if_longer_never_shortens() {
        let mut s = Scheduler::default();
        s.schedule(1, t(500));
        assert!(!s.reschedule_if_longer(1, t(200)));
        assert_eq!(s.due_at(&1), Some(t(500)));
        assert!(s.reschedule_if_longer(1, t(900)));
        assert_eq!(s.due_at(&1), Some(t(900)));
    }

    #[test]
    fn reschedule_if_longer_schedules_when_idle() {
        let mut s = Scheduler::default();
        assert!(s.reschedule_if_longer(7, t(10)));
        assert_eq!(s.due_at(&7), Some(t(10)));
    }

    #[test]
    fn cancel_prevents_firing() {
        let mut s = Scheduler::default();
        s.schedule(1, t(10));
        s.schedule(2, t(10));
        assert_eq!(s.cancel(&1), Some(t(10)));
        assert_eq!(s.cancel(&1), None);
        assert_eq!(s.take_due(t(10)), vec![2]);
    }

    #[test]
    fn past_due_fires_on_next_take() {
        let mut s = Scheduler::default();
        let now = t(1000);
        s.schedule(1, t(10));
        assert_eq!(s.take_due(now), vec![1]);
    }

    #[test]
    fn compaction_keeps_live_entries() {
        let mut s = Scheduler::new(4);
        for round in 0..50 {
            s.schedule(1, t(1000 + round));
            s.schedule(2, t(2000 + round));
        }
        let stats = s.stats();
        assert!(stats.compactions > 0);
        assert!(stats.heap_entries <= stats.pending * 2 + 4 + 1);
        assert_eq!(s.take_due(t(5000)), vec![1, 2]);
    }

    #[test]
    fn next_due_reports_minimum() {
        let mut s = Scheduler::default();
        assert_eq!(s.next_due(), None);
        s.schedule(1, t(30));
        s.schedule(2, t(20));
        assert_eq!(s.next_due(), Some(t(20)));
    }
}
