//! Pending-dependency buffer: child changes waiting for their parent.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use tributary_core::Position;

/// A buffered record and the stream position it was read from.
///
/// `position` is `None` for records that did not come from a stream, such
/// as a dead letter being replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct Held<R> {
    pub record: R,
    pub position: Option<Position>,
}

/// Child changes keyed by the parent they wait for
///
/// Owned by exactly one projector and only touched from its loop. Queues
/// are created on the first deferral and removed when flushed. Records
/// leave only through [`flush`](Self::flush) or an explicit
/// [`retain`](Self::retain) by the owner.
#[derive(Debug)]
pub struct PendingBuffer<K, R> {
    queues: HashMap<K, VecDeque<Held<R>>>,
    len: usize,
}

impl<K, R> Default for PendingBuffer<K, R> {
    fn default() -> Self {
        Self {
            queues: HashMap::new(),
            len: 0,
        }
    }
}

impl<K, R> PendingBuffer<K, R>
where
    K: Eq + Hash + Copy + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` to the queue for `parent`
    pub fn defer(&mut self, parent: K, record: R, position: Option<Position>) {
        self.queues
            .entry(parent)
            .or_default()
            .push_back(Held { record, position });
        self.len += 1;
    }

    /// Remove and return everything waiting on `parent`, in defer order
    pub fn flush(&mut self, parent: &K) -> Vec<Held<R>> {
        match self.queues.remove(parent) {
            Some(queue) => {
                self.len -= queue.len();
                queue.into()
            }
            None => Vec::new(),
        }
    }

    /// Put records back in front of anything deferred since the flush.
    ///
    /// Used when re-applying a flushed record fails: the failed record and
    /// the ones after it go back, in their original order.
    pub fn requeue_front(&mut self, parent: K, records: Vec<Held<R>>) {
        if records.is_empty() {
            return;
        }
        self.len += records.len();
        let queue = self.queues.entry(parent).or_default();
        for held in records.into_iter().rev() {
            queue.push_front(held);
        }
    }

    /// Keep only the records for which `keep` returns true. Returns how many
    /// were dropped. Queues left empty are removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &R) -> bool) -> usize {
        let mut dropped = 0;
        self.queues.retain(|parent, queue| {
            let before = queue.len();
            queue.retain(|held| keep(parent, &held.record));
            dropped += before - queue.len();
            !queue.is_empty()
        });
        self.len -= dropped;
        dropped
    }

    /// Oldest buffered offset per `(topic, partition)`.
    ///
    /// A consumer must not commit at or past these offsets, or a restart
    /// loses the records that are still waiting.
    pub fn oldest_offsets(&self) -> BTreeMap<(String, i32), i64> {
        let mut oldest: BTreeMap<(String, i32), i64> = BTreeMap::new();
        for held in self.queues.values().flatten() {
            if let Some(position) = &held.position {
                oldest
                    .entry((position.topic.clone(), position.partition))
                    .and_modify(|offset| *offset = (*offset).min(position.offset))
                    .or_insert(position.offset);
            }
        }
        oldest
    }

    /// Total buffered records across all parents
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pending_for(&self, parent: &K) -> usize {
        self.queues.get(parent).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(topic: &str, offset: i64) -> Option<Position> {
        Some(Position {
            topic: topic.to_string(),
            partition: 0,
            offset,
        })
    }

    fn records<R: Clone>(held: &[Held<R>]) -> Vec<R> {
        held.iter().map(|h| h.record.clone()).collect()
    }

    #[test]
    fn flush_returns_defer_order_and_removes_queue() {
        let mut buf = PendingBuffer::new();
        buf.defer(5, "a", None);
        buf.defer(6, "x", None);
        buf.defer(5, "b", None);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.pending_for(&5), 2);

        assert_eq!(records(&buf.flush(&5)), vec!["a", "b"]);
        assert_eq!(buf.pending_for(&5), 0);
        assert!(buf.flush(&5).is_empty());
        assert_eq!(buf.pending_for(&6), 1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn flush_of_unknown_parent_is_empty() {
        let mut buf: PendingBuffer<i64, u8> = PendingBuffer::new();
        assert!(buf.flush(&1).is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn requeue_goes_before_newer_deferrals() {
        let mut buf = PendingBuffer::new();
        buf.defer(1, 'a', None);
        buf.defer(1, 'b', None);
        let flushed = buf.flush(&1);
        buf.defer(1, 'c', None);

        buf.requeue_front(1, flushed);
        assert_eq!(records(&buf.flush(&1)), vec!['a', 'b', 'c']);
        assert!(buf.is_empty());

        buf.requeue_front(2, Vec::new());
        assert_eq!(buf.pending_for(&2), 0);
    }

    #[test]
    fn retain_drops_matching_records_across_parents() {
        let mut buf = PendingBuffer::new();
        buf.defer(5, ("dept", 9), None);
        buf.defer(5, ("dept", 10), None);
        buf.defer(7, ("dept", 9), None);

        let dropped = buf.retain(|_, (_, id)| *id != 9);
        assert_eq!(dropped, 2);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.pending_for(&5), 1);
        assert_eq!(buf.pending_for(&7), 0);
        assert!(buf.flush(&7).is_empty());

        assert_eq!(buf.retain(|parent, _| *parent != 5), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn oldest_offsets_track_what_is_still_buffered() {
        let mut buf = PendingBuffer::new();
        buf.defer(5, 'a', at("departments", 4));
        buf.defer(6, 'b', at("departments", 2));
        buf.defer(6, 'c', at("attendances", 7));
        buf.defer(8, 'd', None);

        let oldest = buf.oldest_offsets();
        assert_eq!(oldest.len(), 2);
        assert_eq!(oldest[&("departments".to_string(), 0)], 2);
        assert_eq!(oldest[&("attendances".to_string(), 0)], 7);

        buf.flush(&6);
        let oldest = buf.oldest_offsets();
        assert_eq!(oldest.len(), 1);
        assert_eq!(oldest[&("departments".to_string(), 0)], 4);
    }
}
