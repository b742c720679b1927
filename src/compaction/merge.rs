//! K-way merge of ordered record streams with tombstone-aware dedup.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::wal::Record;

struct HeapEntry {
    record: Record,
    /// Lower number = newer.
    priority: usize,
    stream: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.record.key == other.record.key && self.priority == other.priority
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert both comparisons so the
        // smallest key (and, on ties, the newest priority) pops first.
        other
            .record
            .key
            .cmp(&self.record.key)
            .then_with(|| other.priority.cmp(&self.priority))
    }
}

/// Merges `k` ordered record streams, each labelled by a priority
/// (lower = newer), into a single ascending stream. When multiple
/// streams carry the same key, only the newest-priority record is
/// emitted.
///
/// If `drop_bottom_tombstones` is set, tombstones are dropped from the
/// output entirely rather than emitted — callers should only set this
/// when the merge output is destined for the bottom-most level and no
/// older level can still hold the key.
pub struct MergeIterator<I: Iterator<Item = Record>> {
    heap: BinaryHeap<HeapEntry>,
    streams: Vec<I>,
    drop_bottom_tombstones: bool,
}

impl<I: Iterator<Item = Record>> MergeIterator<I> {
    pub fn new(mut streams: Vec<I>, drop_bottom_tombstones: bool) -> Self {
        let mut heap = BinaryHeap::with_capacity(streams.len());
        for (idx, stream) in streams.iter_mut().enumerate() {
            if let Some(record) = stream.next() {
                heap.push(HeapEntry {
                    record,
                    priority: idx,
                    stream: idx,
                });
            }
        }
        Self {
            heap,
            streams,
            drop_bottom_tombstones,
        }
    }
}

impl<I: Iterator<Item = Record>> Iterator for MergeIterator<I> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let winner = self.heap.pop()?;
            if let Some(next_record) = self.streams[winner.stream].next() {
                self.heap.push(HeapEntry {
                    record: next_record,
                    priority: winner.priority,
                    stream: winner.stream,
                });
            }

            // Discard every other entry sharing this key, advancing
            // their streams so the heap stays consistent.
            while let Some(peek) = self.heap.peek() {
                if peek.record.key != winner.record.key {
                    break;
                }
                let shadowed = self.heap.pop().expect("peeked entry exists");
                if let Some(next_record) = self.streams[shadowed.stream].next() {
                    self.heap.push(HeapEntry {
                        record: next_record,
                        priority: shadowed.priority,
                        stream: shadowed.stream,
                    });
                }
            }

            if winner.record.tombstone && self.drop_bottom_tombstones {
                continue;
            }
            return Some(winner.record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(k: &str, v: &str) -> Record {
        Record::set(k.as_bytes().to_vec(), v.as_bytes().to_vec())
    }

    fn del(k: &str) -> Record {
        Record::delete(k.as_bytes().to_vec())
    }

    #[test]
    fn merges_disjoint_streams_in_order() {
        let a = vec![set("a", "1"), set("c", "3")].into_iter();
        let b = vec![set("b", "2"), set("d", "4")].into_iter();

        let merged: Vec<Record> = MergeIterator::new(vec![a, b], false).collect();
        let keys: Vec<&[u8]> = merged.iter().map(|r| r.key.as_slice()).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"b", b"c", b"d"]);
    }

    #[test]
    fn newest_priority_wins_on_key_collision() {
        let newer = vec![set("k", "new")].into_iter();
        let older = vec![set("k", "old")].into_iter();

        let merged: Vec<Record> = MergeIterator::new(vec![newer, older], false).collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, Some(b"new".to_vec()));
    }

    #[test]
    fn tombstone_shadows_older_value() {
        let newer = vec![del("k")].into_iter();
        let older = vec![set("k", "old")].into_iter();

        let merged: Vec<Record> = MergeIterator::new(vec![newer, older], false).collect();
        assert_eq!(merged.len(), 1);
        assert!(merged[0].tombstone);
    }

    #[test]
    fn drop_bottom_tombstones_removes_them_from_output() {
        let stream = vec![set("a", "1"), del("b"), set("c", "3")].into_iter();
        let merged: Vec<Record> = MergeIterator::new(vec![stream], true).collect();
        let keys: Vec<&[u8]> = merged.iter().map(|r| r.key.as_slice()).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"c"]);
    }

    #[test]
    fn three_way_collision_keeps_only_newest() {
        let s0 = vec![set("k", "zero")].into_iter();
        let s1 = vec![set("k", "one")].into_iter();
        let s2 = vec![set("k", "two")].into_iter();

        let merged: Vec<Record> = MergeIterator::new(vec![s0, s1, s2], false).collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, Some(b"zero".to_vec()));
    }
}
