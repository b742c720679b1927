//! # Memtable Module
//!
//! ## Design Invariants
//!
//! - Keys are unique; the last `set`/`delete` for a key wins.
//! - Deletes are represented via tombstones, not physical removal — a
//!   tombstone shadows any older value for the same key wherever it is
//!   later found (older memtable generations, SSTables).
//! - Iteration (`iter`) yields entries in ascending key order, the order
//!   required to stream a memtable straight into a new L0 SSTable.
//!
//! ## Backing structure
//!
//! The memtable is a skip list: an arena of nodes (`Vec<Node>`, linked by
//! `u32` indices rather than pointers) with a probabilistic per-node
//! height (max level 16, branching probability 0.5, per an in-process
//! xorshift64 PRNG). This gives expected `O(log n)` `set`/`get` without
//! any `unsafe` code.
//!
//! ## Concurrency
//!
//! The arena lives behind a `RwLock`: `get`/`iter` take a shared lock,
//! `set`/`delete` take an exclusive one. The engine is still the single
//! writer in practice (§5 of the specification), but wrapping the arena
//! itself keeps a frozen memtable safely shared (`Arc<Memtable>`) between
//! the flush worker and any reader still consulting it.


use std::cmp::Ordering as CmpOrdering;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Maximum skip list height.
const MAX_LEVEL: usize = 16;

/// Branching probability for each additional level (`P(level >= i+1 | level >= i) = 0.5`).
const BRANCHING_P: f64 = 0.5;

/// Sentinel "null" link in the arena.
const NIL: u32 = u32::MAX;

/// Errors returned by [`Memtable`] operations.
#[derive(Debug, Error)]
pub enum MemtableError {
    /// Write buffer limit reached; the engine must freeze and flush
    /// before the write can be applied.
    #[error("flush required before further writes")]
    FlushRequired,

    /// Internal invariant violation or poisoned lock.
    #[error("internal memtable error: {0}")]
    Internal(String),
}

/// A single logical entry: either a live value or a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemtableEntry {
    /// `Some(value)` for a live write, `None` for a tombstone.
    pub value: Option<Vec<u8>>,
    /// `true` if this entry is a deletion marker.
    pub tombstone: bool,
}

impl MemtableEntry {
    fn size_bytes(&self) -> usize {
        self.value.as_ref().map(|v| v.len()).unwrap_or(0)
    }
}

/// A single skip list node. `forward[i]` is the arena index of the next
/// node at level `i`, or [`NIL`].
struct Node {
    key: Vec<u8>,
    entry: MemtableEntry,
    forward: Vec<u32>,
}

/// Tiny, deterministic PRNG for skip-list level generation. Not
/// cryptographic — only used to pick node heights.
struct XorShift64(u64);

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Returns a pseudo-random `f64` in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

struct SkipListInner {
    /// Arena of nodes; index 0.. are real nodes (no head node stored here).
    nodes: Vec<Node>,
    /// Head's forward pointers, one per level.
    head: [u32; MAX_LEVEL],
    /// Highest level currently in use (1-indexed count of active levels).
    top_level: usize,
    rng: XorShift64,
    len: usize,
    size_bytes: usize,
}

impl SkipListInner {
    fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);

        Self {
            nodes: Vec::new(),
            head: [NIL; MAX_LEVEL],
            top_level: 1,
            rng: XorShift64::new(seed),
            len: 0,
            size_bytes: 0,
        }
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.next_f64() < BRANCHING_P {
            level += 1;
        }
        level
    }

    fn forward_at(&self, node_idx: u32, level: usize) -> u32 {
        if node_idx == NIL {
            self.head[level]
        } else {
            self.nodes[node_idx as usize].forward[level]
        }
    }

    /// Locates `key`, filling `update` with the last node at or before
    /// `key` at every level. Returns the arena index of an exact match,
    /// if any.
    fn find(&self, key: &[u8], update: &mut [u32; MAX_LEVEL]) -> Option<u32> {
        let mut cur: u32 = NIL;
        for level in (0..self.top_level).rev() {
            loop {
                let next = self.forward_at(cur, level);
                if next == NIL {
                    break;
                }
                match self.nodes[next as usize].key.as_slice().cmp(key) {
                    CmpOrdering::Less => cur = next,
                    _ => break,
                }
            }
            update[level] = cur;
        }

        let candidate = self.forward_at(cur, 0);
        if candidate != NIL && self.nodes[candidate as usize].key == key {
            Some(candidate)
        } else {
            None
        }
    }

    fn set(&mut self, key: Vec<u8>, entry: MemtableEntry) {
        let mut update = [NIL; MAX_LEVEL];
        if let Some(existing) = self.find(&key, &mut update) {
            let node = &mut self.nodes[existing as usize];
            self.size_bytes -= node.entry.size_bytes();
            self.size_bytes += entry.size_bytes();
            node.entry = entry;
            return;
        }

        let level = self.random_level();
        if level > self.top_level {
            for entry in update.iter_mut().take(level).skip(self.top_level) {
                *entry = NIL;
            }
            self.top_level = level;
        }

        let new_idx = self.nodes.len() as u32;
        let key_len = key.len();
        let entry_size = entry.size_bytes();
        let mut forward = vec![NIL; level];

        for (lvl, slot) in forward.iter_mut().enumerate() {
            let pred = update[lvl];
            *slot = self.forward_at(pred, lvl);
        }

        self.nodes.push(Node {
            key,
            entry,
            forward,
        });

        for (lvl, &pred) in update.iter().enumerate().take(level) {
            if pred == NIL {
                self.head[lvl] = new_idx;
            } else {
                self.nodes[pred as usize].forward[lvl] = new_idx;
            }
        }

        self.len += 1;
        self.size_bytes += key_len + entry_size;
    }

    fn get(&self, key: &[u8]) -> Option<MemtableEntry> {
        let mut update = [NIL; MAX_LEVEL];
        self.find(key, &mut update)
            .map(|idx| self.nodes[idx as usize].entry.clone())
    }

    fn iter_entries(&self) -> Vec<(Vec<u8>, MemtableEntry)> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.head[0];
        while cur != NIL {
            let node = &self.nodes[cur as usize];
            out.push((node.key.clone(), node.entry.clone()));
            cur = node.forward[0];
        }
        out
    }
}

/// The mutable, in-memory write buffer of the storage engine.
///
/// See the [module-level documentation](self) for the backing data
/// structure and concurrency model.
pub struct Memtable {
    inner: RwLock<SkipListInner>,
}

impl Memtable {
    /// Creates a new, empty memtable.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SkipListInner::new()),
        }
    }

    /// Inserts or overwrites a live value for `key`.
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), MemtableError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| MemtableError::Internal("lock poisoned".into()))?;
        inner.set(
            key,
            MemtableEntry {
                value: Some(value),
                tombstone: false,
            },
        );
        Ok(())
    }

    /// Inserts a tombstone for `key`, shadowing any older value.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), MemtableError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| MemtableError::Internal("lock poisoned".into()))?;
        inner.set(
            key,
            MemtableEntry {
                value: None,
                tombstone: true,
            },
        );
        Ok(())
    }

    /// Returns the current entry for `key`, or `None` if absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<MemtableEntry>, MemtableError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("lock poisoned".into()))?;
        Ok(inner.get(key))
    }

    /// Returns all entries in ascending key order.
    pub fn iter(&self) -> Result<Vec<(Vec<u8>, MemtableEntry)>, MemtableError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("lock poisoned".into()))?;
        Ok(inner.iter_entries())
    }

    /// Sum of key lengths plus value lengths across every entry
    /// (tombstones contribute zero value bytes). Used as the flush
    /// trigger.
    pub fn size_bytes(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.size_bytes)
            .unwrap_or(0)
    }

    /// Number of entries currently held (tombstones included — they
    /// still occupy a key slot until compacted away).
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.len).unwrap_or(0)
    }

    /// Returns `true` if the memtable holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}
