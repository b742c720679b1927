//! # lsmkv
//!
//! An embedded, single-node, ordered key-value storage engine built on a
//! **Log-Structured Merge-tree (LSM-tree)** architecture. Writes are
//! buffered in memory and logged for durability; the buffer periodically
//! spills to immutable, sorted, on-disk segments; background compaction
//! keeps read amplification and space usage bounded.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                        Engine                          │
//! │  ┌────────────┐                    ┌─────────────────┐ │
//! │  │  Active    │   freeze + flush   │  SSTables        │ │
//! │  │  Memtable  │ ─────────────────► │  L0, L1, L2, …   │ │
//! │  │  + WAL     │                    └────────┬─────────┘ │
//! │  └────────────┘                             │           │
//! │                                   compaction │           │
//! │                                   (leveled / tiered)     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`bloom`] | Probabilistic per-segment membership filter |
//! | [`memtable`] | Ordered in-memory write buffer (skip list) |
//! | [`wal`] | Durable, segmented, CRC-protected write-ahead log |
//! | [`sstable`] | Immutable, sorted, on-disk segment with bloom + sparse index |
//! | [`compaction`] | Leveled and tiered compaction strategies |
//! | [`engine`] | Orchestration, recovery, background worker, public API |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use lsmkv::{Engine, EngineConfig};
//!
//! let engine = Engine::open("/tmp/my_db", EngineConfig::default()).unwrap();
//!
//! engine.set(b"hello".to_vec(), b"world".to_vec()).unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));
//!
//! engine.delete(b"hello".to_vec()).unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), None);
//!
//! engine.close().unwrap();
//! ```
//!
//! ## Non-goals
//!
//! Multi-node replication, cross-key transactions, range queries as a
//! first-class API, secondary indexes, and snapshots/MVCC are all out of
//! scope. The `scan` primitive that exists on [`sstable::SSTable`] is an
//! internal tool that feeds compaction, not a public range-query API.

#![allow(dead_code)]

pub mod bloom;
pub mod compaction;
pub mod encoding;
pub mod engine;
pub mod memtable;
pub mod sstable;
pub mod wal;

pub use engine::{Engine, EngineConfig, EngineError};
