//! Compaction Module
//!
//! Picks which SSTables to merge and in what order, and performs the
//! merge itself via [`merge::MergeIterator`]. The engine owns the
//! actual level vectors, file naming, and atomic publication; this
//! module is the policy brain: given the current levels, should
//! anything be compacted right now, and if so, what?
//!
//! ## Level model
//!
//! `levels[0]` is L0: fed directly by memtable flushes, tables may
//! overlap in key range, ordered newest-first. `levels[i]` for `i > 0`
//! holds disjoint, key-sorted tables (leveled policy) or a tier of
//! same-sized-ish tables (tiered policy).
//!
//! ## Strategies
//!
//! - [`leveled`]: classic leveled compaction with per-level size
//!   budgets and overlap-driven input selection.
//! - [`tiered`]: size-tiered compaction, merging whole tiers at once
//!   with no cross-table disjointness requirement.

pub mod leveled;
pub mod merge;
pub mod tiered;

use std::sync::Arc;

use crate::engine::EngineConfig;
use crate::sstable::SSTable;

/// Default per-level-i>0 size budget (`base_size * ratio^i`), i=1 base.
pub const DEFAULT_BASE_LEVEL_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_LEVEL_SIZE_RATIO: u64 = 10;
pub const DEFAULT_L0_TRIGGER: usize = 4;
pub const DEFAULT_L0_STALL: usize = 8;
pub const DEFAULT_TIER_MIN_RUNS: usize = 4;
pub const DEFAULT_SSTABLE_TARGET_SIZE: u64 = 32 * 1024 * 1024;

/// A single compaction round: merge `levels[from_level][from_indices]`
/// with `levels[to_level][to_indices]`, writing output(s) into
/// `to_level` and atomically removing every input.
#[derive(Debug, Clone)]
pub struct CompactionJob {
    pub from_level: usize,
    pub from_indices: Vec<usize>,
    pub to_level: usize,
    pub to_indices: Vec<usize>,
}

/// Decides what (if anything) should be compacted next, given the
/// current level contents.
pub trait CompactionPlanner: Send + Sync {
    /// `levels[0]` is L0. Returns `None` if no trigger has fired.
    fn plan(&self, levels: &[Vec<Arc<SSTable>>], config: &EngineConfig) -> Option<CompactionJob>;
}

/// Which strategy family an engine instance runs. Exactly one is
/// active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategyType {
    Leveled,
    Tiered,
}

impl CompactionStrategyType {
    pub fn planner(&self) -> Box<dyn CompactionPlanner> {
        match self {
            CompactionStrategyType::Leveled => Box::new(leveled::LeveledPlanner::new()),
            CompactionStrategyType::Tiered => Box::new(tiered::TieredPlanner),
        }
    }
}

/// Returns the key range `[min, max]` spanned by `tables`, or `None`
/// if every table is empty.
pub(crate) fn union_key_range(tables: &[Arc<SSTable>]) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut result: Option<(Vec<u8>, Vec<u8>)> = None;
    for table in tables {
        if let Some((first, last)) = table.key_range() {
            result = Some(match result {
                None => (first, last),
                Some((lo, hi)) => (lo.min(first), hi.max(last)),
            });
        }
    }
    result
}

/// Returns `true` if `table`'s key range intersects `[lo, hi]`.
pub(crate) fn overlaps(table: &Arc<SSTable>, lo: &[u8], hi: &[u8]) -> bool {
    match table.key_range() {
        Some((t_lo, t_hi)) => t_lo.as_slice() <= hi && lo <= t_hi.as_slice(),
        None => false,
    }
}
