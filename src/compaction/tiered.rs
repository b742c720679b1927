//! Tiered (size-tiered) compaction policy (§4.6 "Tiered policy").
//!
//! Each level is a *tier*: a set of roughly-equal-sized SSTables with
//! no disjointness requirement. When a tier grows past its size
//! budget or accumulates too many runs, every table in it is merged
//! into a single output promoted to the next tier — the destination
//! tier's existing tables are left untouched.

use std::sync::Arc;

use crate::engine::EngineConfig;
use crate::sstable::SSTable;

use super::{CompactionJob, CompactionPlanner};

pub struct TieredPlanner;

impl TieredPlanner {
    fn tier_budget(config: &EngineConfig, tier: usize) -> u64 {
        config
            .tier_size_budget
            .saturating_mul(config.level_size_ratio.pow(tier as u32))
    }

    fn tier_size(tier: &[Arc<SSTable>]) -> u64 {
        tier.iter().map(|t| t.size_bytes()).sum()
    }
}

impl CompactionPlanner for TieredPlanner {
    fn plan(&self, levels: &[Vec<Arc<SSTable>>], config: &EngineConfig) -> Option<CompactionJob> {
        for (i, tier) in levels.iter().enumerate() {
            if tier.is_empty() {
                continue;
            }
            let over_budget = Self::tier_size(tier) > Self::tier_budget(config, i);
            let too_many_runs = tier.len() >= config.tier_min_runs;
            if over_budget || too_many_runs {
                return Some(CompactionJob {
                    from_level: i,
                    from_indices: (0..tier.len()).collect(),
                    to_level: i + 1,
                    to_indices: Vec::new(),
                });
            }
        }
        None
    }
}
