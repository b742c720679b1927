//! Leveled compaction policy (§4.6 "Leveled policy").
//!
//! L0 is flushed into directly and may hold overlapping tables. Every
//! level `i > 0` holds disjoint, key-sorted tables with a size budget
//! of `base_level_size * level_size_ratio^(i-1)`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::engine::EngineConfig;
use crate::sstable::SSTable;

use super::{overlaps, union_key_range, CompactionJob, CompactionPlanner};

/// Picks L0→L1 and `i→i+1` compaction inputs per the overlap rule in
/// §4.6. Round-robins which table of a level is picked as the
/// `i→i+1` victim so that no single table is starved.
pub struct LeveledPlanner {
    round_robin: Mutex<HashMap<usize, usize>>,
}

impl LeveledPlanner {
    pub fn new() -> Self {
        Self {
            round_robin: Mutex::new(HashMap::new()),
        }
    }

    fn level_budget(config: &EngineConfig, level: usize) -> u64 {
        debug_assert!(level >= 1);
        config
            .base_level_size
            .saturating_mul(config.level_size_ratio.pow((level - 1) as u32))
    }

    fn level_size(level: &[Arc<SSTable>]) -> u64 {
        level.iter().map(|t| t.size_bytes()).sum()
    }

    /// Picks the next victim index in `level` via round-robin,
    /// advancing the cursor for next time.
    fn next_victim(&self, level_no: usize, level_len: usize) -> usize {
        let mut cursor = self.round_robin.lock().expect("lock poisoned");
        let entry = cursor.entry(level_no).or_insert(0);
        let victim = *entry % level_len;
        *entry = (*entry + 1) % level_len;
        victim
    }
}

impl Default for LeveledPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl CompactionPlanner for LeveledPlanner {
    fn plan(&self, levels: &[Vec<Arc<SSTable>>], config: &EngineConfig) -> Option<CompactionJob> {
        let l0 = levels.first()?;
        if l0.len() > config.l0_trigger {
            let l1 = levels.get(1).cloned().unwrap_or_default();
            let (lo, hi) = union_key_range(l0)?;
            let to_indices: Vec<usize> = l1
                .iter()
                .enumerate()
                .filter(|(_, t)| overlaps(t, &lo, &hi))
                .map(|(i, _)| i)
                .collect();

            return Some(CompactionJob {
                from_level: 0,
                from_indices: (0..l0.len()).collect(),
                to_level: 1,
                to_indices,
            });
        }

        for (i, level) in levels.iter().enumerate().skip(1) {
            if level.is_empty() {
                continue;
            }
            if Self::level_size(level) > Self::level_budget(config, i) {
                let victim = self.next_victim(i, level.len());
                let victim_table = &level[victim];
                let (lo, hi) = victim_table.key_range()?;

                let next_level = levels.get(i + 1).cloned().unwrap_or_default();
                let to_indices: Vec<usize> = next_level
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| overlaps(t, &lo, &hi))
                    .map(|(idx, _)| idx)
                    .collect();

                return Some(CompactionJob {
                    from_level: i,
                    from_indices: vec![victim],
                    to_level: i + 1,
                    to_indices,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::Record;
    use tempfile::tempdir;

    fn table(dir: &std::path::Path, name: &str, keys: &[&str]) -> Arc<SSTable> {
        let items: Vec<Record> = keys
            .iter()
            .map(|k| Record::set(k.as_bytes().to_vec(), b"v".to_vec()))
            .collect();
        Arc::new(SSTable::create(dir.join(name), &items, 0.01, 64).unwrap())
    }

    #[test]
    fn l0_trigger_fires_past_threshold() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            l0_trigger: 2,
            ..EngineConfig::default()
        };
        let l0 = vec![
            table(dir.path(), "a.sst", &["a"]),
            table(dir.path(), "b.sst", &["b"]),
            table(dir.path(), "c.sst", &["c"]),
        ];
        let planner = LeveledPlanner::new();
        let job = planner.plan(&[l0], &config).unwrap();
        assert_eq!(job.from_level, 0);
        assert_eq!(job.to_level, 1);
        assert_eq!(job.from_indices.len(), 3);
    }

    #[test]
    fn l0_trigger_does_not_fire_below_threshold() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            l0_trigger: 4,
            ..EngineConfig::default()
        };
        let l0 = vec![table(dir.path(), "a.sst", &["a"])];
        let planner = LeveledPlanner::new();
        assert!(planner.plan(&[l0], &config).is_none());
    }

    #[test]
    fn l0_to_l1_selects_only_overlapping_l1_tables() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            l0_trigger: 0,
            ..EngineConfig::default()
        };
        let l0 = vec![table(dir.path(), "l0a.sst", &["m"])];
        let l1 = vec![
            table(dir.path(), "l1a.sst", &["a", "m"]),
            table(dir.path(), "l1b.sst", &["z"]),
        ];
        let planner = LeveledPlanner::new();
        let job = planner.plan(&[l0, l1], &config).unwrap();
        assert_eq!(job.to_indices, vec![0]);
    }
}
