//! Engine Module
//!
//! Ties the memtable, WAL, SSTables, and compaction policies together
//! into the public storage engine: a durable, crash-recoverable
//! key/value store with background flush and compaction.
//!
//! ## Directory layout
//!
//! ```text
//! datadir/
//!   sst_000000.sst      L0 tables, higher number is newer
//!   sst_000001.sst
//!   L1_merged_0.sst     leveled compaction outputs, level >= 1
//!   T1_merged_0.sst     tiered compaction outputs, tier >= 1
//!   wal/
//!     wal_000000.log
//!     wal_000001.log
//! ```
//!
//! Level membership and the next sequence/ordinal counters are
//! reconstructed from these filenames alone at `open` — there is no
//! manifest.
//!
//! ## Concurrency
//!
//! One [`Mutex`] (`State`) serializes every bookkeeping mutation:
//! swapping the active memtable, rotating the WAL segment, inserting or
//! removing SSTables from a level. Actual I/O — WAL append, SSTable
//! write, SSTable read — happens outside that lock, against immutable
//! objects or state owned exclusively by the background worker. A
//! [`Condvar`] backs the L0 write stall.
//!
//! ## Flush protocol
//!
//! 1. freeze the active memtable as immutable; install a fresh empty
//!    memtable and rotate to a new WAL segment
//! 2. write the immutable memtable as a new L0 SSTable in key order,
//!    fsync, rename-publish
//! 3. under the state lock, insert the new SSTable at the head of L0
//!    and drop the immutable memtable reference
//! 4. discard the now-superseded WAL segment
//! 5. wake the compactor
//!
//! The flush protocol is restartable: if step 2 fails, the immutable
//! memtable and its WAL segment are left in place and retried on the
//! next worker tick.


pub mod codec;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use codec::{BlockCodec, IdentityCodec};

use crate::compaction::merge::MergeIterator;
use crate::compaction::{self, CompactionPlanner, CompactionStrategyType};
use crate::memtable::{Memtable, MemtableError};
use crate::sstable::{SSTable, SSTableError};
use crate::wal::{self, Record, Wal, WalError, WalFsync};

const WAL_DIR: &str = "wal";

/// Errors surfaced by the engine's public API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying file system failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// WAL failure: propagates [`WalError::Corrupt`] for a non-torn-tail
    /// corruption found during recovery.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// SSTable failure encountered while writing a flush or compaction
    /// output.
    #[error(transparent)]
    SSTable(#[from] SSTableError),

    /// Memtable failure (lock poisoning only; no variant can occur from
    /// ordinary operation today).
    #[error(transparent)]
    Memtable(#[from] MemtableError),

    /// Internal contract broken; a programmer error, not a user one.
    #[error("internal invariant violation: {0}")]
    InvariantViolation(String),

    /// Write throttled because L0 exceeds `l0_stall`. Reserved for a
    /// future deadline-bearing write API (`set`/`delete` have no
    /// deadline parameter today, so a stall always blocks the caller
    /// until compaction catches up rather than returning this).
    #[error("write stalled: L0 file count exceeds the configured limit")]
    Stalled,
}

/// Tunable engine parameters (§6 "Configuration").
#[derive(Clone)]
pub struct EngineConfig {
    /// Memtable size, in bytes, that triggers a flush.
    pub memtable_flush_bytes: usize,
    /// L0 file count above which leveled compaction compacts L0 into L1.
    pub l0_trigger: usize,
    /// L0 file count at which writers block until compaction catches up.
    pub l0_stall: usize,
    /// Size budget of L1; higher levels scale by `level_size_ratio`.
    pub base_level_size: u64,
    /// Per-level size multiplier for leveled compaction, and per-tier
    /// multiplier for tiered compaction.
    pub level_size_ratio: u64,
    /// Records per sparse-index entry.
    pub block_stride: usize,
    /// Target Bloom filter false-positive rate.
    pub bloom_fp_rate: f64,
    /// Which compaction policy this engine instance runs.
    pub compaction_strategy: CompactionStrategyType,
    /// WAL fsync policy.
    pub wal_fsync: WalFsync,
    /// Tier run count above which a tiered tier is promoted.
    pub tier_min_runs: usize,
    /// Size budget of tier 0; higher tiers scale by `level_size_ratio`.
    pub tier_size_budget: u64,
    /// Target size of a compaction output file. Advisory only; this
    /// implementation always writes one output file per job.
    pub sstable_target_size: u64,
    /// Codec applied to values crossing into or out of an SSTable.
    pub block_codec: Arc<dyn BlockCodec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memtable_flush_bytes: 4 * 1024 * 1024,
            l0_trigger: compaction::DEFAULT_L0_TRIGGER,
            l0_stall: compaction::DEFAULT_L0_STALL,
            base_level_size: compaction::DEFAULT_BASE_LEVEL_SIZE,
            level_size_ratio: compaction::DEFAULT_LEVEL_SIZE_RATIO,
            block_stride: crate::sstable::DEFAULT_BLOCK_STRIDE,
            bloom_fp_rate: 0.01,
            compaction_strategy: CompactionStrategyType::Leveled,
            wal_fsync: WalFsync::PerRecord,
            tier_min_runs: compaction::DEFAULT_TIER_MIN_RUNS,
            tier_size_budget: compaction::DEFAULT_BASE_LEVEL_SIZE,
            sstable_target_size: compaction::DEFAULT_SSTABLE_TARGET_SIZE,
            block_codec: codec::default_codec(),
        }
    }
}

/// A snapshot of engine-level counters, useful for tests and operators.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub memtable_len: usize,
    pub memtable_bytes: usize,
    pub level_counts: Vec<usize>,
    /// Total on-disk size, in bytes, of every live SSTable across all
    /// levels. Does not include the WAL.
    pub total_bytes: u64,
    pub l0_stalled: bool,
}

struct State {
    memtable: Arc<Memtable>,
    immutable: Option<Arc<Memtable>>,
    /// WAL segment path superseded by `immutable`, removed once its
    /// contents are durably published as an SSTable.
    immutable_wal_path: Option<PathBuf>,
    /// `levels[0]` is L0; `levels[i]`, `i >= 1`, are leveled or tiered
    /// runs depending on `EngineConfig::compaction_strategy`.
    levels: Vec<Vec<Arc<SSTable>>>,
    next_l0_seq: u64,
    /// Next output ordinal/count per level `>= 1`.
    next_ordinal: HashMap<usize, u64>,
}

struct Shared {
    data_dir: PathBuf,
    wal_dir: PathBuf,
    config: EngineConfig,
    state: Mutex<State>,
    stall_cv: Condvar,
    wal: Mutex<Wal>,
    planner: Box<dyn CompactionPlanner>,
    wake_tx: Sender<()>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// A durable, crash-recoverable key/value store built from a memtable,
/// a write-ahead log, and leveled or tiered on-disk SSTables.
///
/// See the [module-level documentation](self) for the directory layout,
/// flush protocol, and concurrency model.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Opens (creating if necessary) the engine rooted at `data_dir`:
    /// loads every SSTable into its level by filename, replays every
    /// WAL segment in ascending sequence order into a fresh memtable,
    /// opens a new WAL segment, and starts the background worker.
    pub fn open<P: AsRef<Path>>(data_dir: P, config: EngineConfig) -> Result<Self, EngineError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        let wal_dir = data_dir.join(WAL_DIR);
        fs::create_dir_all(&wal_dir)?;

        let (levels, next_l0_seq, next_ordinal) =
            reconstruct_levels(&data_dir, config.compaction_strategy)?;

        let wal_seqs = list_wal_segments(&wal_dir)?;
        let memtable = Arc::new(Memtable::new());
        for seq in &wal_seqs {
            let path = wal_dir.join(wal::segment_name(*seq));
            let segment = Wal::open(&path, config.wal_fsync)?;
            for record in segment.replay_iter()? {
                let record = record?;
                if record.tombstone {
                    memtable.delete(record.key)?;
                } else {
                    memtable.set(record.key, record.value.unwrap_or_default())?;
                }
            }
        }
        info!(segments = wal_seqs.len(), keys = memtable.len(), "WAL replay complete");

        let next_wal_seq = wal_seqs.last().map(|s| s + 1).unwrap_or(0);
        let active_wal = Wal::open(wal_dir.join(wal::segment_name(next_wal_seq)), config.wal_fsync)?;

        let planner = config.compaction_strategy.planner();
        let (wake_tx, wake_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let needs_immediate_flush = memtable.size_bytes() >= config.memtable_flush_bytes;

        let shared = Arc::new(Shared {
            data_dir,
            wal_dir,
            config,
            state: Mutex::new(State {
                memtable,
                immutable: None,
                immutable_wal_path: None,
                levels,
                next_l0_seq,
                next_ordinal,
            }),
            stall_cv: Condvar::new(),
            wal: Mutex::new(active_wal),
            planner,
            wake_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || worker_loop(worker_shared, wake_rx, shutdown_rx));
        *shared.worker.lock().expect("lock poisoned") = Some(handle);

        let engine = Engine { shared };

        if needs_immediate_flush {
            engine.shared.wake_tx.try_send(()).ok();
        }

        Ok(engine)
    }

    /// Inserts or overwrites `key`. Durable (WAL-appended) before this
    /// returns.
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        self.apply(Record::set(key, value))
    }

    /// Marks `key` as deleted via a tombstone. Durable before this
    /// returns.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), EngineError> {
        self.apply(Record::delete(key))
    }

    /// Looks up `key`: active memtable, then the immutable memtable
    /// being flushed (if any), then SSTables newest to oldest. A
    /// tombstone hit at any layer returns `Ok(None)` without consulting
    /// older layers.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        let (memtable, immutable, levels) = {
            let state = self.shared.state.lock().expect("lock poisoned");
            (
                Arc::clone(&state.memtable),
                state.immutable.clone(),
                state.levels.clone(),
            )
        };

        if let Some(entry) = memtable.get(key)? {
            return Ok(entry.value);
        }
        if let Some(imm) = immutable {
            if let Some(entry) = imm.get(key)? {
                return Ok(entry.value);
            }
        }
        for level in &levels {
            for table in level {
                if let Some(result) = table.get(key)? {
                    return Ok(result.map(|bytes| self.shared.config.block_codec.decode(&bytes)));
                }
            }
        }
        Ok(None)
    }

    /// A point-in-time snapshot of sizes and level occupancy.
    pub fn stats(&self) -> EngineStats {
        let state = self.shared.state.lock().expect("lock poisoned");
        let total_bytes = state.levels.iter().flatten().map(|t| t.size_bytes()).sum();
        EngineStats {
            memtable_len: state.memtable.len(),
            memtable_bytes: state.memtable.size_bytes(),
            level_counts: state.levels.iter().map(|l| l.len()).collect(),
            total_bytes,
            l0_stalled: state
                .levels
                .first()
                .map(|l0| l0.len() > self.shared.config.l0_stall)
                .unwrap_or(false),
        }
    }

    /// Flushes the active memtable to a new L0 SSTable now, without
    /// waiting for `memtable_flush_bytes` to be reached. A no-op if the
    /// memtable is empty and no flush is already pending.
    pub fn flush(&self) -> Result<(), EngineError> {
        {
            let state = self.shared.state.lock().expect("lock poisoned");
            if state.memtable.len() == 0 && state.immutable.is_none() {
                return Ok(());
            }
        }
        freeze_and_rotate_forced(&self.shared)?;
        while write_flush_output(&self.shared)? {}
        Ok(())
    }

    /// Stops the background worker, finishes any flush already frozen
    /// or newly due, and fsyncs the active WAL segment.
    pub fn close(self) -> Result<(), EngineError> {
        self.stop_worker()?;
        while flush_once(&self.shared)? {}
        self.shared.wal.lock().expect("lock poisoned").sync()?;
        info!("engine closed");
        Ok(())
    }

    /// Stops the background worker without draining any pending flush
    /// or syncing the WAL, simulating a hard process kill for
    /// crash-recovery tests. Unlike [`Engine::close`], whatever was
    /// frozen or still in the active memtable at the moment of the call
    /// is left exactly as is; only what was already durable in the WAL
    /// survives a subsequent reopen.
    ///
    /// The worker thread is still joined before this returns: a real
    /// crash has no such guarantee, but a test calling this needs one,
    /// since this crate's `Engine` has no `Drop` impl and a merely
    /// dropped handle leaves the worker thread running against the same
    /// directory, racing whatever opens it next.
    pub fn simulate_crash(self) -> Result<(), EngineError> {
        self.stop_worker()
    }

    fn stop_worker(&self) -> Result<(), EngineError> {
        if let Some(tx) = self.shared.shutdown_tx.lock().expect("lock poisoned").take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.shared.worker.lock().expect("lock poisoned").take() {
            handle
                .join()
                .map_err(|_| EngineError::InvariantViolation("background worker panicked".into()))?;
        }
        Ok(())
    }

    fn apply(&self, record: Record) -> Result<(), EngineError> {
        self.wait_out_stall();

        {
            let wal = self.shared.wal.lock().expect("lock poisoned");
            wal.append(&record)?;
        }

        let memtable = {
            let state = self.shared.state.lock().expect("lock poisoned");
            Arc::clone(&state.memtable)
        };

        if record.tombstone {
            memtable.delete(record.key)?;
        } else {
            memtable.set(record.key, record.value.unwrap_or_default())?;
        }

        if memtable.size_bytes() >= self.shared.config.memtable_flush_bytes {
            let _ = self.shared.wake_tx.try_send(());
        }

        Ok(())
    }

    /// Blocks on the stall condition variable while L0 exceeds
    /// `l0_stall`, per §5's stall policy.
    fn wait_out_stall(&self) {
        let mut state = self.shared.state.lock().expect("lock poisoned");
        while state
            .levels
            .first()
            .map(|l0| l0.len() > self.shared.config.l0_stall)
            .unwrap_or(false)
        {
            warn!("write stalled: L0 over limit, waiting for compaction");
            state = self.shared.stall_cv.wait(state).expect("lock poisoned");
        }
    }
}

/// Starting delay for a failing compaction round's backoff.
const COMPACTION_BACKOFF_BASE: Duration = Duration::from_millis(50);
/// Cap on the backoff delay: past this, doubling stops.
const COMPACTION_BACKOFF_MAX: Duration = Duration::from_secs(2);
/// Consecutive failures after which the round is abandoned until the
/// next wake-up rather than retried again immediately.
const COMPACTION_BACKOFF_MAX_RETRIES: u32 = 6;

fn worker_loop(shared: Arc<Shared>, wake_rx: Receiver<()>, shutdown_rx: Receiver<()>) {
    let mut consecutive_failures: u32 = 0;

    loop {
        select! {
            recv(shutdown_rx) -> _ => {
                debug!("background worker shutting down");
                return;
            }
            recv(wake_rx) -> _ => {}
            default(Duration::from_millis(100)) => {}
        }

        match flush_once(&shared) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => error!(error = %e, "flush attempt failed, immutable memtable retained"),
        }

        match compact_once(&shared) {
            Ok(true) => {
                consecutive_failures = 0;
                let _ = shared.wake_tx.try_send(());
            }
            Ok(false) => {
                consecutive_failures = 0;
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures > COMPACTION_BACKOFF_MAX_RETRIES {
                    error!(error = %e, retries = consecutive_failures, "compaction retry cap exhausted, skipping until next wake-up");
                    consecutive_failures = 0;
                    continue;
                }
                let delay = COMPACTION_BACKOFF_BASE
                    .saturating_mul(1 << (consecutive_failures - 1))
                    .min(COMPACTION_BACKOFF_MAX);
                warn!(error = %e, retries = consecutive_failures, delay_ms = delay.as_millis() as u64, "compaction attempt failed, inputs remain live, retrying with backoff");
                thread::sleep(delay);
            }
        }
    }
}

/// Freezes the active memtable if it is due for a flush, rotating to a
/// new WAL segment. A no-op if a flush is already frozen and pending
/// (the previous attempt's output write failed) or the memtable is
/// still below threshold.
fn freeze_and_rotate(shared: &Shared) -> Result<(), EngineError> {
    freeze_and_rotate_impl(shared, false)
}

/// Like [`freeze_and_rotate`], but freezes a non-empty memtable
/// regardless of whether it has reached `memtable_flush_bytes`. Used by
/// [`Engine::flush`].
fn freeze_and_rotate_forced(shared: &Shared) -> Result<(), EngineError> {
    freeze_and_rotate_impl(shared, true)
}

fn freeze_and_rotate_impl(shared: &Shared, force: bool) -> Result<(), EngineError> {
    let mut state = shared.state.lock().expect("lock poisoned");
    if state.immutable.is_some() {
        return Ok(());
    }
    let due = if force {
        state.memtable.len() > 0
    } else {
        state.memtable.size_bytes() >= shared.config.memtable_flush_bytes
    };
    if !due {
        return Ok(());
    }

    let mut wal_guard = shared.wal.lock().expect("lock poisoned");
    let old_path = wal_guard.path().to_path_buf();
    let next_seq = wal_guard.seq() + 1;
    let new_wal = Wal::open(
        shared.wal_dir.join(wal::segment_name(next_seq)),
        shared.config.wal_fsync,
    )?;
    *wal_guard = new_wal;
    drop(wal_guard);

    let old_memtable = std::mem::replace(&mut state.memtable, Arc::new(Memtable::new()));
    info!(keys = old_memtable.len(), "memtable frozen for flush");
    state.immutable = Some(old_memtable);
    state.immutable_wal_path = Some(old_path);
    Ok(())
}

/// Writes the frozen immutable memtable, if any, as a new L0 SSTable,
/// then publishes it and discards the WAL segment it superseded.
/// Returns `true` if a flush was written.
fn write_flush_output(shared: &Shared) -> Result<bool, EngineError> {
    let immutable = {
        let state = shared.state.lock().expect("lock poisoned");
        match &state.immutable {
            Some(imm) => Arc::clone(imm),
            None => return Ok(false),
        }
    };

    // The memtable already iterates in ascending key order.
    let items: Vec<Record> = immutable
        .iter()?
        .into_iter()
        .map(|(key, entry)| Record {
            key,
            value: entry.value.map(|v| shared.config.block_codec.encode(&v)),
            tombstone: entry.tombstone,
        })
        .collect();

    let seq = {
        let mut state = shared.state.lock().expect("lock poisoned");
        let seq = state.next_l0_seq;
        state.next_l0_seq += 1;
        seq
    };
    let path = shared.data_dir.join(l0_name(seq));
    let table = match SSTable::create(&path, &items, shared.config.bloom_fp_rate, shared.config.block_stride) {
        Ok(table) => table,
        Err(e) => {
            let _ = fs::remove_file(&path);
            let _ = fs::remove_file(path.with_extension("sst.tmp"));
            return Err(e.into());
        }
    };
    info!(path = %path.display(), records = items.len(), "memtable flushed to L0");

    let old_wal_path = {
        let mut state = shared.state.lock().expect("lock poisoned");
        if state.levels.is_empty() {
            state.levels.push(Vec::new());
        }
        state.levels[0].insert(0, Arc::new(table));
        state.immutable = None;
        state.immutable_wal_path.take()
    };

    if let Some(wal_path) = old_wal_path {
        let _ = fs::remove_file(&wal_path);
    }
    shared.stall_cv.notify_all();
    Ok(true)
}

fn flush_once(shared: &Shared) -> Result<bool, EngineError> {
    freeze_and_rotate(shared)?;
    write_flush_output(shared)
}

/// Runs a single compaction round chosen by the configured planner.
/// Returns `true` if a job ran.
fn compact_once(shared: &Shared) -> Result<bool, EngineError> {
    let levels_snapshot = {
        let state = shared.state.lock().expect("lock poisoned");
        state.levels.clone()
    };

    let Some(job) = shared.planner.plan(&levels_snapshot, &shared.config) else {
        return Ok(false);
    };

    let from_tables: Vec<Arc<SSTable>> = job
        .from_indices
        .iter()
        .map(|&i| Arc::clone(&levels_snapshot[job.from_level][i]))
        .collect();
    let to_tables: Vec<Arc<SSTable>> = job
        .to_indices
        .iter()
        .map(|&i| Arc::clone(&levels_snapshot[job.to_level][i]))
        .collect();

    debug!(
        from_level = job.from_level,
        from = from_tables.len(),
        to_level = job.to_level,
        to = to_tables.len(),
        "compaction starting"
    );

    let drop_tombstones = is_bottom_level(&levels_snapshot, job.to_level);
    let streams: Vec<_> = from_tables
        .iter()
        .chain(to_tables.iter())
        .map(|t| t.scan().filter_map(|r| r.ok()))
        .collect();
    let items: Vec<Record> = MergeIterator::new(streams, drop_tombstones).collect();

    let out_path = if items.is_empty() {
        None
    } else {
        let ordinal = {
            let mut state = shared.state.lock().expect("lock poisoned");
            let counter = state.next_ordinal.entry(job.to_level).or_insert(0);
            let ordinal = *counter;
            *counter += 1;
            ordinal
        };
        let name = match shared.config.compaction_strategy {
            CompactionStrategyType::Leveled => leveled_merged_name(job.to_level, ordinal),
            CompactionStrategyType::Tiered => tiered_merged_name(job.to_level, ordinal),
        };
        let path = shared.data_dir.join(name);
        match SSTable::create(&path, &items, shared.config.bloom_fp_rate, shared.config.block_stride) {
            Ok(table) => Some((path, table)),
            Err(e) => {
                let _ = fs::remove_file(&path);
                let _ = fs::remove_file(path.with_extension("sst.tmp"));
                return Err(e.into());
            }
        }
    };

    {
        let mut state = shared.state.lock().expect("lock poisoned");
        while state.levels.len() <= job.to_level {
            state.levels.push(Vec::new());
        }
        // `from_tables`/`to_tables` were resolved under the lock dropped
        // above; a concurrent `Engine::flush()` may have since inserted
        // into `state.levels[0]`, shifting positions. Remove by `Arc`
        // identity against the live vectors rather than trusting
        // `job.from_indices`/`job.to_indices`, which were computed
        // against the stale snapshot.
        if job.from_level < state.levels.len() {
            remove_tables(&mut state.levels[job.from_level], &from_tables);
        }
        remove_tables(&mut state.levels[job.to_level], &to_tables);
        if let Some((_, table)) = out_path {
            let table = Arc::new(table);
            match shared.config.compaction_strategy {
                CompactionStrategyType::Leveled => {
                    state.levels[job.to_level].push(table);
                    state.levels[job.to_level].sort_by(|a, b| {
                        a.first_key().unwrap_or(b"").cmp(b.first_key().unwrap_or(b""))
                    });
                }
                CompactionStrategyType::Tiered => {
                    state.levels[job.to_level].insert(0, table);
                }
            }
        }
    }

    for table in from_tables.iter().chain(to_tables.iter()) {
        let _ = fs::remove_file(table.path());
    }
    info!(from_level = job.from_level, to_level = job.to_level, "compaction published");
    shared.stall_cv.notify_all();
    Ok(true)
}

/// Removes every table in `victims` from `level` by `Arc` pointer
/// identity. Safe to call against a vector that has been mutated since
/// `victims` was resolved, unlike removal by positional index.
fn remove_tables(level: &mut Vec<Arc<SSTable>>, victims: &[Arc<SSTable>]) {
    level.retain(|table| !victims.iter().any(|victim| Arc::ptr_eq(table, victim)));
}

/// Tombstones can be dropped once no level below `to_level` still holds
/// the key. Round-robin leveled compaction (`leveled.rs`) moves one
/// table per round rather than draining a whole level at once, so a
/// level can sit empty while a deeper one still holds a stale copy of a
/// key that hasn't been touched again. Checking only the adjacent level
/// misses that case; every level below `to_level` must be empty.
fn is_bottom_level(levels: &[Vec<Arc<SSTable>>], to_level: usize) -> bool {
    levels
        .get(to_level + 1..)
        .map(|deeper| deeper.iter().all(|level| level.is_empty()))
        .unwrap_or(true)
}

fn list_wal_segments(wal_dir: &Path) -> Result<Vec<u32>, EngineError> {
    let mut seqs = Vec::new();
    for entry in fs::read_dir(wal_dir)? {
        let entry = entry?;
        if let Some(seq) = wal::parse_seq(&entry.path()) {
            seqs.push(seq);
        }
    }
    seqs.sort_unstable();
    Ok(seqs)
}

fn l0_name(seq: u64) -> String {
    format!("sst_{seq:06}.sst")
}

fn parse_l0_seq(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("sst_")?.strip_suffix(".sst")?.parse().ok()
}

fn leveled_merged_name(level: usize, ordinal: u64) -> String {
    format!("L{level}_merged_{ordinal}.sst")
}

fn parse_leveled_merged(path: &Path) -> Option<(usize, u64)> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix('L')?;
    let (level_str, rest) = rest.split_once("_merged_")?;
    let ordinal_str = rest.strip_suffix(".sst")?;
    Some((level_str.parse().ok()?, ordinal_str.parse().ok()?))
}

fn tiered_merged_name(tier: usize, count: u64) -> String {
    format!("T{tier}_merged_{count}.sst")
}

fn parse_tiered_merged(path: &Path) -> Option<(usize, u64)> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix('T')?;
    let (tier_str, rest) = rest.split_once("_merged_")?;
    let count_str = rest.strip_suffix(".sst")?;
    Some((tier_str.parse().ok()?, count_str.parse().ok()?))
}

/// Scans `data_dir` for SSTable files, opening and grouping them into
/// per-level vectors by filename alone. A file that fails to open as a
/// valid SSTable is quarantined (logged and skipped) rather than
/// failing the whole open, per §7's Corrupt policy.
fn reconstruct_levels(
    data_dir: &Path,
    strategy: CompactionStrategyType,
) -> Result<(Vec<Vec<Arc<SSTable>>>, u64, HashMap<usize, u64>), EngineError> {
    let mut l0: Vec<(u64, Arc<SSTable>)> = Vec::new();
    let mut merged: HashMap<usize, Vec<(u64, Arc<SSTable>)>> = HashMap::new();

    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        if let Some(seq) = parse_l0_seq(&path) {
            match SSTable::open(&path) {
                Ok(table) => l0.push((seq, Arc::new(table))),
                Err(e) => error!(path = %path.display(), error = %e, "quarantining corrupt L0 SSTable"),
            }
            continue;
        }

        let parsed = match strategy {
            CompactionStrategyType::Leveled => parse_leveled_merged(&path),
            CompactionStrategyType::Tiered => parse_tiered_merged(&path),
        };
        if let Some((level, ordinal)) = parsed {
            match SSTable::open(&path) {
                Ok(table) => merged.entry(level).or_default().push((ordinal, Arc::new(table))),
                Err(e) => error!(path = %path.display(), error = %e, "quarantining corrupt SSTable"),
            }
        }
    }

    l0.sort_by(|a, b| b.0.cmp(&a.0));
    let next_l0_seq = l0.first().map(|(seq, _)| seq + 1).unwrap_or(0);
    let mut levels: Vec<Vec<Arc<SSTable>>> = vec![l0.into_iter().map(|(_, t)| t).collect()];

    let max_level = merged.keys().copied().max().unwrap_or(0);
    let mut next_ordinal = HashMap::new();
    for level in 1..=max_level {
        let mut entries = merged.remove(&level).unwrap_or_default();
        match strategy {
            CompactionStrategyType::Leveled => {
                entries.sort_by(|a, b| a.1.first_key().unwrap_or(b"").cmp(b.1.first_key().unwrap_or(b"")));
            }
            CompactionStrategyType::Tiered => {
                entries.sort_by(|a, b| b.0.cmp(&a.0));
            }
        }
        let next = entries.iter().map(|(ord, _)| *ord + 1).max().unwrap_or(0);
        next_ordinal.insert(level, next);
        levels.push(entries.into_iter().map(|(_, t)| t).collect());
    }

    Ok((levels, next_l0_seq, next_ordinal))
}
