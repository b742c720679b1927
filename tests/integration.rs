//! Integration tests for the public `Engine` API.
//!
//! These exercise the full storage stack (WAL -> memtable -> SSTable ->
//! compaction) through `lsmkv::{Engine, EngineConfig}` only; no internal
//! module is referenced.

use lsmkv::{Engine, EngineConfig};
use tempfile::TempDir;

fn small_flush_config() -> EngineConfig {
    EngineConfig {
        memtable_flush_bytes: 4096,
        l0_trigger: 3,
        block_stride: 8,
        ..EngineConfig::default()
    }
}

/// Scenario 1, Basic: overwrite then delete a single key.
#[test]
fn basic_overwrite_and_delete() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    engine.set(b"key1".to_vec(), b"value1".to_vec()).unwrap();
    assert_eq!(engine.get(b"key1").unwrap(), Some(b"value1".to_vec()));

    engine.set(b"key1".to_vec(), b"value2".to_vec()).unwrap();
    assert_eq!(engine.get(b"key1").unwrap(), Some(b"value2".to_vec()));

    engine.delete(b"key1".to_vec()).unwrap();
    assert_eq!(engine.get(b"key1").unwrap(), None);

    engine.close().unwrap();
}

/// Scenario 2, Multi-SSTable: a low flush threshold forces many L0
/// tables while every key remains correctly readable.
#[test]
fn multi_sstable_thousand_keys() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), small_flush_config()).unwrap();

    for i in 0..1000 {
        engine
            .set(format!("key{i}").into_bytes(), format!("value{i}").into_bytes())
            .unwrap();
    }

    std::thread::sleep(std::time::Duration::from_millis(500));

    for i in 0..1000 {
        assert_eq!(
            engine.get(format!("key{i}").as_bytes()).unwrap(),
            Some(format!("value{i}").into_bytes())
        );
    }

    let stats = engine.stats();
    assert!(stats.level_counts[0] > 1 || stats.level_counts.len() > 1);

    engine.close().unwrap();
}

/// Scenario 3, Recovery: writes land durably in the WAL even when the
/// process never flushes or closes cleanly.
#[test]
fn recovery_without_flush_or_close() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        engine.set(b"key1".to_vec(), b"v1".to_vec()).unwrap();
        engine.set(b"key2".to_vec(), b"v2".to_vec()).unwrap();
        engine.set(b"key3".to_vec(), b"v3".to_vec()).unwrap();
        // No flush, no ordinary close: simulates a crash after every
        // write was durably appended, without leaving the background
        // worker running against `dir` once this scope ends.
        engine.simulate_crash().unwrap();
    }

    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
    assert_eq!(engine.get(b"key1").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(engine.get(b"key2").unwrap(), Some(b"v2".to_vec()));
    assert_eq!(engine.get(b"key3").unwrap(), Some(b"v3".to_vec()));
    engine.close().unwrap();
}

/// Scenario 4, Large value: a 1 MiB random payload round-trips exactly.
#[test]
fn large_value_round_trip() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    // Deterministic pseudo-random fill; no external RNG dependency needed
    // for a byte-exactness check.
    let mut value = vec![0u8; 1024 * 1024];
    let mut state: u64 = 0x1234_5678_9abc_def0;
    for byte in value.iter_mut() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *byte = state as u8;
    }

    engine.set(b"large".to_vec(), value.clone()).unwrap();
    assert_eq!(engine.get(b"large").unwrap(), Some(value));

    engine.close().unwrap();
}

/// Scenario 5, Empty value: present-but-empty is distinct from absent.
#[test]
fn empty_value_is_distinct_from_absent() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    engine.set(b"empty".to_vec(), Vec::new()).unwrap();
    assert_eq!(engine.get(b"empty").unwrap(), Some(Vec::new()));
    assert_eq!(engine.get(b"nonexistent").unwrap(), None);

    engine.close().unwrap();
}

/// Scenario 6, Tombstone scan: an SSTable built directly from a mixed
/// live/tombstone record set answers lookups and scans correctly.
#[test]
fn tombstone_scan_scenario() {
    use lsmkv::sstable::SSTable;
    use lsmkv::wal::Record;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tombstone.sst");
    let items = vec![
        Record::set(b"key1".to_vec(), b"v1".to_vec()),
        Record::set(b"key2".to_vec(), b"v2".to_vec()),
        Record::delete(b"key3".to_vec()),
        Record::set(b"key4".to_vec(), b"v4".to_vec()),
    ];
    let table = SSTable::create(&path, &items, 0.01, 64).unwrap();

    assert_eq!(table.get(b"key3").unwrap(), Some(None));

    let scanned: Vec<Record> = table.scan().map(|r| r.unwrap()).collect();
    assert_eq!(scanned, items);
}

/// Idempotent recovery: opening N times without intervening writes
/// yields the same logical mapping every time.
#[test]
fn idempotent_recovery_across_several_opens() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(dir.path(), small_flush_config()).unwrap();
        for i in 0..100 {
            engine
                .set(format!("k{i}").into_bytes(), format!("v{i}").into_bytes())
                .unwrap();
        }
        engine.close().unwrap();
    }

    for _ in 0..3 {
        let engine = Engine::open(dir.path(), small_flush_config()).unwrap();
        for i in 0..100 {
            assert_eq!(
                engine.get(format!("k{i}").as_bytes()).unwrap(),
                Some(format!("v{i}").into_bytes())
            );
        }
        engine.close().unwrap();
    }
}

/// Crash safety: every prefix of completed writes is recoverable,
/// because each `set`/`delete` is durable (WAL-appended) before it
/// returns.
///
/// Exactly one `Engine` is live against `dir` at any point in this
/// test: `simulate_crash` consumes and fully shuts down the current
/// handle's background worker before the next `Engine::open` on the
/// same directory runs, so there is no window where two instances race
/// each other's WAL/SSTable files.
#[test]
fn crash_safety_recovers_every_completed_prefix() {
    let dir = TempDir::new().unwrap();
    let mut engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    let mut expected = Vec::new();
    for i in 0..20 {
        let key = format!("k{i}").into_bytes();
        let value = format!("v{i}").into_bytes();
        engine.set(key.clone(), value.clone()).unwrap();
        expected.push((key, value));

        // Simulate a crash right after this write lands, then reopen and
        // verify every write up to and including this one survived.
        engine.simulate_crash().unwrap();
        let reopened = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        for (k, v) in &expected {
            assert_eq!(reopened.get(k).unwrap(), Some(v.clone()));
        }
        engine = reopened;
    }

    engine.close().unwrap();
}

/// After a compaction-triggering burst, the logical mapping is
/// unchanged and every key is still reachable.
#[test]
fn compaction_preserves_logical_mapping() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), small_flush_config()).unwrap();

    for round in 0..6 {
        for i in 0..50 {
            engine
                .set(format!("r{round}-k{i}").into_bytes(), vec![b'v'; 64])
                .unwrap();
        }
    }
    // Delete every other key from the first round to exercise tombstone
    // propagation through compaction.
    for i in (0..50).step_by(2) {
        engine.delete(format!("r0-k{i}").into_bytes()).unwrap();
    }

    std::thread::sleep(std::time::Duration::from_millis(500));

    for i in 0..50 {
        let key = format!("r0-k{i}");
        if i % 2 == 0 {
            assert_eq!(engine.get(key.as_bytes()).unwrap(), None);
        } else {
            assert_eq!(engine.get(key.as_bytes()).unwrap(), Some(vec![b'v'; 64]));
        }
    }
    for round in 1..6 {
        for i in 0..50 {
            assert_eq!(
                engine.get(format!("r{round}-k{i}").as_bytes()).unwrap(),
                Some(vec![b'v'; 64])
            );
        }
    }

    engine.close().unwrap();
}
