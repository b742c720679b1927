//! Micro-benchmarks for the core engine operations.
//!
//! ```bash
//! cargo bench --bench micro
//! cargo bench --bench micro -- get
//! ```

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use lsmkv::{Engine, EngineConfig};
use tempfile::TempDir;

const VALUE_128B: &[u8; 128] = &[0xAB; 128];
const VALUE_1K: &[u8; 1024] = &[0xCD; 1024];

fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

/// Large flush threshold so writes stay in the memtable; isolates
/// WAL-append + skip-list-insert cost from flush/compaction noise.
fn open_memtable_only(dir: &std::path::Path) -> Engine {
    Engine::open(
        dir,
        EngineConfig {
            memtable_flush_bytes: 64 * 1024 * 1024,
            ..EngineConfig::default()
        },
    )
    .expect("open")
}

fn prepopulate(dir: &std::path::Path, count: u64, value: &[u8]) -> Engine {
    let engine = open_memtable_only(dir);
    for i in 0..count {
        engine.set(make_key(i), value.to_vec()).unwrap();
    }
    engine
}

fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    for (label, value) in [("128B", VALUE_128B.as_slice()), ("1K", VALUE_1K.as_slice())] {
        group.throughput(Throughput::Bytes(value.len() as u64));
        group.bench_with_input(BenchmarkId::new("memtable_only", label), value, |b, value| {
            let dir = TempDir::new().unwrap();
            let engine = open_memtable_only(dir.path());
            let mut i = 0u64;
            b.iter_batched(
                || {
                    i += 1;
                    make_key(i)
                },
                |key| engine.set(black_box(key), value.to_vec()).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    group.bench_function("memtable_hit", |b| {
        let dir = TempDir::new().unwrap();
        let engine = prepopulate(dir.path(), 10_000, VALUE_128B);
        let mut i = 0u64;
        b.iter(|| {
            i = (i + 1) % 10_000;
            black_box(engine.get(&make_key(i)).unwrap())
        });
    });

    group.bench_function("sstable_hit", |b| {
        let dir = TempDir::new().unwrap();
        {
            let engine = Engine::open(
                dir.path(),
                EngineConfig {
                    memtable_flush_bytes: 8 * 1024,
                    ..EngineConfig::default()
                },
            )
            .unwrap();
            for i in 0..10_000 {
                engine.set(make_key(i), VALUE_128B.to_vec()).unwrap();
            }
            engine.close().unwrap();
        }
        let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
        let mut i = 0u64;
        b.iter(|| {
            i = (i + 1) % 10_000;
            black_box(engine.get(&make_key(i)).unwrap())
        });
    });

    group.bench_function("miss", |b| {
        let dir = TempDir::new().unwrap();
        let engine = prepopulate(dir.path(), 10_000, VALUE_128B);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(engine.get(&make_key(10_000 + i)).unwrap())
        });
    });

    group.finish();
}

fn bench_delete(c: &mut Criterion) {
    c.bench_function("delete", |b| {
        let dir = TempDir::new().unwrap();
        let engine = prepopulate(dir.path(), 10_000, VALUE_128B);
        let mut i = 0u64;
        b.iter_batched(
            || {
                i = (i + 1) % 10_000;
                make_key(i)
            },
            |key| engine.delete(black_box(key)).unwrap(),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_set, bench_get, bench_delete);
criterion_main!(benches);
