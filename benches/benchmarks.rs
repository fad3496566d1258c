use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;

use snapcache::memory::MemoryDatabase;
use snapcache::signal::{Signal, Stable};
use snapcache::{refs_equal, CacheConfig, SharedRef, SubscriptionCache};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn cache_hit_benchmark(c: &mut Criterion) {
    let rt = runtime();
    let _enter = rt.enter();
    let db = MemoryDatabase::new();
    db.set("items/a", 1u64);
    let cache = SubscriptionCache::new(CacheConfig::default()).unwrap();
    let anchor: SharedRef<u64> = Arc::new(db.doc("items/a"));
    let _keep = cache.subscribe(anchor, |_, _| {}, |_| {}, Some("anchor"));

    c.bench_function("cache_hit_subscribe_detach", |b| {
        b.iter(|| {
            let reference: SharedRef<u64> = Arc::new(db.doc("items/a"));
            let mut guard = cache.subscribe(
                reference,
                |snapshot, _| {
                    black_box(snapshot);
                },
                |_| {},
                Some("bench"),
            );
            guard.detach();
        });
    });
}

fn fan_out_benchmark(c: &mut Criterion) {
    let rt = runtime();
    let _enter = rt.enter();
    let mut group = c.benchmark_group("fan_out");

    for listener_count in [1, 10, 100].iter() {
        let db = MemoryDatabase::new();
        let cache = SubscriptionCache::new(CacheConfig::default()).unwrap();
        let guards: Vec<_> = (0..*listener_count)
            .map(|_| {
                let reference: SharedRef<u64> = Arc::new(db.doc("items/a"));
                cache.subscribe(reference, |_, _| {}, |_| {}, None)
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(listener_count),
            listener_count,
            |b, _| {
                let mut i = 0u64;
                b.iter(|| {
                    db.set("items/a", black_box(i));
                    i += 1;
                });
            },
        );
        drop(guards);
    }
    group.finish();
}

fn registry_lookup_benchmark(c: &mut Criterion) {
    let rt = runtime();
    let _enter = rt.enter();
    let mut group = c.benchmark_group("registry_lookup");

    for entry_count in [10, 100, 1000].iter() {
        let db: MemoryDatabase<u64> = MemoryDatabase::new();
        let cache = SubscriptionCache::new(CacheConfig::default()).unwrap();
        let guards: Vec<_> = (0..*entry_count)
            .map(|i| {
                let reference: SharedRef<u64> = Arc::new(db.doc(format!("items/{i}")));
                cache.subscribe(reference, |_, _| {}, |_| {}, None)
            })
            .collect();
        let last: SharedRef<u64> = Arc::new(db.doc(format!("items/{}", entry_count - 1)));

        group.bench_with_input(
            BenchmarkId::from_parameter(entry_count),
            entry_count,
            |b, _| {
                b.iter(|| black_box(cache.listener_count(&last)));
            },
        );
        drop(guards);
    }
    group.finish();
}

fn stable_reference_benchmark(c: &mut Criterion) {
    let db: MemoryDatabase<u64> = MemoryDatabase::new();
    let mut stable = Stable::new(None, |a: &Option<SharedRef<u64>>, b: &Option<SharedRef<u64>>| {
        refs_equal(a.as_deref(), b.as_deref())
    });

    c.bench_function("stable_reference_update", |b| {
        b.iter(|| {
            let reference: SharedRef<u64> = Arc::new(db.doc("items/a"));
            black_box(stable.update(Some(reference)));
        });
    });
}

fn signal_write_benchmark(c: &mut Criterion) {
    let signal: Signal<u64> = Signal::new(0);
    let _watch = signal.watch(|value| {
        black_box(value);
    });

    c.bench_function("signal_write", |b| {
        let mut i = 0;
        b.iter(|| {
            signal.set(black_box(i));
            i += 1;
        });
    });
}

criterion_group!(
    benches,
    cache_hit_benchmark,
    fan_out_benchmark,
    registry_lookup_benchmark,
    stable_reference_benchmark,
    signal_write_benchmark,
);
criterion_main!(benches);
