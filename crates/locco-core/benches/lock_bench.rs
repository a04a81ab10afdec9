// Benchmarks for lock acquisition on the in-process adapter
// Measures raw adapter calls and the full Lock lifecycle

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use locco_core::{LockAdapter, Locker, MemoryAdapter, ReleaseOptions, RetrySettings};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    Runtime::new().unwrap()
}

fn bench_adapter_create_release(c: &mut Criterion) {
    let rt = runtime();
    let adapter = MemoryAdapter::new();

    c.bench_function("adapter_create_release", |b| {
        b.to_async(&rt).iter(|| async {
            adapter
                .create_lock(black_box("bench:key"), "owner", 30_000)
                .await
                .unwrap();
            adapter.release_lock("bench:key", "owner").await.unwrap();
        })
    });
}

fn bench_adapter_contended_create(c: &mut Criterion) {
    let rt = runtime();
    let adapter = MemoryAdapter::new();
    rt.block_on(adapter.create_lock("bench:held", "holder", 3_600_000))
        .unwrap();

    c.bench_function("adapter_contended_create", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(adapter.create_lock("bench:held", "other", 30_000).await).unwrap_err();
        })
    });
}

fn bench_lock_lifecycle(c: &mut Criterion) {
    let rt = runtime();
    let locker = Locker::new(Arc::new(MemoryAdapter::new()), RetrySettings::fixed(1, 0)).unwrap();

    c.bench_function("lock_acquire_release", |b| {
        b.to_async(&rt).iter(|| async {
            let mut lock = locker.lock("bench:lifecycle", 30_000).unwrap();
            lock.acquire().await.unwrap();
            lock.release(ReleaseOptions::throw_on_fail()).await.unwrap();
        })
    });
}

fn bench_distinct_keys(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("distinct_keys");

    for count in [10, 100, 1000] {
        let keys: Vec<String> = (0..count).map(|i| format!("bench:key:{}", i)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.to_async(&rt).iter(|| async {
                let adapter = MemoryAdapter::new();
                for key in keys {
                    adapter.create_lock(key, "owner", 30_000).await.unwrap();
                }
                for key in keys {
                    adapter.release_lock(key, "owner").await.unwrap();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_adapter_create_release,
    bench_adapter_contended_create,
    bench_lock_lifecycle,
    bench_distinct_keys,
);
criterion_main!(benches);
