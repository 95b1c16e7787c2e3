use std::collections::HashMap;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use terrastat::{
    CacheConfig, CacheKey, ComputeCache, Direction, EntityId, MetricKey, MetricResult,
    MetricStore, Position, SelectionFingerprint, SpatialConfig, SpatialIndex,
};

fn make_store_with_data(scenarios: usize) -> MetricStore {
    let mut directions = HashMap::new();
    directions.insert("avg_utci".to_string(), Direction::LowerIsBetter);
    let store = MetricStore::new(directions);

    store
        .set_results_batch((0..scenarios).map(|i| {
            (
                MetricKey::unfiltered("thermal", "avg_utci", format!("s{i:04}")).unwrap(),
                MetricResult::new(20.0 + i as f64 * 0.01).unwrap(),
            )
        }))
        .unwrap();

    store
}

fn make_index_with_data(items: usize) -> SpatialIndex {
    let mut index = SpatialIndex::new(&SpatialConfig { cell_size: 25.0 }).unwrap();
    // Spread items over a ~2.5km square, roughly uniform.
    for i in 0..items {
        let x = (i % 100) as f64 * 25.0;
        let y = (i / 100) as f64 * 25.0;
        index
            .insert(
                EntityId::new(format!("e{i}")),
                Position::new(x, y).unwrap(),
            )
            .unwrap();
    }
    index
}

fn bench_store_set_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(1));
    group.bench_function("set_result", |b| {
        let store = make_store_with_data(256);
        let key = MetricKey::unfiltered("thermal", "avg_utci", "bench").unwrap();
        b.iter(|| {
            store
                .set_result(key.clone(), MetricResult::new(21.5).unwrap())
                .unwrap();
        });
    });
    group.finish();
}

fn bench_store_get_result(c: &mut Criterion) {
    c.bench_function("store/get_result", |b| {
        let store = make_store_with_data(4096);
        let key = MetricKey::unfiltered("thermal", "avg_utci", "s0100").unwrap();
        b.iter(|| store.get_result(&key).unwrap());
    });
}

fn bench_store_statistics_cold(c: &mut Criterion) {
    c.bench_function("store/statistics_cold_1k", |b| {
        let store = make_store_with_data(1000);
        let probe = MetricKey::unfiltered("thermal", "avg_utci", "probe").unwrap();
        b.iter(|| {
            // Each write invalidates the memo, so every read recomputes.
            store
                .set_result(probe.clone(), MetricResult::new(19.0).unwrap())
                .unwrap();
            store.statistics("thermal", "avg_utci").unwrap()
        });
    });
}

fn bench_spatial_query(c: &mut Criterion) {
    c.bench_function("spatial/query_r100_of_10k", |b| {
        let index = make_index_with_data(10_000);
        let center = Position::new(1250.0, 1250.0).unwrap();
        b.iter(|| index.query(center, 100.0));
    });
}

fn bench_cache_hit(c: &mut Criterion) {
    c.bench_function("cache/compute_or_get_hit", |b| {
        let cache: ComputeCache<f64> = ComputeCache::new(&CacheConfig {
            ttl: Duration::from_secs(3600),
            capacity: 1024,
        });
        let key = CacheKey::new(
            "base",
            SelectionFingerprint::of(["a", "b", "c"]),
            "descriptive",
            "{}",
        );
        cache.put(key.clone(), 24.25).unwrap();
        b.iter(|| cache.compute_or_get(&key, || Ok(0.0)).unwrap());
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("of_1k_ids", |b| {
        let ids: Vec<String> = (0..1000).map(|i| format!("entity-{i}")).collect();
        b.iter(|| SelectionFingerprint::of(&ids));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_store_set_result,
    bench_store_get_result,
    bench_store_statistics_cold,
    bench_spatial_query,
    bench_cache_hit,
    bench_fingerprint
);
criterion_main!(benches);
