use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use refcache::LruCache;

fn bench_lookup_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("lookup_1kb_hit", |b| {
        let cache = LruCache::new(1_000 * 1024);
        let data = vec![b'x'; 1024];

        let keys: Vec<String> = (0..100).map(|i| format!("key:{i}")).collect();
        for key in &keys {
            cache.set(key.clone(), data.clone(), 1024);
        }

        let mut counter = 0;
        b.iter(|| {
            let handle = cache.lookup(&keys[counter % 100]).unwrap();
            black_box(handle.value().len());
            counter += 1;
        });
        cache.close();
    });

    group.finish();
}

fn bench_mixed_50_50(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("50_lookup_50_set", |b| {
        let cache = LruCache::new(1_000 * 1024);
        let data = vec![b'x'; 1024];

        let keys: Vec<String> = (0..100).map(|i| format!("key:{i}")).collect();
        for key in &keys {
            cache.set(key.clone(), data.clone(), 1024);
        }

        let mut counter = 0usize;
        b.iter(|| {
            let key = &keys[counter % 100];
            if counter % 2 == 0 {
                black_box(cache.get(key));
            } else {
                cache.set(key.clone(), data.clone(), 1024);
            }
            counter += 1;
        });
        cache.close();
    });

    group.finish();
}

fn bench_eviction_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_over_capacity", |b| {
        // Small cache so every set evicts
        let cache = LruCache::new(10);

        let mut counter = 0u64;
        b.iter(|| {
            cache.set(format!("key:{counter}"), counter, 1);
            counter += 1;
        });
        black_box(cache.counters().evictions());
        cache.close();
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_lookup_hit,
    bench_mixed_50_50,
    bench_eviction_churn
);
criterion_main!(benches);
