//! Benchmarks for the volatile tier and key handling.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use vendor_cache::cache::key::{CacheKey, DataKind};
use vendor_cache::cache::volatile::VolatileCache;
use vendor_cache::provider::ProviderRequest;

fn request_for(symbol: &str) -> ProviderRequest {
    let key = CacheKey::new(DataKind::Overview, symbol);
    key.kind().codec().request(&key)
}

fn bench_volatile_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = VolatileCache::new(200, Duration::from_secs(3600));
    let requests: Vec<ProviderRequest> = (0..200).map(|i| request_for(&format!("SYM{i}"))).collect();

    rt.block_on(async {
        for request in &requests {
            cache.put(request.clone(), json!({"Symbol": "X"})).await;
        }
    });

    c.bench_function("volatile_get_hit_200", |b| {
        b.iter(|| {
            rt.block_on(async {
                for request in &requests {
                    black_box(cache.get(request).await);
                }
            })
        })
    });
}

fn bench_volatile_churn(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = VolatileCache::new(200, Duration::from_secs(3600));
    let requests: Vec<ProviderRequest> = (0..1_000).map(|i| request_for(&format!("SYM{i}"))).collect();

    // 1,000 distinct keys through a 200-entry cache forces eviction on most puts.
    c.bench_function("volatile_put_evicting_1k", |b| {
        b.iter(|| {
            rt.block_on(async {
                for request in &requests {
                    cache.put(request.clone(), json!({})).await;
                }
            })
        })
    });
}

fn bench_key_normalization(c: &mut Criterion) {
    c.bench_function("cache_key_and_request", |b| {
        b.iter(|| {
            let key = CacheKey::new(DataKind::DailySeries, black_box("brk.b"));
            black_box(key.kind().codec().request(&key));
        })
    });
}

criterion_group!(
    benches,
    bench_volatile_hit,
    bench_volatile_churn,
    bench_key_normalization,
);
criterion_main!(benches);
