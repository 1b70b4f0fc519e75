//! Benchmarks for the local store, the hash ring and the group hit path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use peer_cache::cache::{ByteView, LruStore};
use peer_cache::group::{GroupRegistry, SourceFn};
use peer_cache::peers::ring::{HashRing, DEFAULT_REPLICAS};

fn bench_lru(c: &mut Criterion) {
    let keys: Vec<String> = (0..10_000).map(|i| format!("key-{i}")).collect();
    let value = ByteView::from(vec![0u8; 64]);

    c.bench_function("lru_add_10k_evicting", |b| {
        b.iter(|| {
            // Room for roughly a quarter of the keys.
            let mut lru = LruStore::new(2_500 * 73);
            for key in &keys {
                lru.add(key.as_str(), value.clone());
            }
            black_box(lru.len());
        })
    });

    let mut lru = LruStore::new(0);
    for key in &keys {
        lru.add(key.as_str(), value.clone());
    }
    c.bench_function("lru_get_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % keys.len();
            black_box(lru.get(&keys[i]).is_some());
        })
    });
}

fn bench_ring(c: &mut Criterion) {
    let mut ring = HashRing::new(DEFAULT_REPLICAS);
    ring.add((0..16).map(|i| format!("http://10.0.0.{i}:8001")));
    let keys: Vec<String> = (0..1_000).map(|i| format!("key-{i}")).collect();

    c.bench_function("ring_get_16_peers", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(ring.get(key));
            }
        })
    });

    c.bench_function("ring_build_16_peers", |b| {
        b.iter(|| {
            let mut ring = HashRing::new(DEFAULT_REPLICAS);
            ring.add((0..16).map(|i| format!("http://10.0.0.{i}:8001")));
            black_box(ring.len());
        })
    });
}

fn bench_group_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let registry = GroupRegistry::new().unwrap();
    let group = registry
        .new_group(
            "bench",
            0,
            SourceFn(|key: String| async move { anyhow::Ok(key.into_bytes()) }),
        )
        .unwrap();
    runtime.block_on(group.get("hot")).unwrap();

    c.bench_function("group_get_hit", |b| {
        b.iter(|| {
            let value = runtime.block_on(group.get(black_box("hot"))).unwrap();
            black_box(value);
        })
    });
}

criterion_group!(benches, bench_lru, bench_ring, bench_group_hit);
criterion_main!(benches);
