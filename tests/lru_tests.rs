//! Capacity and ordering tests for the byte-bounded LRU store.

use std::collections::HashMap;

use peer_cache::cache::{ByteView, LruStore};

/// Deterministic xorshift generator so failures are reproducible.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> usize {
        (self.next() % n) as usize
    }
}

#[test]
fn test_capacity_holds_under_random_workload() {
    for max_bytes in [1, 16, 64, 256] {
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15 ^ max_bytes as u64);
        let mut lru = LruStore::new(max_bytes);

        for _ in 0..5_000 {
            let key = format!("k{}", rng.below(64));
            if rng.below(3) == 0 {
                lru.get(&key);
                continue;
            }
            let value = ByteView::from(vec![b'x'; rng.below(40)]);
            lru.add(key, value);

            assert!(
                lru.used_bytes() <= max_bytes,
                "used {} > max {max_bytes}",
                lru.used_bytes()
            );
        }
        lru.debug_validate_invariants();
    }
}

#[test]
fn test_matches_reference_model() {
    // Each entry is exactly 4 bytes, so capacity 20 holds five entries.
    let mut rng = XorShift(42);
    let mut lru = LruStore::new(20);
    // Reference: keys ordered most to least recently used.
    let mut model: Vec<String> = Vec::new();
    let mut values: HashMap<String, ByteView> = HashMap::new();

    for i in 0..2_000 {
        let key = format!("k{}", rng.below(10));
        if rng.below(2) == 0 {
            let hit = lru.get(&key).cloned();
            if let Some(pos) = model.iter().position(|k| k == &key) {
                let k = model.remove(pos);
                model.insert(0, k);
                assert_eq!(hit.as_ref(), values.get(&key));
            } else {
                assert!(hit.is_none(), "unexpected hit for {key} at step {i}");
            }
        } else {
            let value = ByteView::from(format!("{:02}", i % 100).as_str());
            lru.add(key.clone(), value.clone());
            model.retain(|k| k != &key);
            model.insert(0, key.clone());
            values.insert(key, value);
            while model.len() > 5 {
                if let Some(evicted) = model.pop() {
                    values.remove(&evicted);
                }
            }
        }
        assert_eq!(lru.keys(), model, "order diverged at step {i}");
    }
}

#[test]
fn test_unbounded_store_never_evicts() {
    let mut lru = LruStore::new(0);
    for i in 0..1_000 {
        lru.add(format!("key-{i}"), ByteView::from(vec![0u8; 100]));
    }
    assert_eq!(lru.len(), 1_000);
    assert!(lru.get("key-0").is_some());
}
