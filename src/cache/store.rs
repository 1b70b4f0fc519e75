//! Thread-safe, lazily constructed wrapper around [`LruStore`].

use parking_lot::Mutex;

use crate::cache::byteview::ByteView;
use crate::cache::lru::LruStore;

/// Point-in-time size of a [`LocalCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    pub items: usize,
    pub bytes: usize,
}

/// The per-group local cache.
///
/// The inner store is only allocated on the first write; reads against an
/// empty cache are plain misses. Every operation holds the mutex for a single
/// O(1) store call.
#[derive(Debug)]
pub struct LocalCache {
    max_bytes: usize,
    lru: Mutex<Option<LruStore<ByteView>>>,
}

impl LocalCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            lru: Mutex::new(None),
        }
    }

    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut guard = self.lru.lock();
        guard.as_mut()?.get(key).cloned()
    }

    pub fn add(&self, key: &str, value: ByteView) -> CacheUsage {
        let mut guard = self.lru.lock();
        let lru = guard.get_or_insert_with(|| LruStore::new(self.max_bytes));
        lru.add(key, value);
        CacheUsage {
            items: lru.len(),
            bytes: lru.used_bytes(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lru
            .lock()
            .as_ref()
            .map(|lru| lru.contains(key))
            .unwrap_or(false)
    }

    pub fn usage(&self) -> CacheUsage {
        self.lru
            .lock()
            .as_ref()
            .map(|lru| CacheUsage {
                items: lru.len(),
                bytes: lru.used_bytes(),
            })
            .unwrap_or_default()
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}
