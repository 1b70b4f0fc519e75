//! Byte-bounded least-recently-used store.
//!
//! Entries live in a slot vector and are threaded into a doubly linked
//! recency list by index, so lookup, promotion, insertion and eviction are
//! all O(1). The store is not synchronized; [`LocalCache`](super::store::LocalCache)
//! wraps it in a mutex.
//!
//! Byte accounting counts `key.len() + value.byte_len()` per entry. A
//! `max_bytes` of zero disables the bound.

use std::collections::HashMap;
use std::fmt;

use crate::cache::byteview::ByteLen;

/// Callback invoked with the key and value of every evicted entry.
pub type EvictionCallback<V> = Box<dyn FnMut(&str, &V) + Send>;

struct Node<V> {
    key: String,
    value: V,
    /// Towards the most recently used end.
    prev: Option<usize>,
    /// Towards the least recently used end.
    next: Option<usize>,
}

/// A single-node LRU store bounded by total byte size.
pub struct LruStore<V> {
    /// Capacity in bytes (0 = unbounded).
    max_bytes: usize,

    /// Sum of logical sizes of all entries.
    used_bytes: usize,

    /// Node storage; `None` marks a free slot.
    slots: Vec<Option<Node<V>>>,

    /// Indices of free slots available for reuse.
    free_list: Vec<usize>,

    /// Key to slot index.
    index: HashMap<String, usize>,

    /// Most recently used entry.
    head: Option<usize>,

    /// Least recently used entry.
    tail: Option<usize>,

    on_evicted: Option<EvictionCallback<V>>,
}

impl<V: ByteLen> LruStore<V> {
    /// Create an empty store with the given byte capacity.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            slots: Vec::new(),
            free_list: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            on_evicted: None,
        }
    }

    /// Create an empty store that reports evictions to `callback`.
    pub fn with_eviction_callback(max_bytes: usize, callback: EvictionCallback<V>) -> Self {
        let mut store = Self::new(max_bytes);
        store.on_evicted = Some(callback);
        store
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Look up `key` without touching its recency.
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or replace `key`, then evict until the byte bound holds.
    ///
    /// A value whose own size exceeds `max_bytes` is inserted and immediately
    /// evicted again by the same capacity check.
    pub fn add(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();

        if let Some(&idx) = self.index.get(&key) {
            let new_len = value.byte_len();
            if let Some(node) = self.slots[idx].as_mut() {
                let old_len = node.value.byte_len();
                node.value = value;
                self.used_bytes = self.used_bytes - old_len + new_len;
            }
            self.move_to_front(idx);
        } else {
            self.used_bytes += key.len() + value.byte_len();
            let node = Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            };
            let idx = match self.free_list.pop() {
                Some(idx) => {
                    self.slots[idx] = Some(node);
                    idx
                }
                None => {
                    self.slots.push(Some(node));
                    self.slots.len() - 1
                }
            };
            self.index.insert(key, idx);
            self.push_front(idx);
        }

        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            if self.remove_oldest().is_none() {
                break;
            }
        }

        #[cfg(debug_assertions)]
        self.debug_validate_invariants();
    }

    /// Evict the least recently used entry, invoking the eviction callback.
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let idx = self.tail?;
        let (key, value) = self.take(idx)?;
        if let Some(callback) = self.on_evicted.as_mut() {
            callback(&key, &value);
        }
        Some((key, value))
    }

    /// Remove `key` and return its value. The eviction callback is not invoked.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = *self.index.get(key)?;
        let removed = self.take(idx).map(|(_, value)| value);

        #[cfg(debug_assertions)]
        self.debug_validate_invariants();

        removed
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes currently accounted to entries.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Configured byte capacity (0 = unbounded).
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Keys ordered from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            match self.slots[idx].as_ref() {
                Some(node) => {
                    keys.push(node.key.clone());
                    cursor = node.next;
                }
                None => break,
            }
        }
        keys
    }

    /// Unlink the entry at `idx`, free its slot and update accounting.
    fn take(&mut self, idx: usize) -> Option<(String, V)> {
        self.detach(idx);
        let node = self.slots[idx].take()?;
        self.free_list.push(idx);
        self.index.remove(&node.key);
        self.used_bytes -= node.key.len() + node.value.byte_len();
        Some((node.key, node.value))
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.slots[h].as_mut() {
                node.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    /// Check list links, index and byte accounting against each other.
    ///
    /// Panics on any inconsistency.
    pub fn debug_validate_invariants(&self) {
        let mut count = 0usize;
        let mut bytes = 0usize;
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            let node = self.slots[idx]
                .as_ref()
                .unwrap_or_else(|| panic!("recency list points at free slot {idx}"));
            assert_eq!(node.prev, prev, "broken back link at slot {idx}");
            assert_eq!(
                self.index.get(&node.key),
                Some(&idx),
                "index disagrees for key {:?}",
                node.key
            );
            count += 1;
            bytes += node.key.len() + node.value.byte_len();
            prev = Some(idx);
            cursor = node.next;
        }

        assert_eq!(self.tail, prev, "tail does not terminate the list");
        assert_eq!(count, self.index.len(), "list length differs from index");
        assert_eq!(bytes, self.used_bytes, "used_bytes drifted from entry sizes");
    }
}

impl<V> fmt::Debug for LruStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruStore")
            .field("len", &self.index.len())
            .field("used_bytes", &self.used_bytes)
            .field("max_bytes", &self.max_bytes)
            .field("has_eviction_callback", &self.on_evicted.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::cache::byteview::ByteView;

    fn view(s: &str) -> ByteView {
        ByteView::from(s)
    }

    #[test]
    fn test_get_hit_and_miss() {
        let mut lru = LruStore::new(0);
        lru.add("key1", view("1234"));
        assert_eq!(lru.get("key1"), Some(&view("1234")));
        assert!(lru.get("key2").is_none());
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (k1, k2, k3) = ("key1", "key2", "k3");
        let (v1, v2, v3) = ("value1", "value2", "v3");
        let cap = k1.len() + k2.len() + v1.len() + v2.len();

        let mut lru = LruStore::new(cap);
        lru.add(k1, view(v1));
        lru.add(k2, view(v2));
        lru.add(k3, view(v3));

        assert!(lru.get(k1).is_none());
        assert_eq!(lru.len(), 2);
        assert!(lru.used_bytes() <= cap);
    }

    #[test]
    fn test_get_protects_from_eviction() {
        // Each entry is 2 bytes; capacity fits three.
        let mut lru = LruStore::new(6);
        lru.add("a", view("1"));
        lru.add("b", view("2"));
        lru.add("c", view("3"));
        assert!(lru.get("b").is_some());

        lru.add("d", view("4"));

        assert!(!lru.contains("a"));
        assert!(lru.contains("b"));
        assert!(lru.contains("c"));
        assert_eq!(lru.keys(), vec!["d", "b", "c"]);
    }

    #[test]
    fn test_replace_updates_bytes_and_recency() {
        let mut lru = LruStore::new(0);
        lru.add("a", view("1"));
        lru.add("b", view("2"));
        lru.add("a", view("12345"));

        assert_eq!(lru.len(), 2);
        assert_eq!(lru.used_bytes(), (1 + 5) + (1 + 1));
        assert_eq!(lru.keys(), vec!["a", "b"]);
        assert_eq!(lru.peek("a"), Some(&view("12345")));
    }

    #[test]
    fn test_eviction_callback_receives_entries() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();
        let mut lru = LruStore::with_eviction_callback(
            10,
            Box::new(move |key: &str, value: &ByteView| {
                sink.lock().unwrap().push((key.to_string(), value.to_string_lossy()));
            }),
        );

        lru.add("key1", view("123456"));
        lru.add("k2", view("k2"));
        lru.add("k3", view("k3"));
        lru.add("k4", view("k4"));

        let evicted = evicted.lock().unwrap();
        assert_eq!(
            *evicted,
            vec![("key1".to_string(), "123456".to_string()), ("k2".to_string(), "k2".to_string())]
        );
    }

    #[test]
    fn test_oversized_value_is_not_retained() {
        let mut lru = LruStore::new(8);
        lru.add("a", view("1"));
        lru.add("big", view("0123456789"));

        assert!(!lru.contains("big"));
        assert!(lru.used_bytes() <= 8);
        lru.debug_validate_invariants();
    }

    #[test]
    fn test_remove_and_slot_reuse() {
        let mut lru = LruStore::new(0);
        lru.add("a", view("1"));
        lru.add("b", view("2"));
        assert_eq!(lru.remove("a"), Some(view("1")));
        assert_eq!(lru.remove("a"), None);
        assert_eq!(lru.used_bytes(), 2);

        lru.add("c", view("3"));
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.keys(), vec!["c", "b"]);
        assert_eq!(lru.remove_oldest(), Some(("b".to_string(), view("2"))));
        assert_eq!(lru.keys(), vec!["c"]);
    }

    #[test]
    fn test_unbounded_never_evicts() {
        let mut lru = LruStore::new(0);
        for i in 0..1000 {
            lru.add(format!("key{i}"), view("value"));
        }
        assert_eq!(lru.len(), 1000);
        assert!(lru.remove_oldest().is_some());
        assert_eq!(lru.len(), 999);
    }
}
