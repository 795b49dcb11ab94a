//! Bounded generational cache (spec §4.B).
//!
//! A best-effort, non-authoritative cache mapping an arbitrary hashable key
//! to a value. The newest generation absorbs writes; once its population
//! exceeds `limit`, it is rotated into the old generation and whatever was
//! in the old generation is discarded. A read hit in the old generation
//! promotes the entry into the new one. Callers must never treat a miss as
//! "does not exist" — the cache exists purely to avoid repeated lookups
//! against the authoritative store.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

struct Generations<K, V> {
    young: HashMap<K, V>,
    old: HashMap<K, V>,
}

/// A bounded, two-generation cache. Cheap to share: all interior mutation
/// goes through a single [`parking_lot::Mutex`].
pub struct Cache<K, V> {
    inner: Mutex<Generations<K, V>>,
    limit: usize,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose young generation rotates once it holds more
    /// than `limit` entries.
    pub fn new(limit: usize) -> Self {
        Cache {
            inner: Mutex::new(Generations {
                young: HashMap::new(),
                old: HashMap::new(),
            }),
            limit: limit.max(1),
        }
    }

    /// Look up `key`. A hit in the old generation is promoted to the
    /// young one before returning.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut gens = self.inner.lock();
        if let Some(v) = gens.young.get(key) {
            return Some(v.clone());
        }
        if let Some(v) = gens.old.remove(key) {
            // Promotion can itself push young over `limit`; that's fine,
            // the next `insert` will rotate.
            gens.young.insert(key.clone(), v.clone());
            return Some(v);
        }
        None
    }

    /// Insert or overwrite `key` in the young generation, rotating
    /// generations if the young generation now exceeds `limit`.
    pub fn insert(&self, key: K, value: V) {
        let mut gens = self.inner.lock();
        gens.old.remove(&key);
        gens.young.insert(key, value);
        if gens.young.len() > self.limit {
            let new_young = HashMap::new();
            let retiring = std::mem::replace(&mut gens.young, new_young);
            gens.old = retiring;
        }
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        let mut gens = self.inner.lock();
        gens.young.clear();
        gens.old.clear();
    }

    /// Total entries across both generations. Best-effort: a key present
    /// in both generations (possible only mid-promotion) is counted once.
    pub fn len(&self) -> usize {
        let gens = self.inner.lock();
        gens.young.len() + gens.old.len()
    }

    /// Whether the cache currently holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
