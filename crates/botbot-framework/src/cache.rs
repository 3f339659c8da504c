//! A small concurrent cache with optional expiry.
//!
//! Reads and writes go through a `parking_lot` lock and are never held across
//! an `.await`. Values are replaced whole, so a reader sees either the old or
//! the new value and never a partial write.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct Slot<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Slot<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// A keyed cache whose entries optionally expire after a fixed lifetime.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Slot<V>>>,
    ttl: Option<Duration>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates a cache; `None` keeps entries until they are invalidated.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached value if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries.write().insert(key, Slot { value, expires_at });
    }

    /// Inserts only if `valid` still holds once the write lock is taken,
    /// returning whether the value was stored.
    pub fn insert_if(&self, key: K, value: V, valid: impl FnOnce() -> bool) -> bool {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.write();
        if !valid() {
            return false;
        }
        entries.insert(key, Slot { value, expires_at });
        true
    }

    /// Drops `key`, returning whether it was cached.
    pub fn remove(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Keeps only the entries whose key satisfies `keep`.
    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
        self.entries.write().retain(|key, _| keep(key));
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.read().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
