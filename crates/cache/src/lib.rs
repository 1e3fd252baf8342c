//! Fixed-capacity key/value cache with optional TTL.
//!
//! The cache evicts the least-recently-used entry when inserting at capacity,
//! so it can never hold more than `capacity` entries. When a TTL is set,
//! entries older than the TTL are treated as absent by [`get`](BoundedCache::get)
//! and [`has`](BoundedCache::has) and evicted lazily on access. Iteration
//! skips expired entries but does not purge them; they stay in place until
//! the next access or until capacity pressure pushes them out.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    touched_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        match ttl {
            Some(ttl) => now.duration_since(self.touched_at) > ttl,
            None => false,
        }
    }
}

/// A bounded LRU cache with optional time-to-live.
///
/// `get` counts as a use: it refreshes both the entry's recency and its
/// TTL window. `has` and iteration do not.
pub struct BoundedCache<K, V> {
    capacity: usize,
    ttl: Option<Duration>,
    entries: HashMap<K, CacheEntry<V>>,
    // Recency order, least recently used first. Linear scans are fine at
    // the capacities this cache is used with (hundreds of entries).
    order: Vec<K>,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries, with no TTL.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            capacity,
            ttl: None,
            entries: HashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
        }
    }

    /// Set a time-to-live for entries. Expiry is measured from the last
    /// `set` or `get` of the entry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently stored, including any not-yet-purged
    /// expired entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a key, promoting it to most-recently-used on a hit.
    ///
    /// An expired entry is evicted and reported as absent.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return None,
            Some(entry) if entry.is_expired(self.ttl, now) => {
                self.remove_key(key);
                return None;
            }
            Some(_) => {}
        }
        self.promote(key);
        let entry = self.entries.get_mut(key)?;
        entry.touched_at = now;
        Some(&entry.value)
    }

    /// Whether a live (non-expired) entry exists for `key`.
    ///
    /// Does not affect recency. An expired entry is evicted.
    pub fn has(&mut self, key: &K) -> bool {
        let now = Instant::now();
        match self.entries.get(key) {
            None => false,
            Some(entry) if entry.is_expired(self.ttl, now) => {
                self.remove_key(key);
                false
            }
            Some(_) => true,
        }
    }

    /// Insert or replace a value. Evicts the least-recently-used entry
    /// first when inserting a new key at capacity.
    pub fn set(&mut self, key: K, value: V) {
        let now = Instant::now();
        if self.entries.contains_key(&key) {
            self.promote(&key);
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.value = value;
                entry.touched_at = now;
            }
            return;
        }
        if self.entries.len() >= self.capacity
            && !self.order.is_empty()
        {
            let lru = self.order.remove(0);
            self.entries.remove(&lru);
        }
        self.order.push(key.clone());
        self.entries.insert(key, CacheEntry { value, touched_at: now });
    }

    /// Remove an entry, returning its value if it was present (expired or not).
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.order.retain(|k| k != key);
        self.entries.remove(key).map(|entry| entry.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Iterate over live entries in no particular order.
    ///
    /// Expired entries are skipped but not purged; they remain until the
    /// next `get`/`has` on their key.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries
            .iter()
            .filter(move |(_, entry)| !entry.is_expired(ttl, now))
            .map(|(key, entry)| (key, &entry.value))
    }

    /// Call `f` for every live entry.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for (key, value) in self.entries() {
            f(key, value);
        }
    }

    fn promote(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn remove_key(&mut self, key: &K) {
        self.order.retain(|k| k != key);
        self.entries.remove(key);
    }
}
