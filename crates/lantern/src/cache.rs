//
// cache.rs
//
// Bounded TTL cache with LRU eviction and interior mutability, one instance
// per repository.
//

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Default capacity. Per-domain caches hold one slot per logical dataset,
/// so the bound only matters under pathological reload patterns.
const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self) -> bool {
        self.ttl.is_zero() || self.created_at.elapsed() > self.ttl
    }
}

/// String-keyed cache bounded by capacity and per-entry TTL.
///
/// Uses `get()` under the write lock so live lookups promote to
/// most-recently-used; expired entries are deleted lazily on lookup (no
/// background sweep). Insertion at capacity evicts the least-recently-used
/// entry.
pub struct BoundedCache<T: Clone> {
    inner: RwLock<LruCache<String, CacheEntry<T>>>,
    default_ttl: Duration,
}

impl<T: Clone> std::fmt::Debug for BoundedCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache").finish_non_exhaustive()
    }
}

impl<T: Clone> BoundedCache<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, default_ttl)
    }

    pub fn with_capacity(cap: usize, default_ttl: Duration) -> Self {
        let cap =
            NonZeroUsize::new(cap).unwrap_or(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        Self {
            inner: RwLock::new(LruCache::new(cap)),
            default_ttl,
        }
    }

    /// Look up a live entry, promoting it to most-recently-used.
    ///
    /// An expired entry is removed as a side effect and reported as a miss.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut guard = self.inner.write().ok()?;
        let expired = match guard.get(key) {
            Some(entry) if entry.is_expired() => true,
            Some(entry) => return Some(entry.value.clone()),
            None => return None,
        };
        if expired {
            guard.pop(key);
        }
        None
    }

    /// Insert with the cache's default TTL.
    pub fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert at the most-recently-used position, replacing any existing
    /// entry for the key and evicting the LRU entry when at capacity.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: T, ttl: Duration) {
        if let Ok(mut guard) = self.inner.write() {
            guard.push(
                key.into(),
                CacheEntry {
                    value,
                    created_at: Instant::now(),
                    ttl,
                },
            );
        }
    }

    pub fn delete(&self, key: &str) {
        if let Ok(mut guard) = self.inner.write() {
            guard.pop(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            guard.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live values, most-recently-used first. Expired entries discovered
    /// during the scan are dropped as a side effect (compacting).
    pub fn values(&self) -> Vec<T> {
        let Ok(mut guard) = self.inner.write() else {
            return Vec::new();
        };
        let stale: Vec<String> = guard
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            guard.pop(key);
        }
        guard.iter().map(|(_, e)| e.value.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(cap: usize) -> BoundedCache<i32> {
        BoundedCache::with_capacity(cap, Duration::from_secs(60))
    }

    #[test]
    fn test_get_miss_on_absent_key() {
        let c = cache(4);
        assert_eq!(c.get("missing"), None);
    }

    #[test]
    fn test_set_then_get() {
        let c = cache(4);
        c.set("a", 1);
        assert_eq!(c.get("a"), Some(1));
    }

    #[test]
    fn test_set_replaces_existing() {
        let c = cache(4);
        c.set("a", 1);
        c.set("a", 2);
        assert_eq!(c.get("a"), Some(2));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_lru_eviction_order() {
        // n+1 distinct sets with no intervening gets: first key evicted.
        let c = cache(3);
        c.set("k1", 1);
        c.set("k2", 2);
        c.set("k3", 3);
        c.set("k4", 4);
        assert_eq!(c.get("k1"), None, "LRU entry should be evicted");
        assert_eq!(c.get("k2"), Some(2));
        assert_eq!(c.get("k3"), Some(3));
        assert_eq!(c.get("k4"), Some(4));
    }

    #[test]
    fn test_get_refreshes_recency() {
        // Touching the first-inserted key makes the second-inserted key
        // the eviction victim.
        let c = cache(3);
        c.set("k1", 1);
        c.set("k2", 2);
        c.set("k3", 3);
        assert_eq!(c.get("k1"), Some(1));
        c.set("k4", 4);
        assert_eq!(c.get("k1"), Some(1));
        assert_eq!(c.get("k2"), None, "second-inserted key should be evicted");
        assert_eq!(c.get("k3"), Some(3));
        assert_eq!(c.get("k4"), Some(4));
    }

    #[test]
    fn test_zero_ttl_behaves_as_expired() {
        let c = cache(4);
        c.set_with_ttl("a", 1, Duration::ZERO);
        assert_eq!(c.get("a"), None);
        // The expired entry was deleted by the lookup.
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn test_expired_entry_deleted_on_lookup() {
        let c = cache(4);
        c.set_with_ttl("a", 1, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(c.get("a"), None);
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn test_delete_and_clear() {
        let c = cache(4);
        c.set("a", 1);
        c.set("b", 2);
        c.delete("a");
        assert_eq!(c.get("a"), None);
        assert_eq!(c.get("b"), Some(2));
        c.clear();
        assert!(c.is_empty());
    }

    #[test]
    fn test_values_compacts_expired() {
        let c = cache(4);
        c.set("live", 1);
        c.set_with_ttl("stale", 2, Duration::ZERO);
        let values = c.values();
        assert_eq!(values, vec![1]);
        assert_eq!(c.len(), 1);
    }
}
