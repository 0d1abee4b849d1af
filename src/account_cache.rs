//! Bounded TTL cache for account reads.
//!
//! LRU recency plus a per-entry deadline: `get` drops entries past their
//! deadline and refreshes recency on a hit, inserts evict the coldest
//! entry once the capacity is reached. Coarse-grained locking keeps the
//! structure correct under concurrent readers and writers; every call is
//! a short critical section.

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub insertions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

pub struct TtlCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, CacheEntry<V>>>,
    default_ttl: Duration,
    stats: Mutex<CacheStats>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            default_ttl,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Fetch a live entry, refreshing its recency. Expired entries are
    /// removed on the way out.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut cache = self.inner.lock();
        let expired = match cache.get(key) {
            None => {
                self.stats.lock().misses += 1;
                return None;
            }
            Some(entry) => now >= entry.expires_at,
        };
        if expired {
            cache.pop(key);
            let mut stats = self.stats.lock();
            stats.expirations += 1;
            stats.misses += 1;
            return None;
        }
        self.stats.lock().hits += 1;
        cache.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.inner.lock().put(key, entry);
        self.stats.lock().insertions += 1;
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().pop(key).map(|entry| entry.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_hit_then_expiry() {
        let cache: TtlCache<String, u64> = TtlCache::new(8, Duration::from_secs(2));
        cache.insert("mint".to_string(), 42);
        assert_eq!(cache.get(&"mint".to_string()), Some(42));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.get(&"mint".to_string()), None);
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_coldest() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 10);
        cache.insert(2, 20);
        // Touch 1 so 2 becomes the eviction candidate.
        assert_eq!(cache.get(&1), Some(10));
        cache.insert(3, 30);

        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_ttl_overrides_default() {
        let cache: TtlCache<u32, u32> = TtlCache::new(4, Duration::from_secs(1));
        cache.insert_with_ttl(7, 70, Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get(&7), Some(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove() {
        let cache: TtlCache<u32, u32> = TtlCache::new(4, Duration::from_secs(10));
        cache.insert(1, 1);
        assert_eq!(cache.remove(&1), Some(1));
        assert_eq!(cache.get(&1), None);
    }
}
