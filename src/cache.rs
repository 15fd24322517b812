//! Read Response Cache
//!
//! TTL-bounded cache for read responses. Expiry is checked lazily on access;
//! nothing sweeps in the background. Any write clears the whole cache.
//!
//! Every invalidation bumps a generation counter. A reader that captured the
//! generation before fetching stores its value with [`CacheLayer::set_if_current`],
//! which drops the value if a write invalidated the cache in the meantime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// A cached value and when it was stored
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Key/value cache with a fixed TTL
pub struct CacheLayer<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    generation: AtomicU64,
}

impl<V: Clone> CacheLayer<V> {
    /// Create a cache using the wall clock
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
            generation: AtomicU64::new(0),
        }
    }

    /// Return the value if present and younger than the TTL, evicting it otherwise
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(key) {
            if now.saturating_duration_since(entry.stored_at) < self.ttl {
                return Some(entry.value.clone());
            }
        }

        // Re-check under the shard write lock so a fresh value stored
        // between the read above and here is not evicted
        let ttl = self.ttl;
        if self
            .entries
            .remove_if(key, |_, entry| now.saturating_duration_since(entry.stored_at) >= ttl)
            .is_some()
        {
            tracing::trace!("Evicted stale cache entry {}", key);
        }
        None
    }

    /// Store a value, replacing any previous entry for the key
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: self.clock.now(),
            },
        );
    }

    /// Current invalidation generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store a value computed under `generation`, unless an invalidation happened since
    pub fn set_if_current(&self, key: impl Into<String>, value: V, generation: u64) -> bool {
        let key = key.into();
        self.set(key.clone(), value);

        // An invalidation racing the insert either cleared it already or
        // bumped the generation before clearing, which is caught here
        if self.generation() != generation {
            self.entries.remove(&key);
            tracing::debug!("Discarded cache entry {} computed before a write", key);
            return false;
        }
        true
    }

    /// Drop every entry regardless of age
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let dropped = self.entries.len();
        self.entries.clear();
        tracing::debug!("Cache invalidated ({} entries dropped)", dropped);
    }

    /// Number of stored entries, including stale ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (Arc<ManualClock>, CacheLayer<String>) {
        let clock = Arc::new(ManualClock::new());
        let cache = CacheLayer::with_clock(Duration::from_secs(10), clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_hit_after_set() {
        let (_, cache) = cache();
        assert!(cache.get("k").is_none());

        cache.set("k", "v".to_string());
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_expiry() {
        let (clock, cache) = cache();
        cache.set("k", "v".to_string());

        clock.advance(Duration::from_secs(9));
        assert!(cache.get("k").is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("k").is_none());
        // Stale entry evicted on access
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites_and_refreshes() {
        let (clock, cache) = cache();
        cache.set("k", "old".to_string());
        clock.advance(Duration::from_secs(8));

        cache.set("k", "new".to_string());
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_all() {
        let (_, cache) = cache();
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());

        cache.invalidate_all();
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_value_from_before_invalidation_is_dropped() {
        let (_, cache) = cache();
        let generation = cache.generation();

        // A write lands while the value is being computed
        cache.invalidate_all();

        assert!(!cache.set_if_current("k", "stale".to_string(), generation));
        assert!(cache.get("k").is_none());

        assert!(cache.set_if_current("k", "fresh".to_string(), cache.generation()));
        assert_eq!(cache.get("k").as_deref(), Some("fresh"));
    }
}
