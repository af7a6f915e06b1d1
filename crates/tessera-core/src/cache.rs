//! Expiring key/value cache.
//!
//! [`TtlCache`] stores values for a fixed time-to-live. Expiry is evaluated
//! lazily: an expired entry is evicted by the next [`TtlCache::get`] of its
//! key, never by a background sweep.
//!
//! Time comes from a [`Clock`]. [`MonotonicClock`] is backed by
//! [`std::time::Instant`], so wall-clock adjustments cannot resurrect or
//! prematurely expire entries. [`ManualClock`] lets tests step time by hand.
//!
//! The cache takes `&mut self` for every operation and carries no lock of its
//! own. Owners that share it across tasks wrap it in a mutex and hold the
//! guard for a single operation only.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ============================================================================
// Clocks
// ============================================================================

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by the OS monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can hand one clone to a
/// cache and keep another to advance it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }

    /// Total time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

// ============================================================================
// Cache
// ============================================================================

/// A cached value with its absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// The stored value.
    pub value: V,
    /// Instant after which the entry is stale; `None` when the TTL reaches
    /// past what [`Instant`] can represent.
    pub expires_at: Option<Instant>,
}

/// Generic expiring key/value store.
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache using the monotonic OS clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(MonotonicClock))
    }

    /// Create a cache with an explicit clock.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    /// The time-to-live applied by [`set`](Self::set).
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the value for `key` if it has not expired.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if entry.expires_at.is_none_or(|at| now < at) => {
                Some(entry.value.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value`, replacing any previous entry and resetting its expiry.
    pub fn set(&mut self, key: K, value: V) {
        let expires_at = self.clock.now().checked_add(self.ttl);
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Remove `key` regardless of its expiry state.
    ///
    /// Returns `true` if an entry was present.
    pub fn delete(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Whether an entry is stored for `key`, expired or not.
    ///
    /// Does not evict.
    pub fn contains_raw(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored entries, including expired-but-unread ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_clock(ttl_ms: u64) -> (TtlCache<String, i32>, ManualClock) {
        let clock = ManualClock::new();
        let cache = TtlCache::with_clock(Duration::from_millis(ttl_ms), Arc::new(clock.clone()));
        (cache, clock)
    }

    #[test]
    fn test_get_before_and_after_expiry() {
        let (mut cache, clock) = cache_with_clock(100);
        cache.set("a".to_string(), 1);

        clock.advance(Duration::from_millis(50));
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        clock.advance(Duration::from_millis(100));
        assert_eq!(cache.get(&"a".to_string()), None);

        // The read evicted the entry.
        assert!(!cache.contains_raw(&"a".to_string()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let (mut cache, clock) = cache_with_clock(100);
        cache.set("a".to_string(), 1);
        clock.advance(Duration::from_millis(100));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn test_expired_entry_kept_until_read() {
        let (mut cache, clock) = cache_with_clock(10);
        cache.set("a".to_string(), 1);
        clock.advance(Duration::from_millis(20));

        assert_eq!(cache.len(), 1);
        assert!(cache.contains_raw(&"a".to_string()));
    }

    #[test]
    fn test_set_overwrites_and_resets_expiry() {
        let (mut cache, clock) = cache_with_clock(100);
        cache.set("a".to_string(), 1);
        clock.advance(Duration::from_millis(80));
        cache.set("a".to_string(), 2);
        clock.advance(Duration::from_millis(80));

        assert_eq!(cache.get(&"a".to_string()), Some(2));
    }

    #[test]
    fn test_delete_live_entry() {
        let (mut cache, _clock) = cache_with_clock(100);
        cache.set("a".to_string(), 1);
        assert!(cache.delete(&"a".to_string()));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn test_delete_expired_entry() {
        let (mut cache, clock) = cache_with_clock(10);
        cache.set("a".to_string(), 1);
        clock.advance(Duration::from_millis(50));

        assert!(cache.delete(&"a".to_string()));
        assert!(cache.is_empty());
        assert!(!cache.delete(&"a".to_string()));
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let (mut cache, _clock) = cache_with_clock(100);
        assert_eq!(cache.get(&"missing".to_string()), None);
    }

    #[test]
    fn test_clear() {
        let (mut cache, _clock) = cache_with_clock(100);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oversized_ttl_never_expires() {
        let clock = ManualClock::new();
        let mut cache: TtlCache<&str, i32> =
            TtlCache::with_clock(Duration::from_secs(i64::MAX as u64), Arc::new(clock.clone()));
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert_eq!(cache.get(&"a"), Some(1));
        assert!(cache.delete(&"a"));
    }

    #[test]
    fn test_oversized_ttl_on_monotonic_clock() {
        let mut cache = TtlCache::new(Duration::MAX);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let start = other.now();
        clock.advance(Duration::from_secs(3));
        assert_eq!(other.now() - start, Duration::from_secs(3));
        assert_eq!(other.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn test_monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_debug_output() {
        let (cache, _clock) = cache_with_clock(100);
        let debug = format!("{cache:?}");
        assert!(debug.contains("TtlCache"));
    }
}
