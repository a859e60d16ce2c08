//! TTL cache with least-recently-used eviction.
//!
//! Expiry is lazy: an expired entry stays in the map (and is counted by
//! [`TtlCache::size`]) until it is read or [`TtlCache::cleanup_expired`] runs.
//! Recency is tracked with a monotonically increasing rank; the entry with the
//! lowest rank is the least recently used.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Cache shared between the kernel and plugins
pub type SharedCache<K, V> = Arc<Mutex<TtlCache<K, V>>>;

/// Default capacity
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default time-to-live
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Longest lifetime any deadline is given; larger TTLs are clamped to it
pub const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + ttl`, clamped to [`FAR_FUTURE`] instead of overflowing the clock.
pub(crate) fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(FAR_FUTURE)).unwrap_or(now)
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` for an entry stored with a zero TTL
    expire_at: Option<Instant>,
    rank: u64,
}

impl<V> CacheEntry<V> {
    /// Live up to and including its deadline
    fn is_live(&self, now: Instant) -> bool {
        self.expire_at.is_some_and(|at| now <= at)
    }
}

/// Bounded, expiring key/value store
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// rank -> key, oldest first
    recency: BTreeMap<u64, K>,
    next_rank: u64,
    max_size: usize,
    default_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_rank: 0,
            max_size,
            default_ttl,
        }
    }

    pub fn shared(max_size: usize, default_ttl: Duration) -> SharedCache<K, V> {
        Arc::new(Mutex::new(Self::new(max_size, default_ttl)))
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Insert or overwrite `key`, marking it most recently used.
    ///
    /// A zero `ttl` stores an entry that is already expired.
    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expire_at = (!ttl.is_zero()).then(|| deadline_after(Instant::now(), ttl));
        let rank = self.next_rank;
        self.next_rank += 1;

        let entry = CacheEntry { value, expire_at, rank };
        if let Some(previous) = self.entries.insert(key.clone(), entry) {
            self.recency.remove(&previous.rank);
        }
        self.recency.insert(rank, key);

        while self.entries.len() > self.max_size {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    /// Live value for `key`, promoting it to most recently used.
    /// An expired entry is removed and reported as absent.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let live = self.entries.get(key)?.is_live(Instant::now());
        if !live {
            self.remove(key);
            return None;
        }

        let rank = self.next_rank;
        self.next_rank += 1;

        let entry = self.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut entry.rank, rank);
        self.recency.remove(&previous);
        self.recency.insert(rank, key.clone());
        Some(&entry.value)
    }

    /// Liveness check that does not touch recency
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.is_live(Instant::now()))
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.rank);
        Some(entry.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    /// Number of stored entries, expired-but-unread ones included
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_size_never_exceeds_max() {
        let mut cache = TtlCache::new(3, TTL);
        for i in 0..10 {
            cache.set(i, i * 10, None);
            assert!(cache.size() <= 3);
        }
        // The three most recent survive
        assert_eq!(cache.get(&7), Some(&70));
        assert_eq!(cache.get(&8), Some(&80));
        assert_eq!(cache.get(&9), Some(&90));
        assert_eq!(cache.get(&6), None);
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let mut cache = TtlCache::new(2, TTL);
        cache.set("a", 1, None);
        cache.set("b", 2, None);

        assert_eq!(cache.get(&"a"), Some(&1));
        cache.set("c", 3, None);

        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_overwrite_refreshes_recency_without_growing() {
        let mut cache = TtlCache::new(2, TTL);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("a", 10, None);
        assert_eq!(cache.size(), 2);

        cache.set("c", 3, None);
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.get(&"a"), Some(&10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_get_removes_entry() {
        let mut cache = TtlCache::new(10, TTL);
        cache.set("short", 1, Some(Duration::from_secs(5)));
        cache.set("long", 2, None);

        tokio::time::advance(Duration::from_secs(6)).await;

        // Lazy expiry: still counted until accessed
        assert_eq!(cache.size(), 2);
        assert!(!cache.contains(&"short"));
        assert_eq!(cache.get(&"short"), None);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(&"long"), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_ignores_access() {
        let mut cache = TtlCache::new(10, TTL);
        cache.set(1, "a", Some(Duration::from_secs(1)));
        cache.set(2, "b", Some(Duration::from_secs(1)));
        cache.set(3, "c", None);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_is_live_at_its_deadline() {
        let mut cache = TtlCache::new(10, TTL);
        cache.set("k", 1, Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.contains(&"k"));
        assert_eq!(cache.cleanup_expired(), 0);
        assert_eq!(cache.get(&"k"), Some(&1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let mut cache = TtlCache::new(10, Duration::from_secs(u64::MAX));
        cache.set("default", 1, None);
        cache.set("max", 2, Some(Duration::MAX));

        assert_eq!(cache.get(&"default"), Some(&1));
        assert_eq!(cache.get(&"max"), Some(&2));
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn test_deadline_after_never_overflows() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::from_secs(5)), now + Duration::from_secs(5));
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[test]
    fn test_zero_ttl_is_already_expired() {
        let mut cache = TtlCache::new(10, TTL);
        cache.set("k", 1, Some(Duration::ZERO));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_clear_and_remove() {
        let mut cache: TtlCache<String, u32> = TtlCache::default();
        cache.set("x".to_string(), 1, None);
        cache.set("y".to_string(), 2, None);
        assert_eq!(cache.remove(&"x".to_string()), Some(1));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.max_size(), DEFAULT_MAX_SIZE);
    }
}
