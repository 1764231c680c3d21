//! Bounded, time-expiring in-memory caches.
//!
//! [`TtlLruCache`] is the shared building block: every entry expires once its
//! age exceeds the configured time-to-live, and the least-recently-used entry is
//! evicted whenever the entry count would exceed the configured maximum.
//!
//! Two domain caches are built on top of it:
//! - [`DeduplicationCache`] remembers processed event identifiers so a given
//!   event triggers side effects at most once
//! - [`ResponseCache`] memoizes generated replies keyed by normalized input text
//!
//! All operations take a single lock for their whole read-modify-write
//! sequence and never hold it across an `.await`.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

// ============================================================================
// Configuration
// ============================================================================

/// Size and age bounds for a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of live entries
    pub max_entries: usize,

    /// Maximum age of an entry before it becomes unobservable
    pub ttl: Duration,
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self { max_entries, ttl }
    }

    /// Recommended bounds for event deduplication (1000 entries, 10 minutes)
    pub fn deduplication() -> Self {
        Self::new(1000, Duration::from_secs(10 * 60))
    }

    /// Recommended bounds for reply memoization (500 entries, 5 minutes)
    pub fn responses() -> Self {
        Self::new(500, Duration::from_secs(5 * 60))
    }
}

// ============================================================================
// TtlLruCache
// ============================================================================

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    insert_seq: u64,
    access_tick: u64,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// access tick -> key, oldest access first
    by_recency: BTreeMap<u64, K>,
    /// (insertion time, insertion sequence) -> key, oldest insertion first
    by_age: BTreeMap<(Instant, u64), K>,
    next_tick: u64,
}

impl<K, V> CacheState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_recency: BTreeMap::new(),
            by_age: BTreeMap::new(),
            next_tick: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn purge_expired(&mut self, now: Instant, ttl: Duration) -> usize {
        let mut purged = 0;
        while let Some((&(inserted_at, _), _)) = self.by_age.first_key_value() {
            if now.saturating_duration_since(inserted_at) <= ttl {
                break;
            }
            if let Some((_, key)) = self.by_age.pop_first() {
                if let Some(entry) = self.entries.remove(&key) {
                    self.by_recency.remove(&entry.access_tick);
                }
                purged += 1;
            }
        }
        purged
    }

    fn evict_least_recently_used(&mut self) -> bool {
        let Some((_, key)) = self.by_recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.by_age.remove(&(entry.inserted_at, entry.insert_seq));
        }
        true
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.entries.remove(key)?;
        self.by_recency.remove(&entry.access_tick);
        self.by_age.remove(&(entry.inserted_at, entry.insert_seq));
        Some(entry.value)
    }

    fn touch<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let tick = self.tick();
        let entry = self.entries.get_mut(key)?;
        if let Some(owned_key) = self.by_recency.remove(&entry.access_tick) {
            self.by_recency.insert(tick, owned_key);
        }
        entry.access_tick = tick;
        Some(&entry.value)
    }

    fn insert(&mut self, key: K, value: V, now: Instant, max_entries: usize) -> usize {
        self.remove(&key);

        let tick = self.tick();
        let seq = self.tick();
        self.by_recency.insert(tick, key.clone());
        self.by_age.insert((now, seq), key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                insert_seq: seq,
                access_tick: tick,
            },
        );

        let mut evicted = 0;
        while self.entries.len() > max_entries && self.evict_least_recently_used() {
            evicted += 1;
        }
        evicted
    }
}

/// Thread-safe cache bounded by entry count (LRU eviction) and entry age (TTL).
///
/// Every public operation has an `_at` variant taking an explicit `now` so
/// that expiry can be exercised deterministically.
///
/// # Examples
///
/// ```rust
/// use cast_responder_core::cache::{CacheConfig, TtlLruCache};
/// use std::time::{Duration, Instant};
///
/// let cache = TtlLruCache::new(CacheConfig::new(2, Duration::from_secs(60)));
/// let now = Instant::now();
///
/// cache.insert_at("a".to_string(), 1, now);
/// assert_eq!(cache.get_at("a", now), Some(1));
/// assert_eq!(cache.get_at("a", now + Duration::from_secs(61)), None);
/// ```
pub struct TtlLruCache<K, V> {
    config: CacheConfig,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::new()),
        }
    }

    /// Get the cache bounds
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live entry, marking it as recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_at(key, Instant::now())
    }

    /// Look up a live entry as of `now`.
    pub fn get_at<Q>(&self, key: &Q, now: Instant) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.lock();
        state.purge_expired(now, self.config.ttl);
        state.touch(key).cloned()
    }

    /// Insert or replace an entry, restarting its time-to-live.
    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now())
    }

    /// Insert or replace an entry as of `now`.
    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        let mut state = self.lock();
        state.purge_expired(now, self.config.ttl);
        let evicted = state.insert(key, value, now, self.config.max_entries);
        if evicted > 0 {
            debug!(evicted, "Evicted least recently used cache entries");
        }
    }

    /// Insert the entry only if no live entry exists for `key`.
    ///
    /// Returns `true` when the entry was inserted. The lookup and the insert
    /// happen under one lock, so among concurrent callers with the same key
    /// exactly one observes `true`. An existing entry keeps its original
    /// insertion time.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        self.insert_if_absent_at(key, value, Instant::now())
    }

    /// Atomic insert-if-absent as of `now`.
    pub fn insert_if_absent_at(&self, key: K, value: V, now: Instant) -> bool {
        let mut state = self.lock();
        state.purge_expired(now, self.config.ttl);

        if state.touch(&key).is_some() {
            return false;
        }

        let evicted = state.insert(key, value, now, self.config.max_entries);
        if evicted > 0 {
            debug!(evicted, "Evicted least recently used cache entries");
        }
        true
    }

    /// Remove an entry, returning its value if it was present.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().remove(key)
    }

    /// Drop every entry whose age exceeds the time-to-live as of `now`.
    ///
    /// Returns the number of entries dropped.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        self.lock().purge_expired(now, self.config.ttl)
    }

    /// Number of live entries as of `now`.
    pub fn len_at(&self, now: Instant) -> usize {
        let mut state = self.lock();
        state.purge_expired(now, self.config.ttl);
        state.entries.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len_at(Instant::now())
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> std::fmt::Debug for TtlLruCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlLruCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DeduplicationCache
// ============================================================================

/// Remembers processed event identifiers for at-most-once side effects.
#[derive(Debug)]
pub struct DeduplicationCache {
    seen: TtlLruCache<String, ()>,
}

impl DeduplicationCache {
    /// Create an empty deduplication cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            seen: TtlLruCache::new(config),
        }
    }

    /// Mark `event_id` as seen.
    ///
    /// Returns `true` the first time an identifier is seen within the
    /// retention window and `false` for every later delivery.
    pub fn check_and_mark(&self, event_id: &str) -> bool {
        self.check_and_mark_at(event_id, Instant::now())
    }

    /// [`check_and_mark`](Self::check_and_mark) as of `now`.
    pub fn check_and_mark_at(&self, event_id: &str, now: Instant) -> bool {
        self.seen.insert_if_absent_at(event_id.to_string(), (), now)
    }

    /// Whether `event_id` is currently remembered, without marking it.
    pub fn contains(&self, event_id: &str) -> bool {
        self.seen.get(event_id).is_some()
    }

    /// Number of remembered identifiers
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no identifiers are remembered
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DeduplicationCache {
    fn default() -> Self {
        Self::new(CacheConfig::deduplication())
    }
}

// ============================================================================
// ResponseCache
// ============================================================================

/// Memoizes generated replies keyed by normalized input text.
///
/// Purely a cost and latency optimization: a miss is never an error.
#[derive(Debug)]
pub struct ResponseCache {
    replies: TtlLruCache<String, String>,
}

impl ResponseCache {
    /// Create an empty response cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            replies: TtlLruCache::new(config),
        }
    }

    /// Normalize input text into a cache key (trimmed and case-folded).
    pub fn normalize_key(text: &str) -> String {
        text.trim().to_lowercase()
    }

    /// Look up a memoized reply for `text`.
    pub fn get(&self, text: &str) -> Option<String> {
        self.get_at(text, Instant::now())
    }

    /// [`get`](Self::get) as of `now`.
    pub fn get_at(&self, text: &str, now: Instant) -> Option<String> {
        self.replies.get_at(Self::normalize_key(text).as_str(), now)
    }

    /// Memoize `reply` for `text`.
    pub fn set(&self, text: &str, reply: String) {
        self.set_at(text, reply, Instant::now())
    }

    /// [`set`](Self::set) as of `now`.
    pub fn set_at(&self, text: &str, reply: String, now: Instant) {
        self.replies.insert_at(Self::normalize_key(text), reply, now)
    }

    /// Number of memoized replies
    pub fn len(&self) -> usize {
        self.replies.len()
    }

    /// Whether no replies are memoized
    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::responses())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
