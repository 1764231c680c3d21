//! Tests for the bounded TTL caches.

use super::*;
use std::sync::{Arc, Barrier};

fn cache(max_entries: usize, ttl_secs: u64) -> TtlLruCache<String, u32> {
    TtlLruCache::new(CacheConfig::new(max_entries, Duration::from_secs(ttl_secs)))
}

// ============================================================================
// TtlLruCache
// ============================================================================

mod ttl_lru_tests {
    use super::*;

    #[test]
    fn test_entry_visible_until_ttl_exceeded() {
        let cache = cache(10, 60);
        let start = Instant::now();

        cache.insert_at("k".to_string(), 7, start);

        assert_eq!(cache.get_at("k", start + Duration::from_secs(60)), Some(7));
        assert_eq!(
            cache.get_at("k", start + Duration::from_secs(60) + Duration::from_millis(1)),
            None
        );
    }

    #[test]
    fn test_size_never_exceeds_max_entries() {
        let cache = cache(3, 600);
        let now = Instant::now();

        for i in 0..50u32 {
            cache.insert_at(format!("key-{}", i), i, now);
            assert!(cache.len_at(now) <= 3);
        }
        assert_eq!(cache.len_at(now), 3);
    }

    #[test]
    fn test_least_recently_used_entry_evicted_first() {
        let cache = cache(2, 600);
        let now = Instant::now();

        cache.insert_at("a".to_string(), 1, now);
        cache.insert_at("b".to_string(), 2, now);

        // Reading "a" makes "b" the least recently used
        assert_eq!(cache.get_at("a", now), Some(1));
        cache.insert_at("c".to_string(), 3, now);

        assert_eq!(cache.get_at("a", now), Some(1));
        assert_eq!(cache.get_at("b", now), None);
        assert_eq!(cache.get_at("c", now), Some(3));
    }

    #[test]
    fn test_replacing_entry_restarts_ttl() {
        let cache = cache(10, 60);
        let start = Instant::now();

        cache.insert_at("k".to_string(), 1, start);
        cache.insert_at("k".to_string(), 2, start + Duration::from_secs(50));

        assert_eq!(cache.get_at("k", start + Duration::from_secs(100)), Some(2));
        assert_eq!(cache.len_at(start + Duration::from_secs(100)), 1);
    }

    #[test]
    fn test_reads_do_not_extend_ttl() {
        let cache = cache(10, 60);
        let start = Instant::now();

        cache.insert_at("k".to_string(), 1, start);
        assert_eq!(cache.get_at("k", start + Duration::from_secs(59)), Some(1));
        assert_eq!(cache.get_at("k", start + Duration::from_secs(61)), None);
    }

    #[test]
    fn test_insert_if_absent_only_first_wins() {
        let cache = cache(10, 60);
        let now = Instant::now();

        assert!(cache.insert_if_absent_at("k".to_string(), 1, now));
        assert!(!cache.insert_if_absent_at("k".to_string(), 2, now));
        assert_eq!(cache.get_at("k", now), Some(1));
    }

    #[test]
    fn test_insert_if_absent_succeeds_after_expiry() {
        let cache = cache(10, 60);
        let start = Instant::now();

        assert!(cache.insert_if_absent_at("k".to_string(), 1, start));
        assert!(cache.insert_if_absent_at("k".to_string(), 2, start + Duration::from_secs(61)));
        assert_eq!(cache.get_at("k", start + Duration::from_secs(61)), Some(2));
    }

    #[test]
    fn test_purge_expired_reports_count() {
        let cache = cache(10, 60);
        let start = Instant::now();

        cache.insert_at("old-1".to_string(), 1, start);
        cache.insert_at("old-2".to_string(), 2, start);
        cache.insert_at("fresh".to_string(), 3, start + Duration::from_secs(30));

        assert_eq!(cache.purge_expired_at(start + Duration::from_secs(70)), 2);
        assert_eq!(cache.len_at(start + Duration::from_secs(70)), 1);
    }

    #[test]
    fn test_remove_returns_value() {
        let cache = cache(10, 60);
        cache.insert("k".to_string(), 9);

        assert_eq!(cache.remove("k"), Some(9));
        assert_eq!(cache.remove("k"), None);
        assert!(cache.is_empty());
    }

    /// Under arbitrary interleavings of inserts and reads the cache never
    /// exceeds its bound and never returns an entry older than its TTL.
    #[test]
    fn test_bounds_hold_under_mixed_operations() {
        let ttl = Duration::from_millis(500);
        let cache: TtlLruCache<u64, Instant> = TtlLruCache::new(CacheConfig::new(8, ttl));
        let start = Instant::now();

        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut offset = Duration::ZERO;

        for _ in 0..5_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            offset += Duration::from_millis(seed % 20);
            let now = start + offset;
            let key = seed % 32;

            if seed % 3 == 0 {
                cache.insert_at(key, now, now);
            } else if let Some(inserted_at) = cache.get_at(&key, now) {
                assert!(now.duration_since(inserted_at) <= ttl);
            }
            assert!(cache.len_at(now) <= 8);
        }
    }
}

// ============================================================================
// DeduplicationCache
// ============================================================================

mod deduplication_tests {
    use super::*;

    #[test]
    fn test_first_delivery_true_then_false() {
        let dedup = DeduplicationCache::default();

        assert!(dedup.check_and_mark("0xabc"));
        assert!(!dedup.check_and_mark("0xabc"));
        assert!(!dedup.check_and_mark("0xabc"));
        assert!(dedup.check_and_mark("0xdef"));
    }

    #[test]
    fn test_default_bounds() {
        let config = CacheConfig::deduplication();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_identifier_forgotten_after_retention_window() {
        let dedup = DeduplicationCache::new(CacheConfig::new(10, Duration::from_secs(600)));
        let start = Instant::now();

        assert!(dedup.check_and_mark_at("0xabc", start));
        assert!(!dedup.check_and_mark_at("0xabc", start + Duration::from_secs(599)));
        assert!(dedup.check_and_mark_at("0xabc", start + Duration::from_secs(601)));
    }

    #[test]
    fn test_contains_does_not_mark() {
        let dedup = DeduplicationCache::default();

        assert!(!dedup.contains("0xabc"));
        assert!(dedup.check_and_mark("0xabc"));
        assert!(dedup.contains("0xabc"));
    }

    #[test]
    fn test_concurrent_check_and_mark_exactly_one_winner() {
        let dedup = Arc::new(DeduplicationCache::default());
        let callers = 16;
        let barrier = Arc::new(Barrier::new(callers));

        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    dedup.check_and_mark("0xsame")
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}

// ============================================================================
// ResponseCache
// ============================================================================

mod response_cache_tests {
    use super::*;

    #[test]
    fn test_key_normalization_trims_and_case_folds() {
        assert_eq!(ResponseCache::normalize_key("  Hello World \n"), "hello world");
    }

    #[test]
    fn test_lookup_is_normalization_insensitive() {
        let cache = ResponseCache::default();
        cache.set("What is Farcaster?", "A protocol.".to_string());

        assert_eq!(
            cache.get("  what is farcaster?  "),
            Some("A protocol.".to_string())
        );
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = ResponseCache::default();
        assert_eq!(cache.get("never asked"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_memoized_reply_expires() {
        let cache = ResponseCache::new(CacheConfig::new(10, Duration::from_secs(300)));
        let start = Instant::now();

        cache.set_at("question", "answer".to_string(), start);
        assert!(cache.get_at("question", start + Duration::from_secs(300)).is_some());
        assert!(cache.get_at("question", start + Duration::from_secs(301)).is_none());
    }
}
