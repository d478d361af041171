#[cfg(test)]
mod tests {
    use crate::cache::tests::helpers::{blob, capacity_cache};

    #[test]
    fn test_lru_eviction_under_capacity() {
        // Capacity 1000, watermark 0.0. A(400), B(400), C(400): A is the
        // LRU prefix whose removal restores the capacity constraint.
        let cache = capacity_cache(1000);

        cache.insert("a", blob(400));
        cache.insert("b", blob(400));
        cache.insert("c", blob(400));

        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_some());
        assert!(cache.lookup("c").is_some());
        assert_eq!(cache.usage_bytes(), 800);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lookup_refreshes_recency() {
        let cache = capacity_cache(1000);

        cache.insert("a", blob(400));
        cache.insert("b", blob(400));

        // Touch "a" so "b" becomes the eviction victim.
        cache.lookup("a").unwrap();
        cache.insert("c", blob(400));

        assert!(cache.lookup("a").is_some());
        assert!(cache.lookup("b").is_none());
        assert!(cache.lookup("c").is_some());
    }

    #[test]
    fn test_eviction_takes_strict_lru_prefix() {
        let cache = capacity_cache(1000);

        cache.insert("a", blob(300));
        cache.insert("b", blob(300));
        cache.insert("c", blob(300));

        // 900 + 500 = 1400: evicting "a" leaves 1100, still over, so "b"
        // goes too; "c" survives.
        cache.insert("d", blob(500));

        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_none());
        assert!(cache.lookup("c").is_some());
        assert!(cache.lookup("d").is_some());
        assert_eq!(cache.usage_bytes(), 800);
    }

    #[test]
    fn test_oversized_value_rejected_without_eviction() {
        let cache = capacity_cache(1000);

        cache.insert("a", blob(400));
        cache.insert("huge", blob(1001));

        // No insertion, no eviction.
        assert!(cache.lookup("huge").is_none());
        assert!(cache.lookup("a").is_some());
        assert_eq!(cache.usage_bytes(), 400);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_value_exactly_at_capacity_accepted() {
        let cache = capacity_cache(1000);

        cache.insert("a", blob(400));
        cache.insert("full", blob(1000));

        // The newcomer displaces everything else but fits by itself.
        assert!(cache.lookup("a").is_none());
        assert_eq!(cache.lookup("full").unwrap().bytes, 1000);
        assert_eq!(cache.usage_bytes(), 1000);
    }

    #[test]
    fn test_replace_does_not_double_count() {
        let cache = capacity_cache(1000);

        cache.insert("a", blob(600));
        cache.insert("a", blob(600));

        assert_eq!(cache.usage_bytes(), 600);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_usage_is_sum_of_entries_after_mixed_ops() {
        let cache = capacity_cache(10_000);

        for i in 0..20 {
            cache.insert(format!("k{i}"), blob(100 + i));
        }
        cache.erase("k3");
        cache.erase("k17");
        cache.insert("k5", blob(999));

        let expected: usize = (0..20)
            .filter(|i| *i != 3 && *i != 17 && *i != 5)
            .map(|i| 100 + i)
            .sum::<usize>()
            + 999;
        assert_eq!(cache.usage_bytes(), expected);
        assert_eq!(cache.len(), 18);
    }
}
