//! Bounded, insertion-ordered deduplication cache.
//!
//! Eviction is strictly first-in first-out: lookups and repeated adds never
//! refresh an entry's position, so eviction order depends only on the order
//! of first insertion.
//!
//! The cache is not synchronized. The pipeline only touches it from the
//! sequential merge phase that runs after every fetch task has joined.

use crate::models::Fingerprint;
use std::collections::{HashMap, VecDeque};
use tracing::trace;

#[derive(Debug)]
pub struct DedupCache<T> {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, T>,
}

impl<T: Fingerprint> DedupCache<T> {
    /// A cache holding at most `capacity` entries. A zero capacity stores
    /// nothing, so nothing is ever reported as a duplicate.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(4096)),
            entries: HashMap::with_capacity(capacity.min(4096)),
        }
    }

    pub fn is_duplicate(&self, item: &T) -> bool {
        self.entries.contains_key(&item.fingerprint())
    }

    /// Insert `item` unless its fingerprint is already present, evicting the
    /// oldest entry first when full.
    pub fn add(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        let key = item.fingerprint();
        if self.entries.contains_key(&key) {
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                trace!(evicted = %oldest, "Cache full; evicted oldest fingerprint");
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, item);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached items, oldest first.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|k| self.entries.get(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_article;

    #[test]
    fn test_duplicate_after_add() {
        let mut cache = DedupCache::new(10);
        let a = sample_article("Banjir Bekasi", "https://a.com/1");
        let mut b = sample_article("Banjir Bekasi", "https://a.com/1");
        b.source = "https://other.com/".to_string();

        assert!(!cache.is_duplicate(&b));
        cache.add(a);
        assert!(cache.is_duplicate(&b));
    }

    #[test]
    fn test_re_add_is_noop() {
        let mut cache = DedupCache::new(10);
        cache.add(sample_article("A", "https://a.com/1"));
        cache.add(sample_article("A", "https://a.com/1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent_in_order() {
        let capacity = 3;
        let k = 2;
        let mut cache = DedupCache::new(capacity);
        for i in 0..capacity + k {
            cache.add(sample_article(&format!("t{i}"), "https://a.com"));
        }

        assert_eq!(cache.len(), capacity);
        for i in 0..k {
            assert!(!cache.is_duplicate(&sample_article(&format!("t{i}"), "https://a.com")));
        }
        let titles: Vec<&str> = cache.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["t2", "t3", "t4"]);
    }

    #[test]
    fn test_lookup_does_not_refresh_position() {
        let mut cache = DedupCache::new(2);
        cache.add(sample_article("first", "u"));
        cache.add(sample_article("second", "u"));

        // touching the oldest must not save it from eviction
        assert!(cache.is_duplicate(&sample_article("first", "u")));
        cache.add(sample_article("first", "u"));
        cache.add(sample_article("third", "u"));

        assert!(!cache.is_duplicate(&sample_article("first", "u")));
        assert!(cache.is_duplicate(&sample_article("second", "u")));
        assert!(cache.is_duplicate(&sample_article("third", "u")));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = DedupCache::new(0);
        cache.add(sample_article("a", "u"));
        assert!(cache.is_empty());
        assert!(!cache.is_duplicate(&sample_article("a", "u")));
        assert_eq!(cache.capacity(), 0);
    }
}
