use crate::error::CacheError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Lifetime class of a cached payload; each maps to a configured TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    RawRecords,
    Aggregate,
    SearchIndex,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub recency_marker: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Capacity-bounded LRU map with per-entry TTL, checked lazily.
///
/// `recency` indexes entries by their last-access marker so the least recently
/// used key is always the first element.
#[derive(Debug)]
pub struct QueryCache {
    capacity: usize,
    entries: HashMap<String, CacheEntry>,
    recency: BTreeMap<u64, String>,
    next_marker: u64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_marker: 0,
        }
    }

    /// Canonical key: operation name plus JSON of filters and options.
    pub fn key_for<F, O>(operation: &str, filters: &F, options: &O) -> String
    where
        F: Serialize,
        O: Serialize,
    {
        let filters_json = serde_json::to_string(filters).unwrap_or_else(|_| "null".to_string());
        let options_json = serde_json::to_string(options).unwrap_or_else(|_| "null".to_string());
        format!("{operation}|{filters_json}|{options_json}")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Presence check that neither refreshes recency nor evicts.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns a copy of a live entry and marks it most recently used.
    /// An expired entry is removed and reported as absent.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<Value> {
        let expired = self.entries.get(key)?.is_expired(now);
        if expired {
            log::debug!("cache entry expired: {key}");
            self.remove(key);
            return None;
        }

        let marker = self.bump_marker();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.recency_marker);
        entry.recency_marker = marker;
        self.recency.insert(marker, key.to_string());
        Some(entry.payload.clone())
    }

    /// Typed read. An undecodable payload is dropped and treated as a miss.
    pub fn get_decoded<T: DeserializeOwned>(&mut self, key: &str, now: Instant) -> Option<T> {
        let payload = self.get_at(key, now)?;
        match serde_json::from_value::<T>(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = CacheError::Corrupted {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                log::warn!("{err}; recomputing");
                self.remove(key);
                None
            }
        }
    }

    /// Stores a payload. Expired entries are swept first; if the cache is still
    /// full and `key` is new, the least recently used entry is evicted.
    pub fn insert_at(&mut self, key: &str, payload: Value, ttl: Duration, now: Instant) {
        if let Some(previous) = self.entries.remove(key) {
            self.recency.remove(&previous.recency_marker);
        } else {
            self.purge_expired_at(now);
            while self.entries.len() >= self.capacity {
                if !self.evict_lru() {
                    break;
                }
            }
        }

        let marker = self.bump_marker();
        self.recency.insert(marker, key.to_string());
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                payload,
                created_at: now,
                expires_at: now + ttl,
                recency_marker: marker,
            },
        );
    }

    /// Typed write. A value that cannot be encoded is simply not cached.
    pub fn insert_encoded<T: Serialize>(
        &mut self,
        key: &str,
        value: &T,
        ttl: Duration,
        now: Instant,
    ) {
        match serde_json::to_value(value) {
            Ok(payload) => self.insert_at(key, payload, ttl, now),
            Err(e) => {
                let err = CacheError::Unencodable {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                log::warn!("{err}; result served uncached");
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.recency_marker);
        Some(entry)
    }

    /// Drops every key starting with `prefix`, or everything when `prefix` is `None`.
    pub fn invalidate(&mut self, prefix: Option<&str>) -> usize {
        let Some(prefix) = prefix else {
            let removed = self.entries.len();
            self.entries.clear();
            self.recency.clear();
            return removed;
        };

        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }

    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        log::debug!("cache evicted least recently used entry: {key}");
        self.entries.remove(&key);
        true
    }

    fn bump_marker(&mut self) -> u64 {
        self.next_marker += 1;
        self.next_marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn evicts_least_recently_inserted_when_full() {
        let mut cache = QueryCache::new(2);
        let now = Instant::now();
        cache.insert_at("A", json!(1), TTL, now);
        cache.insert_at("B", json!(2), TTL, now);
        cache.insert_at("C", json!(3), TTL, now);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key("A"));
        assert!(cache.contains_key("B"));
        assert!(cache.contains_key("C"));
    }

    #[test]
    fn reading_refreshes_recency() {
        let mut cache = QueryCache::new(2);
        let now = Instant::now();
        cache.insert_at("A", json!(1), TTL, now);
        cache.insert_at("B", json!(2), TTL, now);
        assert_eq!(cache.get_at("A", now), Some(json!(1)));
        cache.insert_at("C", json!(3), TTL, now);

        assert!(cache.contains_key("A"));
        assert!(!cache.contains_key("B"));
    }

    #[test]
    fn overwriting_existing_key_does_not_evict() {
        let mut cache = QueryCache::new(2);
        let now = Instant::now();
        cache.insert_at("A", json!(1), TTL, now);
        cache.insert_at("B", json!(2), TTL, now);
        cache.insert_at("A", json!(10), TTL, now);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at("A", now), Some(json!(10)));
        assert!(cache.contains_key("B"));
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut cache = QueryCache::new(3);
        let now = Instant::now();
        for i in 0..50 {
            cache.insert_at(&format!("k{i}"), json!(i), TTL, now);
            if i % 3 == 0 {
                cache.get_at("k0", now);
            }
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn expired_entries_are_misses_and_removed() {
        let mut cache = QueryCache::new(4);
        let now = Instant::now();
        cache.insert_at("A", json!("fresh"), Duration::from_secs(5), now);

        assert_eq!(cache.get_at("A", now + Duration::from_secs(4)), Some(json!("fresh")));
        assert_eq!(cache.get_at("A", now + Duration::from_secs(5)), None);
        assert!(!cache.contains_key("A"));
    }

    #[test]
    fn insert_prefers_sweeping_expired_over_evicting_live() {
        let mut cache = QueryCache::new(2);
        let now = Instant::now();
        cache.insert_at("short", json!(1), Duration::from_secs(1), now);
        cache.insert_at("long", json!(2), TTL, now);
        cache.insert_at("new", json!(3), TTL, now + Duration::from_secs(2));

        assert!(cache.contains_key("long"));
        assert!(cache.contains_key("new"));
        assert!(!cache.contains_key("short"));
    }

    #[test]
    fn invalidates_by_prefix_or_entirely() {
        let mut cache = QueryCache::new(10);
        let now = Instant::now();
        cache.insert_at("savings:a", json!(1), TTL, now);
        cache.insert_at("savings:b", json!(2), TTL, now);
        cache.insert_at("loans:a", json!(3), TTL, now);

        assert_eq!(cache.invalidate(Some("savings:")), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("loans:a"));

        assert_eq!(cache.invalidate(None), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_removes_only_expired() {
        let mut cache = QueryCache::new(10);
        let now = Instant::now();
        cache.insert_at("a", json!(1), Duration::from_secs(1), now);
        cache.insert_at("b", json!(2), Duration::from_secs(100), now);

        assert_eq!(cache.purge_expired_at(now + Duration::from_secs(10)), 1);
        assert!(cache.contains_key("b"));
    }

    #[test]
    fn undecodable_entry_is_dropped() {
        let mut cache = QueryCache::new(4);
        let now = Instant::now();
        cache.insert_at("k", json!({"unexpected": true}), TTL, now);

        let decoded: Option<Vec<u32>> = cache.get_decoded("k", now);
        assert!(decoded.is_none());
        assert!(!cache.contains_key("k"));
    }

    #[test]
    fn canonical_keys_are_stable() {
        let a = QueryCache::key_for("op", &json!({"b": 1, "a": 2}), &json!([1, 2]));
        let b = QueryCache::key_for("op", &json!({"a": 2, "b": 1}), &json!([1, 2]));
        assert_eq!(a, b);
        assert!(a.starts_with("op|"));
    }
}
