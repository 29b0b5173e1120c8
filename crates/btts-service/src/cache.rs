//! TTL cache of search requests for paginated follow-ups.
//!
//! A client that pages through results (bot callbacks, for instance) keeps
//! only a short random key. The request behind it is stored here and
//! re-run with a new offset.
//!
//! The cache is bounded by entry count and by an approximate byte cost.
//! Expired entries are dropped first, then least-recently-used ones until
//! both bounds hold.

use std::mem::size_of;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::debug;

use btts_search::SearchRequest;
use btts_types::{CacheSettings, MessageType};

/// Length of generated cache keys.
pub const KEY_LEN: usize = 8;

struct Entry {
    request: SearchRequest,
    cost: usize,
    expires_at: Instant,
}

struct CacheState {
    entries: LruCache<String, Entry>,
    cost: usize,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.pop(key)?;
        self.cost -= entry.cost;
        Some(entry)
    }
}

/// Bounded TTL cache mapping short keys to search requests.
pub struct ResultCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    max_entries: usize,
    max_cost: usize,
}

/// Approximate heap plus inline size of a cached request.
fn request_cost(key: &str, request: &SearchRequest) -> usize {
    size_of::<Entry>()
        + key.len()
        + request.query.len()
        + request.chat_ids.len() * size_of::<i64>()
        + request.user_filters.len() * size_of::<i64>()
        + request.type_filters.len() * size_of::<MessageType>()
}

fn random_key() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(KEY_LEN)
        .map(char::from)
        .collect()
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize, max_cost: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                cost: 0,
            }),
            ttl,
            max_entries: max_entries.max(1),
            max_cost,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.ttl_secs),
            settings.max_entries,
            settings.max_cost_bytes,
        )
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a request and return its key.
    pub fn insert(&self, request: SearchRequest) -> String {
        let mut state = self.lock();
        let mut key = random_key();
        while state.entries.contains(&key) {
            key = random_key();
        }

        let cost = request_cost(&key, &request);
        state.entries.put(
            key.clone(),
            Entry {
                request,
                cost,
                expires_at: Instant::now() + self.ttl,
            },
        );
        state.cost += cost;
        self.evict(&mut state);
        key
    }

    /// Look a request up, refreshing its recency. Expired entries are
    /// removed and reported as missing.
    pub fn get(&self, key: &str) -> Option<SearchRequest> {
        let mut state = self.lock();
        let expired = state.entries.get(key)?.expires_at <= Instant::now();
        if expired {
            state.remove(key);
            return None;
        }
        state.entries.get(key).map(|e| e.request.clone())
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate bytes held.
    pub fn cost(&self) -> usize {
        self.lock().cost
    }

    /// Drop expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.lock();
        Self::drop_expired(&mut state)
    }

    fn drop_expired(state: &mut CacheState) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    fn evict(&self, state: &mut CacheState) {
        if state.entries.len() <= self.max_entries && state.cost <= self.max_cost {
            return;
        }
        let expired = Self::drop_expired(state);
        let mut evicted = 0;
        while state.entries.len() > self.max_entries || state.cost > self.max_cost {
            match state.entries.pop_lru() {
                Some((_, entry)) => {
                    state.cost -= entry.cost;
                    evicted += 1;
                }
                None => break,
            }
        }
        debug!(expired, evicted, cost = state.cost, "Result cache trimmed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str) -> SearchRequest {
        SearchRequest::chat(1, query)
    }

    #[test]
    fn test_insert_and_get() {
        let cache = ResultCache::new(Duration::from_secs(60), 100, 1_000_000);
        let key = cache.insert(request("hello"));
        assert_eq!(key.len(), KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(cache.get(&key).unwrap().query, "hello");
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_expired_entry_is_gone() {
        let cache = ResultCache::new(Duration::ZERO, 100, 1_000_000);
        let key = cache.insert(request("hello"));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.cost(), 0);
    }

    #[test]
    fn test_entry_bound_evicts_least_recent() {
        let cache = ResultCache::new(Duration::from_secs(60), 2, 1_000_000);
        let a = cache.insert(request("a"));
        let b = cache.insert(request("b"));
        // touch a so b becomes least recent
        cache.get(&a).unwrap();
        let c = cache.insert(request("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn test_cost_bound() {
        let one = request_cost("12345678", &request("x"));
        let cache = ResultCache::new(Duration::from_secs(60), 100, one * 2);
        cache.insert(request("x"));
        cache.insert(request("y"));
        cache.insert(request("z"));

        assert_eq!(cache.len(), 2);
        assert!(cache.cost() <= one * 2);
    }

    #[test]
    fn test_remove_and_purge() {
        let cache = ResultCache::new(Duration::from_secs(60), 100, 1_000_000);
        let key = cache.insert(request("hello"));
        assert!(cache.remove(&key));
        assert!(!cache.remove(&key));
        assert_eq!(cache.purge_expired(), 0);

        let short = ResultCache::new(Duration::ZERO, 100, 1_000_000);
        short.insert(request("a"));
        short.insert(request("b"));
        assert_eq!(short.purge_expired(), 2);
    }
}
