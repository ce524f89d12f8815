//! Byte-budgeted LRU storage.

use super::ByteView;
use crate::types::CacheStats;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Called with every entry that leaves the cache, by eviction or removal.
pub type EvictionCallback = Arc<dyn Fn(&str, &ByteView) + Send + Sync>;

/// LRU cache bounded by the total size of its keys and values.
///
/// An entry costs `key.len() + value.len()` bytes. After every insert the
/// least recently used entries are evicted until the total fits `max_bytes`.
/// A budget of zero means unbounded.
pub struct BoundedCache {
    inner: Mutex<Inner>,

    /// Byte budget, 0 for unbounded.
    max_bytes: usize,

    /// Invoked outside the lock, so it may call back into the cache.
    on_evicted: Option<EvictionCallback>,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct Inner {
    /// Recency order: front is most recently used.
    entries: LruCache<String, ByteView>,

    /// Sum of key and value lengths over `entries`.
    used_bytes: usize,
}

impl Inner {
    fn insert(&mut self, key: String, value: ByteView) {
        let key_len = key.len();
        let value_len = value.len();

        match self.entries.put(key, value) {
            Some(old) => {
                self.used_bytes -= old.len();
                self.used_bytes += value_len;
            }
            None => self.used_bytes += key_len + value_len,
        }
    }

    fn pop_oldest(&mut self) -> Option<(String, ByteView)> {
        let (key, value) = self.entries.pop_lru()?;
        self.used_bytes -= key.len() + value.len();
        Some((key, value))
    }

    fn evict_over(&mut self, max_bytes: usize) -> Vec<(String, ByteView)> {
        let mut evicted = Vec::new();
        while max_bytes != 0 && self.used_bytes > max_bytes {
            match self.pop_oldest() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }
}

impl BoundedCache {
    /// Create a cache holding at most `max_bytes` of keys and values.
    pub fn new(max_bytes: usize) -> Self {
        Self::build(max_bytes, None)
    }

    /// Create a cache that reports evicted entries to `on_evicted`.
    pub fn with_eviction_callback(max_bytes: usize, on_evicted: EvictionCallback) -> Self {
        Self::build(max_bytes, Some(on_evicted))
    }

    fn build(max_bytes: usize, on_evicted: Option<EvictionCallback>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                used_bytes: 0,
            }),
            max_bytes,
            on_evicted,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a key, marking it most recently used on a hit.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let result = self.inner.lock().entries.get(key).cloned();

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        result
    }

    /// Check if a key is present without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Insert or replace a value, then evict down to the byte budget.
    pub fn add(&self, key: impl Into<String>, value: ByteView) {
        let evicted = {
            let mut inner = self.inner.lock();
            inner.insert(key.into(), value);
            inner.evict_over(self.max_bytes)
        };
        self.notify(evicted);
    }

    /// Remove a key. The eviction callback sees it like any other eviction.
    pub fn remove(&self, key: &str) -> Option<ByteView> {
        let removed = {
            let mut inner = self.inner.lock();
            let value = inner.entries.pop(key)?;
            inner.used_bytes -= key.len() + value.len();
            value
        };
        self.notify(vec![(key.to_owned(), removed.clone())]);
        Some(removed)
    }

    /// Evict the least recently used entry.
    pub fn remove_oldest(&self) -> Option<(String, ByteView)> {
        let oldest = self.inner.lock().pop_oldest()?;
        self.notify(vec![oldest.clone()]);
        Some(oldest)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently accounted to keys and values.
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().used_bytes
    }

    /// The byte budget, 0 for unbounded.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let inner = self.inner.lock();
            (inner.entries.len() as u64, inner.used_bytes as u64)
        };
        CacheStats {
            entries,
            bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn notify(&self, evicted: Vec<(String, ByteView)>) {
        self.evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);

        if let Some(callback) = &self.on_evicted {
            for (key, value) in &evicted {
                callback(key, value);
            }
        }
    }
}

impl std::fmt::Debug for BoundedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("entries", &self.len())
            .field("used_bytes", &self.used_bytes())
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}
