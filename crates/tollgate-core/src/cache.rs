//! Cached responses and the shared, lock-guarded response cache.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode, Version};
use parking_lot::Mutex;

use crate::lru::LruCache;

/// Default number of cached responses.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Status line, protocol version, and headers of a stored response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// Response status code.
    pub status: StatusCode,
    /// Protocol version the origin answered with.
    pub version: Version,
    /// Full header map, multi-valued headers preserved in order.
    pub headers: HeaderMap,
}

impl ResponseMeta {
    /// Creates metadata from its parts.
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap) -> Self {
        Self {
            status,
            version,
            headers,
        }
    }
}

/// A response stored in the cache.
///
/// `key` is the absolute request target in the proxy's normalized form. It
/// doubles as the URI dialed when the entry is revalidated, so it must stay an
/// absolute, fetchable URI.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request-target string the response was fetched for.
    pub key: String,
    /// Status, version, and headers.
    pub meta: ResponseMeta,
    /// Complete response body.
    pub body: Bytes,
    /// When the entry was created.
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(key: impl Into<String>, meta: ResponseMeta, body: Bytes) -> Self {
        Self {
            key: key.into(),
            meta,
            body,
            stored_at: Utc::now(),
        }
    }

    /// Whole seconds the entry has spent in the cache, as sent in `Age`.
    pub fn age(&self) -> u64 {
        self.age_at(Utc::now())
    }

    /// Whole seconds between storing and `now`. Never negative.
    pub fn age_at(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.stored_at).num_seconds()).unwrap_or(0)
    }
}

/// Thread-safe response cache.
///
/// A single mutex guards the LRU map. Every method holds it for exactly one
/// logical operation, and [`SharedCache::insert_if_unchanged`] performs the
/// check-then-insert step under that same lock. Entries are handed out as
/// `Arc`s so a cached body can be served after the lock is released.
#[derive(Clone)]
pub struct SharedCache {
    inner: Arc<Mutex<LruCache<String, Arc<CacheEntry>>>>,
}

impl std::fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.inner.lock();
        f.debug_struct("SharedCache")
            .field("capacity", &cache.capacity())
            .field("len", &cache.len())
            .finish()
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl SharedCache {
    /// Creates an empty cache with the given capacity.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Looks up `key`, marking it most recently used on a hit.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.inner.lock().get(key).cloned()
    }

    /// Inserts or replaces an entry. Returns the evicted entry, if any.
    pub fn set(&self, entry: CacheEntry) -> Option<Arc<CacheEntry>> {
        let key = entry.key.clone();
        self.inner
            .lock()
            .set(key, Arc::new(entry))
            .map(|(_, evicted)| evicted)
    }

    /// Stores `entry` only if the slot for its key still holds what the caller
    /// saw before fetching from the origin.
    ///
    /// `observed` is the entry returned by the earlier lookup (`None` for a
    /// miss). The insert happens when the slot is still empty, or still holds
    /// that same stale entry, which is then overwritten. If another task has
    /// stored a different entry in the meantime, nothing changes. Returns true
    /// if the entry was stored.
    pub fn insert_if_unchanged(
        &self,
        entry: CacheEntry,
        observed: Option<&Arc<CacheEntry>>,
    ) -> bool {
        let mut cache = self.inner.lock();

        let unchanged = match (cache.peek(entry.key.as_str()), observed) {
            (None, None) => true,
            (Some(current), Some(seen)) => Arc::ptr_eq(current, seen),
            _ => false,
        };

        if unchanged {
            let key = entry.key.clone();
            cache.set(key, Arc::new(entry));
        }
        unchanged
    }

    /// Runs `f` with the cache locked.
    ///
    /// The closure must not block; the lock is a synchronous mutex.
    pub fn with_lock<R>(
        &self,
        f: impl FnOnce(&mut LruCache<String, Arc<CacheEntry>>) -> R,
    ) -> R {
        f(&mut *self.inner.lock())
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Maximum number of cached entries.
    pub fn capacity(&self) -> NonZeroUsize {
        self.inner.lock().capacity()
    }

    /// Cached keys, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }
}
