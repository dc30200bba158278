//! LRU cache of parsed objects.
//!
//! Objects are immutable per id, so a cached parse never goes stale. Blobs
//! are not cached; their content is usually large and read once.

use crate::Object;
use lru::LruCache;
use parking_lot::Mutex;
use plumbline_core::{ObjectId, ObjectType};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of evictions.
    pub evictions: u64,
    /// Current number of cached objects.
    pub size: usize,
}

impl CacheStats {
    /// Returns the cache hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Parsed-object cache with hit and miss counters.
pub(crate) struct ObjectCache {
    /// `None` when the configured capacity is zero.
    cache: Option<Mutex<LruCache<ObjectId, Object>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ObjectCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub(crate) fn get(&self, id: &ObjectId) -> Option<Object> {
        let cache = self.cache.as_ref()?;
        match cache.lock().get(id).cloned() {
            Some(object) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(object)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub(crate) fn put(&self, object: &Object) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if object.object_type() == ObjectType::Blob {
            return;
        }
        let id = object.id();
        if let Some((evicted, _)) = cache.lock().push(id, object.clone()) {
            if evicted != id {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn clear(&self) {
        if let Some(cache) = self.cache.as_ref() {
            cache.lock().clear();
        }
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.cache.as_ref().map_or(0, |c| c.lock().len()),
        }
    }
}
