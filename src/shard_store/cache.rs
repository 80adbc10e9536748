//! In-memory LRU shard cache (spec §4.1 "Caching").
//!
//! Grounded on the teacher's `DocumentCache`: an `lru::LruCache` behind a
//! `parking_lot::RwLock`, with hit/miss/eviction counters. Keyed by uri only
//! (not uri+hash) — a shard's content hash is a field of the cached value,
//! not part of its identity, since the spec's cache invalidation happens by
//! explicit `invalidate` inside the owning per-uri lock, not by hash miss.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;

use crate::model::FileShard;
use crate::uri::Uri;

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_queries: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_size: usize,
    pub max_capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_queries as f64
        }
    }
}

/// Thread-safe LRU cache mapping uri to its last-loaded shard.
#[derive(Debug)]
pub struct ShardCache {
    cache: RwLock<LruCache<Uri, Arc<FileShard>>>,
    stats: RwLock<CacheStats>,
}

impl ShardCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("capacity must be non-zero"),
            )),
            stats: RwLock::new(CacheStats {
                max_capacity: capacity,
                ..Default::default()
            }),
        }
    }

    pub fn get(&self, uri: &Uri) -> Option<Arc<FileShard>> {
        let mut stats = self.stats.write();
        stats.total_queries += 1;

        let mut cache = self.cache.write();
        match cache.get(uri) {
            Some(shard) => {
                stats.hits += 1;
                Some(shard.clone())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, uri: Uri, shard: Arc<FileShard>) {
        let mut cache = self.cache.write();
        let mut stats = self.stats.write();
        if cache.push(uri, shard).is_some() {
            stats.evictions += 1;
        }
        stats.current_size = cache.len();
    }

    /// Removes `uri` from the cache. Callers MUST hold the per-uri lock
    /// while calling this and before the corresponding disk write completes
    /// (spec §4.1: "cache MUST be invalidated inside the per-uri lock prior
    /// to write").
    pub fn invalidate(&self, uri: &Uri) {
        let mut cache = self.cache.write();
        let mut stats = self.stats.write();
        cache.pop(uri);
        stats.current_size = cache.len();
    }

    pub fn clear(&self) {
        let mut cache = self.cache.write();
        let mut stats = self.stats.write();
        cache.clear();
        stats.current_size = 0;
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}
