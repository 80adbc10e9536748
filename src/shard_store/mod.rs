//! The shard store (spec §4.1): durable per-file storage with safe
//! concurrent access, an LRU cache, write coalescing, and per-uri mutual
//! exclusion composed around a pluggable backend.

pub mod cache;
pub mod format;
pub mod fs_backend;
pub mod lock_table;
pub mod sql_backend;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Result;
use crate::model::FileShard;
use crate::uri::Uri;

use cache::ShardCache;
use fs_backend::FsShardBackend;
use lock_table::LockTable;
use sql_backend::SqlShardBackend;
use write_coalescing::{CoalesceOutcome, WriteCoalescer};

pub mod write_coalescing;

/// The contract both storage backends satisfy (spec §9 open question: the
/// core depends only on this trait, never on SQL-only relational queries).
pub trait IndexStorage: Send + Sync {
    fn load_raw(&self, uri: &Uri) -> Result<Option<FileShard>>;
    fn save_raw(&self, shard: &FileShard) -> Result<()>;
    fn delete_raw(&self, uri: &Uri) -> Result<()>;
    fn exists_raw(&self, uri: &Uri) -> bool;
    fn list_all_raw(&self) -> Result<Vec<FileShard>>;
    fn clear_raw(&self) -> Result<()>;
}

impl IndexStorage for FsShardBackend {
    fn load_raw(&self, uri: &Uri) -> Result<Option<FileShard>> {
        self.load(uri)
    }
    fn save_raw(&self, shard: &FileShard) -> Result<()> {
        self.save(shard)
    }
    fn delete_raw(&self, uri: &Uri) -> Result<()> {
        self.delete(uri)
    }
    fn exists_raw(&self, uri: &Uri) -> bool {
        self.exists(uri)
    }
    fn list_all_raw(&self) -> Result<Vec<FileShard>> {
        self.list_all()
    }
    fn clear_raw(&self) -> Result<()> {
        self.clear()
    }
}

impl IndexStorage for SqlShardBackend {
    fn load_raw(&self, uri: &Uri) -> Result<Option<FileShard>> {
        self.load(uri)
    }
    fn save_raw(&self, shard: &FileShard) -> Result<()> {
        self.save(shard)
    }
    fn delete_raw(&self, uri: &Uri) -> Result<()> {
        self.delete(uri)
    }
    fn exists_raw(&self, uri: &Uri) -> bool {
        self.exists(uri)
    }
    fn list_all_raw(&self) -> Result<Vec<FileShard>> {
        self.list_all()
    }
    fn clear_raw(&self) -> Result<()> {
        self.clear()
    }
}

/// Durable per-file storage: caching, coalescing, and per-uri exclusion
/// composed around any [`IndexStorage`] backend.
pub struct ShardStore {
    backend: Arc<dyn IndexStorage>,
    cache: ShardCache,
    locks: LockTable,
    coalescer: Mutex<WriteCoalescer>,
    write_buffer_enabled: bool,
}

impl ShardStore {
    pub fn new(backend: Arc<dyn IndexStorage>, cache_capacity: usize, coalesce_window: Duration, max_pending_writes: usize) -> Self {
        Self::with_write_buffer(backend, cache_capacity, coalesce_window, max_pending_writes, true)
    }

    /// Same as [`ShardStore::new`], but lets the caller disable write
    /// coalescing outright (spec §6 `writeBufferEnabled`): with it `false`,
    /// every `save`/`save_locked` flushes straight to the backend instead of
    /// buffering inside the coalescing window.
    pub fn with_write_buffer(
        backend: Arc<dyn IndexStorage>,
        cache_capacity: usize,
        coalesce_window: Duration,
        max_pending_writes: usize,
        write_buffer_enabled: bool,
    ) -> Self {
        Self {
            backend,
            cache: ShardCache::with_capacity(cache_capacity),
            locks: LockTable::new(cache_capacity.max(256)),
            coalescer: Mutex::new(WriteCoalescer::new(coalesce_window, max_pending_writes)),
            write_buffer_enabled,
        }
    }

    /// Loads the shard for `uri`: cache first, backend on miss.
    pub async fn load(&self, uri: &Uri) -> Result<Option<Arc<FileShard>>> {
        if let Some(cached) = self.cache.get(uri) {
            return Ok(Some(cached));
        }

        let loaded = self.backend.load_raw(uri)?;
        Ok(loaded.map(|shard| {
            let shard = Arc::new(shard);
            self.cache.insert(uri.clone(), shard.clone());
            shard
        }))
    }

    /// Runs `task` with exclusive access to `uri`, for callers (the
    /// Background Index's `updateFile`/`removeFile`) that must invalidate
    /// the cache, mutate their own in-memory maps, and write the shard all
    /// under the same per-uri lock (spec §4.3, §5 ordering guarantees).
    pub async fn with_uri_lock<F, Fut, T>(&self, uri: &Uri, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.locks.with_lock(uri, task).await
    }

    /// Persists `shard`, invalidating the cache *inside* the uri's lock
    /// before the write is issued (spec §4.1: avoids a concurrent reader
    /// repopulating stale data between write and invalidation).
    pub async fn save(&self, shard: FileShard) -> Result<()> {
        let uri = shard.uri.clone();
        self.with_uri_lock(&uri, move || async move { self.save_locked(shard) }).await
    }

    /// Same write path as `save`, for a caller that already holds `uri`'s
    /// lock via [`ShardStore::with_uri_lock`]. Never acquires a lock itself
    /// — calling this without already holding the uri's lock reintroduces
    /// the race `with_uri_lock` exists to close.
    pub fn save_locked(&self, shard: FileShard) -> Result<()> {
        self.cache.invalidate(&shard.uri);
        if !self.write_buffer_enabled {
            return self.flush_one(shard);
        }
        let outcome = self.coalescer.lock().submit(shard);
        match outcome {
            CoalesceOutcome::Buffered => Ok(()),
            CoalesceOutcome::FlushNow(shard) => self.flush_one(shard),
        }
    }

    fn flush_one(&self, shard: FileShard) -> Result<()> {
        self.backend.save_raw(&shard)?;
        self.cache.insert(shard.uri.clone(), Arc::new(shard));
        Ok(())
    }

    /// Sweeps the coalescing window, flushing any write that's aged out.
    /// Intended to be called on a periodic timer by the owning scheduler.
    pub async fn flush_ready(&self) -> Result<()> {
        let ready = self.coalescer.lock().drain_ready();
        for shard in ready {
            let uri = shard.uri.clone();
            self.locks
                .with_lock(&uri, move || async move { self.flush_one(shard) })
                .await?;
        }
        Ok(())
    }

    /// Flushes every pending write unconditionally (spec: "On `dispose`,
    /// all pending writes are flushed").
    pub async fn flush(&self) -> Result<()> {
        let pending = self.coalescer.lock().drain_all();
        for shard in pending {
            let uri = shard.uri.clone();
            self.locks
                .with_lock(&uri, move || async move { self.flush_one(shard) })
                .await?;
        }
        Ok(())
    }

    pub async fn delete(&self, uri: &Uri) -> Result<()> {
        self.with_uri_lock(uri, move || async move { self.delete_locked(uri) }).await
    }

    /// Same delete path as `delete`, for a caller that already holds `uri`'s
    /// lock via [`ShardStore::with_uri_lock`].
    pub fn delete_locked(&self, uri: &Uri) -> Result<()> {
        self.coalescer.lock().cancel(uri);
        self.cache.invalidate(uri);
        self.backend.delete_raw(uri)
    }

    pub fn exists(&self, uri: &Uri) -> bool {
        self.backend.exists_raw(uri)
    }

    pub fn list_all(&self) -> Result<Vec<FileShard>> {
        self.backend.list_all_raw()
    }

    pub async fn clear(&self) -> Result<()> {
        self.cache.clear();
        self.coalescer.lock().drain_all();
        self.backend.clear_raw()
    }

    pub async fn dispose(&self) -> Result<()> {
        self.flush().await
    }

    pub fn cache_stats(&self) -> cache::CacheStats {
        self.cache.stats()
    }

    pub fn lock_table_len(&self) -> usize {
        self.locks.len()
    }
}
