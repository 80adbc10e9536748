//! The background index (spec §4.3): the persistent tier, owning the shard
//! store, the metadata summary, and the seven inverted/reverse maps.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::IndexConfig;
use crate::error::Result;
use crate::index::maps::IndexMaps;
use crate::metadata_summary::MetadataSummary;
use crate::model::{FileMetadata, FileShard};
use crate::parser::FileIndexResult;
use crate::shard_store::ShardStore;
use crate::uri::Uri;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct BackgroundIndex {
    store: ShardStore,
    maps: IndexMaps,
    summary: parking_lot::RwLock<MetadataSummary>,
    cache_dir: PathBuf,
    /// Set for the duration of a bulk pass; gates per-file deferred
    /// resolution (spec §4.6 step c).
    bulk_mode: AtomicBool,
}

impl BackgroundIndex {
    pub fn new(store: ShardStore, cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        let summary = MetadataSummary::load(&cache_dir);
        Self {
            store,
            maps: IndexMaps::new(),
            summary: parking_lot::RwLock::new(summary),
            cache_dir,
            bulk_mode: AtomicBool::new(false),
        }
    }

    pub fn set_bulk_mode(&self, enabled: bool) {
        self.bulk_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn is_bulk_mode(&self) -> bool {
        self.bulk_mode.load(Ordering::SeqCst)
    }

    /// The central mutation (spec §4.3 `updateFile`), under the uri's lock
    /// for its entire duration so step ordering is also a concurrency
    /// guarantee: (1) invalidate the cache, (2) remove this file's old
    /// contributions from the inverted indexes via the reverse maps in O(k),
    /// (3) write the new shard, (4) add the new inverted/reverse entries,
    /// (5) update the metadata summary. Steps 4-5 only run once step 3 has
    /// actually succeeded, so a failed write never leaves index entries
    /// pointing at a shard that was never persisted.
    pub async fn update_file(
        &self,
        uri: &Uri,
        content_hash: String,
        mtime: Option<u64>,
        result: FileIndexResult,
    ) -> Result<()> {
        let last_indexed_at = now_millis();
        let symbol_count = result.symbols.len();

        let mut shard = FileShard::empty(uri.clone(), content_hash.clone(), crate::model::SHARD_VERSION, last_indexed_at);
        shard.mtime = mtime;
        shard.symbols = result.symbols;
        shard.references = result.references;
        shard.imports = result.imports;
        shard.re_exports = result.re_exports;
        shard.pending_references = result.pending_references;
        shard.skip_reason = result.skip_reason;

        // Captured before the shard is moved into `save_locked`, so the new
        // inverted-index entries can still be added afterward.
        let symbol_entries: Vec<(String, crate::model::SymbolId)> =
            shard.symbols.iter().map(|s| (s.name.clone(), s.id)).collect();
        let reference_names: Vec<String> = shard.references.iter().map(|r| r.symbol_name.clone()).collect();

        let metadata = FileMetadata {
            uri: uri.clone(),
            content_hash,
            mtime,
            symbol_count,
            last_indexed_at,
        };

        self.store
            .with_uri_lock(uri, move || async move {
                // Steps 1-2: invalidate the cache (inside `save_locked`,
                // once it runs) and remove the old entries first, so a
                // concurrent reader under this same lock never observes a
                // shard and its index entries straddling the update.
                self.maps.remove_file(uri);

                // Step 3. On failure, bail out before any new entry or
                // summary update is committed.
                self.store.save_locked(shard)?;

                // Steps 4-5: only commit now that the write above succeeded.
                for (name, id) in symbol_entries {
                    self.maps.add_symbol_name(&name, uri);
                    self.maps.add_symbol_id(id, uri);
                }
                for name in reference_names {
                    self.maps.add_reference_name(&name, uri);
                }
                self.maps.file_metadata.insert(uri.clone(), metadata.clone());
                self.summary.write().upsert(metadata);

                Ok(())
            })
            .await
    }

    /// Mirror of `update_file`'s cleanup, plus shard deletion (spec §4.3
    /// `removeFile`), under the same per-uri lock for the same reason.
    pub async fn remove_file(&self, uri: &Uri) -> Result<()> {
        self.store
            .with_uri_lock(uri, move || async move {
                self.maps.remove_file(uri);
                self.summary.write().remove(uri);
                self.store.delete_locked(uri)
            })
            .await
    }

    /// True if `uri` has never been indexed, has no recorded mtime, or its
    /// current mtime differs from the stored one. Hash comparison is only
    /// consulted when mtime is unavailable (spec §4.3 `needsReindexing`).
    pub fn needs_reindexing(&self, uri: &Uri, current_mtime: Option<u64>, current_hash: Option<&str>) -> bool {
        let summary = self.summary.read();
        let Some(metadata) = summary.get(uri) else {
            return true;
        };

        match (metadata.mtime, current_mtime) {
            (Some(stored), Some(current)) => stored != current,
            _ => match current_hash {
                Some(hash) => metadata.content_hash != hash,
                None => true,
            },
        }
    }

    /// Every uri currently recorded in the metadata summary. Used by the
    /// scheduler's bulk pass to purge files that are no longer admitted
    /// (spec §6 `excludePatterns`: "purged from the index on next bulk
    /// run") or that have disappeared from disk (spec §7).
    pub fn known_uris(&self) -> Vec<Uri> {
        self.summary.read().iter().map(|m| m.uri.clone()).collect()
    }

    pub fn find_definitions(&self, name: &str) -> Vec<Uri> {
        self.maps.uris_for_symbol_name(name)
    }

    pub fn find_definition_by_id(&self, id: crate::model::SymbolId) -> Option<Uri> {
        self.maps.uri_for_symbol_id(id)
    }

    pub fn find_reference_uris(&self, name: &str) -> Vec<Uri> {
        self.maps.uris_for_reference_name(name)
    }

    pub fn file_symbol_names(&self, uri: &Uri) -> Vec<String> {
        self.maps.file_symbol_names(uri)
    }

    pub async fn load_shard(&self, uri: &Uri) -> Result<Option<std::sync::Arc<FileShard>>> {
        self.store.load(uri).await
    }

    pub fn metadata(&self, uri: &Uri) -> Option<FileMetadata> {
        self.summary.read().get(uri).cloned()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn flush_summary(&self) -> Result<()> {
        self.summary.read().save(&self.cache_dir)
    }

    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await?;
        self.flush_summary()
    }

    /// Cold-start fallback when the metadata summary is absent or corrupt:
    /// scan every shard and rebuild both the summary and the in-memory maps
    /// (spec §4.2).
    pub fn rebuild_from_shards(&self) -> Result<()> {
        self.maps.clear();
        let mut summary = MetadataSummary::new();

        for shard in self.store.list_all()? {
            for symbol in &shard.symbols {
                self.maps.add_symbol_name(&symbol.name, &shard.uri);
                self.maps.add_symbol_id(symbol.id, &shard.uri);
            }
            for reference in &shard.references {
                self.maps.add_reference_name(&reference.symbol_name, &shard.uri);
            }

            let metadata = FileMetadata {
                uri: shard.uri.clone(),
                content_hash: shard.content_hash.clone(),
                mtime: shard.mtime,
                symbol_count: shard.symbols.len(),
                last_indexed_at: shard.last_indexed_at,
            };
            self.maps.file_metadata.insert(shard.uri.clone(), metadata.clone());
            summary.upsert(metadata);
        }

        *self.summary.write() = summary;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.maps.clear();
        *self.summary.write() = MetadataSummary::new();
        self.store.clear().await
    }

    pub fn shard_count(&self) -> usize {
        self.summary.read().len()
    }

    /// Every persisted shard, for callers (searchSymbols) that need to scan
    /// the whole background tier rather than look up a single name. Storage
    /// errors are swallowed rather than failing the whole scan — a single
    /// corrupt shard shouldn't blank out search results for everything else.
    pub fn all_shards_best_effort(&self) -> Vec<FileShard> {
        self.store.list_all().unwrap_or_default()
    }

    /// A snapshot of map sizes for `getStats`/`inspectIndex` (spec §6). Takes
    /// a consistent-enough read under concurrent writers; exact counts are
    /// not guaranteed, only freshness.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            shard_count: self.shard_count(),
            symbol_names: self.maps.symbol_name_index.len(),
            symbol_ids: self.maps.symbol_id_index.len(),
            reference_names: self.maps.reference_map.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub shard_count: usize,
    pub symbol_names: usize,
    pub symbol_ids: usize,
    pub reference_names: usize,
}

/// Builds the background index's storage layer from config: an fs-backed
/// or sql-backed [`ShardStore`], per [`IndexConfig::use_sql_storage`].
pub fn build_store(config: &IndexConfig) -> Result<ShardStore> {
    use crate::shard_store::fs_backend::FsShardBackend;
    use crate::shard_store::sql_backend::SqlShardBackend;
    use crate::shard_store::IndexStorage;
    use std::sync::Arc;
    use std::time::Duration;

    let backend: Arc<dyn IndexStorage> = if config.use_sql_storage {
        Arc::new(SqlShardBackend::open(config.cache_dir.join("index.db"))?)
    } else {
        Arc::new(FsShardBackend::new(&config.cache_dir))
    };

    Ok(ShardStore::with_write_buffer(
        backend,
        config.shard_cache_capacity as usize,
        Duration::from_millis(config.debounce_delay_ms as u64 / 3),
        config.max_pending_writes as usize,
        config.write_buffer_enabled,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_support::LineParser;
    use crate::parser::SourceParser;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn index_over_tempdir() -> (tempfile::TempDir, BackgroundIndex) {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn crate::shard_store::IndexStorage> =
            Arc::new(crate::shard_store::fs_backend::FsShardBackend::new(dir.path()));
        let store = ShardStore::new(backend, 50, Duration::from_millis(0), 256);
        let index = BackgroundIndex::new(store, dir.path());
        (dir, index)
    }

    #[tokio::test]
    async fn update_file_populates_name_index_and_metadata() {
        let (_dir, index) = index_over_tempdir();
        let uri = Uri::new("file:///a.rs");
        let result = LineParser.parse(&uri, "def Foo\n");

        index.update_file(&uri, "h1".to_string(), Some(1), result).await.unwrap();

        assert_eq!(index.find_definitions("Foo"), vec![uri.clone()]);
        assert!(index.metadata(&uri).is_some());
    }

    #[tokio::test]
    async fn update_file_twice_replaces_rather_than_accumulates() {
        let (_dir, index) = index_over_tempdir();
        let uri = Uri::new("file:///a.rs");

        let first = LineParser.parse(&uri, "def Foo\n");
        index.update_file(&uri, "h1".to_string(), Some(1), first).await.unwrap();

        let second = LineParser.parse(&uri, "def Bar\n");
        index.update_file(&uri, "h2".to_string(), Some(2), second).await.unwrap();

        assert!(index.find_definitions("Foo").is_empty());
        assert_eq!(index.find_definitions("Bar"), vec![uri]);
    }

    #[tokio::test]
    async fn remove_file_clears_index_and_shard() {
        let (_dir, index) = index_over_tempdir();
        let uri = Uri::new("file:///a.rs");
        let result = LineParser.parse(&uri, "def Foo\n");
        index.update_file(&uri, "h1".to_string(), Some(1), result).await.unwrap();

        index.remove_file(&uri).await.unwrap();

        assert!(index.find_definitions("Foo").is_empty());
        assert!(index.metadata(&uri).is_none());
        assert!(index.file_symbol_names(&uri).is_empty());
    }

    #[tokio::test]
    async fn needs_reindexing_true_when_mtime_absent_or_different() {
        let (_dir, index) = index_over_tempdir();
        let uri = Uri::new("file:///a.rs");
        assert!(index.needs_reindexing(&uri, Some(1), None));

        let result = LineParser.parse(&uri, "def Foo\n");
        index.update_file(&uri, "h1".to_string(), Some(1), result).await.unwrap();

        assert!(!index.needs_reindexing(&uri, Some(1), None));
        assert!(index.needs_reindexing(&uri, Some(2), None));
    }
}
