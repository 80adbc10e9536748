//! The indexing scheduler (spec §4.6): mtime-based staleness checks,
//! worker-pool fan-out, progress throttling, cancellation, bulk vs.
//! single-file modes.

pub mod cancellation;
pub mod progress;
pub mod worker_pool;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use glob::Pattern;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::index::background::BackgroundIndex;
use crate::parser::SourceParser;
use crate::scheduler::cancellation::CancellationToken;
use crate::scheduler::progress::{ProgressEvent, ProgressState, ProgressThrottle};
use crate::scheduler::worker_pool::{ParseJob, WorkerPool};
use crate::uri::Uri;

/// Cooperative yield cadence inside the bulk loop (spec §5: "yields
/// cooperatively after N items (≈50)").
const BULK_BATCH_SIZE: usize = 50;

fn file_mtime_millis(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok()?.modified().ok()?.duration_since(UNIX_EPOCH).ok().map(|d| d.as_millis() as u64)
}

fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub processed: usize,
    pub skipped_missing: usize,
    pub cancelled: bool,
}

/// Drives both single-file and bulk indexing over the background tier. Does
/// not itself run the deferred resolver (spec §4.6 step f) — that is a
/// separate pass the top-level service invokes once bulk indexing returns,
/// keeping the scheduler's own responsibility limited to dispatch.
pub struct Scheduler {
    background: Arc<BackgroundIndex>,
    pool: WorkerPool,
    parser: Arc<dyn SourceParser>,
    max_file_size: u64,
    progress_interval: Duration,
    exclude_patterns: Vec<Pattern>,
}

impl Scheduler {
    pub fn new(background: Arc<BackgroundIndex>, parser: Arc<dyn SourceParser>, config: &IndexConfig) -> Self {
        Self {
            background,
            pool: WorkerPool::new(config.max_concurrent_index_jobs as usize),
            parser,
            max_file_size: config.max_file_size_bytes as u64,
            progress_interval: Duration::from_millis(config.progress_notification_interval_ms as u64),
            exclude_patterns: config.exclude_patterns.iter().filter_map(|g| Pattern::new(g).ok()).collect(),
        }
    }

    /// True if `path` matches any of the config's `excludePatterns` (spec
    /// §6) — such files are never parsed and, if previously indexed, are
    /// purged from the index at the end of the bulk run that excludes them.
    fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.exclude_patterns.iter().any(|p| p.matches(&path_str))
    }

    /// Single-file mode (spec §4.6): existence check, one parse task, one
    /// `updateFile`. Used by the file watcher.
    pub async fn index_single_file(&self, path: &Path, uri: &Uri) -> Result<bool> {
        if !path.exists() {
            debug!(%uri, "file missing at index time, skipping");
            return Ok(false);
        }
        let Ok(raw_text) = std::fs::read_to_string(path) else {
            warn!(%uri, "unreadable file, skipping");
            return Ok(false);
        };

        let oversized = raw_text.len() as u64 > self.max_file_size;
        let text = if oversized { String::new() } else { raw_text };

        let mtime = file_mtime_millis(path);
        let hash = content_hash(&text);

        let jobs = vec![ParseJob { uri: uri.clone(), text }];
        let mut results = self.pool.parse_batch(jobs, self.parser.clone()).await;
        let (_, mut result) = results.pop().expect("exactly one job submitted, one result returned");
        if oversized {
            result.skip_reason = Some("file exceeds maxIndexedFileSize".to_string());
        }

        self.background.update_file(uri, hash, mtime, result).await?;
        Ok(true)
    }

    /// Bulk mode (spec §4.6 steps a-e, g-h). `root` is walked for candidate
    /// files; `admit` gates file-extension/exclusion filtering before the
    /// staleness check.
    pub async fn run_bulk(
        &self,
        root: &Path,
        admit: impl Fn(&Path) -> bool,
        cancellation: &CancellationToken,
        mut on_progress: impl FnMut(ProgressEvent),
    ) -> Result<BulkOutcome> {
        let mut candidates = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && admit(entry.path()) && !self.is_excluded(entry.path()) {
                candidates.push(entry.path().to_path_buf());
            }
        }

        self.background.set_bulk_mode(true);
        let mut outcome = BulkOutcome::default();
        let total = candidates.len();
        let mut throttle = ProgressThrottle::new(self.progress_interval, 10);

        on_progress(ProgressEvent { state: ProgressState::Busy, processed: 0, total, current_file: None });

        for chunk in candidates.chunks(BULK_BATCH_SIZE) {
            if cancellation.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let mut jobs = Vec::with_capacity(chunk.len());
            let mut meta = Vec::with_capacity(chunk.len());
            for path in chunk {
                if !path.exists() {
                    warn!(path = %path.display(), "candidate file vanished before bulk indexing reached it");
                    outcome.skipped_missing += 1;
                    continue;
                }
                let Ok(uri) = path_to_uri(path) else { continue };
                let Ok(text) = std::fs::read_to_string(path) else {
                    outcome.skipped_missing += 1;
                    continue;
                };
                if !self.background.needs_reindexing(&uri, file_mtime_millis(path), None) {
                    continue;
                }
                meta.push((uri.clone(), file_mtime_millis(path), content_hash(&text)));
                jobs.push(ParseJob { uri, text });
            }

            if jobs.is_empty() {
                continue;
            }

            let results = self.pool.parse_batch(jobs, self.parser.clone()).await;
            for (uri, result) in results {
                let (mtime, hash) = meta
                    .iter()
                    .find(|(u, _, _)| u == &uri)
                    .map(|(_, m, h)| (*m, h.clone()))
                    .expect("every parsed job has a corresponding metadata entry");
                self.background.update_file(&uri, hash, mtime, result).await?;
                outcome.processed += 1;
                if throttle.tick() {
                    on_progress(ProgressEvent {
                        state: ProgressState::Busy,
                        processed: outcome.processed,
                        total,
                        current_file: Some(uri),
                    });
                }
            }

            tokio::task::yield_now().await;
        }

        self.background.set_bulk_mode(false);
        on_progress(ProgressEvent { state: ProgressState::Finalizing, processed: outcome.processed, total, current_file: None });

        // Purge anything the background tier still knows about that this
        // walk didn't admit — excluded by a newly added `excludePatterns`
        // entry, or simply gone from disk (spec §6, §7). Skipped on a
        // cancelled run: `candidates` reflects the whole walk regardless of
        // how far the chunk loop above got, so purging from a partial run
        // would remove files the run never actually reached.
        if !outcome.cancelled {
            let admitted: HashSet<Uri> = candidates.iter().filter_map(|p| path_to_uri(p).ok()).collect();
            for known in self.background.known_uris() {
                if !admitted.contains(&known) {
                    self.background.remove_file(&known).await?;
                }
            }
        }

        self.background.flush_summary()?;
        on_progress(ProgressEvent { state: ProgressState::Idle, processed: outcome.processed, total, current_file: None });

        Ok(outcome)
    }
}

fn path_to_uri(path: &Path) -> std::result::Result<Uri, ()> {
    Ok(Uri::new(format!("file://{}", path.to_string_lossy())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_support::LineParser;
    use crate::shard_store::fs_backend::FsShardBackend;
    use crate::shard_store::IndexStorage;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    fn scheduler_over_tempdir() -> (tempfile::TempDir, Arc<BackgroundIndex>, Scheduler) {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join(".cache");
        let backend: Arc<dyn IndexStorage> = Arc::new(FsShardBackend::new(&cache_dir));
        let store = crate::shard_store::ShardStore::new(backend, 50, StdDuration::from_millis(0), 256);
        let background = Arc::new(BackgroundIndex::new(store, &cache_dir));
        let config = IndexConfig::new(cache_dir);
        let scheduler = Scheduler::new(background.clone(), Arc::new(LineParser), &config);
        (dir, background, scheduler)
    }

    #[tokio::test]
    async fn single_file_indexes_and_updates_background() {
        let (dir, background, scheduler) = scheduler_over_tempdir();
        let path = dir.path().join("a.src");
        std::fs::write(&path, "def Foo\n").unwrap();
        let uri = path_to_uri(&path).unwrap();

        let indexed = scheduler.index_single_file(&path, &uri).await.unwrap();
        assert!(indexed);
        assert_eq!(background.find_definitions("Foo"), vec![uri]);
    }

    #[tokio::test]
    async fn single_file_missing_is_a_noop() {
        let (dir, _background, scheduler) = scheduler_over_tempdir();
        let path = dir.path().join("missing.src");
        let uri = path_to_uri(&path).unwrap();
        assert!(!scheduler.index_single_file(&path, &uri).await.unwrap());
    }

    #[tokio::test]
    async fn bulk_indexes_every_admitted_file_and_clears_bulk_mode() {
        let (dir, background, scheduler) = scheduler_over_tempdir();
        std::fs::write(dir.path().join("a.src"), "def Foo\n").unwrap();
        std::fs::write(dir.path().join("b.src"), "def Bar\n").unwrap();

        let cancellation = CancellationToken::new();
        let outcome = scheduler
            .run_bulk(dir.path(), |p| p.extension().map(|e| e == "src").unwrap_or(false), &cancellation, |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.processed, 2);
        assert!(!background.is_bulk_mode());
        assert_eq!(background.find_definitions("Foo").len(), 1);
        assert_eq!(background.find_definitions("Bar").len(), 1);
    }

    #[tokio::test]
    async fn bulk_skips_files_that_do_not_need_reindexing() {
        let (dir, background, scheduler) = scheduler_over_tempdir();
        let path = dir.path().join("a.src");
        std::fs::write(&path, "def Foo\n").unwrap();

        let cancellation = CancellationToken::new();
        scheduler.run_bulk(dir.path(), |_| true, &cancellation, |_| {}).await.unwrap();
        let first_count = background.shard_count();

        let outcome = scheduler.run_bulk(dir.path(), |_| true, &cancellation, |_| {}).await.unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(background.shard_count(), first_count);
    }

    #[tokio::test]
    async fn bulk_purges_files_excluded_by_config_on_the_next_run() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join(".cache");
        let backend: Arc<dyn IndexStorage> = Arc::new(FsShardBackend::new(&cache_dir));
        let store = crate::shard_store::ShardStore::new(backend, 50, StdDuration::from_millis(0), 256);
        let background = Arc::new(BackgroundIndex::new(store, &cache_dir));

        std::fs::write(dir.path().join("a.src"), "def Foo\n").unwrap();
        std::fs::write(dir.path().join("b.src"), "def Bar\n").unwrap();

        let admit = |p: &Path| p.extension().map(|e| e == "src").unwrap_or(false);
        let cancellation = CancellationToken::new();

        let mut config = IndexConfig::new(cache_dir.clone());
        let scheduler = Scheduler::new(background.clone(), Arc::new(LineParser), &config);
        scheduler.run_bulk(dir.path(), admit, &cancellation, |_| {}).await.unwrap();
        assert_eq!(background.find_definitions("Foo").len(), 1);
        assert_eq!(background.find_definitions("Bar").len(), 1);

        config.exclude_patterns = vec!["**/a.src".to_string()];
        let scheduler = Scheduler::new(background.clone(), Arc::new(LineParser), &config);
        let outcome = scheduler.run_bulk(dir.path(), admit, &cancellation, |_| {}).await.unwrap();

        assert!(background.find_definitions("Foo").is_empty());
        assert_eq!(background.find_definitions("Bar").len(), 1);
        assert_eq!(outcome.processed, 0);
    }
}
