//! Background file watching (spec §4.8): a `notify` watcher feeds raw
//! filesystem events through a per-uri debounce, then drives the scheduler's
//! single-file indexing path. Grounded on the teacher's reactive document
//! debouncer (`backend/reactive.rs`): a `HashMap<Uri, Instant>` of pending
//! events drained on a fixed poll tick, diffed against the debounce window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

use crate::config::IndexConfig;
use crate::index::background::BackgroundIndex;
use crate::scheduler::Scheduler;
use crate::uri::Uri;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Changed,
    Removed,
}

fn path_to_uri(path: &Path) -> Uri {
    Uri::new(format!("file://{}", path.to_string_lossy()))
}

fn classify(event: &Event) -> Option<PendingKind> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => Some(PendingKind::Changed),
        EventKind::Remove(_) => Some(PendingKind::Removed),
        _ => None,
    }
}

/// Owns the `notify` watch handle and the debounce/dispatch task. Dropping
/// this stops watching — the underlying `RecommendedWatcher` is tied to the
/// task's lifetime via the channel it feeds.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    currently_indexing: Arc<DashSet<Uri>>,
}

impl FileWatcher {
    /// Starts watching `root` recursively, dispatching changes onto
    /// `scheduler`/`background`. `admit` gates which paths are worth acting
    /// on (extension filtering, ignored directories).
    pub fn watch(
        root: &Path,
        background: Arc<BackgroundIndex>,
        scheduler: Arc<Scheduler>,
        config: &IndexConfig,
        admit: impl Fn(&Path) -> bool + Send + Sync + 'static,
    ) -> notify::Result<Self> {
        let (tx, rx) = unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => warn!(%err, "file watcher observed an error event"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let currently_indexing = Arc::new(DashSet::new());
        let debounce = Duration::from_millis(config.debounce_delay_ms as u64);
        spawn_debounce_loop(rx, background, scheduler, admit, currently_indexing.clone(), debounce);

        Ok(Self { _watcher: watcher, currently_indexing })
    }

    /// True while a uri's indexing job is in flight — used to suppress
    /// overlapping dispatch for the same file (spec §4.8).
    pub fn is_indexing(&self, uri: &Uri) -> bool {
        self.currently_indexing.contains(uri)
    }
}

fn spawn_debounce_loop(
    mut rx: UnboundedReceiver<Event>,
    background: Arc<BackgroundIndex>,
    scheduler: Arc<Scheduler>,
    admit: impl Fn(&Path) -> bool + Send + Sync + 'static,
    currently_indexing: Arc<DashSet<Uri>>,
    debounce: Duration,
) {
    tokio::spawn(async move {
        let mut pending: HashMap<Uri, (PathBuf, PendingKind, Instant)> = HashMap::new();

        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    let Some(kind) = classify(&event) else { continue };
                    for path in event.paths {
                        if !admit(&path) {
                            continue;
                        }
                        let uri = path_to_uri(&path);
                        // a later Remove always wins over an earlier Changed
                        // for the same uri within one debounce window, and
                        // vice versa — whichever arrives last is the intent.
                        pending.insert(uri, (path, kind, Instant::now()));
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(50)) => {
                    let now = Instant::now();
                    let ready: Vec<Uri> = pending
                        .iter()
                        .filter(|(_, (_, _, at))| now.duration_since(*at) >= debounce)
                        .map(|(uri, _)| uri.clone())
                        .collect();

                    for uri in ready {
                        let Some((path, kind, _)) = pending.remove(&uri) else { continue };
                        dispatch(&uri, &path, kind, &background, &scheduler, &currently_indexing).await;
                    }
                }
                else => break,
            }
        }

        debug!("file watcher debounce loop terminated");
    });
}

async fn dispatch(
    uri: &Uri,
    path: &Path,
    kind: PendingKind,
    background: &Arc<BackgroundIndex>,
    scheduler: &Arc<Scheduler>,
    currently_indexing: &Arc<DashSet<Uri>>,
) {
    if !currently_indexing.insert(uri.clone()) {
        debug!(%uri, "already indexing this file, dropping duplicate watch event");
        return;
    }

    match kind {
        PendingKind::Removed => {
            if let Err(err) = background.remove_file(uri).await {
                error!(%uri, %err, "failed to remove file from the index after a delete event");
            }
        }
        PendingKind::Changed => {
            if let Err(err) = scheduler.index_single_file(path, uri).await {
                error!(%uri, %err, "failed to index file after a change event");
            }
        }
    }

    currently_indexing.remove(uri);
}

/// Bypasses the debounce window entirely — called directly by the LSP layer
/// on a save notification, which doesn't arrive through the filesystem
/// watcher at all (spec §4.8: "save events bypass debounce").
pub async fn index_immediately(
    path: &Path,
    uri: &Uri,
    background: &Arc<BackgroundIndex>,
    scheduler: &Arc<Scheduler>,
    currently_indexing: &Arc<DashSet<Uri>>,
) {
    dispatch(uri, path, PendingKind::Changed, background, scheduler, currently_indexing).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_support::LineParser;
    use crate::shard_store::fs_backend::FsShardBackend;
    use crate::shard_store::{IndexStorage, ShardStore};
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    fn harness() -> (tempfile::TempDir, Arc<BackgroundIndex>, Arc<Scheduler>, IndexConfig) {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join(".cache");
        let backend: Arc<dyn IndexStorage> = Arc::new(FsShardBackend::new(&cache_dir));
        let store = ShardStore::new(backend, 50, StdDuration::from_millis(0), 256);
        let background = Arc::new(BackgroundIndex::new(store, &cache_dir));
        let config = IndexConfig::new(cache_dir);
        let scheduler = Arc::new(Scheduler::new(background.clone(), Arc::new(LineParser), &config));
        (dir, background, scheduler, config)
    }

    #[tokio::test]
    async fn changed_event_indexes_the_file() {
        let (dir, background, scheduler, _config) = harness();
        let path = dir.path().join("a.src");
        std::fs::write(&path, "def Foo\n").unwrap();
        let uri = path_to_uri(&path);
        let currently_indexing = Arc::new(DashSet::new());

        dispatch(&uri, &path, PendingKind::Changed, &background, &scheduler, &currently_indexing).await;

        assert_eq!(background.find_definitions("Foo"), vec![uri]);
        assert!(!currently_indexing.contains(&path_to_uri(&path)));
    }

    #[tokio::test]
    async fn removed_event_clears_the_shard() {
        let (dir, background, scheduler, _config) = harness();
        let path = dir.path().join("a.src");
        std::fs::write(&path, "def Foo\n").unwrap();
        let uri = path_to_uri(&path);
        let currently_indexing = Arc::new(DashSet::new());

        dispatch(&uri, &path, PendingKind::Changed, &background, &scheduler, &currently_indexing).await;
        assert_eq!(background.shard_count(), 1);

        dispatch(&uri, &path, PendingKind::Removed, &background, &scheduler, &currently_indexing).await;
        assert_eq!(background.shard_count(), 0);
    }

    #[tokio::test]
    async fn overlapping_dispatch_for_the_same_uri_is_suppressed() {
        let (dir, background, scheduler, _config) = harness();
        let path = dir.path().join("a.src");
        std::fs::write(&path, "def Foo\n").unwrap();
        let uri = path_to_uri(&path);
        let currently_indexing = Arc::new(DashSet::new());
        currently_indexing.insert(uri.clone());

        dispatch(&uri, &path, PendingKind::Changed, &background, &scheduler, &currently_indexing).await;

        assert!(background.find_definitions("Foo").is_empty());
    }
}
