//! The top-level facade (spec §6 request surface): the one type an embedder
//! constructs and calls. Owns every tier, the scheduler, the dependency
//! graph, and the cancellation token the scheduler and dead-code analyzer
//! share; wires the deferred resolver in after each bulk pass.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::IndexConfig;
use crate::dead_code::{find_dead_code, DeadCodeCandidate, DeadCodeOptions};
use crate::dependency_graph::{generate_mermaid, DependencyGraph, DependencyTree, Direction};
use crate::error::{IndexError, Result};
use crate::index::background::{self, BackgroundIndex, IndexStats};
use crate::index::dynamic::DynamicIndex;
use crate::index::merged::MergedIndex;
use crate::index::query::{FindReferencesOptions, ScoredSymbol};
use crate::index::static_index::StaticIndex;
use crate::model::{ImportInfo, ReExportInfo, Symbol, SymbolId};
use crate::parser::SourceParser;
use crate::resolver::{self, ResolverReport};
use crate::scheduler::cancellation::CancellationToken;
use crate::scheduler::progress::ProgressEvent;
use crate::scheduler::{BulkOutcome, Scheduler};
use crate::uri::Uri;
use crate::watcher::FileWatcher;

pub struct Service {
    dynamic: Arc<DynamicIndex>,
    background: Arc<BackgroundIndex>,
    static_index: Arc<StaticIndex>,
    merged: MergedIndex,
    scheduler: Arc<Scheduler>,
    dependency_graph: Arc<DependencyGraph>,
    parser: Arc<dyn SourceParser>,
    config: IndexConfig,
    cancellation: CancellationToken,
    currently_indexing: Arc<dashmap::DashSet<Uri>>,
    watcher: Mutex<Option<FileWatcher>>,
    bulk_running: AtomicBool,
}

impl Service {
    pub fn new(config: IndexConfig, parser: Arc<dyn SourceParser>) -> Result<Self> {
        let store = background::build_store(&config)?;
        let background = Arc::new(BackgroundIndex::new(store, &config.cache_dir));
        let dynamic = Arc::new(DynamicIndex::new());
        let static_index = Arc::new(StaticIndex::empty());
        let merged = MergedIndex::new(dynamic.clone(), background.clone(), static_index.clone());
        let scheduler = Arc::new(Scheduler::new(background.clone(), parser.clone(), &config));

        Ok(Self {
            dynamic,
            background,
            static_index,
            merged,
            scheduler,
            dependency_graph: Arc::new(DependencyGraph::new()),
            parser,
            config,
            cancellation: CancellationToken::new(),
            currently_indexing: Arc::new(dashmap::DashSet::new()),
            watcher: Mutex::new(None),
            bulk_running: AtomicBool::new(false),
        })
    }

    /// Loads the metadata summary's view of the world at startup, or scans
    /// every shard if the summary is absent/corrupt (spec §4.2).
    pub fn warm_start(&self) -> Result<()> {
        if self.background.shard_count() == 0 {
            self.background.rebuild_from_shards()?;
        }
        Ok(())
    }

    /// Starts watching `root` for external edits, dispatching through the
    /// scheduler (spec §4.8). Replaces any previously active watcher.
    pub fn start_watching(&self, root: &Path, admit: impl Fn(&Path) -> bool + Send + Sync + 'static) -> notify::Result<()> {
        let watcher = FileWatcher::watch(root, self.background.clone(), self.scheduler.clone(), &self.config, admit)?;
        *self.watcher.lock().expect("watcher mutex poisoned") = Some(watcher);
        Ok(())
    }

    /// Bypasses the watcher's debounce for an explicit save notification
    /// (spec §4.8).
    pub async fn notify_saved(&self, path: &Path, uri: &Uri) {
        crate::watcher::index_immediately(path, uri, &self.background, &self.scheduler, &self.currently_indexing).await;
        self.refresh_dependencies(uri).await;
    }

    /// Applies an open-buffer edit directly to the dynamic tier (spec §4.4).
    /// Bypasses the shard store entirely.
    pub fn apply_open_edit(&self, uri: &Uri, text: &str) {
        self.dynamic.apply_edit(uri, text, self.parser.as_ref());
    }

    pub fn close_buffer(&self, uri: &Uri) {
        self.dynamic.remove_buffer(uri);
    }

    /// Removes a file from the background tier and the dependency graph
    /// (used directly by embedders that detect a deletion themselves, and by
    /// the file watcher's delete-event path indirectly through
    /// `BackgroundIndex::remove_file`).
    pub async fn remove_file(&self, uri: &Uri) -> Result<()> {
        self.background.remove_file(uri).await?;
        self.dependency_graph.remove_file(uri);
        Ok(())
    }

    /// Bulk mode (spec §4.6 steps a-h): walks `root`, indexes every admitted
    /// file, runs the deferred resolver once, then flushes. Refuses to run
    /// concurrently with itself.
    pub async fn rebuild_index(
        &self,
        root: &Path,
        admit: impl Fn(&Path) -> bool,
        on_progress: impl FnMut(ProgressEvent),
    ) -> Result<(BulkOutcome, ResolverReport)> {
        if self.bulk_running.swap(true, Ordering::SeqCst) {
            return Err(IndexError::Codec("a bulk index run is already in progress".to_string()));
        }
        let _guard = scopeguard::guard((), |_| self.bulk_running.store(false, Ordering::SeqCst));

        let outcome = self.scheduler.run_bulk(root, admit, &self.cancellation, on_progress).await?;
        self.rebuild_dependency_graph();
        let report = resolver::resolve(&self.background).await?;
        info!(processed = outcome.processed, cancelled = outcome.cancelled, "bulk index run complete");
        Ok((outcome, report))
    }

    pub fn cancel_rebuild(&self) {
        self.cancellation.cancel();
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.background.clear().await?;
        self.dependency_graph.clear();
        Ok(())
    }

    pub fn get_stats(&self) -> IndexStats {
        self.background.stats()
    }

    pub fn inspect_index(&self) -> IndexStats {
        self.background.stats()
    }

    pub async fn find_definitions(&self, name: &str) -> Result<Vec<Symbol>> {
        self.merged.find_definitions(name).await
    }

    pub async fn find_definition_by_id(&self, id: SymbolId) -> Result<Option<Symbol>> {
        self.merged.find_definition_by_id(id).await
    }

    pub async fn find_references_by_name(&self, name: &str, opts: FindReferencesOptions) -> Result<Vec<crate::model::Reference>> {
        let definitions = self.merged.find_definitions(name).await?;
        let definition_locations: Vec<_> = definitions.iter().map(|s| s.location.clone()).collect();
        self.merged.find_references_by_name(name, opts, &definition_locations).await
    }

    pub async fn search_symbols(&self, query: &str, limit: usize) -> Result<Vec<ScoredSymbol>> {
        self.merged.search_symbols(query, limit).await
    }

    pub async fn get_file_symbols(&self, uri: &Uri) -> Result<Vec<Symbol>> {
        self.merged.get_file_symbols(uri).await
    }

    pub async fn get_file_imports(&self, uri: &Uri) -> Result<Vec<ImportInfo>> {
        self.merged.get_file_imports(uri).await
    }

    pub async fn get_file_re_exports(&self, uri: &Uri) -> Result<Vec<ReExportInfo>> {
        self.merged.get_file_re_exports(uri).await
    }

    pub async fn find_dead_code(&self, options: &DeadCodeOptions) -> Result<Vec<DeadCodeCandidate>> {
        let shards = if options.scope.is_empty() {
            self.background.all_shards_best_effort()
        } else {
            let mut out = Vec::with_capacity(options.scope.len());
            for uri in &options.scope {
                if let Some(shard) = self.background.load_shard(uri).await? {
                    out.push((*shard).clone());
                }
            }
            out
        };
        find_dead_code(&self.merged, shards, options).await
    }

    pub fn get_dependency_tree(&self, uri: &Uri, direction: Direction, max_depth: Option<usize>) -> DependencyTree {
        self.dependency_graph.tree(uri, direction, max_depth)
    }

    pub fn generate_mermaid(&self, uri: &Uri, direction: Direction, max_depth: Option<usize>) -> String {
        generate_mermaid(&self.dependency_graph.tree(uri, direction, max_depth))
    }

    pub fn get_impacted_files(&self, uri: &Uri, max_depth: Option<usize>) -> Vec<Uri> {
        self.dependency_graph.impacted_files(uri, max_depth)
    }

    async fn refresh_dependencies(&self, uri: &Uri) {
        if let Ok(Some(shard)) = self.background.load_shard(uri).await {
            let deps: Vec<Uri> = shard.imports.iter().map(|i| Uri::new(i.source_module.clone())).collect();
            self.dependency_graph.set_dependencies(uri, &deps);
        }
    }

    /// Rebuilds the whole dependency graph from every persisted shard's
    /// imports. Called once after a bulk pass rather than incrementally
    /// per-file, since bulk mode already processes every file anyway.
    fn rebuild_dependency_graph(&self) {
        self.dependency_graph.clear();
        for shard in self.background.all_shards_best_effort() {
            let deps: Vec<Uri> = shard.imports.iter().map(|i| Uri::new(i.source_module.clone())).collect();
            if !deps.is_empty() {
                self.dependency_graph.set_dependencies(&shard.uri, &deps);
            }
        }
    }
}
