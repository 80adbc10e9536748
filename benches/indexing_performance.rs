//! Benchmarks for bulk and single-file indexing throughput.
//!
//! Benchmarks:
//! - Bulk indexing over a synthetic workspace of increasing file counts
//! - Single-file re-indexing (the file-watcher hot path)
//! - The deferred resolver's pass cost over an increasing pending-reference
//!   backlog
//!
//! Run with: cargo bench --bench indexing_performance

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::tempdir;

use code_symbol_index::config::IndexConfig;
use code_symbol_index::index::background::BackgroundIndex;
use code_symbol_index::model::{Location, PendingReference, Position, Range, Symbol, SymbolKind};
use code_symbol_index::parser::{FileIndexResult, SourceParser};
use code_symbol_index::resolver;
use code_symbol_index::scheduler::cancellation::CancellationToken;
use code_symbol_index::scheduler::Scheduler;
use code_symbol_index::shard_store::fs_backend::FsShardBackend;
use code_symbol_index::shard_store::{IndexStorage, ShardStore};
use code_symbol_index::uri::Uri;

/// Mirrors `def NAME` / `use NAME` lines without depending on the crate's
/// own `#[cfg(test)]` parser, which isn't linked into a bench binary.
struct BenchParser;

impl SourceParser for BenchParser {
    fn parse(&self, uri: &Uri, text: &str) -> FileIndexResult {
        let mut result = FileIndexResult::default();
        for (line_no, line) in text.lines().enumerate() {
            let line_no = line_no as u32;
            let location = Location { uri: uri.clone(), line: line_no, character: 0 };
            let range = Range { start: Position::new(line_no, 0), end: Position::new(line_no, line.len() as u32) };
            if let Some(name) = line.strip_prefix("def ") {
                result.symbols.push(Symbol::new(name, SymbolKind::Function, None, None, range, location, true, true));
            } else if let Some(name) = line.strip_prefix("use ") {
                result.references.push(code_symbol_index::model::Reference {
                    symbol_name: name.to_string(),
                    location,
                    range,
                    container_name: None,
                    is_local: false,
                    scope_id: None,
                });
            }
        }
        result
    }
}

fn generate_file(index: usize, symbol_count: usize) -> String {
    let mut code = String::new();
    for i in 0..symbol_count {
        code.push_str(&format!("def symbol_{index}_{i}\n"));
    }
    for i in 0..symbol_count / 2 {
        code.push_str(&format!("use symbol_{index}_{i}\n"));
    }
    code
}

fn bench_bulk_indexing(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("bulk_indexing");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for file_count in [10usize, 50, 200] {
        group.bench_with_input(BenchmarkId::new("files", file_count), &file_count, |b, &file_count| {
            b.iter_batched(
                || {
                    let dir = tempdir().unwrap();
                    for i in 0..file_count {
                        std::fs::write(dir.path().join(format!("f{i}.src")), generate_file(i, 20)).unwrap();
                    }
                    let cache_dir = dir.path().join(".cache");
                    let backend: Arc<dyn IndexStorage> = Arc::new(FsShardBackend::new(&cache_dir));
                    let store = ShardStore::new(backend, 4096, Duration::from_millis(0), 4096);
                    let background = Arc::new(BackgroundIndex::new(store, &cache_dir));
                    let config = IndexConfig::new(cache_dir);
                    let scheduler = Scheduler::new(background, Arc::new(BenchParser), &config);
                    (dir, scheduler)
                },
                |(dir, scheduler)| {
                    rt.block_on(async {
                        let cancellation = CancellationToken::new();
                        let outcome = scheduler
                            .run_bulk(
                                dir.path(),
                                |p: &Path| p.extension().map(|e| e == "src").unwrap_or(false),
                                &cancellation,
                                |_| {},
                            )
                            .await
                            .unwrap();
                        black_box(outcome)
                    });
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_single_file_reindex(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("single_file_reindex");
    group.sample_size(50);

    let dir = tempdir().unwrap();
    let path = dir.path().join("hot.src");
    let cache_dir = dir.path().join(".cache");
    let backend: Arc<dyn IndexStorage> = Arc::new(FsShardBackend::new(&cache_dir));
    let store = ShardStore::new(backend, 4096, Duration::from_millis(0), 4096);
    let background = Arc::new(BackgroundIndex::new(store, &cache_dir));
    let config = IndexConfig::new(cache_dir);
    let scheduler = Scheduler::new(background, Arc::new(BenchParser), &config);
    let uri = Uri::new(format!("file://{}", path.to_string_lossy()));

    group.bench_function("50_symbols", |b| {
        b.iter(|| {
            std::fs::write(&path, generate_file(0, 50)).unwrap();
            rt.block_on(async { scheduler.index_single_file(&path, &uri).await.unwrap() });
        });
    });

    group.finish();
}

fn bench_resolver_pass(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("resolver_pass");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    for consumer_count in [10usize, 100, 500] {
        group.bench_with_input(BenchmarkId::new("pending_references", consumer_count), &consumer_count, |b, &consumer_count| {
            b.iter_batched(
                || {
                    let dir = tempdir().unwrap();
                    let backend: Arc<dyn IndexStorage> = Arc::new(FsShardBackend::new(dir.path()));
                    let store = ShardStore::new(backend, 4096, Duration::from_millis(0), 4096);
                    let background = BackgroundIndex::new(store, dir.path());

                    let group_uri = Uri::new("file:///group.src");
                    let mut events = serde_json::Map::new();
                    events.insert("loadUser".to_string(), serde_json::Value::Bool(true));
                    let mut group_symbol = Symbol::new(
                        "Actions",
                        SymbolKind::Constant,
                        None,
                        None,
                        Range { start: Position::new(0, 0), end: Position::new(0, 1) },
                        Location { uri: group_uri.clone(), line: 0, character: 0 },
                        true,
                        true,
                    );
                    group_symbol.metadata = Some(serde_json::json!({"isGroup": true, "events": events}));
                    let mut group_result = FileIndexResult::default();
                    group_result.symbols = vec![group_symbol];

                    rt.block_on(async {
                        background.update_file(&group_uri, "g".to_string(), Some(1), group_result).await.unwrap();
                        for i in 0..consumer_count {
                            let uri = Uri::new(format!("file:///consumer_{i}.src"));
                            let mut result = FileIndexResult::default();
                            result.pending_references = vec![PendingReference {
                                container: "Actions".to_string(),
                                member: "loadUser".to_string(),
                                container_name: None,
                                location: Location { uri: uri.clone(), line: 0, character: 0 },
                                range: Range { start: Position::new(0, 0), end: Position::new(0, 1) },
                            }];
                            background.update_file(&uri, format!("h{i}"), Some(1), result).await.unwrap();
                        }
                    });
                    (dir, background)
                },
                |(_dir, background)| {
                    rt.block_on(async { black_box(resolver::resolve(&background).await.unwrap()) });
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(20).measurement_time(Duration::from_secs(10));
    targets = bench_bulk_indexing, bench_single_file_reindex, bench_resolver_pass
);
criterion_main!(benches);
