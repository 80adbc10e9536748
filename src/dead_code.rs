//! The dead-code analyzer (spec §4.9): a consumer of the index, not a
//! mutator — it only issues `findReferencesByName` queries and glob
//! matching. Grounded on the merged index's existing query surface
//! (`index/merged.rs`, `index/query.rs`); no new storage is added.

use std::collections::{HashMap, HashSet};

use glob::Pattern;
use serde::Serialize;

use crate::error::Result;
use crate::index::merged::MergedIndex;
use crate::index::query::FindReferencesOptions;
use crate::model::{FileShard, Location, Range, Symbol};
use crate::uri::Uri;

/// A handful of framework lifecycle/decorator names that are "implicitly
/// alive" even with zero references — constructors, init hooks, and the
/// common test-framework entry points a glob list can't easily express.
const LIFECYCLE_NAMES: &[&str] =
    &["main", "constructor", "setup", "teardown", "beforeEach", "afterEach", "beforeAll", "afterAll"];

#[derive(Debug, Clone)]
pub struct DeadCodeOptions {
    /// Restricts the scan to these uris. Empty means the whole background
    /// tier.
    pub scope: Vec<Uri>,
    pub include_tests: bool,
    pub entry_point_globs: Vec<String>,
    pub check_barrier_files: bool,
}

impl Default for DeadCodeOptions {
    fn default() -> Self {
        Self {
            scope: Vec::new(),
            include_tests: false,
            entry_point_globs: vec![
                "**/main.*".to_string(),
                "**/index.*".to_string(),
                "**/*.test.*".to_string(),
                "**/tests/**".to_string(),
            ],
            check_barrier_files: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Confidence {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadCodeCandidate {
    pub symbol_name: String,
    pub uri: Uri,
    pub location: Location,
    pub confidence: Confidence,
}

fn compiled_patterns(globs: &[String], include_tests: bool) -> Vec<Pattern> {
    globs
        .iter()
        .filter(|g| include_tests || (!g.contains("test") && !g.contains("Test")))
        .filter_map(|g| Pattern::new(g).ok())
        .collect()
}

fn path_like(uri: &Uri) -> String {
    uri.as_str().trim_start_matches("file://").to_string()
}

fn is_entry_point(uri: &Uri, patterns: &[Pattern]) -> bool {
    let path = path_like(uri);
    patterns.iter().any(|p| p.matches(&path))
}

fn is_lifecycle_name(name: &str) -> bool {
    LIFECYCLE_NAMES.contains(&name)
}

/// `a` contains `b` if `b`'s start is not before `a`'s start and `b`'s end is
/// not after `a`'s end, comparing (line, character) lexicographically.
fn range_contains(a: &Range, b: &Range) -> bool {
    let a_start = (a.start.line, a.start.character);
    let a_end = (a.end.line, a.end.character);
    let b_start = (b.start.line, b.start.character);
    let b_end = (b.end.line, b.end.character);
    a_start <= b_start && b_end <= a_end
}

/// True if some same-file reference to `symbol.name` falls under another
/// exported symbol in `shard`, by container-name match or range containment
/// (spec §9: the two checks are both preserved, not one or the other).
fn used_by_exported_symbol_in_same_file(shard: &FileShard, symbol: &Symbol) -> bool {
    let other_exported: Vec<&Symbol> =
        shard.symbols.iter().filter(|s| s.is_exported && s.is_definition && s.name != symbol.name).collect();
    if other_exported.is_empty() {
        return false;
    }

    shard.references.iter().filter(|r| r.symbol_name == symbol.name).any(|r| {
        other_exported.iter().any(|other| {
            r.container_name.as_deref() == Some(other.name.as_str()) || range_contains(&other.range, &r.range)
        })
    })
}

fn is_barrier_uri(shards_by_uri: &HashMap<&Uri, &FileShard>, uri: &Uri, name: &str) -> bool {
    shards_by_uri.get(uri).map(|s| s.re_exports.iter().any(|re| re.exported_name == name)).unwrap_or(false)
}

/// Scans exported top-level symbols for zero (or barrel-only) cross-file
/// usage and reports dead-code candidates (spec §4.9). A pure read over the
/// index — no mutation, no locking.
pub async fn find_dead_code(merged: &MergedIndex, shards: Vec<FileShard>, options: &DeadCodeOptions) -> Result<Vec<DeadCodeCandidate>> {
    let patterns = compiled_patterns(&options.entry_point_globs, options.include_tests);
    let shards_by_uri: HashMap<&Uri, &FileShard> = shards.iter().map(|s| (&s.uri, s)).collect();

    let mut candidates = Vec::new();

    for shard in &shards {
        if is_entry_point(&shard.uri, &patterns) {
            continue;
        }

        for symbol in &shard.symbols {
            if !symbol.is_exported || !symbol.is_definition || is_lifecycle_name(&symbol.name) {
                continue;
            }

            let refs = merged
                .find_references_by_name(&symbol.name, FindReferencesOptions::default(), &[symbol.location.clone()])
                .await?;
            let external_uris: HashSet<&Uri> = refs.iter().map(|r| &r.location.uri).filter(|u| *u != &shard.uri).collect();

            let confidence = if external_uris.is_empty() {
                Confidence::High
            } else if options.check_barrier_files
                && external_uris.iter().all(|uri| is_barrier_uri(&shards_by_uri, uri, &symbol.name))
            {
                Confidence::Medium
            } else {
                continue;
            };

            if used_by_exported_symbol_in_same_file(shard, symbol) {
                continue;
            }

            candidates.push(DeadCodeCandidate {
                symbol_name: symbol.name.clone(),
                uri: shard.uri.clone(),
                location: symbol.location.clone(),
                confidence,
            });
        }
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::background::BackgroundIndex;
    use crate::index::dynamic::DynamicIndex;
    use crate::index::static_index::StaticIndex;
    use crate::model::{Position, ReExportInfo, Reference, SymbolKind};
    use crate::parser::FileIndexResult;
    use crate::shard_store::fs_backend::FsShardBackend;
    use crate::shard_store::{IndexStorage, ShardStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn def(name: &str, uri: &Uri, line: u32, exported: bool) -> Symbol {
        Symbol::new(
            name,
            SymbolKind::Function,
            None,
            None,
            Range { start: Position::new(line, 0), end: Position::new(line + 5, 0) },
            Location { uri: uri.clone(), line, character: 0 },
            true,
            exported,
        )
    }

    fn reference(name: &str, uri: &Uri, line: u32, container_name: Option<&str>) -> Reference {
        Reference {
            symbol_name: name.to_string(),
            location: Location { uri: uri.clone(), line, character: 0 },
            range: Range { start: Position::new(line, 0), end: Position::new(line, 1) },
            container_name: container_name.map(|s| s.to_string()),
            is_local: false,
            scope_id: None,
        }
    }

    async fn merged_over_tempdir() -> (tempfile::TempDir, Arc<BackgroundIndex>, MergedIndex) {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn IndexStorage> = Arc::new(FsShardBackend::new(dir.path()));
        let store = ShardStore::new(backend, 50, Duration::from_millis(0), 256);
        let background = Arc::new(BackgroundIndex::new(store, dir.path()));
        let merged = MergedIndex::new(Arc::new(DynamicIndex::new()), background.clone(), Arc::new(StaticIndex::empty()));
        (dir, background, merged)
    }

    #[tokio::test]
    async fn unreferenced_exported_function_is_high_confidence() {
        let (_dir, background, merged) = merged_over_tempdir().await;
        let uri = Uri::new("file:///util.src");

        let mut result = FileIndexResult::default();
        result.symbols = vec![def("helper", &uri, 0, true)];
        background.update_file(&uri, "h".into(), Some(1), result).await.unwrap();

        let shards = background.all_shards_best_effort();
        let candidates = find_dead_code(&merged, shards, &DeadCodeOptions::default()).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].symbol_name, "helper");
        assert_eq!(candidates[0].confidence, Confidence::High);
    }

    #[tokio::test]
    async fn used_only_inside_another_exported_symbol_is_not_flagged() {
        let (_dir, background, merged) = merged_over_tempdir().await;
        let uri = Uri::new("file:///util.src");

        let mut result = FileIndexResult::default();
        result.symbols = vec![def("helper", &uri, 0, true), def("used", &uri, 10, true)];
        result.references = vec![reference("helper", &uri, 11, Some("used"))];
        background.update_file(&uri, "h".into(), Some(1), result).await.unwrap();

        let shards = background.all_shards_best_effort();
        let candidates = find_dead_code(&merged, shards, &DeadCodeOptions::default()).await.unwrap();

        assert!(candidates.iter().all(|c| c.symbol_name != "helper"));
        assert!(candidates.iter().all(|c| c.symbol_name != "used"));
    }

    #[tokio::test]
    async fn cross_file_reference_clears_the_candidate() {
        let (_dir, background, merged) = merged_over_tempdir().await;
        let util_uri = Uri::new("file:///util.src");
        let main_uri = Uri::new("file:///main_logic.src");

        let mut util_result = FileIndexResult::default();
        util_result.symbols = vec![def("helper", &util_uri, 0, true)];
        background.update_file(&util_uri, "h".into(), Some(1), util_result).await.unwrap();

        let mut main_result = FileIndexResult::default();
        main_result.references = vec![reference("helper", &main_uri, 3, None)];
        background.update_file(&main_uri, "m".into(), Some(1), main_result).await.unwrap();

        let shards = background.all_shards_best_effort();
        let candidates = find_dead_code(&merged, shards, &DeadCodeOptions::default()).await.unwrap();

        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn entry_point_glob_excludes_the_file_entirely() {
        let (_dir, background, merged) = merged_over_tempdir().await;
        let uri = Uri::new("file:///src/main.rs");

        let mut result = FileIndexResult::default();
        result.symbols = vec![def("helper", &uri, 0, true)];
        background.update_file(&uri, "h".into(), Some(1), result).await.unwrap();

        let shards = background.all_shards_best_effort();
        let candidates = find_dead_code(&merged, shards, &DeadCodeOptions::default()).await.unwrap();

        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn barrel_only_usage_is_medium_confidence() {
        let (_dir, background, merged) = merged_over_tempdir().await;
        let util_uri = Uri::new("file:///util.src");
        let barrel_uri = Uri::new("file:///index.src");

        let mut util_result = FileIndexResult::default();
        util_result.symbols = vec![def("helper", &util_uri, 0, true)];
        background.update_file(&util_uri, "h".into(), Some(1), util_result).await.unwrap();

        let mut barrel_result = FileIndexResult::default();
        barrel_result.references = vec![reference("helper", &barrel_uri, 0, None)];
        barrel_result.re_exports =
            vec![ReExportInfo { exported_name: "helper".to_string(), source_module: "./util".to_string(), location: Location { uri: barrel_uri.clone(), line: 0, character: 0 } }];
        background.update_file(&barrel_uri, "b".into(), Some(1), barrel_result).await.unwrap();

        let shards = background.all_shards_best_effort();
        let mut options = DeadCodeOptions::default();
        options.entry_point_globs.retain(|g| !g.contains("index"));
        let candidates = find_dead_code(&merged, shards, &options).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, Confidence::Medium);
    }
}
