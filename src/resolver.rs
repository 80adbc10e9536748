//! The deferred cross-file resolver (spec §4.7): binds `Container.member`
//! pending references against action-group symbols once bulk indexing
//! completes. A single pass, never run per-file (spec §9: "per-file
//! resolution during bulk would cause O(files²) container lookups").

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use rustc_hash::FxHashSet;
use tracing::info;

use crate::error::Result;
use crate::index::background::BackgroundIndex;
use crate::metrics::metrics;
use crate::model::{PendingReference, Reference};
use crate::parser::FileIndexResult;

/// An action-group symbol's known member set, keyed by container name.
struct GroupTable {
    groups: HashMap<String, HashSet<String>>,
}

impl GroupTable {
    /// Reads a symbol's opaque metadata looking for the is-group marker this
    /// crate's convention expects: `{"isGroup": true, "events": {...}}`, with
    /// `events`'s keys being the container's member names.
    fn members_from_metadata(metadata: &Option<serde_json::Value>) -> Option<HashSet<String>> {
        let value = metadata.as_ref()?;
        if value.get("isGroup")?.as_bool() != Some(true) {
            return None;
        }
        let events = value.get("events")?.as_object()?;
        Some(events.keys().cloned().collect())
    }

    fn build(background: &BackgroundIndex) -> Self {
        let mut groups = HashMap::new();
        for shard in background.all_shards_best_effort() {
            for symbol in &shard.symbols {
                if let Some(members) = Self::members_from_metadata(&symbol.metadata) {
                    groups.insert(symbol.name.clone(), members);
                }
            }
        }
        Self { groups }
    }
}

fn to_camel_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn to_pascal_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Tries `member` against `candidates` in the casing order the spec mandates:
/// exact, camelCase, PascalCase.
fn casing_match<'a>(member: &str, candidates: &'a HashSet<String>) -> Option<&'a String> {
    candidates
        .get(member)
        .or_else(|| candidates.get(&to_camel_case(member)))
        .or_else(|| candidates.get(&to_pascal_case(member)))
}

#[derive(Debug, Clone, Default)]
pub struct ResolverReport {
    pub groups_found: usize,
    pub group_resolved: usize,
    pub fallback_resolved: usize,
    pub shards_modified: usize,
    pub elapsed_ms: u64,
}

/// Runs the two-phase resolution pass once over every uri with pending
/// references (spec §4.7). Idempotent: a second run clears nothing new
/// because resolved entries were already removed from `pendingReferences`.
pub async fn resolve(background: &BackgroundIndex) -> Result<ResolverReport> {
    let start = Instant::now();
    let groups = GroupTable::build(background);
    let mut report = ResolverReport { groups_found: groups.groups.len(), ..Default::default() };

    let consumers: Vec<_> = background
        .all_shards_best_effort()
        .into_iter()
        .filter(|shard| !shard.pending_references.is_empty())
        .collect();

    for shard in consumers {
        let uri = shard.uri.clone();
        let mut references = shard.references.clone();
        let mut seen: FxHashSet<(String, u32, u32)> =
            references.iter().map(|r| (r.symbol_name.clone(), r.location.line, r.location.character)).collect();

        let mut remaining_pending = Vec::new();
        let mut modified = false;

        for pending in shard.pending_references.iter().cloned() {
            match resolve_one(&pending, &groups) {
                Some((resolved_ref, is_fallback)) => {
                    let key = (resolved_ref.symbol_name.clone(), resolved_ref.location.line, resolved_ref.location.character);
                    if seen.insert(key) {
                        references.push(resolved_ref);
                    }
                    modified = true;
                    if is_fallback {
                        report.fallback_resolved += 1;
                    } else {
                        report.group_resolved += 1;
                    }
                }
                None => remaining_pending.push(pending),
            }
        }

        if modified {
            report.shards_modified += 1;
            let result = FileIndexResult {
                symbols: shard.symbols.clone(),
                references,
                imports: shard.imports.clone(),
                re_exports: shard.re_exports.clone(),
                pending_references: remaining_pending,
                skip_reason: shard.skip_reason.clone(),
            };
            background.update_file(&uri, shard.content_hash.clone(), shard.mtime, result).await?;
        }
    }

    report.elapsed_ms = start.elapsed().as_millis() as u64;
    metrics().record_resolver_run(report.group_resolved as u64, report.fallback_resolved as u64);
    info!(
        groups = report.groups_found,
        group_resolved = report.group_resolved,
        fallback_resolved = report.fallback_resolved,
        shards_modified = report.shards_modified,
        elapsed_ms = report.elapsed_ms,
        "deferred resolver pass complete"
    );
    Ok(report)
}

/// Resolves one pending reference. Returns `None` if `container` is a known
/// group but `member` doesn't match any casing (stays pending); `Some((_,
/// is_fallback))` otherwise.
fn resolve_one(pending: &PendingReference, groups: &GroupTable) -> Option<(Reference, bool)> {
    match groups.groups.get(&pending.container) {
        Some(members) => casing_match(&pending.member, members).map(|_| {
            (
                Reference {
                    symbol_name: pending.member.clone(),
                    location: pending.location.clone(),
                    range: pending.range,
                    container_name: pending.container_name.clone(),
                    is_local: false,
                    scope_id: None,
                },
                false,
            )
        }),
        None => Some((
            Reference {
                symbol_name: format!("{}.{}", pending.container, pending.member),
                location: pending.location.clone(),
                range: pending.range,
                container_name: pending.container_name.clone(),
                is_local: false,
                scope_id: None,
            },
            true,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, Range, Position, Symbol, SymbolKind};
    use crate::shard_store::fs_backend::FsShardBackend;
    use crate::shard_store::{IndexStorage, ShardStore};
    use crate::uri::Uri;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn background_over_tempdir() -> (tempfile::TempDir, BackgroundIndex) {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn IndexStorage> = Arc::new(FsShardBackend::new(dir.path()));
        let store = ShardStore::new(backend, 50, Duration::from_millis(0), 256);
        (dir, BackgroundIndex::new(store, dir.path()))
    }

    fn group_symbol(name: &str, uri: &Uri, members: &[&str]) -> Symbol {
        let events: serde_json::Map<String, serde_json::Value> =
            members.iter().map(|m| (m.to_string(), serde_json::Value::Bool(true))).collect();
        let mut symbol = Symbol::new(
            name,
            SymbolKind::Constant,
            None,
            None,
            Range { start: Position::new(0, 0), end: Position::new(0, 1) },
            Location { uri: uri.clone(), line: 0, character: 0 },
            true,
            true,
        );
        symbol.metadata = Some(serde_json::json!({"isGroup": true, "events": events}));
        symbol
    }

    fn pending(container: &str, member: &str, uri: &Uri, line: u32) -> PendingReference {
        PendingReference {
            container: container.to_string(),
            member: member.to_string(),
            container_name: None,
            location: Location { uri: uri.clone(), line, character: 0 },
            range: Range { start: Position::new(line, 0), end: Position::new(line, 1) },
        }
    }

    #[tokio::test]
    async fn resolves_exact_member_against_a_group() {
        let (_dir, background) = background_over_tempdir();
        let g_uri = Uri::new("file:///g.src");
        let u_uri = Uri::new("file:///u.src");

        let mut g_shard = FileIndexResult::skipped("".into());
        g_shard.symbols = vec![group_symbol("Actions", &g_uri, &["loadUser", "logOut"])];
        g_shard.skip_reason = None;
        background.update_file(&g_uri, "hg".into(), Some(1), g_shard).await.unwrap();

        let mut u_shard = FileIndexResult::skipped("".into());
        u_shard.pending_references = vec![pending("Actions", "loadUser", &u_uri, 0)];
        u_shard.skip_reason = None;
        background.update_file(&u_uri, "hu".into(), Some(1), u_shard).await.unwrap();

        let report = resolve(&background).await.unwrap();
        assert_eq!(report.groups_found, 1);
        assert_eq!(report.group_resolved, 1);
        assert_eq!(report.fallback_resolved, 0);
        assert_eq!(background.find_reference_uris("loadUser"), vec![u_uri]);
    }

    #[tokio::test]
    async fn pascal_case_consumer_resolves_via_camel_case_transform() {
        let (_dir, background) = background_over_tempdir();
        let g_uri = Uri::new("file:///g.src");
        let u_uri = Uri::new("file:///u.src");

        let mut g_shard = FileIndexResult::skipped("".into());
        g_shard.symbols = vec![group_symbol("Actions", &g_uri, &["loadUser"])];
        g_shard.skip_reason = None;
        background.update_file(&g_uri, "hg".into(), Some(1), g_shard).await.unwrap();

        let mut u_shard = FileIndexResult::skipped("".into());
        u_shard.pending_references = vec![pending("Actions", "LoadUser", &u_uri, 0)];
        u_shard.skip_reason = None;
        background.update_file(&u_uri, "hu".into(), Some(1), u_shard).await.unwrap();

        let report = resolve(&background).await.unwrap();
        assert_eq!(report.group_resolved, 1);
        assert_eq!(background.find_reference_uris("LoadUser"), vec![u_uri]);
    }

    #[tokio::test]
    async fn unknown_container_falls_back_to_qualified_reference() {
        let (_dir, background) = background_over_tempdir();
        let u_uri = Uri::new("file:///u.src");

        let mut u_shard = FileIndexResult::skipped("".into());
        u_shard.pending_references = vec![pending("Utils", "helper", &u_uri, 0)];
        u_shard.skip_reason = None;
        background.update_file(&u_uri, "hu".into(), Some(1), u_shard).await.unwrap();

        let report = resolve(&background).await.unwrap();
        assert_eq!(report.fallback_resolved, 1);
        assert_eq!(background.find_reference_uris("Utils.helper"), vec![u_uri]);
    }

    #[tokio::test]
    async fn running_resolver_twice_is_idempotent() {
        let (_dir, background) = background_over_tempdir();
        let u_uri = Uri::new("file:///u.src");

        let mut u_shard = FileIndexResult::skipped("".into());
        u_shard.pending_references = vec![pending("Utils", "helper", &u_uri, 0)];
        u_shard.skip_reason = None;
        background.update_file(&u_uri, "hu".into(), Some(1), u_shard).await.unwrap();

        resolve(&background).await.unwrap();
        let second = resolve(&background).await.unwrap();

        assert_eq!(second.shards_modified, 0);
        assert_eq!(second.fallback_resolved, 0);
    }
}
