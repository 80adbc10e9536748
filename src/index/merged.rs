//! The merged index (spec §4.5): the only query façade callers use.
//! Priority order dynamic > background > static; results are deduplicated
//! and, for `searchSymbols`, ranked.

use std::sync::Arc;

use crate::error::Result;
use crate::index::background::BackgroundIndex;
use crate::index::dynamic::DynamicIndex;
use crate::index::query::{dedup_references, dedup_symbols, rank_symbols, subtract_definitions, FindReferencesOptions, ScoredSymbol};
use crate::index::static_index::StaticIndex;
use crate::metrics::metrics;
use crate::model::{ImportInfo, ReExportInfo, Symbol, SymbolId};
use crate::uri::Uri;

const RANK_BATCH_SIZE: usize = 1000;

pub struct MergedIndex {
    dynamic: Arc<DynamicIndex>,
    background: Arc<BackgroundIndex>,
    static_index: Arc<StaticIndex>,
}

impl MergedIndex {
    pub fn new(dynamic: Arc<DynamicIndex>, background: Arc<BackgroundIndex>, static_index: Arc<StaticIndex>) -> Self {
        Self { dynamic, background, static_index }
    }

    async fn background_symbols_named(&self, name: &str) -> Result<Vec<Symbol>> {
        let mut out = Vec::new();
        for uri in self.background.find_definitions(name) {
            if let Some(shard) = self.background.load_shard(&uri).await? {
                out.extend(shard.symbols.iter().filter(|s| s.name == name).cloned());
            }
        }
        Ok(out)
    }

    fn dynamic_symbols_named(&self, name: &str) -> Vec<Symbol> {
        let mut out = Vec::new();
        for uri in self.dynamic.find_definitions(name) {
            if let Some(result) = self.dynamic.get_result(&uri) {
                out.extend(result.symbols.iter().filter(|s| s.name == name).cloned());
            }
        }
        out
    }

    fn static_symbols_named(&self, name: &str) -> Vec<Symbol> {
        let mut out = Vec::new();
        for uri in self.static_index.find_definitions(name) {
            if let Some(shard) = self.static_index.shard(&uri) {
                out.extend(shard.symbols.iter().filter(|s| s.name == name).cloned());
            }
        }
        out
    }

    /// Priority order dynamic > background > static (spec §4.5).
    pub async fn find_definitions(&self, name: &str) -> Result<Vec<Symbol>> {
        metrics().record_find_definitions();

        let dynamic = self.dynamic_symbols_named(name);
        let background = self.background_symbols_named(name).await?;
        let static_res = self.static_symbols_named(name);

        let mut combined = dynamic;
        combined.extend(background);
        combined.extend(static_res);
        Ok(dedup_symbols(combined))
    }

    pub async fn find_definition_by_id(&self, id: SymbolId) -> Result<Option<Symbol>> {
        if let Some(uri) = self.dynamic.find_definition_by_id(id) {
            if let Some(result) = self.dynamic.get_result(&uri) {
                if let Some(symbol) = result.symbols.iter().find(|s| s.id == id) {
                    return Ok(Some(symbol.clone()));
                }
            }
        }
        if let Some(uri) = self.background.find_definition_by_id(id) {
            if let Some(shard) = self.background.load_shard(&uri).await? {
                if let Some(symbol) = shard.symbols.iter().find(|s| s.id == id) {
                    return Ok(Some(symbol.clone()));
                }
            }
        }
        Ok(None)
    }

    pub async fn find_references_by_name(
        &self,
        name: &str,
        opts: FindReferencesOptions,
        definition_locations: &[crate::model::Location],
    ) -> Result<Vec<crate::model::Reference>> {
        metrics().record_find_references();

        let mut combined = Vec::new();

        for uri in self.dynamic.find_reference_uris(name) {
            if let Some(result) = self.dynamic.get_result(&uri) {
                combined.extend(result.references.iter().filter(|r| r.symbol_name == name).cloned());
            }
        }
        for uri in self.background.find_reference_uris(name) {
            if let Some(shard) = self.background.load_shard(&uri).await? {
                combined.extend(shard.references.iter().filter(|r| r.symbol_name == name).cloned());
            }
        }

        if opts.exclude_local {
            combined.retain(|r| !r.is_local);
        }
        if let Some(scope_id) = opts.scope_id {
            combined.retain(|r| r.scope_id == Some(scope_id));
        }

        let combined = subtract_definitions(combined, definition_locations);
        Ok(dedup_references(combined))
    }

    pub async fn search_symbols(&self, query: &str, limit: usize) -> Result<Vec<ScoredSymbol>> {
        metrics().record_search_symbols();

        let mut candidates = Vec::new();
        for uri in self.dynamic.open_uris() {
            if let Some(result) = self.dynamic.get_result(&uri) {
                candidates.extend(result.symbols.iter().cloned());
            }
        }
        for shard in self.background.all_shards_best_effort() {
            candidates.extend(shard.symbols.into_iter());
        }

        let candidates = dedup_symbols(candidates);
        Ok(rank_symbols(query, candidates, limit, RANK_BATCH_SIZE).await)
    }

    pub async fn get_file_symbols(&self, uri: &Uri) -> Result<Vec<Symbol>> {
        if let Some(result) = self.dynamic.get_result(uri) {
            return Ok(result.symbols.clone());
        }
        if let Some(shard) = self.background.load_shard(uri).await? {
            return Ok(shard.symbols.clone());
        }
        if let Some(shard) = self.static_index.shard(uri) {
            return Ok(shard.symbols.clone());
        }
        Ok(Vec::new())
    }

    pub async fn get_file_imports(&self, uri: &Uri) -> Result<Vec<ImportInfo>> {
        if let Some(result) = self.dynamic.get_result(uri) {
            return Ok(result.imports.clone());
        }
        if let Some(shard) = self.background.load_shard(uri).await? {
            return Ok(shard.imports.clone());
        }
        Ok(Vec::new())
    }

    pub async fn get_file_re_exports(&self, uri: &Uri) -> Result<Vec<ReExportInfo>> {
        if let Some(result) = self.dynamic.get_result(uri) {
            return Ok(result.re_exports.clone());
        }
        if let Some(shard) = self.background.load_shard(uri).await? {
            return Ok(shard.re_exports.clone());
        }
        Ok(Vec::new())
    }
}
