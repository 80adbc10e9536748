//! The dynamic index (spec §4.4): in-memory mirror of the open-buffer set.
//! Same map shape as the background index, plus content-hash self-healing.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::index::maps::IndexMaps;
use crate::model::{FileMetadata, SymbolId};
use crate::parser::{FileIndexResult, SourceParser};
use crate::uri::Uri;

pub struct DynamicIndex {
    maps: IndexMaps,
    /// uri -> blake3 content hash of the text last applied to this index,
    /// used for self-healing (spec §4.4).
    content_hashes: DashMap<Uri, String>,
    /// uri -> last text, kept only so self-healing can re-parse without a
    /// round trip to the caller.
    buffers: RwLock<std::collections::HashMap<Uri, Arc<str>>>,
    /// uri -> last parse result, so queries can return full symbol/reference
    /// records without re-parsing or touching the shard store.
    results: DashMap<Uri, Arc<FileIndexResult>>,
}

impl DynamicIndex {
    pub fn new() -> Self {
        Self {
            maps: IndexMaps::new(),
            content_hashes: DashMap::new(),
            buffers: RwLock::new(std::collections::HashMap::new()),
            results: DashMap::new(),
        }
    }

    fn hash_of(text: &str) -> String {
        blake3::hash(text.as_bytes()).to_hex().to_string()
    }

    /// Applies an open-buffer edit. Always re-parses and rebuilds this
    /// uri's contribution to the maps — the dynamic tier favors simplicity
    /// over incremental diffing since open-buffer sets are small.
    pub fn apply_edit(&self, uri: &Uri, text: &str, parser: &dyn SourceParser) {
        let result = parser.parse(uri, text);
        self.apply_result(uri, text, result);
    }

    fn apply_result(&self, uri: &Uri, text: &str, result: FileIndexResult) {
        self.maps.remove_file(uri);

        for symbol in &result.symbols {
            self.maps.add_symbol_name(&symbol.name, uri);
            self.maps.add_symbol_id(symbol.id, uri);
        }
        for reference in &result.references {
            self.maps.add_reference_name(&reference.symbol_name, uri);
        }

        let hash = Self::hash_of(text);
        self.maps.file_metadata.insert(
            uri.clone(),
            FileMetadata {
                uri: uri.clone(),
                content_hash: hash.clone(),
                mtime: None,
                symbol_count: result.symbols.len(),
                last_indexed_at: 0,
            },
        );
        self.content_hashes.insert(uri.clone(), hash);
        self.buffers.write().insert(uri.clone(), Arc::from(text));
        self.results.insert(uri.clone(), Arc::new(result));
    }

    pub fn get_result(&self, uri: &Uri) -> Option<Arc<FileIndexResult>> {
        self.results.get(uri).map(|r| r.clone())
    }

    /// Self-healing entry point (spec §4.4): before serving a query against
    /// `uri`, check whether `current_text`'s hash matches what this index
    /// last applied, and re-parse/repair if it drifted — defends against
    /// lost file-watcher events.
    pub fn ensure_fresh(&self, uri: &Uri, current_text: &str, parser: &dyn SourceParser) {
        let current_hash = Self::hash_of(current_text);
        let stale = match self.content_hashes.get(uri) {
            Some(stored) => *stored != current_hash,
            None => true,
        };
        if stale {
            self.apply_edit(uri, current_text, parser);
        }
    }

    pub fn remove_buffer(&self, uri: &Uri) {
        self.maps.remove_file(uri);
        self.content_hashes.remove(uri);
        self.buffers.write().remove(uri);
        self.results.remove(uri);
    }

    pub fn find_definitions(&self, name: &str) -> Vec<Uri> {
        self.maps.uris_for_symbol_name(name)
    }

    pub fn find_definition_by_id(&self, id: SymbolId) -> Option<Uri> {
        self.maps.uri_for_symbol_id(id)
    }

    pub fn find_reference_uris(&self, name: &str) -> Vec<Uri> {
        self.maps.uris_for_reference_name(name)
    }

    pub fn file_symbol_names(&self, uri: &Uri) -> Vec<String> {
        self.maps.file_symbol_names(uri)
    }

    pub fn is_open(&self, uri: &Uri) -> bool {
        self.buffers.read().contains_key(uri)
    }

    pub fn open_uris(&self) -> Vec<Uri> {
        self.buffers.read().keys().cloned().collect()
    }
}

impl Default for DynamicIndex {
    fn default() -> Self {
        Self::new()
    }
}
