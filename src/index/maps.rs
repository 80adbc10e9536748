//! The seven maps shared by every index tier (spec §4.3): inverted indexes
//! for O(1) lookup by name/id/reference-name, and their reverse-index
//! mirrors that make per-file cleanup O(k) instead of an O(N) scan.
//!
//! Grounded on the teacher's `dependency_graph.rs` adjacency tables:
//! `DashMap<K, DashSet<V>>` rather than `DashMap<K, HashSet<V>>`, so the set
//! itself stays safely mutable under concurrent readers without an extra
//! layer of locking — the single-writer discipline (spec §5) governs
//! cross-map consistency, not single-set mutation safety.

use dashmap::{DashMap, DashSet};

use crate::model::{FileMetadata, SymbolId};
use crate::uri::Uri;

#[derive(Default)]
pub struct IndexMaps {
    pub symbol_name_index: DashMap<String, DashSet<Uri>>,
    pub symbol_id_index: DashMap<SymbolId, Uri>,
    pub reference_map: DashMap<String, DashSet<Uri>>,

    pub file_to_symbol_names: DashMap<Uri, DashSet<String>>,
    pub file_to_symbol_ids: DashMap<Uri, DashSet<SymbolId>>,
    pub file_to_reference_names: DashMap<Uri, DashSet<String>>,

    pub file_metadata: DashMap<Uri, FileMetadata>,
}

impl IndexMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `uri` to the inverted entry for `name`, and records `name` in
    /// `uri`'s reverse entry — the basic insert pattern every index map
    /// pair shares.
    fn insert_inverted(inverted: &DashMap<String, DashSet<Uri>>, name: &str, uri: &Uri) {
        inverted
            .entry(name.to_string())
            .or_default()
            .insert(uri.clone());
    }

    fn remove_inverted(inverted: &DashMap<String, DashSet<Uri>>, name: &str, uri: &Uri) {
        if let Some(set) = inverted.get(name) {
            set.remove(uri);
            let empty = set.is_empty();
            drop(set);
            if empty {
                inverted.remove(name);
            }
        }
    }

    pub fn add_symbol_name(&self, name: &str, uri: &Uri) {
        Self::insert_inverted(&self.symbol_name_index, name, uri);
        self.file_to_symbol_names
            .entry(uri.clone())
            .or_default()
            .insert(name.to_string());
    }

    pub fn add_symbol_id(&self, id: SymbolId, uri: &Uri) {
        self.symbol_id_index.insert(id, uri.clone());
        self.file_to_symbol_ids.entry(uri.clone()).or_default().insert(id);
    }

    pub fn add_reference_name(&self, name: &str, uri: &Uri) {
        Self::insert_inverted(&self.reference_map, name, uri);
        self.file_to_reference_names
            .entry(uri.clone())
            .or_default()
            .insert(name.to_string());
    }

    /// Removes every entry contributed by `uri`, in O(k) where k is the
    /// number of names/ids/reference-names `uri` previously contributed
    /// (spec §4.3 step 2): the defining performance property of this
    /// module.
    pub fn remove_file(&self, uri: &Uri) {
        if let Some((_, names)) = self.file_to_symbol_names.remove(uri) {
            for name in names.iter() {
                Self::remove_inverted(&self.symbol_name_index, &name, uri);
            }
        }

        if let Some((_, ids)) = self.file_to_symbol_ids.remove(uri) {
            for id in ids.iter() {
                self.symbol_id_index.remove(&id);
            }
        }

        if let Some((_, names)) = self.file_to_reference_names.remove(uri) {
            for name in names.iter() {
                Self::remove_inverted(&self.reference_map, &name, uri);
            }
        }

        self.file_metadata.remove(uri);
    }

    pub fn uris_for_symbol_name(&self, name: &str) -> Vec<Uri> {
        self.symbol_name_index
            .get(name)
            .map(|set| set.iter().map(|uri| uri.clone()).collect())
            .unwrap_or_default()
    }

    pub fn uri_for_symbol_id(&self, id: SymbolId) -> Option<Uri> {
        self.symbol_id_index.get(&id).map(|uri| uri.clone())
    }

    pub fn uris_for_reference_name(&self, name: &str) -> Vec<Uri> {
        self.reference_map
            .get(name)
            .map(|set| set.iter().map(|uri| uri.clone()).collect())
            .unwrap_or_default()
    }

    pub fn file_symbol_names(&self, uri: &Uri) -> Vec<String> {
        self.file_to_symbol_names
            .get(uri)
            .map(|set| set.iter().map(|name| name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn file_reference_names(&self, uri: &Uri) -> Vec<String> {
        self.file_to_reference_names
            .get(uri)
            .map(|set| set.iter().map(|name| name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.symbol_name_index.clear();
        self.symbol_id_index.clear();
        self.reference_map.clear();
        self.file_to_symbol_names.clear();
        self.file_to_symbol_ids.clear();
        self.file_to_reference_names.clear();
        self.file_metadata.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_file_cleans_up_every_map_in_one_call() {
        let maps = IndexMaps::new();
        let uri = Uri::new("file:///a.rs");
        maps.add_symbol_name("Foo", &uri);
        maps.add_reference_name("Foo", &uri);

        maps.remove_file(&uri);

        assert!(maps.uris_for_symbol_name("Foo").is_empty());
        assert!(maps.uris_for_reference_name("Foo").is_empty());
        assert!(maps.file_symbol_names(&uri).is_empty());
    }

    #[test]
    fn empty_inverted_entries_are_pruned() {
        let maps = IndexMaps::new();
        let uri = Uri::new("file:///a.rs");
        maps.add_symbol_name("Foo", &uri);
        maps.remove_file(&uri);
        assert!(!maps.symbol_name_index.contains_key("Foo"));
    }

    #[test]
    fn same_name_in_two_files_both_present() {
        let maps = IndexMaps::new();
        let a = Uri::new("file:///a.rs");
        let b = Uri::new("file:///b.rs");
        maps.add_symbol_name("Foo", &a);
        maps.add_symbol_name("Foo", &b);

        let mut uris = maps.uris_for_symbol_name("Foo");
        uris.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(uris, expected);
    }
}
