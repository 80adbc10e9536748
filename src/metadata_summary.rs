//! Compact uri→summary projection (spec §4.2).
//!
//! Lets the Background Index answer "does this uri need reindexing" for
//! every file in the workspace without opening a single shard. Rewritten at
//! end-of-bulk and on explicit flush; read once at startup in preference to
//! a full shard scan.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::model::FileMetadata;
use crate::uri::Uri;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSummary {
    entries: HashMap<Uri, FileMetadata>,
}

impl MetadataSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &Uri) -> Option<&FileMetadata> {
        self.entries.get(uri)
    }

    pub fn upsert(&mut self, metadata: FileMetadata) {
        self.entries.insert(metadata.uri.clone(), metadata);
    }

    pub fn remove(&mut self, uri: &Uri) {
        self.entries.remove(uri);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileMetadata> {
        self.entries.values()
    }

    /// Loads `metadata.json` from `cache_dir`, or returns an empty summary
    /// if absent or unparseable — the caller is expected to fall back to a
    /// full shard scan in that case (spec §4.2, §7).
    pub fn load(cache_dir: &Path) -> Self {
        let path = metadata_path(cache_dir);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Atomically writes this summary to `cache_dir/metadata.json`.
    pub fn save(&self, cache_dir: &Path) -> Result<()> {
        fs::create_dir_all(cache_dir).map_err(|e| IndexError::io(cache_dir, e))?;
        let path = metadata_path(cache_dir);
        let tmp_path = cache_dir.join(".metadata.json.tmp");

        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| IndexError::CorruptMetadataSummary { reason: e.to_string() })?;
        fs::write(&tmp_path, &json).map_err(|e| IndexError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| IndexError::io(&path, e))?;
        Ok(())
    }
}

fn metadata_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("metadata.json")
}
