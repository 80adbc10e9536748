//! The static index (spec §4.3 component table, §2 C6): a read-only tier
//! loaded once from a pre-built snapshot, typically shipped alongside a
//! release build so first-query latency doesn't wait on a cold workspace
//! scan. Never mutated after load.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::index::maps::IndexMaps;
use crate::model::{FileShard, SymbolId};
use crate::shard_store::format::{decode_shard, encode_shard};
use crate::uri::Uri;

pub struct StaticIndex {
    maps: IndexMaps,
    shards: HashMap<Uri, FileShard>,
}

impl StaticIndex {
    pub fn empty() -> Self {
        Self { maps: IndexMaps::new(), shards: HashMap::new() }
    }

    /// Builds a static index directly from shards already in memory (used
    /// by snapshot-generation tooling and by tests).
    pub fn from_shards(shards: Vec<FileShard>) -> Self {
        let maps = IndexMaps::new();
        for shard in &shards {
            for symbol in &shard.symbols {
                maps.add_symbol_name(&symbol.name, &shard.uri);
                maps.add_symbol_id(symbol.id, &shard.uri);
            }
            for reference in &shard.references {
                maps.add_reference_name(&reference.symbol_name, &shard.uri);
            }
        }
        let by_uri = shards.into_iter().map(|s| (s.uri.clone(), s)).collect();
        Self { maps, shards: by_uri }
    }

    pub fn shard(&self, uri: &Uri) -> Option<&FileShard> {
        self.shards.get(uri)
    }

    /// Loads a snapshot file written by [`write_snapshot`]: a length-prefixed
    /// sequence of encoded shards, reusing the shard wire codec rather than
    /// inventing a second format.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| IndexError::io(path, e))?;
        let shards = decode_snapshot(&bytes)?;
        Ok(Self::from_shards(shards))
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
}

/// Writes a snapshot of `shards` to `path` for a later [`StaticIndex::load`].
pub fn write_snapshot(path: &Path, shards: &[FileShard]) -> Result<()> {
    let mut out = Vec::new();
    out.extend_from_slice(&(shards.len() as u32).to_le_bytes());
    for shard in shards {
        let encoded = encode_shard(shard)?;
        out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        out.extend_from_slice(&encoded);
    }
    fs::write(path, out).map_err(|e| IndexError::io(path, e))
}

fn decode_snapshot(bytes: &[u8]) -> Result<Vec<FileShard>> {
    if bytes.len() < 4 {
        return Err(IndexError::Codec("snapshot too short for header".to_string()));
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let mut offset = 4;
    let mut shards = Vec::with_capacity(count);

    for _ in 0..count {
        if bytes.len() < offset + 4 {
            return Err(IndexError::Codec("snapshot truncated at entry length".to_string()));
        }
        let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        if bytes.len() < offset + len {
            return Err(IndexError::Codec("snapshot truncated at entry body".to_string()));
        }
        let shard = decode_shard(&bytes[offset..offset + len])?;
        offset += len;
        shards.push(shard);
    }

    Ok(shards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SHARD_VERSION;
    use tempfile::tempdir;

    fn shard_with_symbol(uri: &str, name: &str) -> FileShard {
        let uri = Uri::new(uri);
        let mut shard = FileShard::empty(uri.clone(), "h".to_string(), SHARD_VERSION, 0);
        let range = crate::model::Range {
            start: crate::model::Position::new(0, 0),
            end: crate::model::Position::new(0, 1),
        };
        let location = crate::model::Location { uri, line: 0, character: 0 };
        shard.symbols.push(crate::model::Symbol::new(
            name,
            crate::model::SymbolKind::Function,
            None,
            None,
            range,
            location,
            true,
            true,
        ));
        shard
    }

    #[test]
    fn write_then_load_snapshot_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.bin");
        let shards = vec![shard_with_symbol("file:///a.rs", "Foo")];

        write_snapshot(&path, &shards).unwrap();
        let index = StaticIndex::load(&path).unwrap();

        assert_eq!(index.find_definitions("Foo"), vec![Uri::new("file:///a.rs")]);
    }

    #[test]
    fn from_shards_builds_queryable_index_directly() {
        let index = StaticIndex::from_shards(vec![shard_with_symbol("file:///a.rs", "Foo")]);
        assert_eq!(index.find_definitions("Foo").len(), 1);
    }
}
