//! Binary shard codec (spec §6 "Shard file format v7+").
//!
//! Wire layout: a length-prefixed binary tuple with short field tags,
//! bincode-encoded and zstd-compressed — the same encode pipeline the
//! teacher's persistent cache uses for its document cache blobs, retargeted
//! from `SerializableCachedDocument` to `FileShard`. References don't carry
//! their own container-name strings; they index into a per-shard
//! scope-string table (`sc`) so a container name repeated across many
//! references is stored once.

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::model::{
    FileShard, ImportInfo, Location, PendingReference, Position, Range, ReExportInfo, Reference,
    Symbol, SymbolId, SymbolKind,
};
use crate::uri::Uri;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Serialize, Deserialize)]
struct WireShard {
    u: String,
    h: String,
    t: u64,
    v: u32,
    m: Option<u64>,
    s: Vec<WireSymbol>,
    r: Vec<WireReference>,
    i: Vec<WireImport>,
    #[serde(default)]
    re: Vec<WireReExport>,
    #[serde(default)]
    pr: Vec<WirePending>,
    #[serde(default)]
    sc: Vec<String>,
    #[serde(default)]
    skip: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireSymbol {
    id: u64,
    name: String,
    kind: u8,
    container: Option<u32>,
    full_container_path: Option<u32>,
    sl: u32,
    sc_: u32,
    el: u32,
    ec: u32,
    is_definition: bool,
    is_exported: bool,
    is_static: Option<bool>,
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireReference {
    name: String,
    line: u32,
    character: u32,
    sl: u32,
    sc_: u32,
    el: u32,
    ec: u32,
    container: Option<u32>,
    is_local: bool,
    scope_id: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireImport {
    imported_name: String,
    local_name: String,
    source_module: String,
    line: u32,
    character: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireReExport {
    exported_name: String,
    source_module: String,
    line: u32,
    character: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePending {
    container: String,
    member: String,
    container_name: Option<u32>,
    line: u32,
    character: u32,
    sl: u32,
    sc_: u32,
    el: u32,
    ec: u32,
}

/// Interns strings into a shared table, returning stable indices. Used only
/// during encode; decode just indexes back into `sc`.
struct ScopeTable {
    strings: Vec<String>,
}

impl ScopeTable {
    fn new() -> Self {
        Self { strings: Vec::new() }
    }

    fn intern(&mut self, s: Option<&str>) -> Option<u32> {
        let s = s?;
        if let Some(idx) = self.strings.iter().position(|existing| existing == s) {
            return Some(idx as u32);
        }
        self.strings.push(s.to_string());
        Some((self.strings.len() - 1) as u32)
    }
}

fn kind_to_u8(kind: SymbolKind) -> u8 {
    kind as u8
}

fn kind_from_u8(raw: u8) -> SymbolKind {
    match raw {
        0 => SymbolKind::Class,
        1 => SymbolKind::Interface,
        2 => SymbolKind::Function,
        3 => SymbolKind::Method,
        4 => SymbolKind::Property,
        5 => SymbolKind::Type,
        6 => SymbolKind::Enum,
        7 => SymbolKind::Constant,
        8 => SymbolKind::Variable,
        9 => SymbolKind::Namespace,
        _ => SymbolKind::Module,
    }
}

/// Encodes a shard into its on-disk byte representation (bincode + zstd).
pub fn encode_shard(shard: &FileShard) -> Result<Vec<u8>> {
    let mut scopes = ScopeTable::new();

    let s = shard
        .symbols
        .iter()
        .map(|sym| WireSymbol {
            id: sym.id.raw(),
            name: sym.name.clone(),
            kind: kind_to_u8(sym.kind),
            container: scopes.intern(sym.container_name.as_deref()),
            full_container_path: scopes.intern(sym.full_container_path.as_deref()),
            sl: sym.range.start.line,
            sc_: sym.range.start.character,
            el: sym.range.end.line,
            ec: sym.range.end.character,
            is_definition: sym.is_definition,
            is_exported: sym.is_exported,
            is_static: sym.is_static,
            metadata: sym.metadata.clone(),
        })
        .collect();

    let r = shard
        .references
        .iter()
        .map(|reference| WireReference {
            name: reference.symbol_name.clone(),
            line: reference.location.line,
            character: reference.location.character,
            sl: reference.range.start.line,
            sc_: reference.range.start.character,
            el: reference.range.end.line,
            ec: reference.range.end.character,
            container: scopes.intern(reference.container_name.as_deref()),
            is_local: reference.is_local,
            scope_id: reference.scope_id,
        })
        .collect();

    let i = shard
        .imports
        .iter()
        .map(|import| WireImport {
            imported_name: import.imported_name.clone(),
            local_name: import.local_name.clone(),
            source_module: import.source_module.clone(),
            line: import.location.line,
            character: import.location.character,
        })
        .collect();

    let re = shard
        .re_exports
        .iter()
        .map(|export| WireReExport {
            exported_name: export.exported_name.clone(),
            source_module: export.source_module.clone(),
            line: export.location.line,
            character: export.location.character,
        })
        .collect();

    let pr = shard
        .pending_references
        .iter()
        .map(|pending| WirePending {
            container: pending.container.clone(),
            member: pending.member.clone(),
            container_name: scopes.intern(pending.container_name.as_deref()),
            line: pending.location.line,
            character: pending.location.character,
            sl: pending.range.start.line,
            sc_: pending.range.start.character,
            el: pending.range.end.line,
            ec: pending.range.end.character,
        })
        .collect();

    let wire = WireShard {
        u: shard.uri.as_str().to_string(),
        h: shard.content_hash.clone(),
        t: shard.last_indexed_at,
        v: shard.shard_version,
        m: shard.mtime,
        s,
        r,
        i,
        re,
        pr,
        sc: scopes.strings,
        skip: shard.skip_reason.clone(),
    };

    let encoded = bincode::serialize(&wire).map_err(|e| IndexError::Codec(e.to_string()))?;
    zstd::encode_all(&encoded[..], ZSTD_LEVEL).map_err(|e| IndexError::Codec(e.to_string()))
}

/// Decodes an on-disk byte blob back into a [`FileShard`]. Tries the
/// current zstd+bincode format first; on failure, falls back to the legacy
/// bare-JSON format (older shards written before the v7 binary codec was
/// introduced) so they are transparently migrated on next read.
pub fn decode_shard(bytes: &[u8]) -> Result<FileShard> {
    match decode_binary(bytes) {
        Ok(shard) => Ok(shard),
        Err(_) => decode_legacy_json(bytes),
    }
}

fn decode_binary(bytes: &[u8]) -> Result<FileShard> {
    let decompressed =
        zstd::decode_all(bytes).map_err(|e| IndexError::Codec(e.to_string()))?;
    let wire: WireShard =
        bincode::deserialize(&decompressed).map_err(|e| IndexError::Codec(e.to_string()))?;
    Ok(wire_to_shard(wire))
}

/// Legacy shards were plain `serde_json`-encoded [`FileShard`] values; this
/// path is a one-way on-ramp, never a target — every write re-encodes with
/// [`encode_shard`].
fn decode_legacy_json(bytes: &[u8]) -> Result<FileShard> {
    serde_json::from_slice(bytes).map_err(|e| IndexError::Codec(format!("legacy json: {e}")))
}

fn wire_to_shard(wire: WireShard) -> FileShard {
    let sc = wire.sc;
    let lookup = |idx: Option<u32>| -> Option<String> {
        idx.and_then(|i| sc.get(i as usize).cloned())
    };

    let uri = Uri::new(&wire.u);

    let symbols = wire
        .s
        .into_iter()
        .map(|sym| {
            let container_name = lookup(sym.container);
            let full_container_path = lookup(sym.full_container_path);
            let range = Range {
                start: Position::new(sym.sl, sym.sc_),
                end: Position::new(sym.el, sym.ec),
            };
            let location = Location {
                uri: uri.clone(),
                line: sym.sl,
                character: sym.sc_,
            };
            Symbol {
                id: SymbolId::compute(
                    &uri,
                    &sym.name,
                    container_name.as_deref(),
                    kind_from_u8(sym.kind),
                    sym.sl,
                    sym.sc_,
                ),
                name: sym.name,
                kind: kind_from_u8(sym.kind),
                container_name,
                full_container_path,
                range,
                location,
                is_definition: sym.is_definition,
                is_exported: sym.is_exported,
                is_static: sym.is_static,
                metadata: sym.metadata,
            }
        })
        .collect();

    let references = wire
        .r
        .into_iter()
        .map(|reference| Reference {
            symbol_name: reference.name,
            location: Location {
                uri: uri.clone(),
                line: reference.line,
                character: reference.character,
            },
            range: Range {
                start: Position::new(reference.sl, reference.sc_),
                end: Position::new(reference.el, reference.ec),
            },
            container_name: lookup(reference.container),
            is_local: reference.is_local,
            scope_id: reference.scope_id,
        })
        .collect();

    let imports = wire
        .i
        .into_iter()
        .map(|import| ImportInfo {
            imported_name: import.imported_name,
            local_name: import.local_name,
            source_module: import.source_module,
            location: Location {
                uri: uri.clone(),
                line: import.line,
                character: import.character,
            },
        })
        .collect();

    let re_exports = wire
        .re
        .into_iter()
        .map(|export| ReExportInfo {
            exported_name: export.exported_name,
            source_module: export.source_module,
            location: Location {
                uri: uri.clone(),
                line: export.line,
                character: export.character,
            },
        })
        .collect();

    let pending_references = wire
        .pr
        .into_iter()
        .map(|pending| PendingReference {
            container: pending.container,
            member: pending.member,
            container_name: lookup(pending.container_name),
            location: Location {
                uri: uri.clone(),
                line: pending.line,
                character: pending.character,
            },
            range: Range {
                start: Position::new(pending.sl, pending.sc_),
                end: Position::new(pending.el, pending.ec),
            },
        })
        .collect();

    FileShard {
        uri,
        content_hash: wire.h,
        last_indexed_at: wire.t,
        mtime: wire.m,
        shard_version: wire.v,
        symbols,
        references,
        imports,
        re_exports,
        pending_references,
        skip_reason: wire.skip,
    }
}
