//! Core data model (spec §3): symbols, references, pending references, import
//! metadata, and the persisted `FileShard` / `FileMetadata` projections.

use serde::{Deserialize, Serialize};

use crate::uri::Uri;

/// Zero-based line/character position within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open `[start, end)` span within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// A location is always file + position; the uri is carried alongside rather
/// than embedded in `Range` because references are grouped by uri at the
/// shard level (§3: "no uri per symbol... inherited from the shard header").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub uri: Uri,
    pub line: u32,
    pub character: u32,
}

/// Fixed symbol-kind enumeration (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    Class,
    Interface,
    Function,
    Method,
    Property,
    Type,
    Enum,
    Constant,
    Variable,
    Namespace,
    Module,
}

/// Stable identifier for a symbol: a hash of
/// `(uri, name, container, kind, start-line, start-char)`. Two symbols are
/// equal iff their id is equal (§3, §8 property 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(u64);

impl SymbolId {
    pub fn compute(
        uri: &Uri,
        name: &str,
        container: Option<&str>,
        kind: SymbolKind,
        start_line: u32,
        start_char: u32,
    ) -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        uri.as_str().hash(&mut hasher);
        name.hash(&mut hasher);
        container.unwrap_or("").hash(&mut hasher);
        (kind as u8).hash(&mut hasher);
        start_line.hash(&mut hasher);
        start_char.hash(&mut hasher);
        SymbolId(hasher.finish())
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub container_name: Option<String>,
    pub full_container_path: Option<String>,
    pub range: Range,
    pub location: Location,
    pub is_definition: bool,
    pub is_exported: bool,
    pub is_static: Option<bool>,
    /// Opaque parser metadata (e.g. a skip reason, a decorator name) not
    /// otherwise modeled — carried through verbatim, never interpreted here.
    pub metadata: Option<serde_json::Value>,
}

impl Symbol {
    /// Builds a symbol, computing its id from the other fields per §3.
    pub fn new(
        name: impl Into<String>,
        kind: SymbolKind,
        container_name: Option<String>,
        full_container_path: Option<String>,
        range: Range,
        location: Location,
        is_definition: bool,
        is_exported: bool,
    ) -> Self {
        let name = name.into();
        let id = SymbolId::compute(
            &location.uri,
            &name,
            container_name.as_deref(),
            kind,
            range.start.line,
            range.start.character,
        );
        Self {
            id,
            name,
            kind,
            container_name,
            full_container_path,
            range,
            location,
            is_definition,
            is_exported,
            is_static: None,
            metadata: None,
        }
    }
}

/// A use of `symbolName` whose binding target is resolved on query, never at
/// capture time (§3: "a reference never names a symbol by id at capture
/// time").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub symbol_name: String,
    pub location: Location,
    pub range: Range,
    pub container_name: Option<String>,
    pub is_local: bool,
    pub scope_id: Option<u32>,
}

/// A qualified use `container.member` the parser could not bind because
/// `container`'s definition is not inspectable at parse time (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReference {
    pub container: String,
    pub member: String,
    pub container_name: Option<String>,
    pub location: Location,
    pub range: Range,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportInfo {
    pub imported_name: String,
    pub local_name: String,
    pub source_module: String,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReExportInfo {
    pub exported_name: String,
    pub source_module: String,
    pub location: Location,
}

/// Unit of persistence: everything captured for exactly one source file
/// (§3, §6 shard format v7+).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileShard {
    pub uri: Uri,
    pub content_hash: String,
    pub last_indexed_at: u64,
    pub mtime: Option<u64>,
    pub shard_version: u32,
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    pub imports: Vec<ImportInfo>,
    pub re_exports: Vec<ReExportInfo>,
    pub pending_references: Vec<PendingReference>,
    /// Set when the parser skipped this file (too large, or a parse
    /// failure) rather than producing zero symbols legitimately (§7).
    pub skip_reason: Option<String>,
}

impl FileShard {
    pub fn empty(uri: Uri, content_hash: String, shard_version: u32, last_indexed_at: u64) -> Self {
        Self {
            uri,
            content_hash,
            last_indexed_at,
            mtime: None,
            shard_version,
            symbols: Vec::new(),
            references: Vec::new(),
            imports: Vec::new(),
            re_exports: Vec::new(),
            pending_references: Vec::new(),
            skip_reason: None,
        }
    }
}

/// Compact uri → summary projection loaded without touching full shards
/// (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub uri: Uri,
    pub content_hash: String,
    pub mtime: Option<u64>,
    pub symbol_count: usize,
    pub last_indexed_at: u64,
}

/// The current build's shard format version (§3 "Shard version"). Any
/// semantics-changing field addition bumps this and forces a full re-index;
/// there is deliberately no in-place migration path.
pub const SHARD_VERSION: u32 = 7;
