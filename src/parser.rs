//! The parser seam (spec §1, §4 invariant C1): this crate never parses
//! source itself. It accepts the *result* of parsing through the
//! [`SourceParser`] trait and is responsible only for what happens to that
//! result afterward — persistence, indexing, resolution, querying.

use crate::model::{ImportInfo, PendingReference, ReExportInfo, Reference, Symbol};
use crate::uri::Uri;

/// Everything a language-specific front end extracts from one file in a
/// single pass. Parsers are pure: same `(uri, text)` in, same result out,
/// no I/O, no shared state (§4 C1).
#[derive(Debug, Clone, Default)]
pub struct FileIndexResult {
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    pub imports: Vec<ImportInfo>,
    pub re_exports: Vec<ReExportInfo>,
    pub pending_references: Vec<PendingReference>,
    /// Set when the file was too large or otherwise not parsed; in that
    /// case every other field above is empty by construction.
    pub skip_reason: Option<String>,
}

impl FileIndexResult {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// The seam between this crate and a language front end. Implementations
/// live outside this crate; it ships only the trait and, under `#[cfg(test)]`,
/// a trivial implementation used to exercise the rest of the pipeline.
pub trait SourceParser: Send + Sync {
    /// Parses `text` belonging to `uri`, returning everything extractable in
    /// one pass. Must not perform I/O and must not consult any state beyond
    /// its arguments — the scheduler may call this concurrently across many
    /// files and caches results keyed only on content hash.
    fn parse(&self, uri: &Uri, text: &str) -> FileIndexResult;
}
