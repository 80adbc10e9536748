//! Shared query types and the dedup/ranking helpers the merged index uses
//! (spec §4.5).

use crate::model::{Reference, Symbol};

#[derive(Debug, Clone, Default)]
pub struct FindReferencesOptions {
    pub exclude_local: bool,
    pub scope_id: Option<u32>,
}

/// One hit from `searchSymbols`, carrying the fuzzy-match score used to
/// rank it against its peers.
#[derive(Debug, Clone)]
pub struct ScoredSymbol {
    pub symbol: Symbol,
    pub score: i64,
}

/// Deduplicates symbols by `(name, uri, line, char)`, keeping the first
/// occurrence in iteration order — priority order across tiers is
/// established by the caller's argument order (spec §8 invariant 7).
pub fn dedup_symbols(symbols: Vec<Symbol>) -> Vec<Symbol> {
    let mut seen = rustc_hash::FxHashSet::default();
    symbols
        .into_iter()
        .filter(|s| {
            let key = (s.name.clone(), s.location.uri.clone(), s.location.line, s.location.character);
            seen.insert(key)
        })
        .collect()
}

/// Deduplicates references by `(symbolName, uri, line, char)`.
pub fn dedup_references(references: Vec<Reference>) -> Vec<Reference> {
    let mut seen = rustc_hash::FxHashSet::default();
    references
        .into_iter()
        .filter(|r| {
            let key = (r.symbol_name.clone(), r.location.uri.clone(), r.location.line, r.location.character);
            seen.insert(key)
        })
        .collect()
}

/// Subtracts any reference whose location coincides with one of
/// `definition_locations` so a declaration never shows up as its own
/// reference (spec §4.5 `findReferencesByName`).
pub fn subtract_definitions(references: Vec<Reference>, definition_locations: &[crate::model::Location]) -> Vec<Reference> {
    references
        .into_iter()
        .filter(|r| !definition_locations.contains(&r.location))
        .collect()
}

/// A crude but deterministic fuzzy score: exact match scores highest,
/// prefix match next, then a case-insensitive subsequence match scored by
/// how contiguous the matched characters are. Ties break by shorter name.
fn fuzzy_score(query: &str, candidate: &str) -> Option<i64> {
    if candidate.eq_ignore_ascii_case(query) {
        return Some(1_000_000 - candidate.len() as i64);
    }
    let lower_candidate = candidate.to_ascii_lowercase();
    let lower_query = query.to_ascii_lowercase();

    if lower_candidate.starts_with(&lower_query) {
        return Some(500_000 - candidate.len() as i64);
    }

    let mut score = 0i64;
    let mut run = 0i64;
    let mut chars = lower_candidate.chars();
    for qc in lower_query.chars() {
        let mut found = false;
        for cc in chars.by_ref() {
            if cc == qc {
                found = true;
                break;
            }
        }
        if !found {
            return None;
        }
        run += 1;
        score += run;
    }
    Some(score - candidate.len() as i64 / 4)
}

/// Ranks `symbols` against `query`, dropping non-matches, batching the scan
/// into chunks of `batch_size` and yielding between chunks (spec §4.5: "to
/// avoid blocking the event loop / request thread").
pub async fn rank_symbols(query: &str, symbols: Vec<Symbol>, limit: usize, batch_size: usize) -> Vec<ScoredSymbol> {
    let mut scored = Vec::new();
    for chunk in symbols.chunks(batch_size.max(1)) {
        for symbol in chunk {
            if let Some(score) = fuzzy_score(query, &symbol.name) {
                scored.push(ScoredSymbol { symbol: symbol.clone(), score });
            }
        }
        tokio::task::yield_now().await;
    }

    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.symbol.name.cmp(&b.symbol.name)));
    scored.truncate(limit);
    scored
}
