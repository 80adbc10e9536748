//! A small line-oriented test parser shared by the end-to-end integration
//! tests. Recognizes:
//!
//! - `def NAME`              — an exported top-level function definition
//! - `use NAME`              — a reference to `NAME`
//! - `group NAME: a,b,c`     — an exported definition carrying the
//!                             `{"isGroup": true, "events": {...}}` metadata
//!                             convention the deferred resolver looks for
//! - `pending Container.member` — an unresolved qualified reference

use code_symbol_index::model::{
    Location, PendingReference, Position, Range, Reference, Symbol, SymbolKind,
};
use code_symbol_index::parser::{FileIndexResult, SourceParser};
use code_symbol_index::uri::Uri;

pub struct TestParser;

impl SourceParser for TestParser {
    fn parse(&self, uri: &Uri, text: &str) -> FileIndexResult {
        let mut result = FileIndexResult::default();

        for (line_no, line) in text.lines().enumerate() {
            let line_no = line_no as u32;
            let trimmed = line.trim();
            let location = Location { uri: uri.clone(), line: line_no, character: 0 };
            let range = Range { start: Position::new(line_no, 0), end: Position::new(line_no, line.len() as u32) };

            if let Some(rest) = trimmed.strip_prefix("group ") {
                let (name, members) = rest.split_once(':').expect("group line needs a ':'");
                let name = name.trim();
                let events: serde_json::Map<String, serde_json::Value> = members
                    .split(',')
                    .map(|m| (m.trim().to_string(), serde_json::Value::Bool(true)))
                    .collect();
                let mut symbol = Symbol::new(name, SymbolKind::Constant, None, None, range, location, true, true);
                symbol.metadata = Some(serde_json::json!({"isGroup": true, "events": events}));
                result.symbols.push(symbol);
            } else if let Some(name) = trimmed.strip_prefix("def ") {
                result.symbols.push(Symbol::new(name.trim(), SymbolKind::Function, None, None, range, location, true, true));
            } else if let Some(name) = trimmed.strip_prefix("use ") {
                result.references.push(Reference {
                    symbol_name: name.trim().to_string(),
                    location,
                    range,
                    container_name: None,
                    is_local: false,
                    scope_id: None,
                });
            } else if let Some(rest) = trimmed.strip_prefix("pending ") {
                let (container, member) = rest.trim().split_once('.').expect("pending line needs 'Container.member'");
                result.pending_references.push(PendingReference {
                    container: container.to_string(),
                    member: member.to_string(),
                    container_name: None,
                    location,
                    range,
                });
            }
        }

        result
    }
}

pub fn admit_src(path: &std::path::Path) -> bool {
    path.extension().map(|e| e == "src").unwrap_or(false)
}
