//! Run statistics and their output formatting - plaintext and JSON.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::json;
use tracing::warn;

/// Counters collected while optimizing one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeStats {
    /// Lexical declarations in the tree, generated ones included
    pub declarations: usize,
    pub semantic_nodes: usize,
    pub edges: usize,
    pub roots: usize,
    pub used: usize,
    pub removed_declarations: usize,
    pub removed_macros: usize,
    pub removed_branches: usize,
    pub merged_scopes: usize,
    pub edits: usize,
}

impl OptimizeStats {
    pub fn unused(&self) -> usize {
        self.semantic_nodes.saturating_sub(self.used)
    }
}

/// Plain-text summary, one counter per line.
pub fn format_plain(stats: &OptimizeStats) -> String {
    let mut out = String::new();
    let rows = [
        ("declarations", stats.declarations),
        ("semantic nodes", stats.semantic_nodes),
        ("edges", stats.edges),
        ("roots", stats.roots),
        ("used", stats.used),
        ("unused", stats.unused()),
        ("removed declarations", stats.removed_declarations),
        ("removed macros", stats.removed_macros),
        ("removed branches", stats.removed_branches),
        ("merged scopes", stats.merged_scopes),
        ("edits", stats.edits),
    ];
    let _ = writeln!(out, "OPTIMIZER STATISTICS:");
    for (label, value) in rows {
        let _ = writeln!(out, "- {label}: {value}");
    }
    out
}

pub fn print_plain(stats: &OptimizeStats) {
    eprint!("{}", format_plain(stats));
}

/// Prints the statistics as JSON.
///
/// Falls back to the plain format if serialization fails.
pub fn print_json(stats: &OptimizeStats) {
    match serde_json::to_string_pretty(&json!({ "stats": stats })) {
        Ok(text) => eprintln!("{text}"),
        Err(e) => {
            warn!(error = %e, "JSON serialization failed");
            print_plain(stats);
        }
    }
}
