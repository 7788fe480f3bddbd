//! Graphviz DOT export of the requires graph.
//!
//! Used entities are lightgreen, unused ones lightcoral, roots get a bold
//! border. Labels are the declaration keys (`kind name@offset`).

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write;

use tracing::error;

use crate::graph::RequiresGraph;
use crate::index::{DeclIndex, SemanticId};

/// Render `graph` with the reachability result.
pub fn generate_dot(
    graph: &RequiresGraph,
    index: &DeclIndex,
    roots: &BTreeSet<SemanticId>,
    used: &HashSet<SemanticId>,
) -> String {
    // ~80 bytes per node, ~30 per edge
    let capacity = graph.node_count() * 80 + graph.edge_count() * 30 + 150;
    let mut dot = String::with_capacity(capacity);

    if let Err(e) = write_dot_content(&mut dot, graph, index, roots, used) {
        error!(error = %e, "failed to generate DOT output");
        return "digraph shakecc {\n}\n".to_string();
    }
    dot
}

fn write_dot_content(
    dot: &mut String,
    graph: &RequiresGraph,
    index: &DeclIndex,
    roots: &BTreeSet<SemanticId>,
    used: &HashSet<SemanticId>,
) -> std::fmt::Result {
    writeln!(dot, "digraph shakecc {{")?;
    writeln!(dot, "  rankdir=LR;")?;
    writeln!(
        dot,
        "  node [shape=box, style=filled, fontname=\"JetBrains Mono\"];"
    )?;
    writeln!(dot)?;

    let mut nodes: Vec<SemanticId> = graph.nodes().collect();
    nodes.sort();
    for node in &nodes {
        let color = if used.contains(node) {
            "lightgreen"
        } else {
            "lightcoral"
        };
        let label = escape(&index.key(*node).to_string());
        if roots.contains(node) {
            writeln!(dot, "  \"{node}\" [label=\"{label}\", fillcolor={color}, penwidth=3];")?;
        } else {
            writeln!(dot, "  \"{node}\" [label=\"{label}\", fillcolor={color}];")?;
        }
    }

    writeln!(dot)?;

    let mut edges: Vec<(SemanticId, SemanticId)> = graph.edges().collect();
    edges.sort();
    for (from, to) in edges {
        writeln!(dot, "  \"{from}\" -> \"{to}\";")?;
    }

    writeln!(dot, "}}")?;
    Ok(())
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{Decl, DeclKind, TranslationUnit};
    use crate::source::{SourceFile, SourceRange};

    #[test]
    fn test_generate_dot_empty() {
        let dot = generate_dot(
            &RequiresGraph::new(),
            &DeclIndex::default(),
            &BTreeSet::new(),
            &HashSet::new(),
        );
        assert!(dot.contains("digraph shakecc"));
        assert!(dot.contains("rankdir=LR"));
    }

    #[test]
    fn test_generate_dot_colors_and_edges() {
        let text = "int main() {} void used() {} void dead() {}";
        let mut unit = TranslationUnit::new(SourceFile::new("t.cpp", text));
        let main = unit.add_decl(Decl::new(DeclKind::Function, "main", SourceRange::new(0, 13)));
        let used_fn = unit.add_decl(Decl::new(DeclKind::Function, "used", SourceRange::new(14, 28)));
        let dead = unit.add_decl(Decl::new(DeclKind::Function, "dead", SourceRange::new(29, 43)));
        let index = DeclIndex::build(&unit);
        let (m, u, d) = (
            index.semantic_of(main).unwrap(),
            index.semantic_of(used_fn).unwrap(),
            index.semantic_of(dead).unwrap(),
        );

        let mut graph = RequiresGraph::new();
        graph.add_edge(m, u);
        graph.add_node(d);
        let roots = BTreeSet::from([m]);
        let used = HashSet::from([m, u]);

        let dot = generate_dot(&graph, &index, &roots, &used);
        assert!(dot.contains(&format!("\"{m}\" -> \"{u}\"")));
        assert!(dot.contains("function main@0"));
        assert!(dot.contains("penwidth=3"));
        assert!(dot.contains("lightgreen"));
        assert!(dot.contains("lightcoral"));
    }
}
