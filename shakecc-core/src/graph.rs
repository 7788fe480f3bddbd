//! The requires graph over semantic declarations.
//!
//! An edge `a -> b` means keeping `a` requires keeping `b`. The graph may be
//! cyclic (mutually recursive functions, a class and its members); closure is
//! left to [`crate::reachability`].
//!
//! Backed by `DiGraphMap<SemanticId, ()>`: ids are `Copy`, edges carry no
//! weight, and duplicate edges collapse.

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::common::GraphTraversal;
use crate::index::SemanticId;

#[derive(Debug, Default, Clone)]
pub struct RequiresGraph {
    graph: DiGraphMap<SemanticId, ()>,
}

impl RequiresGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: SemanticId) {
        self.graph.add_node(node);
    }

    /// Add `from -> to`. Self loops are dropped; they never change
    /// reachability.
    pub fn add_edge(&mut self, from: SemanticId, to: SemanticId) {
        if from == to {
            self.graph.add_node(from);
            return;
        }
        self.graph.add_edge(from, to, ());
    }

    pub fn contains(&self, node: SemanticId) -> bool {
        self.graph.contains_node(node)
    }

    pub fn has_edge(&self, from: SemanticId, to: SemanticId) -> bool {
        self.graph.contains_edge(from, to)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = SemanticId> + '_ {
        self.graph.nodes()
    }

    pub fn edges(&self) -> impl Iterator<Item = (SemanticId, SemanticId)> + '_ {
        self.graph.all_edges().map(|(a, b, _)| (a, b))
    }

    pub fn successors(&self, node: SemanticId) -> impl Iterator<Item = SemanticId> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }
}

impl GraphTraversal for RequiresGraph {
    type Node = SemanticId;

    fn neighbors(&self, node: &SemanticId) -> Vec<SemanticId> {
        if !self.graph.contains_node(*node) {
            return Vec::new();
        }
        self.successors(*node).collect()
    }

    fn contains_node(&self, node: &SemanticId) -> bool {
        self.contains(*node)
    }
}
