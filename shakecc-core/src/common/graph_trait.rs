//! Shared graph traversal abstraction.
//!
//! Reachability is written once against this trait; the requires graph and
//! the test graphs only provide adjacency.

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

use tracing::warn;

/// Adjacency queries needed for reachability.
///
/// # Example
/// ```ignore
/// impl GraphTraversal for RequiresGraph {
///     type Node = SemanticId;
///
///     fn neighbors(&self, node: &SemanticId) -> Vec<SemanticId> {
///         self.graph.neighbors(*node).collect()
///     }
///
///     fn contains_node(&self, node: &SemanticId) -> bool {
///         self.graph.contains_node(*node)
///     }
/// }
///
/// let used = graph.reachable_from(roots);
/// ```
pub trait GraphTraversal {
    type Node: Clone + Eq + Hash + Debug;

    /// Outgoing edges of `node`.
    fn neighbors(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn contains_node(&self, node: &Self::Node) -> bool;

    /// Multi-source BFS: every node reachable from any root through zero or
    /// more edges. Each node and edge is visited once, so the cost is
    /// O(|V| + |E|) however many roots there are, and the result does not
    /// depend on the order of `roots`.
    ///
    /// Roots that are not in the graph are logged and skipped.
    fn reachable_from<I>(&self, roots: I) -> HashSet<Self::Node>
    where
        I: IntoIterator<Item = Self::Node>,
    {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if !self.contains_node(&root) {
                warn!(root = ?root, "root not found in graph");
                continue;
            }
            if visited.insert(root.clone()) {
                queue.push_back(root);
            }
        }

        while let Some(node) = queue.pop_front() {
            for neighbor in self.neighbors(&node) {
                if visited.insert(neighbor.clone()) {
                    queue.push_back(neighbor);
                }
            }
        }

        visited
    }
}
