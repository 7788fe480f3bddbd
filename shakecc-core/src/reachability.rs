//! Closure of the root set over the requires graph.

use std::collections::HashSet;

use tracing::debug;

use crate::common::GraphTraversal;
use crate::graph::RequiresGraph;
use crate::index::SemanticId;
use crate::logging::PhaseTimer;

/// Every semantic declaration reachable from `roots`, roots included.
pub fn compute_used<'a, I>(graph: &RequiresGraph, roots: I) -> HashSet<SemanticId>
where
    I: IntoIterator<Item = &'a SemanticId>,
{
    let _timer = PhaseTimer::start("reachability");
    let used = graph.reachable_from(roots.into_iter().copied());
    debug!(
        used = used.len(),
        total = graph.node_count(),
        "reachability computed"
    );
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn s(n: u32) -> SemanticId {
        SemanticId(n)
    }

    fn graph(edges: &[(u32, u32)], nodes: u32) -> RequiresGraph {
        let mut g = RequiresGraph::new();
        for n in 0..nodes {
            g.add_node(s(n));
        }
        for (a, b) in edges {
            g.add_edge(s(*a), s(*b));
        }
        g
    }

    #[test]
    fn test_used_iff_path_from_root() {
        // 0 -> 1 -> 2, 3 -> 2, 4 isolated
        let g = graph(&[(0, 1), (1, 2), (3, 2)], 5);
        let used = compute_used(&g, &[s(0)]);
        let used: BTreeSet<u32> = used.into_iter().map(|x| x.0).collect();
        assert_eq!(used, BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn test_mutual_recursion_unreachable_from_root() {
        let g = graph(&[(1, 2), (2, 1)], 3);
        let used = compute_used(&g, &[s(0)]);
        assert_eq!(used, HashSet::from([s(0)]));
    }

    #[test]
    fn test_root_order_does_not_matter() {
        let g = graph(&[(0, 1), (2, 3), (3, 0)], 5);
        let a = compute_used(&g, &[s(0), s(2)]);
        let b = compute_used(&g, &[s(2), s(0)]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn test_no_roots_nothing_used() {
        let g = graph(&[(0, 1)], 2);
        assert!(compute_used(&g, &Vec::new()).is_empty());
    }
}
