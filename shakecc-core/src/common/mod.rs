//! Shared abstractions.

mod graph_trait;

pub use graph_trait::GraphTraversal;
