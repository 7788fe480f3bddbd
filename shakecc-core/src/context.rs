//! State shared by the pipeline phases of one `optimize` call.

use std::collections::{BTreeSet, HashSet};

use crate::frontend::{DeclId, TranslationUnit};
use crate::graph::RequiresGraph;
use crate::index::{DeclIndex, SemanticId};
use crate::report::OptimizeStats;
use crate::rewriter::Rewriter;

/// Lexical declarations deleted so far, with their semantic identities.
#[derive(Debug, Default)]
pub struct RemovedSet {
    decls: BTreeSet<DeclId>,
    semantics: HashSet<SemanticId>,
}

impl RemovedSet {
    pub fn insert(&mut self, decl: DeclId, semantic: Option<SemanticId>) -> bool {
        if let Some(s) = semantic {
            self.semantics.insert(s);
        }
        self.decls.insert(decl)
    }

    pub fn contains(&self, decl: DeclId) -> bool {
        self.decls.contains(&decl)
    }

    /// Whether some occurrence of `semantic` was deleted.
    pub fn touches(&self, semantic: SemanticId) -> bool {
        self.semantics.contains(&semantic)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.decls.iter().copied()
    }
}

/// Everything one run owns. Phases receive it by `&mut` in order; the index,
/// graph and roots are only written by the collector.
#[derive(Debug)]
pub struct PipelineContext {
    pub unit: TranslationUnit,
    pub index: DeclIndex,
    pub graph: RequiresGraph,
    pub roots: BTreeSet<SemanticId>,
    pub used: HashSet<SemanticId>,
    pub removed: RemovedSet,
    pub rewriter: Rewriter,
    pub stats: OptimizeStats,
}

impl PipelineContext {
    pub fn new(unit: TranslationUnit) -> Self {
        Self {
            index: DeclIndex::build(&unit),
            unit,
            graph: RequiresGraph::new(),
            roots: BTreeSet::new(),
            used: HashSet::new(),
            removed: RemovedSet::default(),
            rewriter: Rewriter::new(),
            stats: OptimizeStats::default(),
        }
    }

    /// Whether the entity behind `decl` survives. Declarations outside the
    /// graph (structure, generated nodes) count as used.
    pub fn is_used(&self, decl: DeclId) -> bool {
        match self.index.semantic_of(decl) {
            Some(s) => self.used.contains(&s),
            None => true,
        }
    }
}
