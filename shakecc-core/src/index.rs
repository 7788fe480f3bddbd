//! Declaration index: lexical occurrences and their semantic identities.
//!
//! Every spelled declaration is recorded under its own [`DeclKey`]. All
//! occurrences of one entity (forward declarations, the definition,
//! out-of-line member definitions) share the [`SemanticId`] of the first
//! declaration in their redeclaration chain.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::frontend::{DeclId, DeclKind, DeclVisitor, TranslationUnit, TraversalOptions, VisitFlow};

/// Interned identity of one program entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SemanticId(pub u32);

impl SemanticId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SemanticId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Stable identity of a declaration occurrence: where it starts, what it is
/// called and what kind of entity it declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeclKey {
    pub offset: usize,
    pub qualified_name: String,
    pub kind: DeclKind,
}

impl DeclKey {
    pub fn of(unit: &TranslationUnit, id: DeclId) -> Self {
        let decl = unit.decl(id);
        Self {
            offset: decl.range.start,
            qualified_name: unit.qualified_name(id),
            kind: decl.kind,
        }
    }
}

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}@{}", self.kind.as_str(), self.qualified_name, self.offset)
    }
}

#[derive(Debug, Default)]
pub struct DeclIndex {
    /// Key of the representative occurrence, by semantic id
    keys: Vec<DeclKey>,
    /// Representative occurrence, by semantic id
    representatives: Vec<DeclId>,
    occurrences: Vec<Vec<DeclId>>,
    semantic_by_key: HashMap<DeclKey, SemanticId>,
    by_decl: HashMap<DeclId, SemanticId>,
    by_occurrence: HashMap<DeclKey, DeclId>,
}

struct IndexBuilder<'a> {
    index: &'a mut DeclIndex,
}

impl DeclVisitor for IndexBuilder<'_> {
    fn enter(&mut self, unit: &TranslationUnit, id: DeclId) -> VisitFlow {
        if unit.decl(id).kind.is_semantic() {
            self.index.record(unit, id);
        }
        VisitFlow::Continue
    }
}

impl DeclIndex {
    /// Index every spelled declaration of `unit`. Implicit declarations and
    /// template instantiations are left out.
    pub fn build(unit: &TranslationUnit) -> Self {
        let mut index = Self::default();
        unit.traverse(&mut IndexBuilder { index: &mut index }, TraversalOptions::lexical());
        debug!(
            occurrences = index.by_decl.len(),
            semantic = index.keys.len(),
            "declaration index built"
        );
        index
    }

    fn record(&mut self, unit: &TranslationUnit, id: DeclId) {
        self.by_occurrence.insert(DeclKey::of(unit, id), id);
        let canonical = unit.canonical(id);
        let semantic = self.intern(DeclKey::of(unit, canonical), canonical);
        self.by_decl.insert(id, semantic);
        self.occurrences[semantic.index()].push(id);
    }

    fn intern(&mut self, key: DeclKey, representative: DeclId) -> SemanticId {
        if let Some(existing) = self.semantic_by_key.get(&key) {
            return *existing;
        }
        let semantic = SemanticId(self.keys.len() as u32);
        self.keys.push(key.clone());
        self.representatives.push(representative);
        self.occurrences.push(Vec::new());
        self.semantic_by_key.insert(key, semantic);
        semantic
    }

    /// Give a generated declaration (template instantiation) its own
    /// identity, distinct from its pattern.
    pub fn intern_instantiation(&mut self, unit: &TranslationUnit, id: DeclId) -> SemanticId {
        if let Some(existing) = self.by_decl.get(&id) {
            return *existing;
        }
        let decl = unit.decl(id);
        let mut key = DeclKey::of(unit, id);
        match &decl.signature {
            Some(args) => key.qualified_name.push_str(args),
            None => key.qualified_name.push_str(&format!("#{}", id.0)),
        }
        let semantic = self.intern(key, id);
        self.by_decl.insert(id, semantic);
        self.occurrences[semantic.index()].push(id);
        semantic
    }

    /// Representative occurrence (first of the redeclaration chain) for any
    /// occurrence.
    pub fn canonical(&self, decl: DeclId) -> DeclId {
        self.semantic_of(decl)
            .map_or(decl, |s| self.representatives[s.index()])
    }

    pub fn semantic_of(&self, decl: DeclId) -> Option<SemanticId> {
        self.by_decl.get(&decl).copied()
    }

    pub fn key(&self, semantic: SemanticId) -> &DeclKey {
        &self.keys[semantic.index()]
    }

    pub fn representative(&self, semantic: SemanticId) -> DeclId {
        self.representatives[semantic.index()]
    }

    /// Every lexical occurrence of `semantic`, in source order.
    pub fn occurrences(&self, semantic: SemanticId) -> &[DeclId] {
        &self.occurrences[semantic.index()]
    }

    /// Occurrence recorded under `key`.
    pub fn lookup(&self, key: &DeclKey) -> Option<DeclId> {
        self.by_occurrence.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn semantics(&self) -> impl Iterator<Item = SemanticId> {
        (0..self.keys.len() as u32).map(SemanticId)
    }
}
