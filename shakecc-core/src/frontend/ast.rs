//! Declaration tree handed over by a front end.
//!
//! The optimizer never looks at statements or expressions. A front end
//! flattens everything below declaration level into resolved
//! [`Reference`]s, which is all dependency collection needs.

use std::collections::BTreeSet;

use serde::Serialize;

use super::diagnostics::DiagnosticsEngine;
use crate::source::{SourceFile, SourceRange};

/// Index of a lexical declaration inside its [`TranslationUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeclId(pub u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DeclKind {
    Namespace,
    /// `extern "C" { ... }`
    LinkageSpec,
    /// class, struct or union
    Record,
    Enum,
    Function,
    /// Namespace-scope variable or static data member
    Variable,
    /// Non-static data member
    Field,
    Typedef,
    TypeAlias,
    NamespaceAlias,
    UsingDecl,
    UsingDirective,
    AccessSpec,
    Friend,
    StaticAssert,
    ExplicitInstantiation,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::LinkageSpec => "linkage-spec",
            Self::Record => "record",
            Self::Enum => "enum",
            Self::Function => "function",
            Self::Variable => "variable",
            Self::Field => "field",
            Self::Typedef => "typedef",
            Self::TypeAlias => "type-alias",
            Self::NamespaceAlias => "namespace-alias",
            Self::UsingDecl => "using-decl",
            Self::UsingDirective => "using-directive",
            Self::AccessSpec => "access-spec",
            Self::Friend => "friend",
            Self::StaticAssert => "static-assert",
            Self::ExplicitInstantiation => "explicit-instantiation",
        }
    }

    /// Kinds that stand for an entity and take part in the requires graph.
    /// The others are pure structure (scopes, labels, directives).
    pub fn is_semantic(&self) -> bool {
        !matches!(
            self,
            Self::Namespace | Self::LinkageSpec | Self::UsingDirective | Self::AccessSpec
        )
    }

    /// Kinds whose children are declarations.
    pub fn is_scope(&self) -> bool {
        matches!(self, Self::Namespace | Self::LinkageSpec | Self::Record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DeclOrigin {
    /// Spelled in the analyzed file; the only declarations ever edited.
    #[default]
    MainFile,
    /// Comes from a header or is otherwise outside the analyzed file.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TemplateKind {
    #[default]
    None,
    Primary,
    PartialSpecialization,
    ExplicitSpecialization,
}

impl TemplateKind {
    pub fn is_specialization(&self) -> bool {
        matches!(self, Self::PartialSpecialization | Self::ExplicitSpecialization)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefKind {
    /// Plain identifier
    Name,
    /// After `.` or `->`
    Member,
    /// After `::`
    Qualified,
    /// Identifier reached through a macro expansion
    Macro,
}

/// A use of a name inside a declaration, resolved by the front end.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    pub name: String,
    pub range: SourceRange,
    pub kind: RefKind,
    /// Every declaration the use may denote. Empty when the name is
    /// external or unknown.
    pub targets: Vec<DeclId>,
}

/// One lexical declaration.
#[derive(Debug, Clone, Serialize)]
pub struct Decl {
    pub id: DeclId,
    pub kind: DeclKind,
    /// Declared name; empty for anonymous entities.
    pub name: String,
    /// Further names introduced by the same declaration: extra declarators,
    /// enumerators, variables declared after a class body.
    pub extra_names: Vec<String>,
    /// Explicit scope qualifier of the declarator (`Foo` in `void Foo::f()`).
    pub qualifier: Vec<String>,
    pub parent: Option<DeclId>,
    pub children: Vec<DeclId>,
    /// Full extent, from the first specifier or template header to the
    /// closing `;` or `}`.
    pub range: SourceRange,
    /// `{ ... }` of a scope or function body, braces included.
    pub body: Option<SourceRange>,
    pub origin: DeclOrigin,
    /// Generated by the compiler (implicit members and the like).
    pub implicit: bool,
    /// Set on implicit template instantiations: the pattern they come from.
    pub instantiation_of: Option<DeclId>,
    pub template: TemplateKind,
    /// Primary template of a specialization, filled by semantic analysis.
    pub specialization_of: Option<DeclId>,
    pub is_definition: bool,
    /// Default arguments (function parameters or template parameters).
    pub has_default_args: bool,
    pub has_attributes: bool,
    pub has_initializer: bool,
    /// The initializer may run code: it calls a function, invokes a lambda
    /// or allocates with `new`.
    pub initializer_has_effects: bool,
    /// Declaration specifiers and virt-specifiers (`static`, `inline`,
    /// `virtual`, `override`, ...).
    pub specifiers: BTreeSet<String>,
    /// Normalized parameter list or template argument list, used to tell
    /// overloads and specializations apart.
    pub signature: Option<String>,
    /// Previous declaration of the same entity.
    pub previous: Option<DeclId>,
    pub references: Vec<Reference>,
    /// Body skipped by delayed template parsing; the range stops at the
    /// signature until the front end is forced to parse it.
    pub deferred: bool,
}

impl Decl {
    pub fn new(kind: DeclKind, name: impl Into<String>, range: SourceRange) -> Self {
        Self {
            id: DeclId(0),
            kind,
            name: name.into(),
            extra_names: Vec::new(),
            qualifier: Vec::new(),
            parent: None,
            children: Vec::new(),
            range,
            body: None,
            origin: DeclOrigin::MainFile,
            implicit: false,
            instantiation_of: None,
            template: TemplateKind::None,
            specialization_of: None,
            is_definition: false,
            has_default_args: false,
            has_attributes: false,
            has_initializer: false,
            initializer_has_effects: false,
            specifiers: BTreeSet::new(),
            signature: None,
            previous: None,
            references: Vec::new(),
            deferred: false,
        }
    }

    pub fn has_specifier(&self, spec: &str) -> bool {
        self.specifiers.contains(spec)
    }

    /// Every name this declaration introduces.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .filter(|n| !n.is_empty())
            .chain(self.extra_names.iter().map(String::as_str))
    }

    pub fn is_main_file(&self) -> bool {
        self.origin == DeclOrigin::MainFile
    }
}

/// Whether traversal descends below a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitFlow {
    Continue,
    SkipChildren,
}

/// Entry/exit hooks driven by [`TranslationUnit::traverse`].
pub trait DeclVisitor {
    fn enter(&mut self, unit: &TranslationUnit, id: DeclId) -> VisitFlow;

    fn exit(&mut self, _unit: &TranslationUnit, _id: DeclId) {}
}

/// Which generated nodes a traversal reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalOptions {
    pub implicit: bool,
    pub instantiations: bool,
}

impl TraversalOptions {
    /// Only what is spelled in the source.
    pub fn lexical() -> Self {
        Self::default()
    }

    /// Everything, generated nodes included.
    pub fn semantic() -> Self {
        Self {
            implicit: true,
            instantiations: true,
        }
    }
}

/// The analyzed file together with its declaration tree and diagnostics.
#[derive(Debug)]
pub struct TranslationUnit {
    file: SourceFile,
    decls: Vec<Decl>,
    top_level: Vec<DeclId>,
    deferred: Vec<DeclId>,
    directives: Vec<SourceRange>,
    pub diagnostics: DiagnosticsEngine,
}

impl TranslationUnit {
    pub fn new(file: SourceFile) -> Self {
        Self {
            file,
            decls: Vec::new(),
            top_level: Vec::new(),
            deferred: Vec::new(),
            directives: Vec::new(),
            diagnostics: DiagnosticsEngine::default(),
        }
    }

    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    /// Append a declaration under `decl.parent` (or at top level) and return
    /// its id. Declarations must be added in source order.
    pub fn add_decl(&mut self, mut decl: Decl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        decl.id = id;
        match decl.parent {
            Some(parent) => self.decls[parent.index()].children.push(id),
            None => self.top_level.push(id),
        }
        self.decls.push(decl);
        id
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn get(&self, id: DeclId) -> Option<&Decl> {
        self.decls.get(id.index())
    }

    pub fn decls(&self) -> impl Iterator<Item = &Decl> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn top_level(&self) -> &[DeclId] {
        &self.top_level
    }

    /// Declarations whose bodies were skipped and wait for `force_parse`.
    pub fn deferred(&self) -> &[DeclId] {
        &self.deferred
    }

    pub fn mark_deferred(&mut self, id: DeclId) {
        self.decls[id.index()].deferred = true;
        self.deferred.push(id);
    }

    pub fn clear_deferred(&mut self, id: DeclId) {
        self.decls[id.index()].deferred = false;
        self.deferred.retain(|d| *d != id);
    }

    /// Every preprocessor directive line seen, taken branch or not.
    pub fn directives(&self) -> &[SourceRange] {
        &self.directives
    }

    pub fn add_directive(&mut self, range: SourceRange) {
        self.directives.push(range);
    }

    /// First declaration of the redeclaration chain.
    pub fn canonical(&self, id: DeclId) -> DeclId {
        let mut current = id;
        let mut steps = 0;
        while let Some(prev) = self.decls[current.index()].previous {
            current = prev;
            steps += 1;
            if steps > self.decls.len() {
                // Cyclic chain: fall back to the occurrence itself.
                return id;
            }
        }
        current
    }

    /// `ns::Class::member` style name including enclosing scopes and the
    /// declarator qualifier.
    pub fn qualified_name(&self, id: DeclId) -> String {
        let mut parts: Vec<String> = Vec::new();
        let decl = self.decl(id);
        let mut scope = decl.parent;
        while let Some(sid) = scope {
            let s = self.decl(sid);
            match s.kind {
                DeclKind::Namespace if s.name.is_empty() => parts.push("(anonymous)".to_string()),
                DeclKind::LinkageSpec => {}
                _ => parts.push(s.name.clone()),
            }
            scope = s.parent;
        }
        parts.reverse();
        parts.extend(decl.qualifier.iter().cloned());
        parts.push(decl.name.clone());
        parts.join("::")
    }

    /// Whether `id` or one of its ancestors is in `set`.
    pub fn is_within<F>(&self, id: DeclId, mut pred: F) -> bool
    where
        F: FnMut(DeclId) -> bool,
    {
        let mut current = Some(id);
        while let Some(c) = current {
            if pred(c) {
                return true;
            }
            current = self.decl(c).parent;
        }
        false
    }

    /// Depth-first walk in source order.
    pub fn traverse<V>(&self, visitor: &mut V, options: TraversalOptions)
    where
        V: DeclVisitor + ?Sized,
    {
        for id in &self.top_level {
            self.walk(*id, visitor, options);
        }
    }

    fn walk<V>(&self, id: DeclId, visitor: &mut V, options: TraversalOptions)
    where
        V: DeclVisitor + ?Sized,
    {
        let decl = self.decl(id);
        if decl.implicit && !options.implicit {
            return;
        }
        if decl.instantiation_of.is_some() && !options.instantiations {
            return;
        }
        if visitor.enter(self, id) == VisitFlow::Continue {
            for child in &decl.children {
                self.walk(*child, visitor, options);
            }
        }
        visitor.exit(self, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_with_tree() -> (TranslationUnit, DeclId, DeclId, DeclId) {
        let text = "namespace N { void f(); void f() {} }";
        let mut unit = TranslationUnit::new(SourceFile::new("t.cpp", text));
        let ns = unit.add_decl(Decl::new(DeclKind::Namespace, "N", SourceRange::new(0, 37)));
        let mut fwd = Decl::new(DeclKind::Function, "f", SourceRange::new(14, 23));
        fwd.parent = Some(ns);
        let fwd = unit.add_decl(fwd);
        let mut def = Decl::new(DeclKind::Function, "f", SourceRange::new(24, 35));
        def.parent = Some(ns);
        def.previous = Some(fwd);
        def.is_definition = true;
        let def = unit.add_decl(def);
        (unit, ns, fwd, def)
    }

    struct Recorder {
        entered: Vec<DeclId>,
        exited: Vec<DeclId>,
        skip: Option<DeclId>,
    }

    impl DeclVisitor for Recorder {
        fn enter(&mut self, _unit: &TranslationUnit, id: DeclId) -> VisitFlow {
            self.entered.push(id);
            if Some(id) == self.skip {
                VisitFlow::SkipChildren
            } else {
                VisitFlow::Continue
            }
        }

        fn exit(&mut self, _unit: &TranslationUnit, id: DeclId) {
            self.exited.push(id);
        }
    }

    #[test]
    fn test_traverse_order_and_skip() {
        let (unit, ns, fwd, def) = unit_with_tree();
        let mut rec = Recorder { entered: vec![], exited: vec![], skip: None };
        unit.traverse(&mut rec, TraversalOptions::lexical());
        assert_eq!(rec.entered, vec![ns, fwd, def]);
        assert_eq!(rec.exited, vec![fwd, def, ns]);

        let mut rec = Recorder { entered: vec![], exited: vec![], skip: Some(ns) };
        unit.traverse(&mut rec, TraversalOptions::lexical());
        assert_eq!(rec.entered, vec![ns]);
    }

    #[test]
    fn test_canonical_and_qualified_name() {
        let (unit, _, fwd, def) = unit_with_tree();
        assert_eq!(unit.canonical(def), fwd);
        assert_eq!(unit.canonical(fwd), fwd);
        assert_eq!(unit.qualified_name(def), "N::f");
    }

    #[test]
    fn test_implicit_nodes_hidden_from_lexical_traversal() {
        let (mut unit, ns, _, _) = unit_with_tree();
        let mut implicit = Decl::new(DeclKind::Function, "g", SourceRange::new(0, 0));
        implicit.parent = Some(ns);
        implicit.implicit = true;
        let implicit = unit.add_decl(implicit);

        let mut rec = Recorder { entered: vec![], exited: vec![], skip: None };
        unit.traverse(&mut rec, TraversalOptions::lexical());
        assert!(!rec.entered.contains(&implicit));

        let mut rec = Recorder { entered: vec![], exited: vec![], skip: None };
        unit.traverse(&mut rec, TraversalOptions::semantic());
        assert!(rec.entered.contains(&implicit));
    }
}
