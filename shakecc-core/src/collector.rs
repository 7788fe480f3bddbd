//! Dependency collection.
//!
//! One semantic traversal of the tree (generated nodes included) turns every
//! resolved reference into an edge of the requires graph and picks the
//! roots. Bodies the front end skipped are forced afterwards and their
//! references collected again, so the graph and the declaration ranges are
//! complete before reachability runs.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::context::PipelineContext;
use crate::error::ShakeResult;
use crate::frontend::{
    Decl, DeclId, DeclKind, DeclVisitor, FrontEnd, TranslationUnit, TraversalOptions, VisitFlow,
};
use crate::graph::RequiresGraph;
use crate::index::{DeclIndex, SemanticId};
use crate::logging::PhaseTimer;

/// Populate `ctx.graph` and `ctx.roots`.
pub fn collect(
    ctx: &mut PipelineContext,
    front_end: &mut dyn FrontEnd,
    keep_identifiers: &[String],
) -> ShakeResult<()> {
    let _timer = PhaseTimer::start("collect");

    let mut collector = Collector::new(
        &ctx.unit,
        &mut ctx.index,
        &mut ctx.graph,
        &mut ctx.roots,
        keep_identifiers,
    );
    ctx.unit.traverse(&mut collector, TraversalOptions::semantic());
    let matched = collector.matched;

    let deferred = ctx.unit.deferred().to_vec();
    for id in &deferred {
        force_body(&mut ctx.unit, front_end, *id)?;
    }
    let mut collector = Collector::new(
        &ctx.unit,
        &mut ctx.index,
        &mut ctx.graph,
        &mut ctx.roots,
        keep_identifiers,
    );
    for id in &deferred {
        if let Some(node) = collector.node_of(*id) {
            collector.reference_edges(*id, node);
        }
    }
    collector.link_free_operators();
    collector.link_orphan_specializations();

    for name in keep_identifiers {
        if !matched.contains(name) {
            warn!(identifier = %name, "identifier to keep not found");
        }
    }
    debug!(
        nodes = ctx.graph.node_count(),
        edges = ctx.graph.edge_count(),
        roots = ctx.roots.len(),
        forced = deferred.len(),
        "requires graph built"
    );
    Ok(())
}

/// Parse a skipped body. Whatever the late parse reports is not the user's
/// concern: the body was accepted when the file was parsed.
fn force_body(unit: &mut TranslationUnit, front_end: &mut dyn FrontEnd, id: DeclId) -> ShakeResult<()> {
    let previous = unit.diagnostics.set_suppress_all(true);
    let result = front_end.force_parse(unit, id);
    unit.diagnostics.set_suppress_all(previous);
    result
}

struct Collector<'a> {
    unit: &'a TranslationUnit,
    index: &'a mut DeclIndex,
    graph: &'a mut RequiresGraph,
    roots: &'a mut BTreeSet<SemanticId>,
    keep: &'a [String],
    matched: HashSet<String>,
}

impl<'a> Collector<'a> {
    fn new(
        unit: &'a TranslationUnit,
        index: &'a mut DeclIndex,
        graph: &'a mut RequiresGraph,
        roots: &'a mut BTreeSet<SemanticId>,
        keep: &'a [String],
    ) -> Self {
        Self {
            unit,
            index,
            graph,
            roots,
            keep,
            matched: HashSet::new(),
        }
    }

    /// Graph node standing for `id`. Instantiations get their own node,
    /// implicit declarations fold into the nearest enclosing declaration.
    fn node_of(&mut self, id: DeclId) -> Option<SemanticId> {
        let unit = self.unit;
        let mut current = Some(id);
        while let Some(c) = current {
            let decl = unit.decl(c);
            if decl.instantiation_of.is_some() && !decl.implicit {
                return Some(self.index.intern_instantiation(unit, c));
            }
            if let Some(s) = self.index.semantic_of(c) {
                return Some(s);
            }
            current = decl.parent;
        }
        // Generated at namespace scope: nothing encloses it.
        let decl = unit.decl(id);
        if decl.kind.is_semantic() && (decl.implicit || decl.instantiation_of.is_some()) {
            return Some(self.index.intern_instantiation(unit, id));
        }
        None
    }

    fn edge(&mut self, from: SemanticId, to: Option<SemanticId>) {
        if let Some(to) = to {
            self.graph.add_edge(from, to);
        }
    }

    fn reference_edges(&mut self, id: DeclId, node: SemanticId) {
        let unit = self.unit;
        for reference in &unit.decl(id).references {
            for target in &reference.targets {
                let to = self.node_of(*target);
                self.edge(node, to);
            }
        }
    }

    fn structural_edges(&mut self, id: DeclId, node: SemanticId) {
        let unit = self.unit;
        let decl = unit.decl(id);

        if let Some(pattern) = decl.instantiation_of {
            let to = self.node_of(pattern);
            self.edge(node, to);
        }
        if let Some(parent) = decl.parent.filter(|p| unit.decl(*p).kind == DeclKind::Record) {
            let to = self.node_of(parent);
            self.edge(node, to);
        }
        if decl.kind == DeclKind::Record {
            for child in &decl.children {
                if is_interface_member(decl, unit.decl(*child)) {
                    let to = self.node_of(*child);
                    self.edge(node, to);
                }
            }
        }
        if let Some(primary) = decl.specialization_of {
            let to = self.node_of(primary);
            self.edge(node, to);
        }
    }

    fn root_if_needed(&mut self, id: DeclId, node: SemanticId) {
        let unit = self.unit;
        let decl = unit.decl(id);
        if decl.implicit || decl.instantiation_of.is_some() {
            return;
        }

        let always = match decl.kind {
            DeclKind::StaticAssert | DeclKind::ExplicitInstantiation => true,
            DeclKind::Function => decl.name == "main" && decl.qualifier.is_empty() && at_global_scope(unit, decl),
            DeclKind::Variable => {
                (decl.name.is_empty() && decl.extra_names.is_empty()) || runs_user_code(unit, decl)
            }
            _ => false,
        };
        if always {
            self.roots.insert(node);
        }

        if self.keep.is_empty() {
            return;
        }
        let qualified = unit.qualified_name(id);
        for name in self.keep {
            if decl.names().any(|n| n == name.as_str()) || qualified == *name {
                self.roots.insert(node);
                self.matched.insert(name.clone());
            }
        }
    }

    /// A class keeps the namespace-scope operators taking it; they are found
    /// by argument-dependent lookup, which name-based references miss.
    fn link_free_operators(&mut self) {
        let unit = self.unit;
        for decl in unit.decls() {
            if decl.kind != DeclKind::Function || !decl.name.starts_with("operator") || is_member(unit, decl) {
                continue;
            }
            self.link_from_records(decl);
        }
    }

    /// Specializations of templates declared elsewhere (`std::hash<T>` and
    /// friends) are kept by the classes they are written for.
    fn link_orphan_specializations(&mut self) {
        let unit = self.unit;
        for decl in unit.decls() {
            if decl.kind.is_semantic() && decl.template.is_specialization() && decl.specialization_of.is_none() {
                self.link_from_records(decl);
            }
        }
    }

    fn link_from_records(&mut self, decl: &Decl) {
        let unit = self.unit;
        let Some(node) = self.node_of(decl.id) else {
            return;
        };
        for reference in &decl.references {
            for target in &reference.targets {
                if unit.decl(*target).kind != DeclKind::Record {
                    continue;
                }
                if let Some(record) = self.node_of(*target) {
                    self.graph.add_edge(record, node);
                }
            }
        }
    }
}

impl DeclVisitor for Collector<'_> {
    fn enter(&mut self, _unit: &TranslationUnit, id: DeclId) -> VisitFlow {
        if !self.unit.decl(id).kind.is_semantic() {
            return VisitFlow::Continue;
        }
        let Some(node) = self.node_of(id) else {
            return VisitFlow::Continue;
        };
        self.graph.add_node(node);
        self.root_if_needed(id, node);
        self.reference_edges(id, node);
        self.structural_edges(id, node);
        VisitFlow::Continue
    }
}

/// Members that come with the class whether named or not: its layout and
/// the special and virtual functions.
fn is_interface_member(record: &Decl, child: &Decl) -> bool {
    match child.kind {
        DeclKind::Field | DeclKind::Friend => true,
        // anonymous struct or union member
        DeclKind::Record => child.name.is_empty(),
        DeclKind::Function => {
            child.name == record.name
                || child.name.starts_with('~')
                || child.name.starts_with("operator")
                || ["virtual", "override", "final"].iter().any(|s| child.has_specifier(s))
        }
        _ => false,
    }
}

fn is_member(unit: &TranslationUnit, decl: &Decl) -> bool {
    !decl.qualifier.is_empty() || decl.parent.is_some_and(|p| unit.decl(p).kind == DeclKind::Record)
}

fn at_global_scope(unit: &TranslationUnit, decl: &Decl) -> bool {
    let mut scope = decl.parent;
    while let Some(s) = scope {
        let parent = unit.decl(s);
        if parent.kind != DeclKind::LinkageSpec {
            return false;
        }
        scope = parent.parent;
    }
    true
}

/// Namespace-scope variable whose construction or initializer runs code:
/// any call or lambda in the initializer, or a type defined in this file.
fn runs_user_code(unit: &TranslationUnit, decl: &Decl) -> bool {
    if is_member(unit, decl) {
        return false;
    }
    if decl.has_specifier("constexpr") || (decl.has_specifier("extern") && !decl.has_initializer) {
        return false;
    }
    decl.initializer_has_effects || mentions_user_code(unit, decl, 0)
}

fn mentions_user_code(unit: &TranslationUnit, decl: &Decl, depth: usize) -> bool {
    decl.references.iter().flat_map(|r| &r.targets).any(|t| {
        let target = unit.decl(*t);
        if !target.is_main_file() {
            return false;
        }
        match target.kind {
            DeclKind::Record | DeclKind::Function => true,
            // look through aliases of the declared type
            DeclKind::Typedef | DeclKind::TypeAlias if depth < 8 => mentions_user_code(unit, target, depth + 1),
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lite::LiteFrontEnd;
    use crate::frontend::{NoopCallbacks, RefKind, Reference};
    use crate::reachability::compute_used;
    use crate::source::{SourceFile, SourceRange};

    fn run(text: &str, args: &[&str], keep: &[&str]) -> PipelineContext {
        let mut fe = LiteFrontEnd::from_args(args).unwrap();
        let unit = fe
            .parse(SourceFile::new("t.cpp", text), &mut NoopCallbacks)
            .unwrap();
        let mut ctx = PipelineContext::new(unit);
        let keep: Vec<String> = keep.iter().map(|s| s.to_string()).collect();
        collect(&mut ctx, &mut fe, &keep).unwrap();
        ctx.used = compute_used(&ctx.graph, &ctx.roots);
        ctx
    }

    fn used(ctx: &PipelineContext, kind: DeclKind, name: &str) -> bool {
        let decl = ctx
            .unit
            .decls()
            .find(|d| d.kind == kind && d.name == name)
            .unwrap_or_else(|| panic!("no {kind:?} {name}"));
        ctx.is_used(decl.id)
    }

    #[test]
    fn test_main_reaches_callees_only() {
        let ctx = run(
            "int leaf() { return 1; }\nint mid() { return leaf(); }\nint unused() { return mid(); }\nint main() { return mid(); }\n",
            &[],
            &[],
        );
        assert_eq!(ctx.roots.len(), 1);
        assert!(used(&ctx, DeclKind::Function, "leaf"));
        assert!(used(&ctx, DeclKind::Function, "mid"));
        assert!(!used(&ctx, DeclKind::Function, "unused"));
    }

    #[test]
    fn test_class_keeps_layout_and_special_members() {
        let text = "struct Dep {};\nstruct S {\n  S() {}\n  ~S() {}\n  virtual void v() {}\n  void plain() {}\n  Dep field;\n};\nint main() { S s; }\n";
        let ctx = run(text, &[], &[]);
        assert!(used(&ctx, DeclKind::Record, "S"));
        assert!(used(&ctx, DeclKind::Function, "v"));
        assert!(used(&ctx, DeclKind::Function, "~S"));
        assert!(used(&ctx, DeclKind::Field, "field"));
        assert!(used(&ctx, DeclKind::Record, "Dep"));
        assert!(!used(&ctx, DeclKind::Function, "plain"));
    }

    #[test]
    fn test_member_requires_class() {
        let text = "struct S { static int count(); };\nint S::count() { return 0; }\nint main() { return S::count(); }\n";
        let ctx = run(text, &[], &[]);
        let count: Vec<DeclId> = ctx.unit.decls().filter(|d| d.name == "count").map(|d| d.id).collect();
        let record = ctx.unit.decls().find(|d| d.kind == DeclKind::Record).unwrap().id;
        let count_node = ctx.index.semantic_of(count[0]).unwrap();
        assert_eq!(ctx.index.semantic_of(count[1]), Some(count_node));
        assert!(ctx.graph.has_edge(count_node, ctx.index.semantic_of(record).unwrap()));
        assert!(used(&ctx, DeclKind::Record, "S"));
    }

    #[test]
    fn test_keep_list_by_simple_and_qualified_name() {
        let text = "namespace dbg { void dump() {} }\nvoid trace() {}\nvoid other() {}\nint main() {}\n";
        let ctx = run(text, &[], &["dbg::dump", "trace", "missing"]);
        assert!(used(&ctx, DeclKind::Function, "dump"));
        assert!(used(&ctx, DeclKind::Function, "trace"));
        assert!(!used(&ctx, DeclKind::Function, "other"));
    }

    #[test]
    fn test_declarations_with_effects_are_roots() {
        let text = "struct Init { Init() {} };\nInit on_start;\nint plain_counter = 0;\nint setup() { return 1; }\nint ready = setup();\nstatic_assert(sizeof(int) == 4, \"int\");\nint main() {}\n";
        let ctx = run(text, &[], &[]);
        assert!(used(&ctx, DeclKind::Variable, "on_start"));
        assert!(used(&ctx, DeclKind::Record, "Init"));
        assert!(used(&ctx, DeclKind::Variable, "ready"));
        assert!(used(&ctx, DeclKind::Function, "setup"));
        assert!(!used(&ctx, DeclKind::Variable, "plain_counter"));
        assert!(used(&ctx, DeclKind::StaticAssert, ""));
    }

    #[test]
    fn test_initializers_calling_external_code_are_roots() {
        let text = "#include <cstdio>\nint banner = std::printf(\"hi\\n\");\nstatic bool fast = [] { return true; }();\nint* pool = new int[8];\nint table[3] = {1, (2), 3};\nint main() {}\n";
        let ctx = run(text, &[], &[]);
        assert!(used(&ctx, DeclKind::Variable, "banner"));
        assert!(used(&ctx, DeclKind::Variable, "fast"));
        assert!(used(&ctx, DeclKind::Variable, "pool"));
        assert!(!used(&ctx, DeclKind::Variable, "table"));
    }

    #[test]
    fn test_free_operator_follows_class() {
        let text = "struct P { int x; };\nbool operator<(const P& a, const P& b) { return a.x < b.x; }\nint main() { P p; }\n";
        let ctx = run(text, &[], &[]);
        assert!(used(&ctx, DeclKind::Function, "operator<"));
    }

    #[test]
    fn test_forced_bodies_contribute_edges() {
        let text = "void helper() {}\ntemplate <class T> void run(T) { helper(); }\nint main() { run(1); }\n";
        let ctx = run(text, &["-fdelayed-template-parsing"], &[]);
        assert!(ctx.unit.deferred().is_empty());
        assert!(used(&ctx, DeclKind::Function, "helper"));
    }

    /// Front end for hand-built trees.
    struct Prebuilt;

    impl FrontEnd for Prebuilt {
        fn parse(
            &mut self,
            _file: SourceFile,
            _callbacks: &mut dyn crate::frontend::PreprocessorCallbacks,
        ) -> ShakeResult<TranslationUnit> {
            Err(crate::error::ShakeError::internal("not used"))
        }

        fn force_parse(&mut self, _unit: &mut TranslationUnit, _decl: DeclId) -> ShakeResult<()> {
            Ok(())
        }
    }

    fn refer(decl: &mut Decl, target: DeclId) {
        decl.references.push(Reference {
            name: String::new(),
            range: SourceRange::default(),
            kind: RefKind::Name,
            targets: vec![target],
        });
    }

    #[test]
    fn test_instantiations_are_distinct_nodes() {
        let text = "void helper() {} template <class T> void tmpl(T) { helper(); } int main() {}";
        let mut unit = TranslationUnit::new(SourceFile::new("t.cpp", text));
        let helper = unit.add_decl(Decl::new(DeclKind::Function, "helper", SourceRange::new(0, 16)));
        let mut tmpl = Decl::new(DeclKind::Function, "tmpl", SourceRange::new(17, 62));
        refer(&mut tmpl, helper);
        let tmpl = unit.add_decl(tmpl);
        let mut inst_int = Decl::new(DeclKind::Function, "tmpl", SourceRange::new(17, 62));
        inst_int.instantiation_of = Some(tmpl);
        inst_int.signature = Some("<int>".into());
        let inst_int = unit.add_decl(inst_int);
        let mut inst_long = Decl::new(DeclKind::Function, "tmpl", SourceRange::new(17, 62));
        inst_long.instantiation_of = Some(tmpl);
        inst_long.signature = Some("<long>".into());
        let inst_long = unit.add_decl(inst_long);
        let mut main = Decl::new(DeclKind::Function, "main", SourceRange::new(63, 75));
        refer(&mut main, inst_int);
        unit.add_decl(main);

        let mut ctx = PipelineContext::new(unit);
        collect(&mut ctx, &mut Prebuilt, &[]).unwrap();
        ctx.used = compute_used(&ctx.graph, &ctx.roots);

        let int_node = ctx.index.semantic_of(inst_int).unwrap();
        let long_node = ctx.index.semantic_of(inst_long).unwrap();
        assert_ne!(int_node, long_node);
        assert!(ctx.used.contains(&int_node));
        assert!(!ctx.used.contains(&long_node));
        assert!(ctx.is_used(tmpl));
        assert!(ctx.is_used(helper));
    }

    #[test]
    fn test_implicit_reference_redirects_to_enclosing() {
        let text = "struct S {}; int main() {}";
        let mut unit = TranslationUnit::new(SourceFile::new("t.cpp", text));
        let record = unit.add_decl(Decl::new(DeclKind::Record, "S", SourceRange::new(0, 12)));
        let mut ctor = Decl::new(DeclKind::Function, "S", SourceRange::new(0, 0));
        ctor.parent = Some(record);
        ctor.implicit = true;
        let ctor = unit.add_decl(ctor);
        let mut main = Decl::new(DeclKind::Function, "main", SourceRange::new(13, 25));
        refer(&mut main, ctor);
        unit.add_decl(main);

        let mut ctx = PipelineContext::new(unit);
        collect(&mut ctx, &mut Prebuilt, &[]).unwrap();
        ctx.used = compute_used(&ctx.graph, &ctx.roots);
        assert!(ctx.is_used(record));
        assert_eq!(ctx.index.semantic_of(ctor), None);
    }
}
