//! Lexical declaration remover.
//!
//! Walks the spelled declarations of the analyzed file and deletes every
//! occurrence of an unused entity, plus occurrences the redundancy rules in
//! [`policy`] reject. The finalize step then deletes structure left empty:
//! access specifiers, namespaces and linkage blocks, using-directives.
//!
//! Nothing here touches the text; all deletions go to the rewriter.

pub mod policy;

use tracing::debug;

use crate::context::PipelineContext;
use crate::error::ShakeResult;
use crate::frontend::{DeclId, DeclKind, DeclVisitor, TranslationUnit, TraversalOptions, VisitFlow};
use crate::logging::PhaseTimer;
use crate::source::SourceRange;

/// Decides which occurrences go, without touching the context.
struct Planner<'a> {
    ctx: &'a PipelineContext,
    doomed: Vec<DeclId>,
}

impl DeclVisitor for Planner<'_> {
    fn enter(&mut self, unit: &TranslationUnit, id: DeclId) -> VisitFlow {
        let decl = unit.decl(id);
        if !decl.is_main_file() {
            return VisitFlow::SkipChildren;
        }
        let Some(semantic) = self.ctx.index.semantic_of(id) else {
            return VisitFlow::Continue;
        };
        if !self.ctx.used.contains(&semantic) || policy::is_redundant(self.ctx, id) {
            self.doomed.push(id);
            return VisitFlow::SkipChildren;
        }
        VisitFlow::Continue
    }
}

/// Delete unused and redundant occurrences, then the structure they leave
/// behind.
pub fn remove_declarations(ctx: &mut PipelineContext) -> ShakeResult<()> {
    let _timer = PhaseTimer::start("remove");

    let mut planner = Planner {
        ctx: &*ctx,
        doomed: Vec::new(),
    };
    ctx.unit.traverse(&mut planner, TraversalOptions::lexical());
    let doomed = planner.doomed;

    for id in &doomed {
        delete_decl(ctx, *id)?;
    }
    remove_empty_access_sections(ctx)?;
    let tops = ctx.unit.top_level().to_vec();
    for id in tops {
        remove_emptied_scope(ctx, id)?;
    }
    remove_orphaned_using_directives(ctx)?;

    ctx.stats.removed_declarations = ctx.removed.len();
    debug!(
        doomed = doomed.len(),
        removed = ctx.removed.len(),
        "declarations removed"
    );
    Ok(())
}

/// Delete the lines of `id` and record it and everything below it.
pub(crate) fn delete_decl(ctx: &mut PipelineContext, id: DeclId) -> ShakeResult<()> {
    let own = ctx.unit.decl(id).range;
    let mut range = ctx.unit.file().expand_to_lines(own);
    // the blanks around it may already go with a neighbour
    if ctx.rewriter.conflicts(range) {
        range = own;
    }
    ctx.rewriter.delete(range)?;
    mark_removed(ctx, id);
    Ok(())
}

fn mark_removed(ctx: &mut PipelineContext, id: DeclId) {
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        let semantic = ctx.index.semantic_of(current);
        ctx.removed.insert(current, semantic);
        stack.extend(ctx.unit.decl(current).children.iter().copied());
    }
}

fn has_directive_inside(ctx: &PipelineContext, range: SourceRange) -> bool {
    ctx.unit.directives().iter().any(|d| d.overlaps(&range))
}

/// Spelled children only.
fn lexical_children(ctx: &PipelineContext, id: DeclId) -> Vec<DeclId> {
    ctx.unit
        .decl(id)
        .children
        .iter()
        .copied()
        .filter(|c| {
            let child = ctx.unit.decl(*c);
            !child.implicit && child.instantiation_of.is_none()
        })
        .collect()
}

/// `public:` and friends whose section lost every member.
fn remove_empty_access_sections(ctx: &mut PipelineContext) -> ShakeResult<()> {
    let mut doomed = Vec::new();
    for record in ctx.unit.decls() {
        if record.kind != DeclKind::Record || !record.is_main_file() || ctx.removed.contains(record.id) {
            continue;
        }
        let Some(body) = record.body else {
            continue;
        };
        let children = lexical_children(ctx, record.id);
        for (pos, spec) in children.iter().enumerate() {
            if ctx.unit.decl(*spec).kind != DeclKind::AccessSpec {
                continue;
            }
            let section: Vec<DeclId> = children[pos + 1..]
                .iter()
                .copied()
                .take_while(|c| ctx.unit.decl(*c).kind != DeclKind::AccessSpec)
                .collect();
            if section.is_empty() || !section.iter().all(|m| ctx.removed.contains(*m)) {
                continue;
            }
            let end = children
                .get(pos + 1 + section.len())
                .map_or(body.end, |next| ctx.unit.decl(*next).range.start);
            let start = ctx.unit.decl(*spec).range.start;
            if has_directive_inside(ctx, SourceRange::new(start, end)) {
                continue;
            }
            doomed.push(*spec);
        }
    }
    for spec in doomed {
        delete_decl(ctx, spec)?;
    }
    Ok(())
}

/// Bottom-up: a namespace or linkage block whose every child was removed
/// goes too. Returns whether `id` is removed afterwards.
fn remove_emptied_scope(ctx: &mut PipelineContext, id: DeclId) -> ShakeResult<bool> {
    if ctx.removed.contains(id) {
        return Ok(true);
    }
    let decl = ctx.unit.decl(id);
    if !decl.is_main_file() || !matches!(decl.kind, DeclKind::Namespace | DeclKind::LinkageSpec) {
        return Ok(false);
    }
    let range = decl.range;
    let children = lexical_children(ctx, id);
    let mut all_gone = !children.is_empty();
    for child in children {
        // no short-circuit: nested scopes must be finalized too
        let gone = remove_emptied_scope(ctx, child)?;
        all_gone &= gone;
    }
    if !all_gone || has_directive_inside(ctx, range) {
        return Ok(false);
    }
    delete_decl(ctx, id)?;
    Ok(true)
}

/// `using namespace N;` where every occurrence of the file-local namespace
/// `N` was removed. Directives naming `std` or a namespace that also lives
/// outside the file stay.
pub(crate) fn remove_orphaned_using_directives(ctx: &mut PipelineContext) -> ShakeResult<()> {
    let mut doomed = Vec::new();
    for directive in ctx.unit.decls() {
        if directive.kind != DeclKind::UsingDirective
            || !directive.is_main_file()
            || ctx.removed.contains(directive.id)
        {
            continue;
        }
        let target = directive.name.as_str();
        if target.is_empty() || target == "std" || target.starts_with("std::") {
            continue;
        }
        let suffix = format!("::{target}");
        let namespaces: Vec<DeclId> = ctx
            .unit
            .decls()
            .filter(|d| d.kind == DeclKind::Namespace)
            .filter(|d| {
                let qualified = ctx.unit.qualified_name(d.id);
                qualified == target || qualified.ends_with(&suffix)
            })
            .map(|d| d.id)
            .collect();
        if namespaces.is_empty() {
            continue;
        }
        let all_gone = namespaces
            .iter()
            .all(|n| ctx.unit.decl(*n).is_main_file() && ctx.removed.contains(*n));
        if all_gone {
            doomed.push(directive.id);
        }
    }
    for id in doomed {
        delete_decl(ctx, id)?;
    }
    Ok(())
}
