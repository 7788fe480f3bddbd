//! Per-kind redundancy rules for occurrences of used declarations.
//!
//! A used entity may still have occurrences that add nothing: forward
//! declarations made obsolete by the definition, repeated aliases. Every rule
//! answers "keep" when in doubt.

use crate::context::PipelineContext;
use crate::frontend::{Decl, DeclId, DeclKind, TranslationUnit};
use crate::index::SemanticId;
use crate::source::SourceRange;

/// Whether the occurrence `id` of a used entity can go.
pub fn is_redundant(ctx: &PipelineContext, id: DeclId) -> bool {
    let unit = &ctx.unit;
    let decl = unit.decl(id);
    if decl.has_attributes || decl.has_default_args || in_class(unit, decl) {
        return false;
    }
    match decl.kind {
        DeclKind::Record | DeclKind::Enum => {
            !decl.is_definition && superseded(ctx, decl, |_| true)
        }
        DeclKind::Function => {
            !decl.is_definition && superseded(ctx, decl, |def| specifiers_repeated(decl, def, false))
        }
        DeclKind::Variable => {
            decl.has_specifier("extern")
                && !decl.has_initializer
                && superseded(ctx, decl, |def| specifiers_repeated(decl, def, true))
        }
        DeclKind::Typedef | DeclKind::TypeAlias => repeats_earlier_alias(ctx, decl),
        _ => false,
    }
}

fn in_class(unit: &TranslationUnit, decl: &Decl) -> bool {
    decl.parent.is_some_and(|p| unit.decl(p).kind == DeclKind::Record)
}

/// A definition of the same entity in this file makes `decl` obsolete: it
/// has the same linkage block, `accept` agrees, and nothing alive uses the
/// entity between the two.
fn superseded<F>(ctx: &PipelineContext, decl: &Decl, accept: F) -> bool
where
    F: Fn(&Decl) -> bool,
{
    let unit = &ctx.unit;
    let Some(semantic) = ctx.index.semantic_of(decl.id) else {
        return false;
    };
    ctx.index
        .occurrences(semantic)
        .iter()
        .map(|o| unit.decl(*o))
        .filter(|def| def.id != decl.id && def.is_definition && def.is_main_file())
        .filter(|def| linkage_block(unit, def) == linkage_block(unit, decl))
        .filter(|def| accept(def))
        .any(|def| !live_reference_between(ctx, semantic, decl.range, def.range))
}

/// Specifiers on the declaration all appear on the definition. `extern` is
/// what separates a variable declaration from its definition, so variables
/// skip it.
fn specifiers_repeated(decl: &Decl, def: &Decl, skip_extern: bool) -> bool {
    decl.specifiers
        .iter()
        .filter(|s| !(skip_extern && s.as_str() == "extern"))
        .all(|s| def.has_specifier(s))
}

fn linkage_block(unit: &TranslationUnit, decl: &Decl) -> Option<DeclId> {
    let mut scope = decl.parent;
    while let Some(s) = scope {
        if unit.decl(s).kind == DeclKind::LinkageSpec {
            return Some(s);
        }
        scope = unit.decl(s).parent;
    }
    None
}

/// A surviving declaration uses `semantic` in the text between the forward
/// declaration and the definition. A definition placed first leaves no gap.
fn live_reference_between(
    ctx: &PipelineContext,
    semantic: SemanticId,
    forward: SourceRange,
    definition: SourceRange,
) -> bool {
    if definition.end <= forward.start {
        return false;
    }
    if definition.start < forward.end {
        // Overlapping occurrences: nothing sensible to compare.
        return true;
    }
    let gap = SourceRange::new(forward.end, definition.start);
    ctx.unit
        .decls()
        .filter(|d| d.is_main_file() && ctx.is_used(d.id))
        .flat_map(|d| &d.references)
        .filter(|r| gap.contains(&r.range))
        .any(|r| {
            r.targets
                .iter()
                .any(|t| ctx.index.semantic_of(*t) == Some(semantic))
        })
}

/// A later alias of a name already aliased identically.
fn repeats_earlier_alias(ctx: &PipelineContext, decl: &Decl) -> bool {
    let unit = &ctx.unit;
    let first = ctx.index.canonical(decl.id);
    if first == decl.id {
        return false;
    }
    let first = unit.decl(first);
    first.is_main_file()
        && first.range.end <= decl.range.start
        && normalized(unit.file().slice(first.range)) == normalized(unit.file().slice(decl.range))
}

fn normalized(text: &str) -> String {
    text.split_whitespace().collect()
}
