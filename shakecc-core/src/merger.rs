//! Namespace merger.
//!
//! After removal a file often reads `namespace a { ... } namespace a { ... }`
//! with nothing left in between. This pass drops namespaces whose body is
//! blank once the registered edits apply, then fuses consecutive reopenings
//! of the same namespace by deleting the `}` ... `namespace a {` seam. The
//! children of a fused run are merged again, so nested reopenings fuse too.

use tracing::debug;

use crate::context::PipelineContext;
use crate::error::ShakeResult;
use crate::frontend::{DeclId, DeclKind};
use crate::logging::PhaseTimer;
use crate::remover::{delete_decl, remove_orphaned_using_directives};
use crate::rewriter::{is_blank_code, Registered};
use crate::source::SourceRange;

pub fn merge_namespaces(ctx: &mut PipelineContext) -> ShakeResult<()> {
    let _timer = PhaseTimer::start("merge");

    let tops = ctx.unit.top_level().to_vec();
    for id in &tops {
        drop_blank_namespaces(ctx, *id)?;
    }
    remove_orphaned_using_directives(ctx)?;
    merge_siblings(ctx, &tops)?;

    debug!(merged = ctx.stats.merged_scopes, "namespaces merged");
    Ok(())
}

/// Post-order, so a namespace holding only blank namespaces goes too.
fn drop_blank_namespaces(ctx: &mut PipelineContext, id: DeclId) -> ShakeResult<()> {
    let decl = ctx.unit.decl(id);
    if ctx.removed.contains(id) || !decl.is_main_file() {
        return Ok(());
    }
    if !matches!(decl.kind, DeclKind::Namespace | DeclKind::LinkageSpec) {
        return Ok(());
    }
    let children = decl.children.clone();
    for child in children {
        drop_blank_namespaces(ctx, child)?;
    }

    let decl = ctx.unit.decl(id);
    let Some(body) = decl.body else {
        return Ok(());
    };
    if decl.kind != DeclKind::Namespace || body.len() < 2 {
        return Ok(());
    }
    let inner = SourceRange::new(body.start + 1, body.end - 1);
    let range = ctx.unit.file().expand_to_lines(decl.range);
    if ctx.rewriter.is_blank_after_edits(ctx.unit.file(), inner) && !ctx.rewriter.conflicts(range) {
        delete_decl(ctx, id)?;
    }
    Ok(())
}

fn merge_siblings(ctx: &mut PipelineContext, siblings: &[DeclId]) -> ShakeResult<()> {
    let live: Vec<DeclId> = siblings
        .iter()
        .copied()
        .filter(|id| {
            let decl = ctx.unit.decl(*id);
            !ctx.removed.contains(*id) && !decl.implicit && decl.instantiation_of.is_none()
        })
        .collect();

    let mut i = 0;
    while i < live.len() {
        let first = live[i];
        let kind = ctx.unit.decl(first).kind;
        let mut run = vec![first];
        let mut j = i + 1;
        if kind == DeclKind::Namespace {
            while j < live.len() {
                let Some(seam) = seam_between(ctx, run[run.len() - 1], live[j]) else {
                    break;
                };
                if ctx.rewriter.delete(seam)? == Registered::Added {
                    ctx.stats.merged_scopes += 1;
                }
                run.push(live[j]);
                j += 1;
            }
        }
        if matches!(kind, DeclKind::Namespace | DeclKind::LinkageSpec) {
            let children: Vec<DeclId> = run
                .iter()
                .flat_map(|id| ctx.unit.decl(*id).children.iter().copied())
                .collect();
            merge_siblings(ctx, &children)?;
        }
        i = j;
    }
    Ok(())
}

/// Text to delete to fuse namespace `a` with the following `b`, from the
/// line holding the `}` of `a` through the line holding the `{` of `b`.
fn seam_between(ctx: &PipelineContext, a: DeclId, b: DeclId) -> Option<SourceRange> {
    let unit = &ctx.unit;
    let (da, db) = (unit.decl(a), unit.decl(b));
    if db.kind != DeclKind::Namespace
        || da.name != db.name
        || da.has_specifier("inline") != db.has_specifier("inline")
        || !da.is_main_file()
        || !db.is_main_file()
        || da.has_attributes
        || db.has_attributes
        || spelled_with_others(ctx, a)
        || spelled_with_others(ctx, b)
    {
        return None;
    }
    let (body_a, body_b) = (da.body?, db.body?);
    if da.range.end > db.range.start {
        return None;
    }
    let gap = SourceRange::new(da.range.end, db.range.start);
    if !ctx.rewriter.is_blank_after_edits(unit.file(), gap) {
        return None;
    }

    let file = unit.file();
    let text = file.text();
    let close = body_a.end - 1;
    let close_line = file.line_start(close);
    let start = if is_blank_code(text.get(close_line..close)?) {
        close_line
    } else {
        close
    };
    let open_end = body_b.start + 1;
    let line_end = file.line_end_inclusive(open_end);
    let end = if is_blank_code(text.get(open_end..line_end)?) {
        line_end
    } else {
        open_end
    };
    let seam = SourceRange::new(start, end);
    if ctx.rewriter.conflicts(seam) {
        return None;
    }
    Some(seam)
}

/// `namespace a::b { }` yields two declarations over the same text; neither
/// can be fused on its own.
fn spelled_with_others(ctx: &PipelineContext, id: DeclId) -> bool {
    let unit = &ctx.unit;
    let decl = unit.decl(id);
    let shares = |other: DeclId| {
        let other = unit.decl(other);
        other.kind == DeclKind::Namespace && other.range == decl.range
    };
    decl.parent.is_some_and(shares) || decl.children.iter().any(|c| shares(*c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lite::LiteFrontEnd;
    use crate::frontend::{FrontEnd, NoopCallbacks};
    use crate::source::SourceFile;

    fn context(text: &str) -> PipelineContext {
        let mut fe = LiteFrontEnd::from_args::<&str>(&[]).unwrap();
        let unit = fe
            .parse(SourceFile::new("t.cpp", text), &mut NoopCallbacks)
            .unwrap();
        PipelineContext::new(unit)
    }

    fn delete_text(ctx: &mut PipelineContext, text: &str, needle: &str) {
        let start = text.find(needle).unwrap();
        ctx.rewriter
            .delete(SourceRange::new(start, start + needle.len()))
            .unwrap();
    }

    #[test]
    fn test_consecutive_reopenings_fuse() {
        let text = "namespace a {\nint x;\n}\nnamespace a {\nint y;\n}\n";
        let mut ctx = context(text);
        merge_namespaces(&mut ctx).unwrap();
        assert_eq!(ctx.rewriter.apply(text).unwrap(), "namespace a {\nint x;\nint y;\n}\n");
        assert_eq!(ctx.stats.merged_scopes, 1);
    }

    #[test]
    fn test_separated_reopenings_stay_apart() {
        let text = "namespace a {\nint x;\n}\nint between;\nnamespace a {\nint y;\n}\n";
        let mut ctx = context(text);
        merge_namespaces(&mut ctx).unwrap();
        assert!(ctx.rewriter.is_empty());
    }

    #[test]
    fn test_inline_mismatch_stays_apart() {
        let text = "namespace a {\nint x;\n}\ninline namespace a {\nint y;\n}\n";
        let mut ctx = context(text);
        merge_namespaces(&mut ctx).unwrap();
        assert!(ctx.rewriter.is_empty());
    }

    #[test]
    fn test_blank_namespace_dropped() {
        let text = "namespace a {\nint x;\n}\nnamespace b {\n// only a note\n}\nint main() {}\n";
        let mut ctx = context(text);
        delete_text(&mut ctx, text, "int x;\n");
        merge_namespaces(&mut ctx).unwrap();
        assert_eq!(ctx.rewriter.apply(text).unwrap(), "int main() {}\n");
    }

    #[test]
    fn test_nested_reopenings_fuse_recursively() {
        let text = "namespace a {\nnamespace b {\nint x;\n}\n}\nnamespace a {\nnamespace b {\nint y;\n}\n}\n";
        let mut ctx = context(text);
        merge_namespaces(&mut ctx).unwrap();
        assert_eq!(
            ctx.rewriter.apply(text).unwrap(),
            "namespace a {\nnamespace b {\nint x;\nint y;\n}\n}\n"
        );
        assert_eq!(ctx.stats.merged_scopes, 2);
    }

    #[test]
    fn test_seam_after_removed_code() {
        let text = "namespace a {\nint x;\n}\nint dead;\nnamespace a {\nint y;\n}\n";
        let mut ctx = context(text);
        delete_text(&mut ctx, text, "int dead;\n");
        merge_namespaces(&mut ctx).unwrap();
        assert_eq!(ctx.rewriter.apply(text).unwrap(), "namespace a {\nint x;\nint y;\n}\n");
    }
}
