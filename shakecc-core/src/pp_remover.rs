//! Preprocessor region and macro remover.
//!
//! [`PreprocessorRecorder`] listens to the front end while the file is
//! preprocessed, since branches that were skipped never show up in the
//! declaration tree. Once reachability is known it deletes
//! - the branches not taken at the analyzed configuration, together with
//!   the directive lines of the chain
//! - macro definitions whose every use now lies in deleted text, and the
//!   `#undef` lines that go with them.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::context::PipelineContext;
use crate::error::ShakeResult;
use crate::frontend::{ConditionalEvent, ConditionalKind, PreprocessorCallbacks};
use crate::logging::PhaseTimer;
use crate::source::SourceRange;

#[derive(Debug, Clone, Serialize)]
pub struct MacroRecord {
    pub name: String,
    /// The whole `#define` line(s).
    pub definition: SourceRange,
    pub usages: Vec<SourceRange>,
    pub protected: bool,
    /// An `#undef` ended this definition.
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Branch {
    pub directive: SourceRange,
    pub taken: bool,
}

/// `#if` ... `#endif` with every branch seen at the analyzed configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionalChain {
    pub branches: Vec<Branch>,
    /// The `#endif` line; `None` while the chain is open.
    pub end: Option<SourceRange>,
    /// Macros mentioned by any condition of the chain.
    pub macros: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct PreprocessorRecorder {
    keep_macros: HashSet<String>,
    macros: Vec<MacroRecord>,
    undefs: Vec<(String, SourceRange)>,
    open: Vec<ConditionalChain>,
    chains: Vec<ConditionalChain>,
}

impl PreprocessorRecorder {
    pub fn new<I, S>(keep_macros: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keep_macros: keep_macros.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn macros(&self) -> &[MacroRecord] {
        &self.macros
    }

    /// Completed chains, in the order their `#endif` was seen.
    pub fn chains(&self) -> &[ConditionalChain] {
        &self.chains
    }

    fn current_definition(&mut self, name: &str) -> Option<&mut MacroRecord> {
        self.macros.iter_mut().rev().find(|m| m.name == name)
    }

    /// (a) Delete every branch not taken and the directive lines of the
    /// chain. Chains testing a protected macro stay verbatim, and so do chains
    /// whose edits would cut through an edit already registered.
    pub fn remove_inactive_branches(&self, ctx: &mut PipelineContext) -> ShakeResult<()> {
        let _timer = PhaseTimer::start("inactive-branches");
        for chain in &self.chains {
            let Some(end) = chain.end else {
                continue;
            };
            if chain.macros.iter().any(|m| self.keep_macros.contains(m)) {
                debug!(macros = ?chain.macros, "chain tests a protected macro, kept");
                continue;
            }

            let mut edits = Vec::with_capacity(chain.branches.len() + 1);
            let mut skipped = 0;
            for (k, branch) in chain.branches.iter().enumerate() {
                if branch.taken {
                    edits.push(branch.directive);
                } else {
                    let next = chain.branches.get(k + 1).map_or(end, |b| b.directive);
                    edits.push(SourceRange::new(branch.directive.start, next.start));
                    skipped += 1;
                }
            }
            edits.push(end);

            if edits.iter().any(|e| ctx.rewriter.conflicts(*e)) {
                debug!(start = end.start, "chain overlaps a registered edit, kept");
                continue;
            }
            for edit in edits {
                ctx.rewriter.delete(edit)?;
            }
            ctx.stats.removed_branches += skipped;
        }
        Ok(())
    }

    /// (b) Delete definitions of unprotected macros whose every use lies in
    /// deleted text, then `#undef` lines of names that lost every definition.
    pub fn remove_unused_macros(&self, ctx: &mut PipelineContext) -> ShakeResult<()> {
        let _timer = PhaseTimer::start("unused-macros");
        // name -> (definitions, deleted definitions)
        let mut outcome: HashMap<&str, (usize, usize)> = HashMap::new();
        for record in &self.macros {
            let entry = outcome.entry(record.name.as_str()).or_default();
            entry.0 += 1;
            if record.protected {
                continue;
            }
            if !record.usages.iter().all(|u| ctx.rewriter.is_deleted(*u)) {
                continue;
            }
            if ctx.rewriter.conflicts(record.definition) {
                continue;
            }
            ctx.rewriter.delete(record.definition)?;
            entry.1 += 1;
            ctx.stats.removed_macros += 1;
        }

        for (name, directive) in &self.undefs {
            let Some((defined, deleted)) = outcome.get(name.as_str()) else {
                continue;
            };
            if defined == deleted && !ctx.rewriter.conflicts(*directive) {
                ctx.rewriter.delete(*directive)?;
            }
        }
        debug!(removed = ctx.stats.removed_macros, "macros removed");
        Ok(())
    }
}

impl PreprocessorCallbacks for PreprocessorRecorder {
    fn macro_defined(&mut self, name: &str, directive: SourceRange) {
        self.macros.push(MacroRecord {
            name: name.to_string(),
            definition: directive,
            usages: Vec::new(),
            protected: self.keep_macros.contains(name),
            closed: false,
        });
    }

    fn macro_undefined(&mut self, name: &str, directive: SourceRange) {
        if let Some(record) = self.current_definition(name) {
            record.closed = true;
        }
        self.undefs.push((name.to_string(), directive));
    }

    fn macro_used(&mut self, name: &str, range: SourceRange) {
        if let Some(record) = self.current_definition(name) {
            record.usages.push(range);
        }
    }

    fn conditional(&mut self, event: ConditionalEvent<'_>) {
        let branch = Branch {
            directive: event.directive,
            taken: event.taken,
        };
        match event.kind {
            kind if kind.opens_chain() => self.open.push(ConditionalChain {
                branches: vec![branch],
                end: None,
                macros: event.macros.iter().cloned().collect(),
            }),
            ConditionalKind::Elif | ConditionalKind::Else => {
                if let Some(chain) = self.open.last_mut() {
                    chain.branches.push(branch);
                    chain.macros.extend(event.macros.iter().cloned());
                }
            }
            ConditionalKind::Endif => {
                if let Some(mut chain) = self.open.pop() {
                    chain.end = Some(event.directive);
                    self.chains.push(chain);
                }
            }
            _ => {}
        }
    }

    /// A header may read any macro defined so far; the `#include` line counts
    /// as a use of each of them.
    fn inclusion(&mut self, _spelled: &str, directive: SourceRange) {
        for record in self.macros.iter_mut().filter(|m| !m.closed) {
            record.usages.push(directive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lite::LiteFrontEnd;
    use crate::frontend::{FrontEnd, TranslationUnit};
    use crate::source::SourceFile;

    fn record(text: &str, keep: &[&str]) -> (PreprocessorRecorder, PipelineContext) {
        let mut recorder = PreprocessorRecorder::new(keep.iter().copied());
        let mut fe = LiteFrontEnd::from_args::<&str>(&[]).unwrap();
        let unit: TranslationUnit = fe.parse(SourceFile::new("t.cpp", text), &mut recorder).unwrap();
        (recorder, PipelineContext::new(unit))
    }

    #[test]
    fn test_records_chains_and_macros() {
        let text = "#define A 1\n#if A\nint x;\n#elif B\nint y;\n#else\nint z;\n#endif\nint w = A;\n";
        let (recorder, _) = record(text, &[]);
        assert_eq!(recorder.chains().len(), 1);
        let chain = &recorder.chains()[0];
        let taken: Vec<bool> = chain.branches.iter().map(|b| b.taken).collect();
        assert_eq!(taken, vec![true, false, false]);
        assert!(chain.macros.contains("A"));
        assert_eq!(recorder.macros().len(), 1);
        // one use in `#if A`, one in the initializer
        assert_eq!(recorder.macros()[0].usages.len(), 2);
    }

    #[test]
    fn test_inactive_branches_removed() {
        let text = "#if 0\nint dead;\n#else\nint alive;\n#endif\n";
        let (recorder, mut ctx) = record(text, &[]);
        recorder.remove_inactive_branches(&mut ctx).unwrap();
        assert_eq!(ctx.rewriter.apply(text).unwrap(), "int alive;\n");
        assert_eq!(ctx.stats.removed_branches, 1);
    }

    #[test]
    fn test_protected_macro_keeps_chain() {
        let text = "#ifdef LOCAL\nint debug;\n#endif\nint x;\n";
        let (recorder, mut ctx) = record(text, &["LOCAL"]);
        recorder.remove_inactive_branches(&mut ctx).unwrap();
        assert!(ctx.rewriter.is_empty());
    }

    #[test]
    fn test_macro_removed_once_uses_are_deleted() {
        let text = "#define TWICE(x) ((x) * 2)\n#define KEEP 1\nint f() { return TWICE(3); }\nint g() { return KEEP; }\n#undef TWICE\n";
        let (recorder, mut ctx) = record(text, &["KEEP"]);
        let f_start = text.find("int f").unwrap();
        let f_end = text[f_start..].find('\n').unwrap() + f_start + 1;
        let g_start = text.find("int g").unwrap();
        let g_end = text[g_start..].find('\n').unwrap() + g_start + 1;
        ctx.rewriter.delete(SourceRange::new(f_start, f_end)).unwrap();
        ctx.rewriter.delete(SourceRange::new(g_start, g_end)).unwrap();
        recorder.remove_unused_macros(&mut ctx).unwrap();
        assert_eq!(ctx.rewriter.apply(text).unwrap(), "#define KEEP 1\n");
        assert_eq!(ctx.stats.removed_macros, 1);
    }

    #[test]
    fn test_macro_before_include_is_kept() {
        let text = "#define _GLIBCXX_DEBUG\n#include <vector>\nint main() {}\n";
        let (recorder, mut ctx) = record(text, &[]);
        recorder.remove_unused_macros(&mut ctx).unwrap();
        assert!(ctx.rewriter.is_empty());
    }
}
