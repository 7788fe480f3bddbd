//! Lightweight C++ front end.
//!
//! Reads one file without following `#include`: everything declared in a
//! header is simply unknown, which the optimizer treats as external. Lookup
//! is by spelling, so results over-approximate what a full compiler would
//! resolve. That errs on the side of keeping code.

pub mod expr;
pub mod lexer;
mod parser;
pub mod preprocessor;
mod sema;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use self::parser::{DeferredBody, Parser};
use self::preprocessor::{PpToken, Preprocessor};
use self::sema::NameTable;
use crate::error::{ShakeError, ShakeResult};
use crate::frontend::{DeclId, FrontEnd, FrontEndFlags, PreprocessorCallbacks, TranslationUnit};
use crate::logging::PhaseTimer;
use crate::source::{SourceFile, SourceRange};

/// What `force_parse` needs from the last `parse`.
struct ParsedState {
    tokens: Vec<PpToken>,
    names: NameTable,
    declarators: HashSet<usize>,
    deferred: HashMap<DeclId, DeferredBody>,
}

/// The shipped [`FrontEnd`].
pub struct LiteFrontEnd {
    flags: FrontEndFlags,
    state: Option<ParsedState>,
}

impl LiteFrontEnd {
    pub fn new(flags: FrontEndFlags) -> Self {
        Self { flags, state: None }
    }

    /// Build from compiler-style arguments (`-DNAME`, `-std=c++17`, ...).
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> ShakeResult<Self> {
        Ok(Self::new(FrontEndFlags::parse(args)?))
    }

    pub fn flags(&self) -> &FrontEndFlags {
        &self.flags
    }
}

impl FrontEnd for LiteFrontEnd {
    fn parse(
        &mut self,
        file: SourceFile,
        callbacks: &mut dyn PreprocessorCallbacks,
    ) -> ShakeResult<TranslationUnit> {
        let _timer = PhaseTimer::start("parse");
        let mut unit = TranslationUnit::new(file);

        let lexed = lexer::tokenize(unit.file().text());
        let pre = Preprocessor::new(&self.flags, callbacks, &mut unit.diagnostics).run(lexed);
        for range in &pre.directives {
            unit.add_directive(*range);
        }

        let out = Parser::new(&pre.tokens, &mut unit, self.flags.delayed_template_parsing).run();
        let names = sema::name_table(&unit);
        sema::analyze(&mut unit, &pre.tokens, &out.own_tokens, &out.declarators, &names);

        debug!(
            decls = unit.len(),
            tokens = pre.tokens.len(),
            deferred = out.deferred.len(),
            errors = unit.diagnostics.error_count(),
            "parsed translation unit"
        );
        self.state = Some(ParsedState {
            tokens: pre.tokens,
            names,
            declarators: out.declarators,
            deferred: out.deferred,
        });
        Ok(unit)
    }

    fn force_parse(&mut self, unit: &mut TranslationUnit, decl: DeclId) -> ShakeResult<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| ShakeError::internal("force_parse called before parse"))?;
        let body = state.deferred.remove(&decl).ok_or_else(|| {
            ShakeError::internal(format!("declaration #{} has no deferred body", decl.0))
        })?;
        let (open, close) = match (state.tokens.get(body.open), state.tokens.get(body.close)) {
            (Some(open), Some(close)) => (open.token.range, close.token.range),
            _ => return Err(ShakeError::internal("deferred body outside the token stream")),
        };

        let refs = sema::resolve_spans(
            unit,
            &state.tokens,
            &[(body.open, body.close + 1)],
            &state.declarators,
            &state.names,
        );
        let target = unit.decl_mut(decl);
        target.references.extend(refs);
        target.body = Some(SourceRange::new(open.start, close.end));
        target.range = target.range.cover(&close);
        target.is_definition = true;
        unit.clear_deferred(decl);
        debug!(decl = decl.0, "parsed deferred body");
        Ok(())
    }
}
