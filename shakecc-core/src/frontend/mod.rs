//! Front-end boundary.
//!
//! The optimizer consumes a semantically analyzed declaration tree, a
//! diagnostics stream, a hook to force deferred bodies and a stream of
//! preprocessor events. Anything able to produce those can drive the
//! pipeline; [`lite::LiteFrontEnd`] is the implementation shipped here.

pub mod ast;
pub mod diagnostics;
pub mod flags;
pub mod lite;

pub use ast::{
    Decl, DeclId, DeclKind, DeclOrigin, DeclVisitor, RefKind, Reference, TemplateKind,
    TranslationUnit, TraversalOptions, VisitFlow,
};
pub use diagnostics::{Diagnostic, DiagnosticsEngine, Severity};
pub use flags::FrontEndFlags;

use crate::error::ShakeResult;
use crate::source::{SourceFile, SourceRange};

/// Produces a [`TranslationUnit`] from one source file.
pub trait FrontEnd {
    /// Parse and analyze `file`, reporting every preprocessor event to
    /// `callbacks` in source order.
    ///
    /// Compilation errors are reported through the unit's diagnostics, not
    /// as `Err`; `Err` is reserved for failures of the front end itself.
    fn parse(
        &mut self,
        file: SourceFile,
        callbacks: &mut dyn PreprocessorCallbacks,
    ) -> ShakeResult<TranslationUnit>;

    /// Parse the skipped body of a deferred declaration, completing its
    /// references and extending its range over the body.
    fn force_parse(&mut self, unit: &mut TranslationUnit, decl: DeclId) -> ShakeResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalKind {
    If,
    Ifdef,
    Ifndef,
    Elif,
    Else,
    Endif,
}

impl ConditionalKind {
    /// Directives that open a new conditional chain.
    pub fn opens_chain(&self) -> bool {
        matches!(self, Self::If | Self::Ifdef | Self::Ifndef)
    }
}

/// One conditional directive evaluated in an active region.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalEvent<'a> {
    pub kind: ConditionalKind,
    /// Whole directive line(s), trailing newline included.
    pub directive: SourceRange,
    /// Whether the branch this directive opens is compiled. Always false for
    /// `#endif`.
    pub taken: bool,
    /// Identifiers spelled in the condition.
    pub macros: &'a [String],
}

/// Preprocessor event stream. Every hook has an empty default so consumers
/// only implement what they need.
pub trait PreprocessorCallbacks {
    /// `#define`; `directive` spans the whole definition.
    fn macro_defined(&mut self, _name: &str, _directive: SourceRange) {}

    /// `#undef`
    fn macro_undefined(&mut self, _name: &str, _directive: SourceRange) {}

    /// Expansion of a macro or a test of it (`#ifdef`, `defined`, `#if`).
    /// Macros expanded from another macro's body are reported at the
    /// outermost use site.
    fn macro_used(&mut self, _name: &str, _range: SourceRange) {}

    fn conditional(&mut self, _event: ConditionalEvent<'_>) {}

    /// `#include` and friends; headers are not followed.
    fn inclusion(&mut self, _spelled: &str, _directive: SourceRange) {}
}

/// Callbacks that ignore everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl PreprocessorCallbacks for NoopCallbacks {}
