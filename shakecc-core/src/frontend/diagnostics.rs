//! Diagnostics stream of a front end.

use std::fmt;

use serde::Serialize;

use crate::source::SourceFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note => write!(f, "note"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Byte offset in the main file, if the diagnostic has a location.
    pub offset: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    /// `file:line:col: severity: message`
    pub fn format(&self, file: &SourceFile) -> String {
        match self.offset {
            Some(offset) => format!("{}: {}: {}", file.describe(offset), self.severity, self.message),
            None => format!("{}: {}: {}", file.path().display(), self.severity, self.message),
        }
    }
}

/// Collects diagnostics. Reporting can be muted while deferred bodies are
/// force-parsed; muted diagnostics are counted but not kept.
#[derive(Debug, Default)]
pub struct DiagnosticsEngine {
    diagnostics: Vec<Diagnostic>,
    suppress_all: bool,
    suppressed: usize,
}

impl DiagnosticsEngine {
    pub fn report(&mut self, severity: Severity, offset: Option<usize>, message: impl Into<String>) {
        if self.suppress_all {
            self.suppressed += 1;
            return;
        }
        self.diagnostics.push(Diagnostic {
            severity,
            offset,
            message: message.into(),
        });
    }

    pub fn error(&mut self, offset: usize, message: impl Into<String>) {
        self.report(Severity::Error, Some(offset), message);
    }

    pub fn warning(&mut self, offset: usize, message: impl Into<String>) {
        self.report(Severity::Warning, Some(offset), message);
    }

    /// Mute or unmute reporting; returns the previous setting so callers can
    /// restore it.
    pub fn set_suppress_all(&mut self, suppress: bool) -> bool {
        std::mem::replace(&mut self.suppress_all, suppress)
    }

    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Every diagnostic formatted with its location, in report order.
    pub fn format_all(&self, file: &SourceFile) -> Vec<String> {
        self.diagnostics.iter().map(|d| d.format(file)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detection_and_format() {
        let file = SourceFile::new("main.cpp", "int a;\nint b\n");
        let mut diags = DiagnosticsEngine::default();
        diags.warning(0, "unused");
        assert!(!diags.has_errors());
        diags.error(12, "expected ';'");
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);

        let formatted = diags.format_all(&file);
        assert_eq!(formatted[0], "main.cpp:1:1: warning: unused");
        assert_eq!(formatted[1], "main.cpp:2:6: error: expected ';'");
    }

    #[test]
    fn test_suppression_is_restorable() {
        let mut diags = DiagnosticsEngine::default();
        let previous = diags.set_suppress_all(true);
        assert!(!previous);
        diags.error(0, "hidden");
        assert!(!diags.has_errors());
        assert_eq!(diags.suppressed(), 1);
        diags.set_suppress_all(previous);
        diags.error(0, "visible");
        assert!(diags.has_errors());
    }
}
