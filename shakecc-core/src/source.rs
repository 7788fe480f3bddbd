//! Source buffers, byte ranges and the location service.
//!
//! Every range in shakecc is a half-open byte range `[start, end)` into the
//! main file's text. Human-readable positions are only computed for messages.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Half-open byte range `[start, end)` in the main file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct SourceRange {
    pub start: usize,
    pub end: usize,
}

impl SourceRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "inverted range {}..{}", start, end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `other` lies entirely inside `self` (equal ranges contain each other).
    pub fn contains(&self, other: &SourceRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Ranges share at least one byte.
    pub fn overlaps(&self, other: &SourceRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest range covering both.
    pub fn cover(&self, other: &SourceRange) -> SourceRange {
        SourceRange::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// The main file of one invocation: its path, text and a line table.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = Vec::with_capacity(text.len() / 32 + 1);
        line_starts.push(0);
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            path: path.into(),
            text,
            line_starts,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Text covered by `range`, empty if the range is out of bounds.
    pub fn slice(&self, range: SourceRange) -> &str {
        self.text.get(range.start..range.end).unwrap_or("")
    }

    /// 1-based line and column of a byte offset.
    pub fn location(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let column = offset.saturating_sub(self.line_starts[line]) + 1;
        (line + 1, column)
    }

    /// `path:line:column` for diagnostics and log messages.
    pub fn describe(&self, offset: usize) -> String {
        let (line, column) = self.location(offset);
        format!("{}:{}:{}", self.path.display(), line, column)
    }

    /// Start offset of the line containing `offset`.
    pub fn line_start(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => self.line_starts[i],
            Err(i) => self.line_starts[i.saturating_sub(1)],
        }
    }

    /// Offset just past the newline ending the line that contains `offset`
    /// (or the end of the text on the last line).
    pub fn line_end_inclusive(&self, offset: usize) -> usize {
        match self.text.get(offset..).and_then(|rest| rest.find('\n')) {
            Some(pos) => offset + pos + 1,
            None => self.text.len(),
        }
    }

    /// Grow a declaration range to whole lines when the declaration is the
    /// only thing on them, swallowing a trailing `//` comment. Otherwise the
    /// spaces and tabs after it are taken, or the ones before it when it ends
    /// its line.
    pub fn expand_to_lines(&self, range: SourceRange) -> SourceRange {
        let bytes = self.text.as_bytes();
        let line_start = self.line_start(range.start);
        let leading_blank = bytes[line_start..range.start]
            .iter()
            .all(|b| *b == b' ' || *b == b'\t');

        let mut end = range.end;
        while end < bytes.len() && (bytes[end] == b' ' || bytes[end] == b'\t') {
            end += 1;
        }
        let at_comment = bytes.get(end) == Some(&b'/') && bytes.get(end + 1) == Some(&b'/');
        let at_newline = end >= bytes.len() || bytes[end] == b'\n' || bytes[end] == b'\r';

        if leading_blank && (at_newline || at_comment) {
            return SourceRange::new(line_start, self.line_end_inclusive(end));
        }
        if at_newline {
            let mut start = range.start;
            while start > line_start && matches!(bytes[start - 1], b' ' | b'\t') {
                start -= 1;
            }
            return SourceRange::new(start, end);
        }
        SourceRange::new(range.start, end)
    }
}
