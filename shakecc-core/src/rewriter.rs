//! Text rewrite engine.
//!
//! Every pass registers edits here instead of touching the text. The edit set
//! stays conflict-free at all times:
//! - an edit nested inside a registered one is a no-op
//! - an edit containing registered ones replaces them
//! - a partial overlap is an internal error
//!
//! The set is applied once, in a single ascending pass, at the very end.

use std::collections::BTreeMap;

use crate::error::{ShakeError, ShakeResult};
use crate::source::{SourceFile, SourceRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    Delete,
    Replace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: SourceRange,
    pub action: EditAction,
}

/// Outcome of registering an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    /// Added to the set.
    Added,
    /// Already covered by a registered edit.
    Nested,
}

#[derive(Debug, Default)]
pub struct Rewriter {
    /// Keyed by `(start, end)`; non-empty ranges never overlap. An insertion
    /// sorts before a deletion starting at the same offset.
    edits: BTreeMap<(usize, usize), Edit>,
}

impl Rewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Registered edits in ascending order.
    pub fn edits(&self) -> impl Iterator<Item = &Edit> {
        self.edits.values()
    }

    pub fn delete(&mut self, range: SourceRange) -> ShakeResult<Registered> {
        self.register(Edit {
            range,
            action: EditAction::Delete,
        })
    }

    pub fn replace(&mut self, range: SourceRange, text: impl Into<String>) -> ShakeResult<Registered> {
        self.register(Edit {
            range,
            action: EditAction::Replace(text.into()),
        })
    }

    fn register(&mut self, edit: Edit) -> ShakeResult<Registered> {
        let range = edit.range;
        if range.is_empty() {
            return Ok(match edit.action {
                EditAction::Delete => Registered::Nested,
                EditAction::Replace(text) => self.insert(range.start, text),
            });
        }

        if let Some(prev) = self.covering(..=(range.start, usize::MAX)) {
            if prev.contains(&range) {
                return Ok(Registered::Nested);
            }
            if prev.overlaps(&range) && !range.contains(&prev) {
                return Err(conflict(&prev, &range));
            }
        }

        // insertions on either boundary stay
        let inside: Vec<(usize, usize)> = self
            .edits
            .range((range.start, 0)..(range.end, 0))
            .filter(|(_, e)| !(e.range.is_empty() && e.range.start == range.start))
            .map(|(key, _)| *key)
            .collect();
        for key in &inside {
            let existing = &self.edits[key].range;
            if !range.contains(existing) {
                return Err(conflict(existing, &range));
            }
        }
        for key in inside {
            self.edits.remove(&key);
        }
        self.edits.insert((range.start, range.end), edit);
        Ok(Registered::Added)
    }

    /// Insertion of `text` at `at`. Dropped when a registered edit strictly
    /// encloses `at`; insertions at one offset apply in registration order.
    fn insert(&mut self, at: usize, text: String) -> Registered {
        if self.covering(..(at, at)).is_some_and(|r| r.start < at && at < r.end) {
            return Registered::Nested;
        }
        match self.edits.get_mut(&(at, at)) {
            Some(Edit {
                action: EditAction::Replace(existing),
                ..
            }) => existing.push_str(&text),
            _ => {
                self.edits.insert(
                    (at, at),
                    Edit {
                        range: SourceRange::new(at, at),
                        action: EditAction::Replace(text),
                    },
                );
            }
        }
        Registered::Added
    }

    /// Non-empty edit with the greatest key in `keys`.
    fn covering<R>(&self, keys: R) -> Option<SourceRange>
    where
        R: std::ops::RangeBounds<(usize, usize)>,
    {
        self.edits
            .range(keys)
            .rev()
            .map(|(_, e)| e.range)
            .find(|r| !r.is_empty())
    }

    /// Whether registering an edit over `range` would be a partial overlap.
    pub fn conflicts(&self, range: SourceRange) -> bool {
        self.edits.values().any(|e| {
            e.range.overlaps(&range) && !e.range.contains(&range) && !range.contains(&e.range)
        })
    }

    /// Whether every byte of `range` is deleted. An empty range counts as
    /// deleted when a deletion covers its position.
    pub fn is_deleted(&self, range: SourceRange) -> bool {
        if range.is_empty() {
            return self.deletions().any(|r| r.contains_offset(range.start));
        }
        let mut pos = range.start;
        for r in self.deletions() {
            if r.end <= pos {
                continue;
            }
            if r.start > pos {
                break;
            }
            pos = r.end;
            if pos >= range.end {
                return true;
            }
        }
        false
    }

    fn deletions(&self) -> impl Iterator<Item = SourceRange> + '_ {
        self.edits
            .values()
            .filter(|e| e.action == EditAction::Delete)
            .map(|e| e.range)
    }

    /// Text of `range` as it will read once the edits are applied.
    pub fn surviving(&self, file: &SourceFile, range: SourceRange) -> String {
        let text = file.text();
        let mut out = String::new();
        let mut pos = range.start;
        for edit in self.edits.values() {
            if edit.range.end < pos || (edit.range.end == pos && !edit.range.is_empty()) {
                continue;
            }
            if edit.range.start >= range.end {
                break;
            }
            if edit.range.start > pos {
                out.push_str(text.get(pos..edit.range.start).unwrap_or(""));
            }
            if let EditAction::Replace(replacement) = &edit.action {
                if range.contains(&edit.range) {
                    out.push_str(replacement);
                }
            }
            pos = pos.max(edit.range.end);
        }
        if pos < range.end {
            out.push_str(text.get(pos..range.end).unwrap_or(""));
        }
        out
    }

    /// Whether `range` holds only whitespace and comments once the edits are
    /// applied.
    pub fn is_blank_after_edits(&self, file: &SourceFile, range: SourceRange) -> bool {
        is_blank_code(&self.surviving(file, range))
    }

    /// Produce the rewritten buffer. With no edits the output is the input,
    /// byte for byte.
    pub fn apply(&self, text: &str) -> ShakeResult<String> {
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;
        for edit in self.edits.values() {
            let kept = text.get(pos..edit.range.start).ok_or_else(|| {
                ShakeError::internal(format!("edit {} lies outside the buffer", edit.range))
            })?;
            out.push_str(kept);
            if let EditAction::Replace(replacement) = &edit.action {
                out.push_str(replacement);
            }
            pos = edit.range.end;
        }
        let rest = text
            .get(pos..)
            .ok_or_else(|| ShakeError::internal(format!("edit ends past the buffer at {pos}")))?;
        out.push_str(rest);
        Ok(out)
    }
}

fn conflict(existing: &SourceRange, new: &SourceRange) -> ShakeError {
    ShakeError::internal(format!(
        "edit {new} partially overlaps registered edit {existing}"
    ))
}

/// Only whitespace, `//` and `/* */` comments.
pub fn is_blank_code(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' | b'\x0b' => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => match text[i + 2..].find("*/") {
                Some(end) => i += end + 4,
                None => return false,
            },
            _ => return false,
        }
    }
    true
}
