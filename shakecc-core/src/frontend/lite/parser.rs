//! Declaration-level parser.
//!
//! Only declarations are structured. Statement and expression tokens are
//! attributed to the innermost enclosing declaration as "own tokens", which
//! semantic analysis later turns into references.
//!
//! Scopes are delimited by bracket matching before they are parsed, so a
//! malformed declaration can never run past the end of its scope.

use std::collections::{HashMap, HashSet};

use super::lexer::TokenKind;
use super::preprocessor::PpToken;
use crate::frontend::ast::{Decl, DeclId, DeclKind, TemplateKind, TranslationUnit};
use crate::source::SourceRange;

/// Half-open token index span.
pub type Span = (usize, usize);

/// Function body skipped by delayed template parsing.
#[derive(Debug, Clone, Copy)]
pub struct DeferredBody {
    /// Token index of `{`
    pub open: usize,
    /// Token index of `}`
    pub close: usize,
}

#[derive(Debug, Default)]
pub struct ParseOutput {
    pub own_tokens: HashMap<DeclId, Vec<Span>>,
    /// Token indices of declared names; these are not references.
    pub declarators: HashSet<usize>,
    pub deferred: HashMap<DeclId, DeferredBody>,
}

pub const KEYWORDS: &[&str] = &[
    "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor", "bool", "break",
    "case", "catch", "char", "char8_t", "char16_t", "char32_t", "class", "compl", "concept",
    "const", "consteval", "constexpr", "constinit", "const_cast", "continue", "co_await",
    "co_return", "co_yield", "decltype", "default", "delete", "do", "double", "dynamic_cast",
    "else", "enum", "explicit", "export", "extern", "false", "float", "for", "friend", "goto",
    "if", "inline", "int", "long", "mutable", "namespace", "new", "noexcept", "not", "not_eq",
    "nullptr", "operator", "or", "or_eq", "private", "protected", "public", "register",
    "reinterpret_cast", "requires", "return", "short", "signed", "sizeof", "static",
    "static_assert", "static_cast", "struct", "switch", "template", "this", "thread_local",
    "throw", "true", "try", "typedef", "typeid", "typename", "union", "unsigned", "using",
    "virtual", "void", "volatile", "wchar_t", "while", "xor", "xor_eq", "__attribute__",
    "__declspec", "__int128", "__restrict", "__restrict__", "_Static_assert", "__extension__",
];

const SPECIFIERS: &[&str] = &[
    "static", "inline", "extern", "constexpr", "consteval", "constinit", "virtual", "explicit",
    "thread_local", "mutable", "register", "friend",
];

const TYPE_WORDS: &[&str] = &[
    "void", "bool", "char", "char8_t", "char16_t", "char32_t", "wchar_t", "short", "int", "long",
    "float", "double", "signed", "unsigned", "auto", "const", "volatile", "struct", "class",
    "enum", "union", "typename", "decltype", "__int128",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// What precedes the declaration proper: attributes and template headers.
#[derive(Debug, Clone, Copy, Default)]
struct Prefix {
    /// Token index where the declaration starts
    start: usize,
    template: TemplateKind,
    has_attributes: bool,
    has_default_args: bool,
    /// Inside `extern "C"` without braces
    extern_c: bool,
}

pub struct Parser<'a> {
    toks: &'a [PpToken],
    pos: usize,
    unit: &'a mut TranslationUnit,
    delayed_templates: bool,
    out: ParseOutput,
}

impl<'a> Parser<'a> {
    pub fn new(toks: &'a [PpToken], unit: &'a mut TranslationUnit, delayed_templates: bool) -> Self {
        Self {
            toks,
            pos: 0,
            unit,
            delayed_templates,
            out: ParseOutput::default(),
        }
    }

    pub fn run(mut self) -> ParseOutput {
        let end = self.toks.len();
        self.parse_seq(None, false, end);
        self.out
    }

    // ---- token helpers -------------------------------------------------

    fn text(&self, i: usize) -> &str {
        self.toks.get(i).map_or("", |t| t.token.text.as_str())
    }

    fn is(&self, i: usize, text: &str) -> bool {
        self.text(i) == text
    }

    /// Identifier that is not a keyword.
    fn is_name(&self, i: usize) -> bool {
        self.toks
            .get(i)
            .is_some_and(|t| t.token.kind == TokenKind::Ident && !is_keyword(&t.token.text))
    }

    fn is_literal(&self, i: usize) -> bool {
        self.toks.get(i).is_some_and(|t| t.token.is_literal())
    }

    fn span_range(&self, first: usize, last: usize) -> SourceRange {
        SourceRange::new(self.toks[first].token.range.start, self.toks[last].token.range.end)
    }

    fn error_at(&mut self, i: usize, message: impl Into<String>) {
        let offset = match self.toks.get(i) {
            Some(t) => t.token.range.start,
            None => self.toks.last().map_or(0, |t| t.token.range.end),
        };
        self.unit.diagnostics.error(offset, message);
    }

    /// Token texts joined, with a space only between two words.
    fn joined(&self, from: usize, to: usize) -> String {
        let mut out = String::new();
        let mut prev_word = false;
        for i in from..to {
            let Some(tok) = self.toks.get(i) else { break };
            let word = matches!(tok.token.kind, TokenKind::Ident | TokenKind::Number);
            if word && prev_word {
                out.push(' ');
            }
            out.push_str(&tok.token.text);
            prev_word = word;
        }
        out
    }

    /// Index of the bracket closing the one at `open`, reporting mismatches.
    fn matching(&mut self, open: usize, limit: usize) -> Option<usize> {
        let mut stack: Vec<&'static str> = Vec::new();
        for i in open..limit {
            match self.text(i) {
                "(" => stack.push(")"),
                "[" => stack.push("]"),
                "{" => stack.push("}"),
                closer @ (")" | "]" | "}") => {
                    let expected = stack.pop();
                    if expected != Some(closer) {
                        let expected = expected.unwrap_or(")");
                        self.error_at(i, format!("expected '{expected}'"));
                        return None;
                    }
                    if stack.is_empty() {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        let opener = self.text(open).to_string();
        self.error_at(open, format!("unbalanced '{opener}'"));
        None
    }

    /// Like [`Self::matching`] but silent, for regions already known to be
    /// balanced. Returns the last index before `limit` when unbalanced.
    fn skip_group(&self, open: usize, limit: usize) -> usize {
        let mut depth = 0usize;
        for i in open..limit {
            match self.text(i) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return i;
                    }
                }
                _ => {}
            }
        }
        limit.saturating_sub(1).max(open)
    }

    /// Closing `>` of a template argument or parameter list, reporting
    /// failure.
    fn matching_angle(&mut self, open: usize, limit: usize) -> Option<usize> {
        match self.scan_angle(open, limit) {
            Some(close) => Some(close),
            None => {
                self.error_at(open, "expected '>'");
                None
            }
        }
    }

    fn scan_angle(&self, open: usize, limit: usize) -> Option<usize> {
        let mut depth = 0i32;
        let mut i = open;
        while i < limit {
            match self.text(i) {
                "<" => depth += 1,
                ">" => depth -= 1,
                ">>" => depth -= 2,
                "(" | "[" | "{" => i = self.skip_group(i, limit),
                ";" | "}" | ")" | "]" => return None,
                _ => {}
            }
            if depth <= 0 {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// Opening `<` for the `>` at `close`, scanning backwards.
    fn angle_open_before(&self, close: usize, floor: usize) -> Option<usize> {
        let mut depth = 0i32;
        let mut i = close;
        loop {
            match self.text(i) {
                ">" => depth += 1,
                ">>" => depth += 2,
                "<" => {
                    depth -= 1;
                    if depth <= 0 {
                        return Some(i);
                    }
                }
                ";" | "{" | "}" => return None,
                _ => {}
            }
            if i <= floor {
                return None;
            }
            i -= 1;
        }
    }

    /// First index in `from..limit` holding one of `targets` outside
    /// brackets.
    fn find_top(&mut self, from: usize, limit: usize, targets: &[&str]) -> Option<usize> {
        let mut i = from;
        while i < limit {
            let t = self.text(i);
            if targets.contains(&t) {
                return Some(i);
            }
            if matches!(t, "(" | "[" | "{") {
                i = self.matching(i, limit)?;
            }
            i += 1;
        }
        None
    }

    /// Comma-separated segments of `from..to` at bracket depth zero. Commas
    /// inside template argument lists are skipped until an `=` starts an
    /// initializer.
    fn split_top(&self, from: usize, to: usize) -> Vec<Span> {
        let mut segments = Vec::new();
        if from >= to {
            return segments;
        }
        let mut seg_start = from;
        let mut angle = 0i32;
        let mut in_init = false;
        let mut i = from;
        while i < to {
            match self.text(i) {
                "(" | "[" | "{" => {
                    i = self.skip_group(i, to);
                }
                "=" if angle <= 0 => in_init = true,
                "<" if !in_init && i > from && self.is_name(i - 1) => angle += 1,
                ">" if angle > 0 => angle -= 1,
                ">>" if angle > 0 => angle = (angle - 2).max(0),
                "," if angle <= 0 => {
                    segments.push((seg_start, i));
                    seg_start = i + 1;
                    in_init = false;
                    angle = 0;
                }
                _ => {}
            }
            i += 1;
        }
        segments.push((seg_start, to));
        segments
    }

    fn add(&mut self, mut decl: Decl, parent: Option<DeclId>, own: Vec<Span>) -> DeclId {
        decl.parent = parent;
        let id = self.unit.add_decl(decl);
        let own: Vec<Span> = own.into_iter().filter(|(a, b)| a < b).collect();
        if !own.is_empty() {
            self.out.own_tokens.insert(id, own);
        }
        id
    }

    // ---- declarations ----------------------------------------------------

    fn parse_seq(&mut self, parent: Option<DeclId>, in_class: bool, limit: usize) {
        while self.pos < limit {
            let before = self.pos;
            if self.parse_declaration(parent, in_class, limit).is_none() {
                self.pos = limit;
            }
            if self.pos <= before {
                self.pos = before + 1;
            }
        }
    }

    fn parse_declaration(&mut self, parent: Option<DeclId>, in_class: bool, limit: usize) -> Option<()> {
        let start = self.pos;
        match self.text(start) {
            ";" => {
                self.pos += 1;
                return Some(());
            }
            stray @ ("}" | ")" | "]") => {
                let stray = stray.to_string();
                self.error_at(start, format!("extraneous '{stray}'"));
                self.pos += 1;
                return Some(());
            }
            _ => {}
        }

        let mut prefix = Prefix {
            start,
            ..Prefix::default()
        };
        loop {
            let i = self.pos;
            if self.is(i, "[") && self.is(i + 1, "[") {
                let close = self.matching(i, limit)?;
                prefix.has_attributes = true;
                self.pos = close + 1;
            } else if matches!(self.text(i), "__attribute__" | "__declspec" | "alignas") && self.is(i + 1, "(") {
                let close = self.matching(i + 1, limit)?;
                prefix.has_attributes = true;
                self.pos = close + 1;
            } else if self.is(i, "__extension__") {
                self.pos += 1;
            } else if self.is(i, "template") && self.is(i + 1, "<") {
                let close = self.matching_angle(i + 1, limit)?;
                if close == i + 2 {
                    prefix.template = TemplateKind::ExplicitSpecialization;
                } else if prefix.template == TemplateKind::None {
                    prefix.template = TemplateKind::Primary;
                }
                if (i + 2..close).any(|k| self.is(k, "=")) {
                    prefix.has_default_args = true;
                }
                self.pos = close + 1;
            } else if self.is(i, "template") || (self.is(i, "extern") && self.is(i + 1, "template")) {
                return self.parse_explicit_instantiation(prefix, parent, limit);
            } else {
                break;
            }
        }
        self.dispatch(prefix, parent, in_class, limit)
    }

    fn dispatch(&mut self, mut prefix: Prefix, parent: Option<DeclId>, in_class: bool, limit: usize) -> Option<()> {
        let i = self.pos;
        let string_follows = self
            .toks
            .get(i + 1)
            .is_some_and(|t| t.token.kind == TokenKind::Str);
        match self.text(i) {
            "namespace" => self.parse_namespace(prefix, parent, limit),
            "inline" if self.is(i + 1, "namespace") => self.parse_namespace(prefix, parent, limit),
            "extern" if string_follows && self.is(i + 2, "{") => self.parse_linkage(prefix, parent, limit),
            "extern" if string_follows => {
                prefix.extern_c = true;
                self.pos += 2;
                self.dispatch(prefix, parent, in_class, limit)
            }
            "using" => self.parse_using(prefix, parent, limit),
            "typedef" => self.parse_typedef(prefix, parent, limit),
            "static_assert" | "_Static_assert" => self.parse_static_assert(prefix, parent, limit),
            "public" | "private" | "protected" if in_class && self.is(i + 1, ":") => {
                let decl = Decl::new(DeclKind::AccessSpec, self.text(i), self.span_range(prefix.start, i + 1));
                self.add(decl, parent, Vec::new());
                self.pos = i + 2;
                Some(())
            }
            "friend" if in_class => self.parse_friend(prefix, parent, limit),
            "class" | "struct" | "union" => {
                if self.parse_record(prefix, parent, limit)? {
                    Some(())
                } else {
                    self.parse_generic(prefix, parent, in_class, limit)
                }
            }
            "enum" => {
                if self.parse_enum(prefix, parent, limit)? {
                    Some(())
                } else {
                    self.parse_generic(prefix, parent, in_class, limit)
                }
            }
            _ => self.parse_generic(prefix, parent, in_class, limit),
        }
    }

    /// Skip attribute groups starting at `i`; returns the first other index.
    fn skip_attributes(&mut self, mut i: usize, limit: usize, seen: &mut bool) -> Option<usize> {
        loop {
            if self.is(i, "[") && self.is(i + 1, "[") {
                i = self.matching(i, limit)? + 1;
                *seen = true;
            } else if matches!(self.text(i), "__attribute__" | "__declspec" | "alignas") && self.is(i + 1, "(") {
                i = self.matching(i + 1, limit)? + 1;
                *seen = true;
            } else {
                return Some(i);
            }
        }
    }

    fn parse_namespace(&mut self, prefix: Prefix, parent: Option<DeclId>, limit: usize) -> Option<()> {
        let mut i = self.pos;
        let mut pending_inline = false;
        if self.is(i, "inline") {
            pending_inline = true;
            i += 1;
        }
        i += 1;

        let mut has_attributes = prefix.has_attributes;
        let mut names: Vec<(String, bool)> = Vec::new();
        loop {
            let next = self.skip_attributes(i, limit, &mut has_attributes)?;
            if next != i {
                i = next;
                continue;
            }
            if self.is(i, "inline") {
                pending_inline = true;
            } else if self.is_name(i) {
                names.push((self.text(i).to_string(), pending_inline));
                pending_inline = false;
            } else if !self.is(i, "::") {
                break;
            }
            i += 1;
        }

        if self.is(i, "=") {
            let Some(semi) = self.find_top(i, limit, &[";"]) else {
                self.error_at(i, "expected ';' after namespace alias");
                return None;
            };
            let name = names.first().map(|(n, _)| n.clone()).unwrap_or_default();
            let mut decl = Decl::new(DeclKind::NamespaceAlias, name, self.span_range(prefix.start, semi));
            decl.is_definition = true;
            self.add(decl, parent, vec![(i + 1, semi)]);
            self.pos = semi + 1;
            return Some(());
        }

        if !self.is(i, "{") {
            self.error_at(i, "expected '{' after namespace name");
            return None;
        }
        let close = self.matching(i, limit)?;
        let range = self.span_range(prefix.start, close);
        let body = self.span_range(i, close);
        if names.is_empty() {
            names.push((String::new(), pending_inline));
        }

        let mut scope = parent;
        for (name, is_inline) in names {
            let mut decl = Decl::new(DeclKind::Namespace, name, range);
            decl.body = Some(body);
            decl.is_definition = true;
            decl.has_attributes = has_attributes;
            if is_inline {
                decl.specifiers.insert("inline".to_string());
            }
            scope = Some(self.add(decl, scope, Vec::new()));
        }
        self.pos = i + 1;
        self.parse_seq(scope, false, close);
        self.pos = close + 1;
        Some(())
    }

    fn parse_linkage(&mut self, prefix: Prefix, parent: Option<DeclId>, limit: usize) -> Option<()> {
        let i = self.pos;
        let open = i + 2;
        let close = self.matching(open, limit)?;
        let lang = self.text(i + 1).trim_matches('"').to_string();
        let mut decl = Decl::new(DeclKind::LinkageSpec, lang, self.span_range(prefix.start, close));
        decl.body = Some(self.span_range(open, close));
        decl.is_definition = true;
        let id = self.add(decl, parent, Vec::new());
        self.pos = open + 1;
        self.parse_seq(Some(id), false, close);
        self.pos = close + 1;
        Some(())
    }

    fn parse_using(&mut self, prefix: Prefix, parent: Option<DeclId>, limit: usize) -> Option<()> {
        let i = self.pos;
        let Some(semi) = self.find_top(i, limit, &[";"]) else {
            self.error_at(i, "expected ';' after using declaration");
            return None;
        };
        let range = self.span_range(prefix.start, semi);

        if self.is(i + 1, "namespace") {
            let parts: Vec<String> = (i + 2..semi)
                .filter(|k| self.is_name(*k))
                .map(|k| self.text(k).to_string())
                .collect();
            let decl = Decl::new(DeclKind::UsingDirective, parts.join("::"), range);
            self.add(decl, parent, Vec::new());
        } else if let Some(eq) = (i + 1..semi).find(|k| self.is(*k, "=")) {
            self.out.declarators.insert(i + 1);
            let mut decl = Decl::new(DeclKind::TypeAlias, self.text(i + 1), range);
            decl.is_definition = true;
            decl.template = prefix.template;
            decl.has_attributes = prefix.has_attributes;
            self.add(decl, parent, vec![(prefix.start, i), (eq + 1, semi)]);
        } else {
            let mut parts: Vec<String> = (i + 1..semi)
                .filter(|k| self.is_name(*k))
                .map(|k| self.text(k).to_string())
                .collect();
            let name = parts.pop().unwrap_or_default();
            let mut decl = Decl::new(DeclKind::UsingDecl, name, range);
            decl.qualifier = parts;
            self.add(decl, parent, vec![(i + 1, semi)]);
        }
        self.pos = semi + 1;
        Some(())
    }

    fn parse_typedef(&mut self, prefix: Prefix, parent: Option<DeclId>, limit: usize) -> Option<()> {
        let i = self.pos;
        let Some(semi) = self.find_top(i, limit, &[";"]) else {
            self.error_at(i, "expected ';' after typedef");
            return None;
        };
        // Declarators follow the last class or enum body, if any.
        let mut declarators_from = i + 1;
        let mut k = i + 1;
        while k < semi {
            if self.is(k, "{") {
                let close = self.skip_group(k, semi);
                declarators_from = close + 1;
                k = close;
            }
            k += 1;
        }
        let mut names = self.declarator_names(declarators_from, semi);
        if names.is_empty() {
            self.error_at(i, "typedef requires a name");
            self.pos = semi + 1;
            return Some(());
        }
        let first = names.remove(0);
        let mut decl = Decl::new(DeclKind::Typedef, first, self.span_range(prefix.start, semi));
        decl.extra_names = names;
        decl.is_definition = true;
        decl.has_attributes = prefix.has_attributes;
        self.add(decl, parent, vec![(i + 1, semi)]);
        self.pos = semi + 1;
        Some(())
    }

    fn parse_static_assert(&mut self, prefix: Prefix, parent: Option<DeclId>, limit: usize) -> Option<()> {
        let i = self.pos;
        if !self.is(i + 1, "(") {
            self.error_at(i + 1, "expected '(' after static_assert");
            return None;
        }
        let close = self.matching(i + 1, limit)?;
        let end = if self.is(close + 1, ";") {
            close + 1
        } else {
            self.error_at(close + 1, "expected ';' after static_assert");
            close
        };
        let mut decl = Decl::new(DeclKind::StaticAssert, "", self.span_range(prefix.start, end));
        decl.is_definition = true;
        self.add(decl, parent, vec![(i + 2, close)]);
        self.pos = end + 1;
        Some(())
    }

    fn parse_explicit_instantiation(&mut self, prefix: Prefix, parent: Option<DeclId>, limit: usize) -> Option<()> {
        let i = self.pos;
        let Some(semi) = self.find_top(i, limit, &[";"]) else {
            self.error_at(i, "expected ';' after explicit instantiation");
            return None;
        };
        let name = (i..semi)
            .find(|k| self.is_name(*k) && matches!(self.text(k + 1), "<" | "("))
            .or_else(|| (i..semi).rev().find(|k| self.is_name(*k)))
            .map(|k| self.text(k).to_string())
            .unwrap_or_default();
        let mut decl = Decl::new(DeclKind::ExplicitInstantiation, name, self.span_range(prefix.start, semi));
        decl.is_definition = !self.is(i, "extern");
        self.add(decl, parent, vec![(i, semi)]);
        self.pos = semi + 1;
        Some(())
    }

    fn parse_friend(&mut self, prefix: Prefix, parent: Option<DeclId>, limit: usize) -> Option<()> {
        let i = self.pos;
        let mut k = i + 1;
        let mut first_paren = None;
        let mut body = false;
        let end = loop {
            if k >= limit {
                self.error_at(i, "expected ';' after friend declaration");
                return None;
            }
            match self.text(k) {
                ";" => break k,
                "{" => {
                    body = true;
                    break self.matching(k, limit)?;
                }
                "(" => {
                    first_paren.get_or_insert(k);
                    k = self.matching(k, limit)?;
                }
                "[" => k = self.matching(k, limit)?,
                _ => {}
            }
            k += 1;
        };
        let name = match first_paren {
            Some(open) if open > i + 1 => {
                let operator_at = (i + 1..open).find(|k| self.is(*k, "operator"));
                self.callable_name(i + 1, open, operator_at).0
            }
            _ => (i + 1..end)
                .rev()
                .find(|j| self.is_name(*j))
                .map(|j| self.text(j).to_string())
                .unwrap_or_default(),
        };
        let mut decl = Decl::new(DeclKind::Friend, name, self.span_range(prefix.start, end));
        decl.is_definition = body;
        decl.template = prefix.template;
        self.add(decl, parent, vec![(i + 1, end + 1)]);
        self.pos = end + 1;
        Some(())
    }

    /// Returns `Some(false)` when the class key starts something other than a
    /// class declaration (`struct S* p;`).
    fn parse_record(&mut self, prefix: Prefix, parent: Option<DeclId>, limit: usize) -> Option<bool> {
        let kw = self.pos;
        let mut has_attributes = prefix.has_attributes;
        let mut i = self.skip_attributes(kw + 1, limit, &mut has_attributes)?;

        let mut name = String::new();
        let mut name_at = None;
        let mut qualifier = Vec::new();
        while self.is_name(i) && !self.is(i, "final") {
            if self.is(i + 1, "::") {
                qualifier.push(self.text(i).to_string());
                i += 2;
                continue;
            }
            name = self.text(i).to_string();
            name_at = Some(i);
            i += 1;
            break;
        }

        let mut template = prefix.template;
        let mut signature = None;
        if !name.is_empty() && self.is(i, "<") {
            let close = self.matching_angle(i, limit)?;
            signature = Some(self.joined(i, close + 1));
            if template != TemplateKind::ExplicitSpecialization {
                template = TemplateKind::PartialSpecialization;
            }
            i = close + 1;
        }
        let is_final = self.is(i, "final");
        if is_final {
            i += 1;
        }

        if matches!(self.text(i), ";" | ":" | "{") {
            self.out.declarators.extend(name_at);
        }
        match self.text(i) {
            ";" if !name.is_empty() => {
                let mut decl = Decl::new(DeclKind::Record, name, self.span_range(prefix.start, i));
                decl.qualifier = qualifier;
                decl.template = template;
                decl.signature = signature;
                decl.has_attributes = has_attributes;
                decl.has_default_args = prefix.has_default_args;
                decl.specifiers.insert(self.text(kw).to_string());
                self.add(decl, parent, vec![(prefix.start, i)]);
                self.pos = i + 1;
                Some(true)
            }
            ":" | "{" => {
                let Some(open) = self.find_top(i, limit, &["{", ";"]).filter(|o| self.is(*o, "{")) else {
                    self.error_at(i, "expected class body");
                    return None;
                };
                let close = self.matching(open, limit)?;
                let end = match self.find_top(close + 1, limit, &[";"]) {
                    Some(semi) => semi,
                    None => {
                        self.error_at(close + 1, "expected ';' after class");
                        close
                    }
                };
                let mut decl = Decl::new(DeclKind::Record, name, self.span_range(prefix.start, end));
                decl.qualifier = qualifier;
                decl.template = template;
                decl.signature = signature;
                decl.body = Some(self.span_range(open, close));
                decl.is_definition = true;
                decl.has_attributes = has_attributes;
                decl.has_default_args = prefix.has_default_args;
                decl.extra_names = self.declarator_names(close + 1, end);
                decl.specifiers.insert(self.text(kw).to_string());
                if is_final {
                    decl.specifiers.insert("final".to_string());
                }
                let id = self.add(decl, parent, vec![(prefix.start, open), (close + 1, end + 1)]);
                self.pos = open + 1;
                self.parse_seq(Some(id), true, close);
                self.pos = end + 1;
                Some(true)
            }
            _ => Some(false),
        }
    }

    fn parse_enum(&mut self, prefix: Prefix, parent: Option<DeclId>, limit: usize) -> Option<bool> {
        let kw = self.pos;
        let mut i = kw + 1;
        let scoped = matches!(self.text(i), "class" | "struct");
        if scoped {
            i += 1;
        }
        let mut has_attributes = prefix.has_attributes;
        i = self.skip_attributes(i, limit, &mut has_attributes)?;

        let mut name = String::new();
        let mut name_at = None;
        let mut qualifier = Vec::new();
        while self.is_name(i) {
            if self.is(i + 1, "::") {
                qualifier.push(self.text(i).to_string());
                i += 2;
                continue;
            }
            name = self.text(i).to_string();
            name_at = Some(i);
            i += 1;
            break;
        }
        if self.is(i, ":") {
            while i < limit && !matches!(self.text(i), "{" | ";") {
                i += 1;
            }
        }

        if matches!(self.text(i), ";" | "{") {
            self.out.declarators.extend(name_at);
        }
        let mut decl = Decl::new(DeclKind::Enum, name, SourceRange::default());
        decl.qualifier = qualifier;
        decl.has_attributes = has_attributes;
        if scoped {
            decl.specifiers.insert("class".to_string());
        }
        match self.text(i) {
            ";" if !decl.name.is_empty() => {
                decl.range = self.span_range(prefix.start, i);
                self.add(decl, parent, vec![(prefix.start, i)]);
                self.pos = i + 1;
                Some(true)
            }
            "{" => {
                let close = self.matching(i, limit)?;
                let end = match self.find_top(close + 1, limit, &[";"]) {
                    Some(semi) => semi,
                    None => {
                        self.error_at(close + 1, "expected ';' after enum");
                        close
                    }
                };
                let mut names = self.enumerator_names(i + 1, close);
                names.extend(self.declarator_names(close + 1, end));
                decl.extra_names = names;
                decl.range = self.span_range(prefix.start, end);
                decl.body = Some(self.span_range(i, close));
                decl.is_definition = true;
                self.add(decl, parent, vec![(prefix.start, end + 1)]);
                self.pos = end + 1;
                Some(true)
            }
            _ => Some(false),
        }
    }

    fn enumerator_names(&mut self, from: usize, to: usize) -> Vec<String> {
        let found = self
            .split_top(from, to)
            .into_iter()
            .map(|(s, _)| s)
            .filter(|s| self.is_name(*s))
            .collect();
        self.claim(found)
    }

    /// Function, variable or data member.
    fn parse_generic(&mut self, prefix: Prefix, parent: Option<DeclId>, in_class: bool, limit: usize) -> Option<()> {
        let head = self.pos;
        let mut i = head;
        let mut angle = 0i32;
        let mut func: Option<Span> = None;
        let mut operator_at: Option<usize> = None;
        let mut seen_eq = false;
        let mut has_init = false;
        let mut init_from: Option<usize> = None;
        let mut body: Option<Span> = None;
        let mut post: Vec<String> = Vec::new();

        let end = loop {
            if i >= limit {
                self.error_at(i.min(limit), "expected ';' after declaration");
                return None;
            }
            match self.text(i) {
                ";" => break i,
                "}" => {
                    self.error_at(i, "expected ';' after declaration");
                    break i.saturating_sub(1).max(head);
                }
                "operator" if func.is_none() && !seen_eq => {
                    operator_at = Some(i);
                    let mut j = i + 1;
                    if self.is(j, "(") && self.is(j + 1, ")") {
                        j += 2;
                    } else {
                        while j < limit && !matches!(self.text(j), "(" | ";" | "{") {
                            j += 1;
                        }
                    }
                    i = j;
                    continue;
                }
                "(" => {
                    let close = self.matching(i, limit)?;
                    if func.is_none()
                        && !seen_eq
                        && angle <= 0
                        && self.is_function_declarator(head, i, close, in_class, operator_at)
                    {
                        func = Some((i, close));
                    }
                    i = close + 1;
                    continue;
                }
                "{" if func.is_some() && !seen_eq => {
                    let close = self.matching(i, limit)?;
                    body = Some((i, close));
                    break close;
                }
                "try" if func.is_some() && !seen_eq && self.is(i + 1, "{") => {
                    let open = i + 1;
                    let mut close = self.matching(open, limit)?;
                    while self.is(close + 1, "catch") && self.is(close + 2, "(") {
                        let params_close = self.matching(close + 2, limit)?;
                        if !self.is(params_close + 1, "{") {
                            self.error_at(params_close + 1, "expected '{' after catch");
                            return None;
                        }
                        close = self.matching(params_close + 1, limit)?;
                    }
                    body = Some((open, close));
                    break close;
                }
                ":" if func.is_some() && !seen_eq => {
                    let (open, close) = self.constructor_body(i + 1, limit)?;
                    body = Some((open, close));
                    break close;
                }
                "{" | "[" => {
                    if self.is(i, "{") && !seen_eq && func.is_none() {
                        has_init = true;
                        init_from.get_or_insert(i);
                    }
                    i = self.matching(i, limit)? + 1;
                    continue;
                }
                "=" if angle <= 0 => {
                    if func.is_some() {
                        match self.text(i + 1) {
                            "default" => post.push("default".to_string()),
                            "delete" => post.push("delete".to_string()),
                            "0" => post.push("pure".to_string()),
                            _ => {}
                        }
                    }
                    seen_eq = true;
                    has_init = true;
                    init_from.get_or_insert(i + 1);
                }
                "<" if !seen_eq && func.is_none() && i > head && (self.is_name(i - 1) || self.is(i - 1, "template")) => {
                    angle += 1;
                }
                ">" if angle > 0 => angle -= 1,
                ">>" if angle > 0 => angle = (angle - 2).max(0),
                word @ ("override" | "final") if func.is_some() => post.push(word.to_string()),
                _ => {}
            }
            i += 1;
        };

        let range = self.span_range(prefix.start, end);
        let mut specifiers: Vec<String> = (head..func.map_or(end, |(open, _)| open))
            .filter(|k| SPECIFIERS.contains(&self.text(*k)))
            .map(|k| self.text(k).to_string())
            .collect();
        if prefix.extern_c {
            specifiers.push("extern".to_string());
        }
        let parent_is_record = parent.is_some_and(|p| self.unit.decl(p).kind == DeclKind::Record);

        if let Some((open, close)) = func {
            let (name, qualifier, name_at) = self.callable_name(head, open, operator_at);
            self.out.declarators.insert(name_at);
            if self.is(name_at, "~") {
                self.out.declarators.insert(name_at + 1);
            }
            let mut decl = Decl::new(DeclKind::Function, name, range);
            decl.qualifier = qualifier;
            decl.template = prefix.template;
            decl.has_attributes = prefix.has_attributes;
            decl.has_default_args = prefix.has_default_args || (open + 1..close).any(|k| self.is(k, "="));
            decl.signature = Some(self.parameter_signature(open, close));
            decl.specifiers.extend(specifiers);
            decl.specifiers.extend(post.iter().cloned());
            decl.is_definition = body.is_some() || post.iter().any(|p| p == "default" || p == "delete");

            let defer = self.delayed_templates && prefix.template != TemplateKind::None;
            match body {
                Some((b_open, b_close)) if defer => {
                    decl.range = self.span_range(prefix.start, b_open.saturating_sub(1).max(prefix.start));
                    let id = self.add(decl, parent, vec![(prefix.start, b_open)]);
                    self.out.deferred.insert(id, DeferredBody { open: b_open, close: b_close });
                    self.unit.mark_deferred(id);
                }
                Some((b_open, b_close)) => {
                    decl.body = Some(self.span_range(b_open, b_close));
                    self.add(decl, parent, vec![(prefix.start, end + 1)]);
                }
                None => {
                    self.add(decl, parent, vec![(prefix.start, end + 1)]);
                }
            }
        } else {
            let mut names = self.declarator_names(head, end);
            let kind = if parent_is_record && !specifiers.iter().any(|s| s == "static") {
                DeclKind::Field
            } else {
                DeclKind::Variable
            };
            let name = if names.is_empty() { String::new() } else { names.remove(0) };
            let qualifier = self.declarator_qualifier(head, end, &name);
            let is_extern = specifiers.iter().any(|s| s == "extern");
            let is_definition = match kind {
                DeclKind::Field => true,
                _ if parent_is_record => specifiers.iter().any(|s| s == "inline" || s == "constexpr"),
                _ => !is_extern || has_init,
            };
            let mut decl = Decl::new(kind, name, range);
            decl.extra_names = names;
            decl.qualifier = qualifier;
            decl.template = prefix.template;
            decl.has_attributes = prefix.has_attributes;
            decl.has_initializer = has_init;
            decl.initializer_has_effects = init_from.is_some_and(|from| self.runs_code(from, end));
            decl.is_definition = is_definition;
            decl.specifiers.extend(specifiers);
            self.add(decl, parent, vec![(prefix.start, end + 1)]);
        }
        self.pos = end + 1;
        Some(())
    }

    /// Tokens `from..to` contain a call, a lambda or a `new` expression.
    fn runs_code(&self, from: usize, to: usize) -> bool {
        (from..to).any(|k| match self.text(k) {
            "new" | "throw" | "co_await" => true,
            "(" => k > from && (self.is_name(k - 1) || matches!(self.text(k - 1), ")" | "]" | ">")),
            // a lambda introducer, not a subscript
            "[" => k == from || !(self.is_name(k - 1) || matches!(self.text(k - 1), ")" | "]")),
            _ => false,
        })
    }

    /// Skip a constructor initializer list starting after `:`; returns the
    /// body braces.
    fn constructor_body(&mut self, from: usize, limit: usize) -> Option<Span> {
        let mut j = from;
        while j < limit {
            match self.text(j) {
                "(" => j = self.matching(j, limit)?,
                // `{` after an initializer's closing bracket opens the body.
                "{" if j > from && matches!(self.text(j - 1), ")" | "}" | "...") => {
                    let close = self.matching(j, limit)?;
                    return Some((j, close));
                }
                "{" => j = self.matching(j, limit)?,
                ";" => break,
                _ => {}
            }
            j += 1;
        }
        self.error_at(from, "expected function body after constructor initializer");
        None
    }

    fn is_function_declarator(
        &self,
        head: usize,
        open: usize,
        close: usize,
        in_class: bool,
        operator_at: Option<usize>,
    ) -> bool {
        if open <= head {
            return false;
        }
        if operator_at.is_some() {
            return true;
        }
        let prev = open - 1;
        let named = self.is_name(prev)
            || (matches!(self.text(prev), ">" | ">>")
                && self
                    .angle_open_before(prev, head)
                    .is_some_and(|lt| lt > head && self.is_name(lt - 1)));
        if !named {
            return false;
        }
        match self.text(close + 1) {
            "{" | "const" | "override" | "final" | "noexcept" | "->" | "&" | "&&" | "volatile" | "throw"
            | "try" | ":" => return true,
            "=" => {
                return matches!(self.text(close + 2), "default" | "delete" | "0");
            }
            _ => {}
        }
        in_class || self.looks_like_parameters(open, close)
    }

    /// Whether the parenthesized list reads as parameter declarations rather
    /// than constructor arguments.
    fn looks_like_parameters(&self, open: usize, close: usize) -> bool {
        if close == open + 1 || (close == open + 2 && self.is(open + 1, "void")) {
            return true;
        }
        let mut type_like = false;
        for (s, e) in self.split_top(open + 1, close) {
            if s >= e || self.is_literal(s) {
                return false;
            }
            if self.is(s, "...") || (s..e).any(|k| TYPE_WORDS.contains(&self.text(k))) {
                type_like = true;
                continue;
            }
            let mut k = s;
            while k < e {
                match self.text(k) {
                    "(" | "[" | "{" => {
                        k = self.skip_group(k, e);
                    }
                    "+" | "-" | "/" | "%" | "==" | "!=" | "<=" | ">=" | "||" | "!" | "?" | "." | "->" | "++"
                    | "--" => return false,
                    _ => {}
                }
                k += 1;
            }
            let adjacent_names = (s..e.saturating_sub(1)).any(|k| self.is_name(k) && self.is_name(k + 1));
            let declarator_punct = (s + 1..e).any(|k| {
                matches!(self.text(k), "&" | "*" | "&&") && (k + 1 == e || self.is_name(k + 1))
            });
            let template_type = self.is(e - 1, ">") || self.is(e - 1, ">>")
                || (s + 1..e).any(|k| self.is(k, ">") && self.is_name(k + 1));
            if adjacent_names || declarator_punct || template_type {
                type_like = true;
            }
        }
        type_like
    }

    /// Declared name and explicit qualifier of a function declarator whose
    /// parameter list opens at `open`.
    /// Also returns the index of the name token.
    fn callable_name(&self, head: usize, open: usize, operator_at: Option<usize>) -> (String, Vec<String>, usize) {
        let (name, q_end) = match operator_at.filter(|op| *op < open && *op >= head) {
            Some(op) => (format!("operator{}", self.operator_suffix(op + 1, open)), op),
            None => {
                let mut k = open.saturating_sub(1);
                if matches!(self.text(k), ">" | ">>") {
                    if let Some(lt) = self.angle_open_before(k, head) {
                        k = lt.saturating_sub(1);
                    }
                }
                if k > head && self.is(k - 1, "~") {
                    (format!("~{}", self.text(k)), k - 1)
                } else {
                    (self.text(k).to_string(), k)
                }
            }
        };
        (name, self.qualifier_before(head, q_end), q_end)
    }

    fn operator_suffix(&self, from: usize, to: usize) -> String {
        let suffix = self.joined(from, to);
        match self.toks.get(from) {
            Some(t) if t.token.kind == TokenKind::Ident => format!(" {suffix}"),
            _ => suffix,
        }
    }

    /// `Foo` in `int Foo::count = 0;`.
    fn declarator_qualifier(&self, head: usize, end: usize, name: &str) -> Vec<String> {
        if name.is_empty() {
            return Vec::new();
        }
        let at = (head + 2..end).find(|k| self.is(*k, name) && self.is(k - 1, "::") && !self.is(k + 1, "::"));
        match at {
            Some(at) => self.qualifier_before(head, at),
            None => Vec::new(),
        }
    }

    /// `A::B` chain spelled right before token `q_end`.
    fn qualifier_before(&self, head: usize, mut q_end: usize) -> Vec<String> {
        let mut qualifier = Vec::new();
        while q_end >= head + 2 && self.is(q_end - 1, "::") {
            let mut q = q_end - 2;
            if matches!(self.text(q), ">" | ">>") {
                match self.angle_open_before(q, head) {
                    Some(lt) if lt > head => q = lt - 1,
                    _ => break,
                }
            }
            if !self.is_name(q) {
                break;
            }
            qualifier.push(self.text(q).to_string());
            q_end = q;
        }
        qualifier.reverse();
        qualifier
    }

    /// Normalized parameter list: parameter names and default arguments are
    /// dropped, trailing cv and ref qualifiers kept.
    fn parameter_signature(&self, open: usize, close: usize) -> String {
        let mut params = Vec::new();
        for (s, e) in self.split_top(open + 1, close) {
            let mut stop = e;
            let mut k = s;
            while k < e {
                match self.text(k) {
                    "(" | "[" | "{" => k = self.skip_group(k, e),
                    "=" => {
                        stop = k;
                        break;
                    }
                    _ => {}
                }
                k += 1;
            }
            let mut keep: Vec<usize> = (s..stop).collect();
            if let Some(bracket) = (s..stop).find(|k| self.is(*k, "[")) {
                if bracket > s && self.is_name(bracket - 1) {
                    keep.retain(|k| *k != bracket - 1);
                }
            } else if stop >= s + 2
                && self.is_name(stop - 1)
                && !self.is(stop - 2, "::")
                && (s..stop - 1).any(|k| !matches!(self.text(k), "const" | "volatile"))
            {
                keep.pop();
            }
            let text: Vec<String> = keep.iter().map(|k| self.joined(*k, *k + 1)).collect();
            params.push(text.join(" "));
        }
        if params.len() == 1 && params[0] == "void" {
            params.clear();
        }
        let mut signature = format!("({})", params.join(","));
        let mut k = close + 1;
        while matches!(self.text(k), "const" | "volatile" | "&" | "&&") {
            signature.push(' ');
            signature.push_str(self.text(k));
            k += 1;
        }
        signature
    }

    /// Names introduced by the declarators in `from..to`.
    fn declarator_names(&mut self, from: usize, to: usize) -> Vec<String> {
        let found = self
            .split_top(from, to)
            .into_iter()
            .filter_map(|(s, e)| self.declarator_name(s, e))
            .collect();
        self.claim(found)
    }

    /// Record `indices` as declared names and return their spellings.
    fn claim(&mut self, indices: Vec<usize>) -> Vec<String> {
        indices
            .into_iter()
            .map(|k| {
                self.out.declarators.insert(k);
                self.text(k).to_string()
            })
            .collect()
    }

    fn declarator_name(&self, from: usize, to: usize) -> Option<usize> {
        let mut last: Option<usize> = None;
        let mut k = from;
        while k < to {
            match self.text(k) {
                "=" | ":" | "{" => break,
                "(" => {
                    let close = self.skip_group(k, to);
                    if last.is_none() || matches!(self.text(k + 1), "*" | "&" | "^" | "&&") {
                        let inner = (k + 1..close)
                            .rev()
                            .find(|j| self.is_name(*j) && !self.is(j + 1, "::") && !self.is(j + 1, "("));
                        if inner.is_some() {
                            return inner;
                        }
                    }
                    if last.is_some() {
                        break;
                    }
                    k = close + 1;
                    continue;
                }
                "[" => {
                    k = self.skip_group(k, to) + 1;
                    continue;
                }
                "<" if k > from && self.is_name(k - 1) => {
                    k = self.scan_angle(k, to).unwrap_or(to) + 1;
                    continue;
                }
                _ => {
                    if self.is_name(k) && !self.is(k + 1, "::") {
                        last = Some(k);
                    }
                }
            }
            k += 1;
        }
        last
    }
}
