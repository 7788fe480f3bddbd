//! Conditional compilation and macro bookkeeping.
//!
//! Macro bodies are not substituted into the token stream: a macro use stays
//! one identifier token, annotated with the identifiers its replacement list
//! reaches. Declarations built from macros therefore keep their spelled
//! ranges, which is all the optimizer edits.

use std::collections::{HashMap, HashSet};

use super::expr;
use super::lexer::{tokenize, Directive, Item, Lexed, Token, TokenKind};
use crate::frontend::diagnostics::DiagnosticsEngine;
use crate::frontend::flags::FrontEndFlags;
use crate::frontend::{ConditionalEvent, ConditionalKind, PreprocessorCallbacks};
use crate::source::SourceRange;

/// Nesting limit for macro expansion inside `#if` conditions.
const MAX_EXPANSION_DEPTH: usize = 64;

/// A token of the active program text.
#[derive(Debug, Clone)]
pub struct PpToken {
    pub token: Token,
    /// Identifiers reached through the expansion of this token, if it names
    /// a macro.
    pub expansion: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Preprocessed {
    pub tokens: Vec<PpToken>,
    pub directives: Vec<SourceRange>,
}

#[derive(Debug, Clone)]
struct MacroDef {
    params: Option<Vec<String>>,
    body: Vec<Token>,
}

#[derive(Debug)]
struct Frame {
    parent_active: bool,
    taken_any: bool,
    active: bool,
    seen_else: bool,
    opened_at: usize,
}

pub struct Preprocessor<'a, C: PreprocessorCallbacks + ?Sized> {
    macros: HashMap<String, MacroDef>,
    stack: Vec<Frame>,
    callbacks: &'a mut C,
    diagnostics: &'a mut DiagnosticsEngine,
    out: Preprocessed,
}

impl<'a, C: PreprocessorCallbacks + ?Sized> Preprocessor<'a, C> {
    pub fn new(
        flags: &FrontEndFlags,
        callbacks: &'a mut C,
        diagnostics: &'a mut DiagnosticsEngine,
    ) -> Self {
        let mut pp = Self {
            macros: HashMap::new(),
            stack: Vec::new(),
            callbacks,
            diagnostics,
            out: Preprocessed::default(),
        };
        pp.predefine("__cplusplus", &flags.cplusplus_value().to_string());
        pp.predefine("__STDC_HOSTED__", "1");
        for (name, value) in &flags.defines {
            pp.predefine(name, value);
        }
        for name in &flags.undefines {
            pp.macros.remove(name);
        }
        pp
    }

    fn predefine(&mut self, name: &str, value: &str) {
        let body = tokenize(value)
            .items
            .into_iter()
            .filter_map(|item| match item {
                Item::Token(t) => Some(t),
                _ => None,
            })
            .collect();
        self.macros.insert(name.to_string(), MacroDef { params: None, body });
    }

    fn active(&self) -> bool {
        self.stack.last().map_or(true, |f| f.active)
    }

    pub fn run(mut self, lexed: Lexed) -> Preprocessed {
        let items = lexed.items;
        for (i, item) in items.iter().enumerate() {
            match item {
                Item::Directive(d) => {
                    self.out.directives.push(d.range);
                    self.directive(d);
                }
                Item::Error { offset, message } => {
                    if self.active() {
                        self.diagnostics.error(*offset, message.clone());
                    }
                }
                Item::Token(tok) => {
                    if !self.active() {
                        continue;
                    }
                    let followed_by_paren =
                        matches!(items.get(i + 1), Some(Item::Token(next)) if next.is("("));
                    let expansion = if tok.is_ident() {
                        self.expand_use(tok, followed_by_paren)
                    } else {
                        Vec::new()
                    };
                    self.out.tokens.push(PpToken {
                        token: tok.clone(),
                        expansion,
                    });
                }
            }
        }
        for frame in std::mem::take(&mut self.stack) {
            self.diagnostics
                .error(frame.opened_at, "unterminated conditional directive");
        }
        self.out
    }

    /// Report every macro reached from a use of `tok` and return the plain
    /// identifiers of the replacement lists.
    fn expand_use(&mut self, tok: &Token, followed_by_paren: bool) -> Vec<String> {
        match self.macros.get(&tok.text) {
            Some(def) if def.params.is_none() || followed_by_paren => {}
            _ => return Vec::new(),
        }
        let mut seen: HashSet<String> = HashSet::new();
        let mut idents: Vec<String> = Vec::new();
        let mut work = vec![tok.text.clone()];
        while let Some(name) = work.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            self.callbacks.macro_used(&name, tok.range);
            let Some(def) = self.macros.get(&name) else { continue };
            let params = def.params.as_deref().unwrap_or(&[]);
            for body_tok in def.body.iter().filter(|t| t.is_ident()) {
                if params.contains(&body_tok.text) || body_tok.text == "__VA_ARGS__" {
                    continue;
                }
                if self.macros.contains_key(&body_tok.text) {
                    work.push(body_tok.text.clone());
                } else if !idents.contains(&body_tok.text) {
                    idents.push(body_tok.text.clone());
                }
            }
        }
        idents
    }

    fn directive(&mut self, d: &Directive) {
        match d.name.as_str() {
            "if" | "ifdef" | "ifndef" => self.open_conditional(d),
            "elif" | "elifdef" | "elifndef" => self.elif(d),
            "else" => self.else_branch(d),
            "endif" => self.endif(d),
            _ if !self.active() => {}
            "define" => self.define(d),
            "undef" => self.undef(d),
            "include" | "include_next" | "import" => {
                let spelled: String = d.tokens.iter().map(|t| t.text.as_str()).collect();
                self.callbacks.inclusion(&spelled, d.range);
            }
            "error" => {
                let text = directive_text(d);
                self.diagnostics.error(d.name_range.start, format!("#error {text}"));
            }
            "warning" => {
                let text = directive_text(d);
                self.diagnostics.warning(d.name_range.start, format!("#warning {text}"));
            }
            // Null directives and GNU line markers have no name.
            "pragma" | "line" | "ident" | "sccs" | "" => {}
            other => {
                self.diagnostics
                    .error(d.name_range.start, format!("invalid preprocessing directive #{other}"));
            }
        }
    }

    fn open_conditional(&mut self, d: &Directive) {
        let parent_active = self.active();
        if !parent_active {
            self.stack.push(Frame {
                parent_active,
                taken_any: true,
                active: false,
                seen_else: false,
                opened_at: d.range.start,
            });
            return;
        }
        let kind = match d.name.as_str() {
            "ifdef" => ConditionalKind::Ifdef,
            "ifndef" => ConditionalKind::Ifndef,
            _ => ConditionalKind::If,
        };
        let (taken, macros) = self.evaluate(d, kind);
        self.stack.push(Frame {
            parent_active,
            taken_any: taken,
            active: taken,
            seen_else: false,
            opened_at: d.range.start,
        });
        self.callbacks.conditional(ConditionalEvent {
            kind,
            directive: d.range,
            taken,
            macros: &macros,
        });
    }

    fn elif(&mut self, d: &Directive) {
        let Some(frame) = self.stack.last() else {
            self.diagnostics.error(d.name_range.start, "#elif without #if");
            return;
        };
        if frame.seen_else {
            self.diagnostics.error(d.name_range.start, "#elif after #else");
            return;
        }
        if !frame.parent_active {
            return;
        }
        let already_taken = frame.taken_any;
        let kind = match d.name.as_str() {
            "elifdef" => ConditionalKind::Ifdef,
            "elifndef" => ConditionalKind::Ifndef,
            _ => ConditionalKind::If,
        };
        let (taken, macros) = if already_taken {
            (false, condition_identifiers(&d.tokens))
        } else {
            self.evaluate(d, kind)
        };
        if let Some(frame) = self.stack.last_mut() {
            frame.active = taken;
            frame.taken_any |= taken;
        }
        self.callbacks.conditional(ConditionalEvent {
            kind: ConditionalKind::Elif,
            directive: d.range,
            taken,
            macros: &macros,
        });
    }

    fn else_branch(&mut self, d: &Directive) {
        let Some(frame) = self.stack.last_mut() else {
            self.diagnostics.error(d.name_range.start, "#else without #if");
            return;
        };
        if frame.seen_else {
            self.diagnostics.error(d.name_range.start, "#else after #else");
            return;
        }
        frame.seen_else = true;
        if !frame.parent_active {
            return;
        }
        let taken = !frame.taken_any;
        frame.active = taken;
        frame.taken_any = true;
        self.callbacks.conditional(ConditionalEvent {
            kind: ConditionalKind::Else,
            directive: d.range,
            taken,
            macros: &[],
        });
    }

    fn endif(&mut self, d: &Directive) {
        let Some(frame) = self.stack.pop() else {
            self.diagnostics.error(d.name_range.start, "#endif without #if");
            return;
        };
        if frame.parent_active {
            self.callbacks.conditional(ConditionalEvent {
                kind: ConditionalKind::Endif,
                directive: d.range,
                taken: false,
                macros: &[],
            });
        }
    }

    fn define(&mut self, d: &Directive) {
        let Some(name_tok) = d.tokens.first().filter(|t| t.is_ident()) else {
            self.diagnostics.error(d.name_range.end, "macro name must be an identifier");
            return;
        };
        if name_tok.text == "defined" {
            self.diagnostics.error(name_tok.range.start, "'defined' cannot be used as a macro name");
            return;
        }

        let mut rest = &d.tokens[1..];
        let mut params = None;
        // Function-like only when `(` touches the name.
        if let Some(open) = rest.first().filter(|t| t.is("(") && t.range.start == name_tok.range.end) {
            let Some(close) = rest.iter().position(|t| t.is(")")) else {
                self.diagnostics.error(open.range.start, "missing ')' in macro parameter list");
                return;
            };
            params = Some(
                rest[1..close]
                    .iter()
                    .filter(|t| t.is_ident() || t.is("..."))
                    .map(|t| t.text.clone())
                    .collect(),
            );
            rest = &rest[close + 1..];
        }

        self.macros.insert(
            name_tok.text.clone(),
            MacroDef {
                params,
                body: rest.to_vec(),
            },
        );
        self.callbacks.macro_defined(&name_tok.text, d.range);
    }

    fn undef(&mut self, d: &Directive) {
        let Some(name_tok) = d.tokens.first().filter(|t| t.is_ident()) else {
            self.diagnostics.error(d.name_range.end, "macro name must be an identifier");
            return;
        };
        self.macros.remove(&name_tok.text);
        self.callbacks.macro_undefined(&name_tok.text, d.range);
    }

    /// Evaluate the condition of `d`; returns whether the branch is taken and
    /// the identifiers spelled in the condition.
    fn evaluate(&mut self, d: &Directive, kind: ConditionalKind) -> (bool, Vec<String>) {
        let macros = condition_identifiers(&d.tokens);
        match kind {
            ConditionalKind::Ifdef | ConditionalKind::Ifndef => {
                let Some(name) = d.tokens.first().filter(|t| t.is_ident()) else {
                    self.diagnostics.error(d.name_range.end, "macro name missing");
                    return (false, macros);
                };
                let defined = self.macros.contains_key(&name.text);
                if defined {
                    self.callbacks.macro_used(&name.text, name.range);
                }
                let taken = if kind == ConditionalKind::Ifdef { defined } else { !defined };
                (taken, macros)
            }
            _ => {
                if d.tokens.is_empty() {
                    self.diagnostics.error(d.name_range.end, "expected value in expression");
                    return (false, macros);
                }
                let mut disabled = HashSet::new();
                let expanded = self.expand_condition(&d.tokens, None, &mut disabled, 0);
                match expr::evaluate(&expanded) {
                    Ok(value) => (value != 0, macros),
                    Err(message) => {
                        self.diagnostics.error(d.name_range.start, message);
                        (false, macros)
                    }
                }
            }
        }
    }

    /// Macro-expand a condition. `site` is the range of the outermost use,
    /// where nested expansions are reported.
    fn expand_condition(
        &mut self,
        tokens: &[Token],
        site: Option<SourceRange>,
        disabled: &mut HashSet<String>,
        depth: usize,
    ) -> Vec<Token> {
        let mut out = Vec::with_capacity(tokens.len());
        if depth > MAX_EXPANSION_DEPTH {
            return out;
        }
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            let at = site.unwrap_or(tok.range);
            if !tok.is_ident() {
                out.push(tok.clone());
                i += 1;
                continue;
            }
            match tok.text.as_str() {
                "defined" => {
                    let (name, consumed) = match (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3)) {
                        (Some(open), Some(name), Some(close)) if open.is("(") && close.is(")") => {
                            (Some(name), 4)
                        }
                        (Some(name), _, _) if name.is_ident() => (Some(name), 2),
                        _ => (None, 1),
                    };
                    let value = match name {
                        Some(name) => {
                            let defined = self.macros.contains_key(&name.text);
                            if defined {
                                self.callbacks.macro_used(&name.text, site.unwrap_or(name.range));
                            }
                            defined
                        }
                        None => {
                            self.diagnostics.error(tok.range.end, "macro name missing");
                            false
                        }
                    };
                    out.push(number(if value { "1" } else { "0" }, at));
                    i += consumed;
                }
                "__has_include" | "__has_include_next" | "__has_cpp_attribute" | "__has_attribute"
                | "__has_builtin" | "__has_feature" => {
                    i += 1;
                    if tokens.get(i).is_some_and(|t| t.is("(")) {
                        i = matching_paren(tokens, i).map_or(tokens.len(), |close| close + 1);
                    }
                    out.push(number("0", at));
                }
                "true" => {
                    out.push(number("1", at));
                    i += 1;
                }
                name if self.macros.contains_key(name) && !disabled.contains(name) => {
                    let Some(def) = self.macros.get(name).cloned() else { break };
                    let name = name.to_string();
                    self.callbacks.macro_used(&name, at);
                    let replacement = match &def.params {
                        None => {
                            i += 1;
                            def.body.clone()
                        }
                        Some(params) => {
                            if !tokens.get(i + 1).is_some_and(|t| t.is("(")) {
                                out.push(number("0", at));
                                i += 1;
                                continue;
                            }
                            let close = matching_paren(tokens, i + 1).unwrap_or(tokens.len() - 1);
                            let args = split_arguments(&tokens[i + 2..close.max(i + 2)]);
                            i = close + 1;
                            substitute(&def.body, params, &args)
                        }
                    };
                    disabled.insert(name.clone());
                    let expanded = self.expand_condition(&replacement, Some(at), disabled, depth + 1);
                    disabled.remove(&name);
                    out.extend(expanded);
                }
                _ => {
                    out.push(tok.clone());
                    i += 1;
                }
            }
        }
        out
    }
}

fn number(text: &str, range: SourceRange) -> Token {
    Token {
        kind: TokenKind::Number,
        text: text.to_string(),
        range,
    }
}

fn directive_text(d: &Directive) -> String {
    d.tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn condition_identifiers(tokens: &[Token]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for tok in tokens.iter().filter(|t| t.is_ident() && !t.is("defined")) {
        if !names.contains(&tok.text) {
            names.push(tok.text.clone());
        }
    }
    names
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        if tok.is("(") {
            depth += 1;
        } else if tok.is(")") {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn split_arguments(tokens: &[Token]) -> Vec<Vec<Token>> {
    let mut args = vec![Vec::new()];
    let mut depth = 0usize;
    for tok in tokens {
        if tok.is("(") {
            depth += 1;
        } else if tok.is(")") {
            depth = depth.saturating_sub(1);
        } else if tok.is(",") && depth == 0 {
            args.push(Vec::new());
            continue;
        }
        if let Some(last) = args.last_mut() {
            last.push(tok.clone());
        }
    }
    args
}

fn substitute(body: &[Token], params: &[String], args: &[Vec<Token>]) -> Vec<Token> {
    let mut out = Vec::with_capacity(body.len());
    for tok in body {
        let slot = if tok.is("__VA_ARGS__") {
            params.iter().position(|p| p == "...")
        } else if tok.is_ident() {
            params.iter().position(|p| *p == tok.text)
        } else {
            None
        };
        match slot {
            Some(idx) if tok.is("__VA_ARGS__") => {
                for (n, arg) in args.iter().enumerate().skip(idx) {
                    if n > idx {
                        out.push(Token {
                            kind: TokenKind::Punct,
                            text: ",".to_string(),
                            range: tok.range,
                        });
                    }
                    out.extend(arg.iter().cloned());
                }
            }
            Some(idx) => out.extend(args.get(idx).into_iter().flatten().cloned()),
            None => out.push(tok.clone()),
        }
    }
    out
}
