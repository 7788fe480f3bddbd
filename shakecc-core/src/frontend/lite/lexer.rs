//! Tokenizer for the lite front end.
//!
//! Produces a flat stream of tokens and directive lines. A directive is kept
//! as one item holding its own tokens so the preprocessor never has to care
//! about line structure.

use crate::source::SourceRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Char,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub range: SourceRange,
}

impl Token {
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, TokenKind::Number | TokenKind::Str | TokenKind::Char)
    }

    /// User-defined literal suffix: `_km` in `5_km` or `"x"_s`.
    pub fn ud_suffix(&self) -> Option<&str> {
        let at = match self.kind {
            TokenKind::Number => self.text.find('_')?,
            TokenKind::Str => self.text.rfind('"')? + 1,
            TokenKind::Char => self.text.rfind('\'')? + 1,
            _ => return None,
        };
        let suffix = &self.text[at..];
        (suffix.len() > 1 && suffix.starts_with('_')).then_some(suffix)
    }
}

/// `#name tokens...` spanning whole physical lines.
#[derive(Debug, Clone)]
pub struct Directive {
    /// Directive name (`define`, `if`, ...); empty for a null directive.
    pub name: String,
    pub name_range: SourceRange,
    pub tokens: Vec<Token>,
    /// From the start of the line holding `#` to just past the final newline.
    pub range: SourceRange,
}

#[derive(Debug, Clone)]
pub enum Item {
    Token(Token),
    Directive(Directive),
    /// Malformed input. Kept in line with the tokens so that errors inside
    /// skipped conditional branches can be dropped.
    Error { offset: usize, message: String },
}

#[derive(Debug, Default)]
pub struct Lexed {
    pub items: Vec<Item>,
}

impl Lexed {
    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, Item::Error { .. }))
            .count()
    }
}

const PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "...", "->*", "<=>", "::", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=",
    "&&", "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "##", ".*",
];

const STRING_PREFIXES: &[&str] = &["u8R", "uR", "UR", "LR", "R", "u8", "u", "U", "L"];

pub fn tokenize(text: &str) -> Lexed {
    let mut lexer = Lexer {
        src: text.as_bytes(),
        text,
        pos: 0,
        out: Lexed::default(),
    };
    lexer.run();
    lexer.out
}

struct Lexer<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
    out: Lexed,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

impl<'a> Lexer<'a> {
    fn peek(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn run(&mut self) {
        let mut at_line_start = true;
        while self.pos < self.src.len() {
            let b = self.src[self.pos];
            match b {
                b'\n' => {
                    at_line_start = true;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'\\' if self.splice_len(self.pos) > 0 => {
                    self.pos += self.splice_len(self.pos);
                }
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                b'#' if at_line_start => {
                    let directive = self.lex_directive();
                    self.out.items.push(Item::Directive(directive));
                    at_line_start = true;
                }
                _ => {
                    at_line_start = false;
                    let limit = self.src.len();
                    if let Some(tok) = self.lex_token(limit) {
                        self.out.items.push(Item::Token(tok));
                    }
                }
            }
        }
    }

    /// Length of a backslash-newline at `at`, or 0.
    fn splice_len(&self, at: usize) -> usize {
        match (self.src.get(at + 1), self.src.get(at + 2)) {
            (Some(b'\n'), _) => 2,
            (Some(b'\r'), Some(b'\n')) => 3,
            _ => 0,
        }
    }

    fn skip_line_comment(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
            if self.src[self.pos] == b'\\' && self.splice_len(self.pos) > 0 {
                self.pos += self.splice_len(self.pos);
                continue;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        let start = self.pos;
        match self.text[self.pos + 2..].find("*/") {
            Some(rel) => self.pos += 2 + rel + 2,
            None => {
                self.error(start, "unterminated /* comment");
                self.pos = self.src.len();
            }
        }
    }

    /// Consume a directive starting at `#` up to the end of its logical line.
    fn lex_directive(&mut self) -> Directive {
        let line_start = match self.text[..self.pos].rfind('\n') {
            Some(nl) => nl + 1,
            None => 0,
        };
        self.pos += 1;

        // Find the end of the logical line, honoring splices and comments.
        let content_start = self.pos;
        let mut end = self.pos;
        while end < self.src.len() {
            match self.src[end] {
                b'\n' => break,
                b'\\' if self.splice_len(end) > 0 => end += self.splice_len(end),
                b'/' if self.src.get(end + 1) == Some(&b'*') => {
                    match self.text[end + 2..].find("*/") {
                        Some(rel) => end += 2 + rel + 2,
                        // Reported when the comment is skipped below.
                        None => end = self.src.len(),
                    }
                }
                b'/' if self.src.get(end + 1) == Some(&b'/') => {
                    while end < self.src.len() && self.src[end] != b'\n' {
                        end += 1;
                    }
                }
                q @ (b'"' | b'\'') => {
                    end += 1;
                    while end < self.src.len() && self.src[end] != q && self.src[end] != b'\n' {
                        if self.src[end] == b'\\' {
                            end += 1;
                        }
                        end += 1;
                    }
                    if end < self.src.len() && self.src[end] == q {
                        end += 1;
                    }
                }
                _ => end += 1,
            }
        }
        let content_end = end.min(self.src.len());
        let range_end = if content_end < self.src.len() {
            content_end + 1
        } else {
            content_end
        };

        let mut tokens = Vec::new();
        self.pos = content_start;
        while self.pos < content_end {
            let b = self.src[self.pos];
            match b {
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'\\' if self.splice_len(self.pos) > 0 => self.pos += self.splice_len(self.pos),
                b'\\' => self.pos += 1,
                b'/' if self.peek(1) == Some(b'/') => self.pos = content_end,
                b'/' if self.peek(1) == Some(b'*') => self.skip_block_comment(),
                _ => {
                    if let Some(tok) = self.lex_token(content_end) {
                        tokens.push(tok);
                    }
                }
            }
        }
        self.pos = range_end;

        let (name, name_range) = match tokens.first() {
            Some(first) if first.is_ident() => (first.text.clone(), first.range),
            _ => (String::new(), SourceRange::new(content_start, content_start)),
        };
        if !name.is_empty() {
            tokens.remove(0);
        }

        Directive {
            name,
            name_range,
            tokens,
            range: SourceRange::new(line_start, range_end),
        }
    }

    /// Lex one token at `self.pos`, never reading past `limit`.
    fn lex_token(&mut self, limit: usize) -> Option<Token> {
        let start = self.pos;
        let b = self.src[start];

        if is_ident_start(b) {
            let mut end = start + 1;
            while end < limit && is_ident_continue(self.src[end]) {
                end += 1;
            }
            let word = &self.text[start..end];
            if end < limit && STRING_PREFIXES.contains(&word) {
                let next = self.src[end];
                if next == b'"' {
                    self.pos = end;
                    return if word.ends_with('R') {
                        self.lex_raw_string(start, limit)
                    } else {
                        self.lex_quoted(start, b'"', TokenKind::Str, limit)
                    };
                }
                if next == b'\'' && !word.ends_with('R') {
                    self.pos = end;
                    return self.lex_quoted(start, b'\'', TokenKind::Char, limit);
                }
            }
            self.pos = end;
            return Some(self.token(TokenKind::Ident, start, end));
        }

        if b.is_ascii_digit() || (b == b'.' && self.src.get(start + 1).is_some_and(u8::is_ascii_digit)) {
            let mut end = start + 1;
            while end < limit {
                let c = self.src[end];
                if c.is_ascii_alphanumeric() || c == b'.' || c == b'_' {
                    end += 1;
                } else if c == b'\'' && self.src.get(end + 1).is_some_and(u8::is_ascii_alphanumeric) {
                    end += 1;
                } else if (c == b'+' || c == b'-') && self.exponent_sign(start, end) {
                    end += 1;
                } else {
                    break;
                }
            }
            self.pos = end;
            return Some(self.token(TokenKind::Number, start, end));
        }

        if b == b'"' {
            return self.lex_quoted(start, b'"', TokenKind::Str, limit);
        }
        if b == b'\'' {
            return self.lex_quoted(start, b'\'', TokenKind::Char, limit);
        }

        for punct in PUNCTUATORS {
            if self.text[start..limit].starts_with(punct) {
                self.pos = start + punct.len();
                return Some(self.token(TokenKind::Punct, start, self.pos));
            }
        }

        let width = self.text[start..].chars().next().map_or(1, char::len_utf8);
        self.pos = start + width;
        Some(self.token(TokenKind::Punct, start, self.pos))
    }

    /// A sign at `end` continues the number `start..end` as an exponent.
    fn exponent_sign(&self, start: usize, end: usize) -> bool {
        let hex = matches!(&self.text[start..end.min(start + 2)], "0x" | "0X");
        match self.src[end - 1] {
            b'e' | b'E' => !hex,
            b'p' | b'P' => hex,
            _ => false,
        }
    }

    /// Lex a quoted literal; `self.pos` sits on the opening quote and `start`
    /// is where the token (prefix included) begins.
    fn lex_quoted(&mut self, start: usize, quote: u8, kind: TokenKind, limit: usize) -> Option<Token> {
        let mut end = self.pos + 1;
        loop {
            if end >= limit || self.src[end] == b'\n' {
                let what = if quote == b'"' { "string" } else { "character" };
                self.error(start, format!("unterminated {what} literal"));
                break;
            }
            match self.src[end] {
                b'\\' => end += 2,
                c if c == quote => {
                    end += 1;
                    break;
                }
                _ => end += 1,
            }
        }
        let end = self.ud_suffix_end(end.min(limit), limit);
        self.pos = end;
        Some(self.token(kind, start, end))
    }

    /// End of a `_suffix` glued to the literal ending at `end`.
    fn ud_suffix_end(&self, end: usize, limit: usize) -> usize {
        if self.src.get(end) != Some(&b'_') {
            return end;
        }
        let mut stop = end + 1;
        while stop < limit && is_ident_continue(self.src[stop]) {
            stop += 1;
        }
        stop
    }

    /// `R"delim( ... )delim"`
    fn lex_raw_string(&mut self, start: usize, limit: usize) -> Option<Token> {
        let open = self.pos + 1;
        let delim_end = self.text[open..limit].find('(').map(|p| open + p);
        let Some(delim_end) = delim_end else {
            self.error(start, "invalid raw string delimiter");
            self.pos = limit;
            return Some(self.token(TokenKind::Str, start, limit));
        };
        let closing = format!("){}\"", &self.text[open..delim_end]);
        match self.text[delim_end..limit].find(&closing) {
            Some(rel) => {
                self.pos = self.ud_suffix_end(delim_end + rel + closing.len(), limit);
            }
            None => {
                self.error(start, "unterminated raw string literal");
                self.pos = limit;
            }
        }
        Some(self.token(TokenKind::Str, start, self.pos))
    }

    fn error(&mut self, offset: usize, message: impl Into<String>) {
        self.out.items.push(Item::Error {
            offset,
            message: message.into(),
        });
    }

    fn token(&self, kind: TokenKind, start: usize, end: usize) -> Token {
        Token {
            kind,
            text: self.text[start..end].to_string(),
            range: SourceRange::new(start, end),
        }
    }
}
