//! Integer expression evaluator for `#if` and `#elif`.
//!
//! Input tokens are already macro-expanded, `defined` is already folded and
//! remaining identifiers are already replaced by `0`.

use super::lexer::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(i64),
    Op(&'static str),
    LParen,
    RParen,
}

const OPERATORS: &[&str] = &[
    "||", "&&", "|", "^", "&", "==", "!=", "<=", ">=", "<", ">", "<<", ">>", "+", "-", "*", "/", "%",
    "!", "~", "?", ":", ",",
];

pub fn evaluate(tokens: &[Token]) -> Result<i64, String> {
    let toks = convert(tokens)?;
    if toks.is_empty() {
        return Err("expected value in expression".to_string());
    }
    let mut parser = ExprParser {
        toks: &toks,
        pos: 0,
        unevaluated: 0,
    };
    let value = parser.comma()?;
    if parser.pos != toks.len() {
        return Err("token is not a valid binary operator in a preprocessor subexpression".to_string());
    }
    Ok(value)
}

fn convert(tokens: &[Token]) -> Result<Vec<Tok>, String> {
    let mut out = Vec::with_capacity(tokens.len());
    for tok in tokens {
        match tok.kind {
            TokenKind::Number => out.push(Tok::Num(parse_integer(&tok.text)?)),
            TokenKind::Char => out.push(Tok::Num(parse_char(&tok.text)?)),
            TokenKind::Ident => out.push(Tok::Num(0)),
            TokenKind::Str => return Err("string literal in preprocessor expression".to_string()),
            TokenKind::Punct => match tok.text.as_str() {
                "(" => out.push(Tok::LParen),
                ")" => out.push(Tok::RParen),
                text => match OPERATORS.iter().find(|op| **op == text) {
                    Some(op) => out.push(Tok::Op(*op)),
                    None => return Err(format!("invalid token '{text}' at start of a preprocessor expression")),
                },
            },
        }
    }
    Ok(out)
}

/// Integer literal with C++ prefixes, digit separators and suffixes.
pub fn parse_integer(text: &str) -> Result<i64, String> {
    let cleaned: String = text.chars().filter(|c| *c != '\'').collect();
    let digits = cleaned.trim_end_matches(|c: char| matches!(c, 'u' | 'U' | 'l' | 'L' | 'z' | 'Z'));
    let lower = digits.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else if lower.len() > 1 && lower.starts_with('0') {
        u64::from_str_radix(&lower[1..], 8)
    } else {
        lower.parse::<u64>()
    };
    parsed
        .map(|v| v as i64)
        .map_err(|_| format!("invalid integer constant '{text}' in preprocessor expression"))
}

fn parse_char(text: &str) -> Result<i64, String> {
    let start = text.find('\'').ok_or_else(|| format!("invalid character constant {text}"))?;
    let inner = text[start + 1..].trim_end_matches('\'');
    let mut chars = inner.chars();
    let value = match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => 10,
            Some('t') => 9,
            Some('r') => 13,
            Some('0') => 0,
            Some('\\') => 92,
            Some('\'') => 39,
            Some('"') => 34,
            Some(c) => c as i64,
            None => return Err(format!("invalid character constant {text}")),
        },
        Some(c) => c as i64,
        None => return Err(format!("empty character constant {text}")),
    };
    Ok(value)
}

struct ExprParser<'a> {
    toks: &'a [Tok],
    pos: usize,
    /// Depth of operands skipped by `&&`, `||` or `?:`; their arithmetic
    /// cannot fail.
    unevaluated: usize,
}

fn binary_precedence(op: &str) -> Option<u8> {
    let prec = match op {
        "*" | "/" | "%" => 10,
        "+" | "-" => 9,
        "<<" | ">>" => 8,
        "<" | ">" | "<=" | ">=" => 7,
        "==" | "!=" => 6,
        "&" => 5,
        "^" => 4,
        "|" => 3,
        "&&" => 2,
        "||" => 1,
        _ => return None,
    };
    Some(prec)
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Tok::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn comma(&mut self) -> Result<i64, String> {
        let mut value = self.conditional()?;
        while self.peek_op() == Some(",") {
            self.pos += 1;
            value = self.conditional()?;
        }
        Ok(value)
    }

    fn conditional(&mut self) -> Result<i64, String> {
        let cond = self.binary(1)?;
        if self.peek_op() != Some("?") {
            return Ok(cond);
        }
        self.pos += 1;
        let then = self.operand(cond == 0, Self::comma)?;
        if self.peek_op() != Some(":") {
            return Err("expected ':' in conditional expression".to_string());
        }
        self.pos += 1;
        let otherwise = self.operand(cond != 0, Self::conditional)?;
        Ok(if cond != 0 { then } else { otherwise })
    }

    /// Parse with `parse`, unevaluated when `skipped`.
    fn operand<F>(&mut self, skipped: bool, parse: F) -> Result<i64, String>
    where
        F: FnOnce(&mut Self) -> Result<i64, String>,
    {
        if skipped {
            self.unevaluated += 1;
        }
        let value = parse(self);
        if skipped {
            self.unevaluated -= 1;
        }
        value
    }

    fn binary(&mut self, min_prec: u8) -> Result<i64, String> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_op() {
            let Some(prec) = binary_precedence(op) else { break };
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let skipped = match op {
                "&&" => lhs == 0,
                "||" => lhs != 0,
                _ => false,
            };
            let rhs = self.operand(skipped, |p| p.binary(prec + 1))?;
            lhs = apply(op, lhs, rhs, self.unevaluated > 0)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<i64, String> {
        match self.peek().cloned() {
            Some(Tok::Op(op @ ("!" | "~" | "-" | "+"))) => {
                self.pos += 1;
                let v = self.unary()?;
                Ok(match op {
                    "!" => (v == 0) as i64,
                    "~" => !v,
                    "-" => v.wrapping_neg(),
                    _ => v,
                })
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let v = self.comma()?;
                if self.peek() != Some(&Tok::RParen) {
                    return Err("expected ')' in preprocessor expression".to_string());
                }
                self.pos += 1;
                Ok(v)
            }
            Some(Tok::Num(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Tok::RParen) | Some(Tok::Op(_)) | None => {
                Err("expected value in expression".to_string())
            }
        }
    }
}

fn apply(op: &str, a: i64, b: i64, unevaluated: bool) -> Result<i64, String> {
    let v = match op {
        "*" => a.wrapping_mul(b),
        "/" | "%" if b == 0 && unevaluated => 0,
        "/" | "%" if b == 0 => return Err("division by zero in preprocessor expression".to_string()),
        "/" => a.wrapping_div(b),
        "%" => a.wrapping_rem(b),
        "+" => a.wrapping_add(b),
        "-" => a.wrapping_sub(b),
        "<<" => a.wrapping_shl(b as u32),
        ">>" => a.wrapping_shr(b as u32),
        "<" => (a < b) as i64,
        ">" => (a > b) as i64,
        "<=" => (a <= b) as i64,
        ">=" => (a >= b) as i64,
        "==" => (a == b) as i64,
        "!=" => (a != b) as i64,
        "&" => a & b,
        "^" => a ^ b,
        "|" => a | b,
        "&&" => (a != 0 && b != 0) as i64,
        "||" => (a != 0 || b != 0) as i64,
        _ => return Err(format!("unexpected operator '{op}'")),
    };
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lite::lexer::{tokenize, Item};

    fn eval(text: &str) -> Result<i64, String> {
        let tokens: Vec<Token> = tokenize(text)
            .items
            .into_iter()
            .filter_map(|item| match item {
                Item::Token(t) => Some(t),
                _ => None,
            })
            .collect();
        evaluate(&tokens)
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Ok(7));
        assert_eq!(eval("(1 + 2) * 3"), Ok(9));
        assert_eq!(eval("1 << 4 | 1"), Ok(17));
        assert_eq!(eval("-3 + ~0"), Ok(-4));
        assert_eq!(eval("201703L >= 201103L"), Ok(1));
        assert_eq!(eval("0x10 + 010 + 0b1"), Ok(25));
    }

    #[test]
    fn test_logic_and_ternary() {
        assert_eq!(eval("1 && 0 || 1"), Ok(1));
        assert_eq!(eval("!1"), Ok(0));
        assert_eq!(eval("0 ? 5 : 1 ? 6 : 7"), Ok(6));
        assert_eq!(eval("'A' == 65"), Ok(1));
    }

    #[test]
    fn test_skipped_operands_do_not_fail() {
        assert_eq!(eval("0 && 100 / 0 > 1"), Ok(0));
        assert_eq!(eval("1 || 1 % 0"), Ok(1));
        assert_eq!(eval("1 ? 2 : 3 / 0"), Ok(2));
        assert_eq!(eval("0 ? 1 / 0 : 4"), Ok(4));
        assert_eq!(eval("0 && (1 || 5 / 0)"), Ok(0));
        assert!(eval("1 && 100 / 0").is_err());
        assert!(eval("0 || 1 / 0").is_err());
    }

    #[test]
    fn test_errors() {
        assert!(eval("").is_err());
        assert!(eval("1 +").is_err());
        assert!(eval("(1").is_err());
        assert!(eval("1 / 0").is_err());
        assert!(eval("1 2").is_err());
        assert!(eval("\"str\"").is_err());
    }
}
