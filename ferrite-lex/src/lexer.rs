#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use ferrite_ast::{Span, span_between};
use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;

use crate::token::{TemplatePart, Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(ferrite::lex))]
#[allow(unused_assignments)]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f\u{FEFF}]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
enum RawToken {
    #[token("interface")]
    KwInterface,
    #[token("class")]
    KwClass,
    #[token("function")]
    KwFunction,
    #[token("export")]
    KwExport,
    #[token("async")]
    KwAsync,
    #[token("await")]
    KwAwait,
    #[token("return")]
    KwReturn,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("while")]
    KwWhile,
    #[token("let")]
    KwLet,
    #[token("const")]
    KwConst,
    #[token("var")]
    KwVar,
    #[token("new")]
    KwNew,
    #[token("this")]
    KwThis,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,
    #[token("null")]
    KwNull,
    #[token("undefined")]
    KwUndefined,
    #[token("extends")]
    KwExtends,
    #[token("implements")]
    KwImplements,
    #[token("import")]
    KwImport,

    #[token("=>")]
    FatArrow,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Neq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("|")]
    Pipe,
    #[token("?")]
    Question,

    #[token("=")]
    Eq,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token("@")]
    At,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[regex(r"0[xX][0-9a-fA-F_]+", |lex| parse_hex(lex.slice()))]
    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?([eE][+-]?[0-9]+)?", |lex| parse_decimal(lex.slice()))]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", |lex| parse_decimal(lex.slice()))]
    Number(Option<f64>),

    #[regex(r#""([^"\\\n]|\\[^\n]|\\\n)*""#, parse_string)]
    #[regex(r#"'([^'\\\n]|\\[^\n]|\\\n)*'"#, parse_string)]
    String(Option<String>),

    #[regex(r"`([^`\\]|\\[^\n]|\\\n)*`", parse_template)]
    Template(Option<Vec<TemplatePart>>),

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn strip_underscores(s: &str) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    if s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return None;
    }
    Some(s.replace('_', ""))
}

fn parse_decimal(s: &str) -> Option<f64> {
    // Underscores must sit between digits.
    if s.contains("_.") || s.contains("._") || s.contains("_e") || s.contains("_E") {
        return None;
    }
    let digits = strip_underscores(s)?;
    digits.parse::<f64>().ok()
}

fn parse_hex(s: &str) -> Option<f64> {
    let rest = s.get(2..)?;
    let digits = strip_underscores(rest)?;
    u64::from_str_radix(&digits, 16).ok().map(|n| n as f64)
}

fn parse_string(lex: &mut logos::Lexer<RawToken>) -> Option<String> {
    let s = lex.slice();
    let inner = s.get(1..s.len().saturating_sub(1))?;
    unescape(inner)
}

/// Decodes script escapes. Unknown escapes keep the escaped character.
fn unescape(inner: &str) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        let esc = chars.next()?;
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            'v' => out.push('\u{000B}'),
            '0' => out.push('\0'),
            // Line continuation.
            '\n' => {}
            'x' => {
                let hex: String = [chars.next()?, chars.next()?].iter().collect();
                let cp = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(cp)?);
            }
            'u' => {
                let mut hex = String::new();
                if chars.peek() == Some(&'{') {
                    chars.next();
                    loop {
                        let ch = chars.next()?;
                        if ch == '}' {
                            break;
                        }
                        hex.push(ch);
                        if hex.len() > 6 {
                            return None;
                        }
                    }
                } else {
                    for _ in 0..4 {
                        hex.push(chars.next()?);
                    }
                }
                if hex.is_empty() {
                    return None;
                }
                let cp = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(cp)?);
            }
            other => out.push(other),
        }
    }

    Some(out)
}

fn parse_template(lex: &mut logos::Lexer<RawToken>) -> Option<Vec<TemplatePart>> {
    let s = lex.slice();
    let inner = s.get(1..s.len().saturating_sub(1))?;
    let bytes = inner.as_bytes();

    let mut parts = Vec::new();
    let mut text_start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                parts.push(TemplatePart::Str(unescape(inner.get(text_start..i)?)?));

                let expr_start = i + 2;
                let mut depth = 1usize;
                let mut j = expr_start;
                let mut quote: Option<u8> = None;
                while j < bytes.len() {
                    let b = bytes[j];
                    match quote {
                        Some(q) => {
                            if b == b'\\' {
                                j += 1;
                            } else if b == q {
                                quote = None;
                            }
                        }
                        None => match b {
                            b'"' | b'\'' => quote = Some(b),
                            b'{' => depth += 1,
                            b'}' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        },
                    }
                    j += 1;
                }
                if depth != 0 {
                    return None;
                }

                parts.push(TemplatePart::Expr {
                    src: inner.get(expr_start..j)?.to_string(),
                    // +1 for the opening backtick
                    start: expr_start + 1,
                });
                i = j + 1;
                text_start = i;
            }
            _ => i += 1,
        }
    }

    parts.push(TemplatePart::Str(unescape(inner.get(text_start..)?)?));
    Some(parts)
}

pub struct Lexer<'a> {
    src: &'a str,
    base: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, base: 0 }
    }

    /// Lexes a fragment that sits at byte offset `base` of a larger source,
    /// so spans stay absolute. Used for template substitutions.
    pub fn with_offset(src: &'a str, base: usize) -> Self {
        Self { src, base }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut prev_end = 0usize;

        let mut lex = RawToken::lexer(self.src);
        while let Some(raw) = lex.next() {
            let range = lex.span();
            let abs_start = self.base + range.start;
            let abs_end = self.base + range.end;
            let span = span_between(abs_start, abs_end);

            let newline_before = !tokens.is_empty()
                && self
                    .src
                    .get(prev_end..range.start)
                    .is_some_and(|gap| gap.contains('\n'));
            prev_end = range.end;

            let kind = match raw {
                Ok(RawToken::KwInterface) => TokenKind::KwInterface,
                Ok(RawToken::KwClass) => TokenKind::KwClass,
                Ok(RawToken::KwFunction) => TokenKind::KwFunction,
                Ok(RawToken::KwExport) => TokenKind::KwExport,
                Ok(RawToken::KwAsync) => TokenKind::KwAsync,
                Ok(RawToken::KwAwait) => TokenKind::KwAwait,
                Ok(RawToken::KwReturn) => TokenKind::KwReturn,
                Ok(RawToken::KwIf) => TokenKind::KwIf,
                Ok(RawToken::KwElse) => TokenKind::KwElse,
                Ok(RawToken::KwWhile) => TokenKind::KwWhile,
                Ok(RawToken::KwLet) => TokenKind::KwLet,
                Ok(RawToken::KwConst) => TokenKind::KwConst,
                Ok(RawToken::KwVar) => TokenKind::KwVar,
                Ok(RawToken::KwNew) => TokenKind::KwNew,
                Ok(RawToken::KwThis) => TokenKind::KwThis,
                Ok(RawToken::KwTrue) => TokenKind::KwTrue,
                Ok(RawToken::KwFalse) => TokenKind::KwFalse,
                Ok(RawToken::KwNull) => TokenKind::KwNull,
                Ok(RawToken::KwUndefined) => TokenKind::KwUndefined,
                Ok(RawToken::KwExtends) => TokenKind::KwExtends,
                Ok(RawToken::KwImplements) => TokenKind::KwImplements,
                Ok(RawToken::KwImport) => TokenKind::KwImport,

                Ok(RawToken::FatArrow) => TokenKind::FatArrow,
                Ok(RawToken::EqEqEq) => TokenKind::EqEqEq,
                Ok(RawToken::NotEqEq) => TokenKind::NotEqEq,
                Ok(RawToken::EqEq) => TokenKind::EqEq,
                Ok(RawToken::Neq) => TokenKind::Neq,
                Ok(RawToken::Le) => TokenKind::Le,
                Ok(RawToken::Ge) => TokenKind::Ge,
                Ok(RawToken::Lt) => TokenKind::Lt,
                Ok(RawToken::Gt) => TokenKind::Gt,

                Ok(RawToken::PlusPlus) => TokenKind::PlusPlus,
                Ok(RawToken::MinusMinus) => TokenKind::MinusMinus,
                Ok(RawToken::PlusEq) => TokenKind::PlusEq,
                Ok(RawToken::MinusEq) => TokenKind::MinusEq,
                Ok(RawToken::StarEq) => TokenKind::StarEq,
                Ok(RawToken::SlashEq) => TokenKind::SlashEq,

                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::Minus) => TokenKind::Minus,
                Ok(RawToken::Star) => TokenKind::Star,
                Ok(RawToken::Slash) => TokenKind::Slash,
                Ok(RawToken::Percent) => TokenKind::Percent,

                Ok(RawToken::AndAnd) => TokenKind::AndAnd,
                Ok(RawToken::OrOr) => TokenKind::OrOr,
                Ok(RawToken::Bang) => TokenKind::Bang,
                Ok(RawToken::Pipe) => TokenKind::Pipe,
                Ok(RawToken::Question) => TokenKind::Question,

                Ok(RawToken::Eq) => TokenKind::Eq,
                Ok(RawToken::Dot) => TokenKind::Dot,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Colon) => TokenKind::Colon,
                Ok(RawToken::Semi) => TokenKind::Semi,
                Ok(RawToken::At) => TokenKind::At,

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBrace) => TokenKind::LBrace,
                Ok(RawToken::RBrace) => TokenKind::RBrace,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,

                Ok(RawToken::Ident(s)) => TokenKind::Ident(s),
                Ok(RawToken::Number(Some(n))) => TokenKind::Number(n),
                Ok(RawToken::Number(None)) => {
                    return Err(LexError {
                        message: "invalid number literal".to_string(),
                        span,
                    });
                }
                Ok(RawToken::String(Some(s))) => TokenKind::String(s),
                Ok(RawToken::String(None)) => {
                    return Err(LexError {
                        message: "invalid string literal".to_string(),
                        span,
                    });
                }
                Ok(RawToken::Template(Some(parts))) => TokenKind::Template(parts),
                Ok(RawToken::Template(None)) => {
                    return Err(LexError {
                        message: "invalid template literal".to_string(),
                        span,
                    });
                }

                Err(_) => {
                    let message = match self.src.get(range.clone()).and_then(|s| s.chars().next()) {
                        Some('"' | '\'') => "unterminated string literal".to_string(),
                        Some('`') => "unterminated template literal".to_string(),
                        Some(c) => format!("unexpected character `{c}`"),
                        None => "unexpected token".to_string(),
                    };
                    return Err(LexError { message, span });
                }
            };

            tokens.push(Token {
                kind,
                span,
                newline_before,
            });
        }

        let end = self.base + self.src.len();
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(end, end),
            newline_before: true,
        });

        Ok(tokens)
    }
}
