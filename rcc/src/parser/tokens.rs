//! Token-level parsers shared by the grammar modules

use crate::ast::{Identifier, IntSuffix};
use crate::lexer::{Token, TokenKind};
use crate::parsec::{satisfy, Parser};

pub type P<R> = Parser<R, Token>;

pub fn kw(word: &'static str) -> P<Token> {
    satisfy(move |t: &Token| t.is_keyword(word), word)
}

pub fn op(sym: &'static str) -> P<Token> {
    satisfy(move |t: &Token| t.is_operator(sym), sym)
}

pub fn sep(sym: &'static str) -> P<Token> {
    satisfy(move |t: &Token| t.is_separator(sym), sym)
}

pub fn delim(sym: &'static str) -> P<Token> {
    satisfy(move |t: &Token| t.is_delimiter(sym), sym)
}

pub fn eof() -> P<Token> {
    satisfy(|t: &Token| t.is_eof(), "end of file")
}

/// Any identifier token (including `_`)
pub fn ident() -> P<Identifier> {
    satisfy(|t: &Token| t.kind == TokenKind::Identifier, "identifier")
        .map(|t| Identifier::new(t.value, t.span))
}

pub fn number() -> P<Token> {
    satisfy(|t: &Token| t.kind == TokenKind::Number, "integer literal")
}

pub fn string_lit() -> P<Token> {
    satisfy(|t: &Token| t.kind == TokenKind::String, "string literal")
}

pub fn cstring_lit() -> P<Token> {
    satisfy(|t: &Token| t.kind == TokenKind::CString, "c-string literal")
}

pub fn char_lit() -> P<Token> {
    satisfy(|t: &Token| t.kind == TokenKind::Char, "character literal")
}

/// Split a raw number token into its numeric value and optional suffix.
/// Underscore digit separators are stripped.
pub fn parse_integer(raw: &str) -> Option<(u64, Option<IntSuffix>)> {
    let (digits, suffix) = if let Some(stripped) = raw.strip_suffix("i32") {
        (stripped, Some(IntSuffix::I32))
    } else if let Some(stripped) = raw.strip_suffix("u32") {
        (stripped, Some(IntSuffix::U32))
    } else if let Some(stripped) = raw.strip_suffix("isize") {
        (stripped, Some(IntSuffix::Isize))
    } else if let Some(stripped) = raw.strip_suffix("usize") {
        (stripped, Some(IntSuffix::Usize))
    } else {
        (raw, None)
    };
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<u64>().ok().map(|value| (value, suffix))
}
