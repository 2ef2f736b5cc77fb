//! Lexer implementation using logos

mod token;

pub use token::{is_keyword, Token, TokenKind, KEYWORDS};

use crate::ast::{FileId, Span};
use crate::error::{CompileError, Result};
use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
enum RawToken {
    /// Block comment; payload is false when the closing `*/` is missing
    #[token("/*", lex_block_comment)]
    BlockComment(bool),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Word,

    #[regex(r"[0-9][0-9_]*(i32|u32|isize|usize)?")]
    Number,

    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,

    #[regex(r#"c"([^"\\]|\\.)*""#)]
    CStr,

    #[regex(r"'([^'\\]|\\.)'")]
    Char,

    // Maximal munch is resolved by logos longest-match
    #[token(">>=")]
    #[token("<<=")]
    #[token("==")]
    #[token("!=")]
    #[token("<=")]
    #[token(">=")]
    #[token("&&")]
    #[token("||")]
    #[token("..")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("&=")]
    #[token("|=")]
    #[token("^=")]
    #[token("<<")]
    #[token(">>")]
    #[token("->")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("%")]
    #[token("&")]
    #[token("|")]
    #[token("^")]
    #[token("!")]
    #[token("=")]
    #[token("<")]
    #[token(">")]
    #[token(".")]
    #[token("@")]
    Operator,

    #[token("{")]
    #[token("}")]
    #[token("(")]
    #[token(")")]
    #[token("[")]
    #[token("]")]
    Delimiter,

    #[token("::")]
    #[token(",")]
    #[token(";")]
    #[token(":")]
    Separator,
}

fn lex_block_comment(lex: &mut logos::Lexer<RawToken>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => {
            lex.bump(lex.remainder().len());
            false
        }
    }
}

/// Tokenize source code into the flat token stream, ending with an Eof token
pub fn tokenize(source: &str, file: FileId) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut lexer = RawToken::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::new(file, lexer.span().start, lexer.span().end);
        let slice = lexer.slice();
        match result {
            Ok(RawToken::BlockComment(true)) => {}
            Ok(RawToken::BlockComment(false)) => {
                return Err(CompileError::lexer("unterminated block comment", span));
            }
            Ok(RawToken::Word) => {
                let kind = if is_keyword(slice) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                };
                tokens.push(Token::new(kind, slice, span));
            }
            Ok(RawToken::Number) => tokens.push(Token::new(TokenKind::Number, slice, span)),
            Ok(RawToken::Str) => {
                let content = unescape(&slice[1..slice.len() - 1], span)?;
                tokens.push(Token::new(TokenKind::String, content, span));
            }
            Ok(RawToken::CStr) => {
                let content = unescape(&slice[2..slice.len() - 1], span)?;
                tokens.push(Token::new(TokenKind::CString, content, span));
            }
            Ok(RawToken::Char) => {
                let content = unescape(&slice[1..slice.len() - 1], span)?;
                if content.chars().count() != 1 {
                    return Err(CompileError::lexer("invalid character literal", span));
                }
                tokens.push(Token::new(TokenKind::Char, content, span));
            }
            Ok(RawToken::Operator) => tokens.push(Token::new(TokenKind::Operator, slice, span)),
            Ok(RawToken::Delimiter) => tokens.push(Token::new(TokenKind::Delimiter, slice, span)),
            Ok(RawToken::Separator) => tokens.push(Token::new(TokenKind::Separator, slice, span)),
            Err(()) => {
                let message = if slice.starts_with('"') || slice.starts_with("c\"") {
                    "unterminated string literal"
                } else if slice.starts_with('\'') {
                    "unterminated character literal"
                } else {
                    return Err(CompileError::lexer(
                        format!("unexpected character: {slice:?}"),
                        span,
                    ));
                };
                return Err(CompileError::lexer(message, span));
            }
        }
    }

    let end = source.len();
    tokens.push(Token::eof(Span::new(file, end, end)));
    Ok(tokens)
}

/// Resolve escape sequences inside a string/char literal body
fn unescape(body: &str, span: Span) -> Result<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                return Err(CompileError::lexer(
                    format!("unknown escape sequence: \\{other}"),
                    span,
                ));
            }
            None => {
                return Err(CompileError::lexer("incomplete escape sequence", span));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, 0).unwrap().iter().map(|t| t.kind).collect()
    }

    fn values(source: &str) -> Vec<String> {
        tokenize(source, 0)
            .unwrap()
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    #[test]
    fn test_empty_input_yields_eof() {
        let tokens = tokenize("", 0).unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_eof());
    }

    #[test]
    fn test_keywords_vs_identifiers() {
        let tokens = tokenize("fn main", 0).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[0].value, "fn");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].value, "main");
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        let tokens = tokenize("fnord iffy selfish", 0).unwrap();
        assert!(tokens[..3].iter().all(|t| t.kind == TokenKind::Identifier));
    }

    #[test]
    fn test_maximal_munch_operators() {
        assert_eq!(values(">>= >> > >= ->"), vec![">>=", ">>", ">", ">=", "->", ""]);
        assert_eq!(values("<<= << <="), vec!["<<=", "<<", "<=", ""]);
        assert_eq!(values("&& & &="), vec!["&&", "&", "&=", ""]);
    }

    #[test]
    fn test_adjacent_operators_munch_longest() {
        // `a>>=b` must lex `>>=` as one operator
        let tokens = tokenize("a>>=b", 0).unwrap();
        assert_eq!(tokens[1].value, ">>=");
        assert_eq!(tokens[1].kind, TokenKind::Operator);
    }

    #[test]
    fn test_separators() {
        let tokens = tokenize(":: : , ;", 0).unwrap();
        assert_eq!(tokens[0].value, "::");
        assert_eq!(tokens[1].value, ":");
        assert!(tokens[..4].iter().all(|t| t.kind == TokenKind::Separator));
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(
            kinds("{ } ( ) [ ]"),
            vec![
                TokenKind::Delimiter,
                TokenKind::Delimiter,
                TokenKind::Delimiter,
                TokenKind::Delimiter,
                TokenKind::Delimiter,
                TokenKind::Delimiter,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_keep_raw_slice() {
        let tokens = tokenize("1_000 42i32 7usize", 0).unwrap();
        assert_eq!(tokens[0].value, "1_000");
        assert_eq!(tokens[1].value, "42i32");
        assert_eq!(tokens[2].value, "7usize");
        assert!(tokens[..3].iter().all(|t| t.kind == TokenKind::Number));
    }

    #[test]
    fn test_string_literal_unescaped() {
        let tokens = tokenize(r#""hello\nworld""#, 0).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].value, "hello\nworld");
    }

    #[test]
    fn test_cstring_literal() {
        let tokens = tokenize(r#"c"abc""#, 0).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::CString);
        assert_eq!(tokens[0].value, "abc");
    }

    #[test]
    fn test_char_literal() {
        let tokens = tokenize(r"'a' '\n'", 0).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Char);
        assert_eq!(tokens[0].value, "a");
        assert_eq!(tokens[1].value, "\n");
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = tokenize("a // line\nb /* block */ c", 0).unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].value, "a");
        assert_eq!(tokens[1].value, "b");
        assert_eq!(tokens[2].value, "c");
    }

    #[test]
    fn test_unterminated_block_comment() {
        let err = tokenize("a /* never closed", 0).unwrap_err();
        assert!(err.message().contains("unterminated block comment"));
    }

    #[test]
    fn test_unknown_escape_is_error() {
        let err = tokenize(r#""bad\qescape""#, 0).unwrap_err();
        assert!(err.message().contains("unknown escape"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("let x = #", 0).unwrap_err();
        assert!(err.message().contains("unexpected character"));
    }

    #[test]
    fn test_spans_cover_tokens() {
        let tokens = tokenize("let abc", 0).unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 0, 3));
        assert_eq!(tokens[1].span, Span::new(0, 4, 7));
    }

    #[test]
    fn test_full_function_shape() {
        let src = "fn f(x: i32) -> i32 { x + 1 }";
        let tokens = tokenize(src, 0).unwrap();
        let vals: Vec<&str> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(
            vals,
            vec!["fn", "f", "(", "x", ":", "i32", ")", "->", "i32", "{", "x", "+", "1", "}", ""]
        );
    }
}
