//! Pattern parsing

use super::tokens::{char_lit, ident, kw, number, op, parse_integer, string_lit, P};
use crate::ast::{Expr, ExprKind, Path, Pattern, PatternKind};
use crate::parsec::{ParseError, Parser};

/// Build the pattern grammar. `pattern` is the lazy handle for recursion.
pub fn pattern_parser(pattern: &P<Pattern>, path: &P<Path>) -> P<Pattern> {
    // `_`
    let wildcard = ident_exact("_").map(|id| Pattern::new(PatternKind::Wildcard, id.span));

    // literals, with optional leading minus
    let literal = {
        let lit = literal_expr();
        op("-")
            .optional()
            .and_then(&lit)
            .map(|(minus, expr)| {
                let span = minus
                    .as_ref()
                    .map(|m| m.span)
                    .unwrap_or(expr.span)
                    .merge(expr.span);
                Pattern::new(
                    PatternKind::Literal {
                        expr: Box::new(expr),
                        is_negative: minus.is_some(),
                    },
                    span,
                )
            })
    };

    // `&pat` / `&mut pat`
    let reference = op("&")
        .and_then(&kw("mut").optional())
        .and_then(pattern)
        .map(|((amp, m), inner)| {
            let span = amp.span.merge(inner.span);
            Pattern::new(
                PatternKind::Reference {
                    pattern: Box::new(inner),
                    is_mut: m.is_some(),
                },
                span,
            )
        });

    // multi-segment paths only; a single identifier is a binding
    let path_pattern = {
        let path = path.clone();
        Parser::new(move |ctx| {
            let start = ctx.position;
            let p = path.parse(ctx)?;
            if p.segments.len() < 2 {
                return Err(ParseError::expecting(start, "path pattern"));
            }
            let span = p.span();
            Ok(Pattern::new(PatternKind::Path(p), span))
        })
    };

    // `ref? mut? name`
    let binding = kw("ref")
        .optional()
        .and_then(&kw("mut").optional())
        .and_then(&ident())
        .map(|((r, m), name)| {
            let span = r
                .as_ref()
                .map(|t| t.span)
                .or(m.as_ref().map(|t| t.span))
                .unwrap_or(name.span)
                .merge(name.span);
            Pattern::new(
                PatternKind::Binding {
                    name,
                    is_ref: r.is_some(),
                    is_mut: m.is_some(),
                },
                span,
            )
        });

    wildcard
        .or_else(&reference)
        .or_else(&literal)
        .or_else(&path_pattern)
        .or_else(&binding)
        .label("pattern")
}

/// An identifier token with an exact spelling
pub fn ident_exact(name: &'static str) -> P<crate::ast::Identifier> {
    let base = ident();
    Parser::new(move |ctx| {
        let start = ctx.position;
        let id = base.parse(ctx)?;
        if id.name == name {
            Ok(id)
        } else {
            Err(ParseError::expecting(start, name))
        }
    })
}

/// The literal expressions a pattern may contain
fn literal_expr() -> P<Expr> {
    let int = {
        let num = number();
        Parser::new(move |ctx| {
            let start = ctx.position;
            let tok = num.parse(ctx)?;
            let (value, suffix) = parse_integer(&tok.value)
                .ok_or_else(|| ParseError::expecting(start, "integer literal"))?;
            Ok(Expr::new(ExprKind::IntegerLiteral { value, suffix }, tok.span))
        })
    };
    let boolean = kw("true")
        .map(|t| Expr::new(ExprKind::BoolLiteral(true), t.span))
        .or_else(&kw("false").map(|t| Expr::new(ExprKind::BoolLiteral(false), t.span)));
    let character = char_lit().map(|t| {
        let c = t.value.chars().next().unwrap_or('\0');
        Expr::new(ExprKind::CharLiteral(c), t.span)
    });
    let string = string_lit().map(|t| {
        Expr::new(
            ExprKind::StringLiteral {
                value: t.value,
                is_cstyle: false,
            },
            t.span,
        )
    });

    int.or_else(&boolean).or_else(&character).or_else(&string)
}

#[cfg(test)]
mod tests {
    use crate::ast::PatternKind;
    use crate::lexer::tokenize;
    use crate::parsec::ParseContext;
    use crate::parser::build_registry;

    fn parse_pattern(source: &str) -> crate::ast::Pattern {
        let tokens = tokenize(source, 0).unwrap();
        let registry = build_registry();
        let mut ctx = ParseContext::new(&tokens);
        registry.pattern.parse(&mut ctx).unwrap()
    }

    #[test]
    fn test_wildcard() {
        assert!(matches!(parse_pattern("_").kind, PatternKind::Wildcard));
    }

    #[test]
    fn test_binding() {
        match parse_pattern("x").kind {
            PatternKind::Binding { name, is_ref, is_mut } => {
                assert_eq!(name.name, "x");
                assert!(!is_ref);
                assert!(!is_mut);
            }
            _ => panic!("expected binding"),
        }
    }

    #[test]
    fn test_mut_binding() {
        assert!(matches!(
            parse_pattern("mut count").kind,
            PatternKind::Binding { is_mut: true, is_ref: false, .. }
        ));
        assert!(matches!(
            parse_pattern("ref x").kind,
            PatternKind::Binding { is_ref: true, .. }
        ));
        assert!(matches!(
            parse_pattern("ref mut x").kind,
            PatternKind::Binding { is_ref: true, is_mut: true, .. }
        ));
    }

    #[test]
    fn test_literal_patterns() {
        assert!(matches!(
            parse_pattern("42").kind,
            PatternKind::Literal { is_negative: false, .. }
        ));
        assert!(matches!(
            parse_pattern("-3").kind,
            PatternKind::Literal { is_negative: true, .. }
        ));
        assert!(matches!(
            parse_pattern("true").kind,
            PatternKind::Literal { .. }
        ));
    }

    #[test]
    fn test_reference_pattern() {
        assert!(matches!(
            parse_pattern("&x").kind,
            PatternKind::Reference { is_mut: false, .. }
        ));
        assert!(matches!(
            parse_pattern("&mut x").kind,
            PatternKind::Reference { is_mut: true, .. }
        ));
    }

    #[test]
    fn test_path_pattern() {
        assert!(matches!(
            parse_pattern("Color::Red").kind,
            PatternKind::Path(_)
        ));
    }
}
