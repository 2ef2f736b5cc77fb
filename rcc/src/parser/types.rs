//! Type annotation parsing

use super::tokens::{delim, kw, op, sep, P};
use crate::ast::{Expr, Path, PrimitiveKind, Type, TypeKind};
use crate::lexer::TokenKind;
use crate::parsec::{satisfy, Parser};

/// Build the type grammar. `ty` is the lazy handle for recursion and
/// `expr` parses array size expressions.
pub fn type_parser(ty: &P<Type>, expr: &P<Expr>, path: &P<Path>) -> P<Type> {
    // ()
    let unit = delim("(")
        .and_then(&delim(")"))
        .map(|(l, r)| Type::new(TypeKind::Unit, l.span.merge(r.span)));

    // i32, u32, isize, usize, bool, char, str
    let primitive = satisfy(
        |t: &crate::lexer::Token| {
            t.kind == TokenKind::Identifier && PrimitiveKind::from_name(&t.value).is_some()
        },
        "primitive type",
    )
    .map(|t| {
        let kind = PrimitiveKind::from_name(&t.value).unwrap();
        Type::new(TypeKind::Primitive(kind), t.span)
    });

    // [T; size]
    let array = delim("[")
        .and_then(ty)
        .and_then(&sep(";"))
        .and_then(expr)
        .and_then(&delim("]"))
        .map(|((((l, element), _), size), r)| {
            Type::new(
                TypeKind::Array {
                    element: Box::new(element),
                    size: Box::new(size),
                },
                l.span.merge(r.span),
            )
        });

    // &T and &mut T
    let reference = op("&")
        .and_then(&kw("mut").optional())
        .and_then(ty)
        .map(|((amp, m), pointee)| {
            let span = amp.span.merge(pointee.span);
            Type::new(
                TypeKind::Reference {
                    is_mut: m.is_some(),
                    pointee: Box::new(pointee),
                },
                span,
            )
        });

    let path_type = {
        let path = path.clone();
        Parser::new(move |ctx| {
            let p = path.parse(ctx)?;
            let span = p.span();
            Ok(Type::new(TypeKind::Path(p), span))
        })
    };

    unit.or_else(&array)
        .or_else(&reference)
        .or_else(&primitive)
        .or_else(&path_type)
        .label("type")
}

#[cfg(test)]
mod tests {
    use crate::ast::{PrimitiveKind, TypeKind};
    use crate::lexer::tokenize;
    use crate::parsec::ParseContext;
    use crate::parser::build_registry;

    fn parse_type(source: &str) -> crate::ast::Type {
        let tokens = tokenize(source, 0).unwrap();
        let registry = build_registry();
        let mut ctx = ParseContext::new(&tokens);
        registry.ty.parse(&mut ctx).unwrap()
    }

    #[test]
    fn test_primitive_types() {
        assert!(matches!(
            parse_type("i32").kind,
            TypeKind::Primitive(PrimitiveKind::I32)
        ));
        assert!(matches!(
            parse_type("bool").kind,
            TypeKind::Primitive(PrimitiveKind::Bool)
        ));
        assert!(matches!(
            parse_type("str").kind,
            TypeKind::Primitive(PrimitiveKind::Str)
        ));
    }

    #[test]
    fn test_unit_type() {
        assert!(matches!(parse_type("()").kind, TypeKind::Unit));
    }

    #[test]
    fn test_reference_types() {
        let ty = parse_type("&i32");
        match ty.kind {
            TypeKind::Reference { is_mut, ref pointee } => {
                assert!(!is_mut);
                assert!(matches!(
                    pointee.kind,
                    TypeKind::Primitive(PrimitiveKind::I32)
                ));
            }
            _ => panic!("expected reference"),
        }

        assert!(matches!(
            parse_type("&mut bool").kind,
            TypeKind::Reference { is_mut: true, .. }
        ));
    }

    #[test]
    fn test_array_type() {
        let ty = parse_type("[i32; 4]");
        match ty.kind {
            TypeKind::Array { ref element, .. } => {
                assert!(matches!(
                    element.kind,
                    TypeKind::Primitive(PrimitiveKind::I32)
                ));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn test_nested_array_of_references() {
        let ty = parse_type("[&mut Point; 8]");
        match ty.kind {
            TypeKind::Array { ref element, .. } => {
                assert!(matches!(element.kind, TypeKind::Reference { is_mut: true, .. }));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn test_path_type() {
        let ty = parse_type("Point");
        assert!(matches!(ty.kind, TypeKind::Path(_)));
    }
}
