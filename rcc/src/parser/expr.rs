//! Expression parsing: atoms, postfix/cast/unary layering and the Pratt
//! infix table

use super::tokens::{
    char_lit, cstring_lit, delim, ident, kw, number, op, parse_integer, sep, string_lit, P,
};
use crate::ast::{
    AssignOp, BinaryOp, Block, Expr, ExprKind, FieldInit, Identifier, Path, Span, Type, UnaryOp,
};
use crate::lexer::Token;
use crate::parsec::{lazy, ParseError, Parser, PrattBuilder};

/// One parsed postfix operation, applied left-to-right atop the atom
enum Postfix {
    Call(Vec<Expr>, Span),
    Index(Expr, Span),
    Method(Identifier, Vec<Expr>, Span),
    Field(Identifier),
}

fn op_matcher(sym: &'static str) -> impl Fn(&Token) -> bool {
    move |t: &Token| t.is_operator(sym)
}

fn mk_binary(bin_op: BinaryOp) -> impl Fn(Expr, Expr) -> Expr {
    move |left, right| {
        let span = left.span.merge(right.span);
        Expr::new(
            ExprKind::Binary {
                op: bin_op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }
}

fn mk_assign(assign_op: AssignOp) -> impl Fn(Expr, Expr) -> Expr {
    move |left, right| {
        let span = left.span.merge(right.span);
        Expr::new(
            ExprKind::Assign {
                op: assign_op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }
}

/// Build the expression grammar. `expr` is the lazy handle for recursion;
/// `block` and `ty` come from the sibling grammars.
pub fn expr_parser(expr: &P<Expr>, block: &P<Block>, ty: &P<Type>, path: &P<Path>) -> P<Expr> {
    let comma = sep(",");

    // --- literals ---

    let integer = {
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
    let cstring = cstring_lit().map(|t| {
        Expr::new(
            ExprKind::StringLiteral {
                value: t.value,
                is_cstyle: true,
            },
            t.span,
        )
    });
    let literal = integer
        .or_else(&boolean)
        .or_else(&character)
        .or_else(&string)
        .or_else(&cstring)
        .label("literal");

    // --- grouped ---

    let grouped = delim("(")
        .and_then(expr)
        .and_then(&delim(")"))
        .map(|((l, inner), r)| {
            Expr::new(ExprKind::Grouped(Box::new(inner)), l.span.merge(r.span))
        });

    // --- arrays: [v; n] before [a, b, c] ---

    let array_repeat = delim("[")
        .and_then(expr)
        .and_then(&sep(";"))
        .and_then(expr)
        .and_then(&delim("]"))
        .map(|((((l, value), _), count), r)| {
            Expr::new(
                ExprKind::ArrayRepeat {
                    value: Box::new(value),
                    count: Box::new(count),
                },
                l.span.merge(r.span),
            )
        });
    let array_init = delim("[")
        .and_then(&expr.sep_by_trailing(&comma))
        .and_then(&delim("]"))
        .map(|((l, elements), r)| {
            Expr::new(ExprKind::ArrayInit(elements), l.span.merge(r.span))
        });
    let array = array_repeat.or_else(&array_init);

    // --- struct literal, then plain path ---

    let field_init = ident()
        .and_then(&sep(":"))
        .and_then(expr)
        .map(|((name, _), value)| {
            let span = name.span.merge(value.span);
            FieldInit { name, value, span }
        });
    let struct_literal = {
        let path = path.clone();
        path.and_then(&delim("{"))
            .and_then(&field_init.sep_by_trailing(&comma))
            .and_then(&delim("}"))
            .map(|(((p, _), fields), r)| {
                let span = p.span().merge(r.span);
                Expr::new(ExprKind::StructLiteral { path: p, fields }, span)
            })
    };

    let path_expr = {
        let path = path.clone();
        Parser::new(move |ctx| {
            let p = path.parse(ctx)?;
            let span = p.span();
            if p.as_single_ident().is_some_and(|id| id.name == "_") {
                Ok(Expr::new(ExprKind::Underscore, span))
            } else {
                Ok(Expr::new(ExprKind::Path(p), span))
            }
        })
    };

    // --- expressions with block ---

    let block_expr = block.map(|b| {
        let span = b.span;
        Expr::new(ExprKind::Block(Box::new(b)), span)
    });

    let if_expr = {
        let (if_lazy, set_if) = lazy::<Expr, Token>();
        let else_tail = kw("else").and_then(&if_lazy.or_else(&block_expr));
        let body = kw("if")
            .and_then(expr)
            .and_then(block)
            .and_then(&else_tail.optional())
            .map(|(((if_tok, condition), then_branch), else_part)| {
                let mut span = if_tok.span.merge(then_branch.span);
                let else_branch = else_part.map(|(_, e)| {
                    span = span.merge(e.span);
                    Box::new(e)
                });
                Expr::new(
                    ExprKind::If {
                        condition: Box::new(condition),
                        then_branch: Box::new(then_branch),
                        else_branch,
                    },
                    span,
                )
            });
        set_if.set(body.clone());
        body
    };

    let while_expr = kw("while")
        .and_then(expr)
        .and_then(block)
        .map(|((while_tok, condition), body)| {
            let span = while_tok.span.merge(body.span);
            Expr::new(
                ExprKind::While {
                    condition: Box::new(condition),
                    body: Box::new(body),
                },
                span,
            )
        });

    let loop_expr = kw("loop").and_then(block).map(|(loop_tok, body)| {
        let span = loop_tok.span.merge(body.span);
        Expr::new(ExprKind::Loop { body: Box::new(body) }, span)
    });

    let with_block = block_expr
        .or_else(&if_expr)
        .or_else(&while_expr)
        .or_else(&loop_expr);

    // --- control transfer ---

    let return_expr = kw("return").and_then(&expr.optional()).map(|(ret, value)| {
        let span = value
            .as_ref()
            .map(|v| ret.span.merge(v.span))
            .unwrap_or(ret.span);
        Expr::new(
            ExprKind::Return {
                value: value.map(Box::new),
            },
            span,
        )
    });

    // The token contract carries no lifetime tokens, so a break label can
    // never appear in the stream; the AST slot stays for completeness.
    let break_expr = kw("break").and_then(&expr.optional()).map(|(brk, value)| {
        let span = value
            .as_ref()
            .map(|v| brk.span.merge(v.span))
            .unwrap_or(brk.span);
        Expr::new(
            ExprKind::Break {
                label: None,
                value: value.map(Box::new),
            },
            span,
        )
    });

    let continue_expr =
        kw("continue").map(|t| Expr::new(ExprKind::Continue { label: None }, t.span));

    let atom = literal
        .or_else(&grouped)
        .or_else(&array)
        .or_else(&struct_literal)
        .or_else(&path_expr)
        .or_else(&with_block)
        .or_else(&return_expr)
        .or_else(&break_expr)
        .or_else(&continue_expr)
        .label("an atomic expression");

    // --- postfix chain: call, index, method call, field access ---

    let call_args = delim("(")
        .and_then(&expr.sep_by_trailing(&comma))
        .and_then(&delim(")"))
        .map(|((_, args), r)| (args, r.span));

    let call_post = call_args.map(|(args, end)| Postfix::Call(args, end));
    let index_post = delim("[")
        .and_then(expr)
        .and_then(&delim("]"))
        .map(|((_, index), r)| Postfix::Index(index, r.span));
    let dot_post = op(".")
        .and_then(&ident())
        .and_then(&call_args.optional())
        .map(|((_, name), args)| match args {
            Some((args, end)) => Postfix::Method(name, args, end),
            None => Postfix::Field(name),
        });
    let postfix_op = call_post.or_else(&index_post).or_else(&dot_post);

    let postfix = atom.and_then(&postfix_op.many()).map(|(base, posts)| {
        posts.into_iter().fold(base, |object, post| match post {
            Postfix::Call(args, end) => {
                let span = object.span.merge(end);
                Expr::new(
                    ExprKind::Call {
                        callee: Box::new(object),
                        args,
                    },
                    span,
                )
            }
            Postfix::Index(index, end) => {
                let span = object.span.merge(end);
                Expr::new(
                    ExprKind::Index {
                        array: Box::new(object),
                        index: Box::new(index),
                    },
                    span,
                )
            }
            Postfix::Method(method, args, end) => {
                let span = object.span.merge(end);
                Expr::new(
                    ExprKind::MethodCall {
                        receiver: Box::new(object),
                        method,
                        args,
                    },
                    span,
                )
            }
            Postfix::Field(field) => {
                let span = object.span.merge(field.span);
                Expr::new(
                    ExprKind::FieldAccess {
                        object: Box::new(object),
                        field,
                    },
                    span,
                )
            }
        })
    });

    // --- unary prefix (tighter than any infix) ---

    let prefix_single = op("!")
        .map(|t| vec![(UnaryOp::Not, t.span)])
        .or_else(&op("-").map(|t| vec![(UnaryOp::Negate, t.span)]))
        .or_else(&op("*").map(|t| vec![(UnaryOp::Deref, t.span)]))
        .or_else(&op("&").and_then(&kw("mut").optional()).map(|(t, m)| {
            let uop = if m.is_some() {
                UnaryOp::RefMut
            } else {
                UnaryOp::Ref
            };
            vec![(uop, t.span)]
        }))
        // `&&x` lexes as one token; it is two reference operators here
        .or_else(&op("&&").and_then(&kw("mut").optional()).map(|(t, m)| {
            let inner = if m.is_some() {
                UnaryOp::RefMut
            } else {
                UnaryOp::Ref
            };
            vec![(UnaryOp::Ref, t.span), (inner, t.span)]
        }));

    let unary = prefix_single
        .many()
        .and_then(&postfix)
        .map(|(prefixes, operand)| {
            let ops: Vec<(UnaryOp, Span)> = prefixes.into_iter().flatten().collect();
            ops.into_iter().rev().fold(operand, |inner, (uop, op_span)| {
                let span = op_span.merge(inner.span);
                Expr::new(
                    ExprKind::Unary {
                        op: uop,
                        operand: Box::new(inner),
                    },
                    span,
                )
            })
        });

    // --- cast chain, left-associative above unary ---

    let cast = unary
        .and_then(&kw("as").and_then(ty).many())
        .map(|(base, casts)| {
            casts.into_iter().fold(base, |inner, (_, target)| {
                let span = inner.span.merge(target.span);
                Expr::new(
                    ExprKind::Cast {
                        expr: Box::new(inner),
                        ty: Box::new(target),
                    },
                    span,
                )
            })
        });

    // --- infix table ---

    let mut builder = PrattBuilder::new().with_atom_parser(cast);

    let assign_ops: [(&'static str, AssignOp); 11] = [
        ("=", AssignOp::Assign),
        ("+=", AssignOp::AddAssign),
        ("-=", AssignOp::SubAssign),
        ("*=", AssignOp::MulAssign),
        ("/=", AssignOp::DivAssign),
        ("%=", AssignOp::RemAssign),
        ("&=", AssignOp::BitAndAssign),
        ("|=", AssignOp::BitOrAssign),
        ("^=", AssignOp::BitXorAssign),
        ("<<=", AssignOp::ShlAssign),
        (">>=", AssignOp::ShrAssign),
    ];
    for (sym, aop) in assign_ops {
        builder = builder.add_infix_right(op_matcher(sym), 10, mk_assign(aop));
    }

    builder = builder
        .add_infix_left(op_matcher("||"), 20, mk_binary(BinaryOp::Or))
        .add_infix_left(op_matcher("&&"), 30, mk_binary(BinaryOp::And))
        .add_infix_left(op_matcher("=="), 40, mk_binary(BinaryOp::Eq))
        .add_infix_left(op_matcher("!="), 40, mk_binary(BinaryOp::Ne))
        .add_infix_left(op_matcher("<"), 40, mk_binary(BinaryOp::Lt))
        .add_infix_left(op_matcher(">"), 40, mk_binary(BinaryOp::Gt))
        .add_infix_left(op_matcher("<="), 40, mk_binary(BinaryOp::Le))
        .add_infix_left(op_matcher(">="), 40, mk_binary(BinaryOp::Ge))
        .add_infix_left(op_matcher("|"), 41, mk_binary(BinaryOp::BitOr))
        .add_infix_left(op_matcher("^"), 42, mk_binary(BinaryOp::BitXor))
        .add_infix_left(op_matcher("&"), 45, mk_binary(BinaryOp::BitAnd))
        .add_infix_left(op_matcher("<<"), 48, mk_binary(BinaryOp::Shl))
        .add_infix_left(op_matcher(">>"), 48, mk_binary(BinaryOp::Shr))
        .add_infix_left(op_matcher("+"), 50, mk_binary(BinaryOp::Add))
        .add_infix_left(op_matcher("-"), 50, mk_binary(BinaryOp::Sub))
        .add_infix_left(op_matcher("*"), 60, mk_binary(BinaryOp::Mul))
        .add_infix_left(op_matcher("/"), 60, mk_binary(BinaryOp::Div))
        .add_infix_left(op_matcher("%"), 60, mk_binary(BinaryOp::Rem));

    let pratt = builder.build();

    // Guard against very deep expression nesting
    Parser::new(move |ctx| {
        stacker::maybe_grow(crate::parser::STACK_RED_ZONE, crate::parser::STACK_GROW_SIZE, || {
            pratt.parse(ctx)
        })
    })
    .context("expression")
}
