//! Statement and block parsing

use super::tokens::{kw, sep, P};
use crate::ast::{Block, Expr, Item, Pattern, Stmt, StmtKind, Type};
use crate::parsec::Parser;

/// Build the statement grammar
pub fn stmt_parser(expr: &P<Expr>, item: &P<Item>, pattern: &P<Pattern>, ty: &P<Type>) -> P<Stmt> {
    // a bare `;`
    let empty = sep(";").map(|t| Stmt::new(StmtKind::Empty, t.span));

    // `let pat (: ty)? (= expr)? ;`
    let let_stmt = kw("let")
        .and_then(pattern)
        .and_then(&sep(":").and_then(ty).optional())
        .and_then(&super::tokens::op("=").and_then(expr).optional())
        .and_then(&sep(";"))
        .map(|((((let_tok, pat), annotation), initializer), semi)| {
            Stmt::new(
                StmtKind::Let {
                    pattern: pat,
                    ty: annotation.map(|(_, t)| t),
                    init: initializer.map(|(_, e)| e),
                },
                let_tok.span.merge(semi.span),
            )
        });

    let item_stmt = item.map(|i| {
        let span = i.span;
        Stmt::new(StmtKind::Item(Box::new(i)), span)
    });

    // An expression followed by `;`; the semicolon is optional only for
    // expressions with block form.
    let expr_stmt = {
        let expr = expr.clone();
        let semi = sep(";");
        Parser::new(move |ctx| {
            let e = expr.parse(ctx)?;
            match semi.parse(ctx) {
                Ok(semi_tok) => {
                    let span = e.span.merge(semi_tok.span);
                    Ok(Stmt::new(
                        StmtKind::Expr {
                            expr: e,
                            has_semicolon: true,
                        },
                        span,
                    ))
                }
                Err(err) => {
                    if e.has_block_form() {
                        let span = e.span;
                        Ok(Stmt::new(
                            StmtKind::Expr {
                                expr: e,
                                has_semicolon: false,
                            },
                            span,
                        ))
                    } else {
                        Err(err)
                    }
                }
            }
        })
    };

    empty
        .or_else(&let_stmt)
        .or_else(&item_stmt)
        .or_else(&expr_stmt)
        .label("statement")
        .context("statement")
}

/// Build the block grammar: `{ stmt* final_expr? }`. A trailing
/// semicolon-free expression-with-block statement is promoted into the
/// final-expression slot.
pub fn block_parser(stmt: &P<Stmt>, expr: &P<Expr>) -> P<Block> {
    super::tokens::delim("{")
        .and_then(&stmt.many())
        .and_then(&expr.optional())
        .and_then(&super::tokens::delim("}"))
        .map(|(((lbrace, mut statements), mut final_expr), rbrace)| {
            if final_expr.is_none() {
                let promote = matches!(
                    statements.last(),
                    Some(Stmt {
                        kind: StmtKind::Expr {
                            has_semicolon: false,
                            ..
                        },
                        ..
                    })
                );
                if promote {
                    if let Some(Stmt {
                        kind: StmtKind::Expr { expr, .. },
                        ..
                    }) = statements.pop()
                    {
                        final_expr = Some(expr);
                    }
                }
            }
            Block {
                statements,
                final_expr: final_expr.map(Box::new),
                span: lbrace.span.merge(rbrace.span),
            }
        })
        .context("block")
}
