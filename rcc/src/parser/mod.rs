//! Parser: a combinator/Pratt grammar over the lexer's token stream
//!
//! The grammar is organized as a `ParserRegistry` built once per
//! compilation; recursive productions are tied together with lazy handles.

mod expr;
mod item;
mod path;
mod pattern;
mod stmt;
mod tokens;
mod types;

#[cfg(test)]
mod tests;

use crate::ast::{Program, Span};
use crate::error::{CompileError, Result};
use crate::lexer::Token;
use crate::parsec::{lazy, run, ParseError};

pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// All grammar entry points, built once and shared
pub struct ParserRegistry {
    pub program: crate::parsec::Parser<Program, Token>,
    pub item: crate::parsec::Parser<crate::ast::Item, Token>,
    pub stmt: crate::parsec::Parser<crate::ast::Stmt, Token>,
    pub expr: crate::parsec::Parser<crate::ast::Expr, Token>,
    pub block: crate::parsec::Parser<crate::ast::Block, Token>,
    pub pattern: crate::parsec::Parser<crate::ast::Pattern, Token>,
    pub ty: crate::parsec::Parser<crate::ast::Type, Token>,
    pub path: crate::parsec::Parser<crate::ast::Path, Token>,
}

/// Construct the grammar
pub fn build_registry() -> ParserRegistry {
    let (expr_h, set_expr) = lazy();
    let (stmt_h, set_stmt) = lazy();
    let (item_h, set_item) = lazy();
    let (pattern_h, set_pattern) = lazy();
    let (ty_h, set_ty) = lazy();
    let (block_h, set_block) = lazy();

    let path = path::path_parser();

    set_ty.set(types::type_parser(&ty_h, &expr_h, &path));
    set_pattern.set(pattern::pattern_parser(&pattern_h, &path));
    set_expr.set(expr::expr_parser(&expr_h, &block_h, &ty_h, &path));
    set_block.set(stmt::block_parser(&stmt_h, &expr_h));
    set_stmt.set(stmt::stmt_parser(&expr_h, &item_h, &pattern_h, &ty_h));
    set_item.set(item::item_parser(
        &item_h, &expr_h, &block_h, &pattern_h, &ty_h, &path,
    ));

    let program = item_h
        .many()
        .keep_left(&tokens::eof())
        .map(|items| Program { items });

    ParserRegistry {
        program,
        item: item_h,
        stmt: stmt_h,
        expr: expr_h,
        block: block_h,
        pattern: pattern_h,
        ty: ty_h,
        path,
    }
}

/// Parse a full token stream (including the trailing EOF token) into a
/// program. Returns the raw combinator error for callers that want to
/// render the failure position themselves.
pub fn parse_program(tokens: &[Token]) -> std::result::Result<Program, ParseError> {
    let registry = build_registry();
    run(&registry.program, tokens)
}

/// The span the parse error points at: the furthest token reached
pub fn error_span(error: &ParseError, tokens: &[Token]) -> Span {
    tokens
        .get(error.position)
        .or_else(|| tokens.last())
        .map(|t| t.span)
        .unwrap_or_else(Span::invalid)
}

/// Parse tokens into an AST, converting failures into `CompileError`
pub fn parse(tokens: &[Token]) -> Result<Program> {
    parse_program(tokens)
        .map_err(|e| CompileError::parser(format!("{e}"), error_span(&e, tokens)))
}
