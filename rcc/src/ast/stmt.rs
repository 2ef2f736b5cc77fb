//! Statement AST nodes

use super::{Expr, Item, Pattern, Span, Type};
use serde::{Deserialize, Serialize};

/// A statement with its source span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// `let pattern (: type)? (= init)? ;`
    Let {
        pattern: Pattern,
        ty: Option<Type>,
        init: Option<Expr>,
    },
    /// Expression statement. `has_semicolon` is false only for
    /// expressions-with-block at statement position.
    Expr {
        expr: Expr,
        has_semicolon: bool,
    },
    /// A bare `;`
    Empty,
    /// A nested item
    Item(Box<Item>),
}
