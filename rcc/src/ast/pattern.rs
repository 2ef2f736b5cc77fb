//! Pattern AST nodes

use super::{Expr, Identifier, Path, Span};
use serde::{Deserialize, Serialize};

/// A pattern with its source span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

impl Pattern {
    pub fn new(kind: PatternKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Pattern kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PatternKind {
    /// Literal pattern, optionally negated (`-3`)
    Literal {
        expr: Box<Expr>,
        is_negative: bool,
    },
    /// `ref? mut? name`
    Binding {
        name: Identifier,
        is_ref: bool,
        is_mut: bool,
    },
    /// `_`
    Wildcard,
    /// `& pat` / `&mut pat`
    Reference {
        pattern: Box<Pattern>,
        is_mut: bool,
    },
    /// Path pattern (e.g. an enum variant)
    Path(Path),
}
