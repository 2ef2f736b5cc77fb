//! Abstract Syntax Tree definitions

mod expr;
mod item;
mod pattern;
mod span;
mod stmt;
mod types;

pub use expr::*;
pub use item::*;
pub use pattern::*;
pub use span::*;
pub use stmt::*;
pub use types::*;

use serde::{Deserialize, Serialize};

/// A program is a sequence of top-level items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub items: Vec<Item>,
}

/// One segment of a path: an identifier, `Self` or `self`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSegment {
    Ident(Identifier),
    SelfType(Span),
    SelfValue(Span),
}

impl PathSegment {
    pub fn name(&self) -> &str {
        match self {
            PathSegment::Ident(id) => &id.name,
            PathSegment::SelfType(_) => "Self",
            PathSegment::SelfValue(_) => "self",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            PathSegment::Ident(id) => id.span,
            PathSegment::SelfType(span) | PathSegment::SelfValue(span) => *span,
        }
    }
}

/// A `::`-separated path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub segments: Vec<PathSegment>,
}

impl Path {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// A single-identifier path
    pub fn from_ident(id: Identifier) -> Self {
        Self {
            segments: vec![PathSegment::Ident(id)],
        }
    }

    pub fn segment_names(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.name()).collect()
    }

    /// The single identifier of a one-segment path, if that is what this is
    pub fn as_single_ident(&self) -> Option<&Identifier> {
        match self.segments.as_slice() {
            [PathSegment::Ident(id)] => Some(id),
            _ => None,
        }
    }

    pub fn span(&self) -> Span {
        self.segments
            .iter()
            .fold(Span::invalid(), |acc, seg| acc.merge(seg.span()))
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.segment_names();
        write!(f, "{}", names.join("::"))
    }
}

/// A brace-delimited block: statements plus an optional trailing expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub final_expr: Option<Box<Expr>>,
    pub span: Span,
}
