//! Source location tracking

use serde::{Deserialize, Serialize};

/// Identifier for a source file registered with the source manager
pub type FileId = u32;

const INVALID_FILE: FileId = FileId::MAX;

/// A byte range inside one source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub file: FileId,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(file: FileId, start: usize, end: usize) -> Self {
        Self { file, start, end }
    }

    /// The distinguished invalid span (synthesized nodes, missing locations)
    pub fn invalid() -> Self {
        Self {
            file: INVALID_FILE,
            start: 0,
            end: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.file != INVALID_FILE
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge two spans into the smallest span covering both.
    /// Merging with an invalid span yields the other operand.
    pub fn merge(self, other: Span) -> Span {
        if !self.is_valid() {
            return other;
        }
        if !other.is_valid() {
            return self;
        }
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}..{}", self.start, self.end)
        } else {
            write!(f, "<invalid>")
        }
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

/// A name appearing in source, with the span it was written at.
/// Synthesized identifiers carry an invalid span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    pub fn synthetic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span: Span::invalid(),
        }
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
