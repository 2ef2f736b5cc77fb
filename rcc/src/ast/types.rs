//! Type AST nodes

use super::{Expr, Path, Span};
use serde::{Deserialize, Serialize};

/// A type annotation with its source span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Type {
    pub kind: TypeKind,
    pub span: Span,
}

impl Type {
    pub fn new(kind: TypeKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Built-in primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    I32,
    U32,
    Isize,
    Usize,
    Bool,
    Char,
    Str,
}

impl std::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::Isize => "isize",
            PrimitiveKind::Usize => "usize",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Str => "str",
        };
        write!(f, "{s}")
    }
}

impl PrimitiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "i32" => Some(PrimitiveKind::I32),
            "u32" => Some(PrimitiveKind::U32),
            "isize" => Some(PrimitiveKind::Isize),
            "usize" => Some(PrimitiveKind::Usize),
            "bool" => Some(PrimitiveKind::Bool),
            "char" => Some(PrimitiveKind::Char),
            "str" => Some(PrimitiveKind::Str),
            _ => None,
        }
    }
}

/// Type kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeKind {
    /// Named type
    Path(Path),
    /// Built-in primitive
    Primitive(PrimitiveKind),
    /// `[element; size]` with a compile-time size expression
    Array {
        element: Box<Type>,
        size: Box<Expr>,
    },
    /// `&T` / `&mut T`
    Reference {
        is_mut: bool,
        pointee: Box<Type>,
    },
    /// `()`
    Unit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_from_name() {
        assert_eq!(PrimitiveKind::from_name("i32"), Some(PrimitiveKind::I32));
        assert_eq!(PrimitiveKind::from_name("usize"), Some(PrimitiveKind::Usize));
        assert_eq!(PrimitiveKind::from_name("str"), Some(PrimitiveKind::Str));
        assert_eq!(PrimitiveKind::from_name("f64"), None);
    }

    #[test]
    fn test_primitive_display_roundtrip() {
        for kind in [
            PrimitiveKind::I32,
            PrimitiveKind::U32,
            PrimitiveKind::Isize,
            PrimitiveKind::Usize,
            PrimitiveKind::Bool,
            PrimitiveKind::Char,
            PrimitiveKind::Str,
        ] {
            let name = format!("{kind}");
            assert_eq!(PrimitiveKind::from_name(&name), Some(kind));
        }
    }
}
