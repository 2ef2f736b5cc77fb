//! Item AST nodes

use super::{Block, Expr, Identifier, Path, Pattern, Span, Type};
use serde::{Deserialize, Serialize};

/// A top-level or nested item with its source span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

impl Item {
    pub fn new(kind: ItemKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Item kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ItemKind {
    Function(Function),
    Struct(StructDef),
    Enum(EnumDef),
    Const(ConstItem),
    Trait(TraitDef),
    Impl(ImplBlock),
    TypeAlias(TypeAlias),
}

/// The receiver of a method: `self`, `mut self`, `&self` or `&mut self`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfParam {
    pub is_reference: bool,
    pub is_mutable: bool,
}

/// A positional parameter: `pattern : type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub pattern: Pattern,
    pub ty: Type,
    pub span: Span,
}

/// Function definition or signature (`body` is `None` for trait items
/// declared as `fn name(...);`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: Identifier,
    pub self_param: Option<SelfParam>,
    pub params: Vec<Param>,
    pub return_type: Option<Type>,
    pub body: Option<Block>,
}

/// A named struct field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructField {
    pub name: Identifier,
    pub ty: Type,
}

/// Struct definition; `struct Name;` has an empty field list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDef {
    pub name: Identifier,
    pub fields: Vec<StructField>,
}

/// Enum definition. Variants carry no payload in this subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: Identifier,
    pub variants: Vec<Identifier>,
}

/// `const NAME: Type = value;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstItem {
    pub name: Identifier,
    pub ty: Type,
    pub value: Expr,
}

/// `trait Name { items }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitDef {
    pub name: Identifier,
    pub items: Vec<Item>,
}

/// `impl Type { items }` or `impl Trait for Type { items }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplBlock {
    pub trait_path: Option<Path>,
    pub self_ty: Type,
    pub items: Vec<Item>,
}

/// `type Alias = Type;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeAlias {
    pub name: Identifier,
    pub ty: Type,
}
