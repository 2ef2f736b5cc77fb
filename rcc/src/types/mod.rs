//! Canonical type representation
//!
//! All structural types are interned into a per-compilation `TypeTable`;
//! a `TypeId` is a cheap handle and two structurally equal types always
//! share one id. The table is append-only: once minted, an id is never
//! reassigned.

use std::collections::HashMap;

/// Handle into the type table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle into the struct side table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(u32);

impl StructId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle into the enum side table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(u32);

impl EnumId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTy {
    Bool,
    Char,
    I32,
    U32,
    Isize,
    Usize,
    Str,
}

/// Structural type variants
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Primitive(PrimitiveTy),
    Unit,
    /// The type of diverging expressions; a subtype of every type
    Never,
    /// Unification placeholder
    Underscore,
    Struct(StructId),
    Enum(EnumId),
    Reference {
        pointee: TypeId,
        is_mutable: bool,
    },
    Array {
        element: TypeId,
        size: usize,
    },
}

/// Struct definition payload
#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: String,
    pub fields: Vec<(String, TypeId)>,
}

/// Enum definition payload
#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub name: String,
    pub variants: Vec<String>,
}

/// The per-compilation type interning table
pub struct TypeTable {
    types: Vec<Ty>,
    lookup: HashMap<Ty, TypeId>,
    structs: Vec<StructInfo>,
    enums: Vec<EnumInfo>,

    ty_bool: TypeId,
    ty_char: TypeId,
    ty_i32: TypeId,
    ty_u32: TypeId,
    ty_isize: TypeId,
    ty_usize: TypeId,
    ty_str: TypeId,
    ty_unit: TypeId,
    ty_never: TypeId,
    ty_underscore: TypeId,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            lookup: HashMap::new(),
            structs: Vec::new(),
            enums: Vec::new(),
            ty_bool: TypeId(0),
            ty_char: TypeId(0),
            ty_i32: TypeId(0),
            ty_u32: TypeId(0),
            ty_isize: TypeId(0),
            ty_usize: TypeId(0),
            ty_str: TypeId(0),
            ty_unit: TypeId(0),
            ty_never: TypeId(0),
            ty_underscore: TypeId(0),
        };
        table.ty_bool = table.intern(Ty::Primitive(PrimitiveTy::Bool));
        table.ty_char = table.intern(Ty::Primitive(PrimitiveTy::Char));
        table.ty_i32 = table.intern(Ty::Primitive(PrimitiveTy::I32));
        table.ty_u32 = table.intern(Ty::Primitive(PrimitiveTy::U32));
        table.ty_isize = table.intern(Ty::Primitive(PrimitiveTy::Isize));
        table.ty_usize = table.intern(Ty::Primitive(PrimitiveTy::Usize));
        table.ty_str = table.intern(Ty::Primitive(PrimitiveTy::Str));
        table.ty_unit = table.intern(Ty::Unit);
        table.ty_never = table.intern(Ty::Never);
        table.ty_underscore = table.intern(Ty::Underscore);
        table
    }

    /// Intern a structural type, returning its canonical id
    pub fn intern(&mut self, ty: Ty) -> TypeId {
        if let Some(&id) = self.lookup.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.lookup.insert(ty, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &Ty {
        &self.types[id.index()]
    }

    pub fn bool_ty(&self) -> TypeId {
        self.ty_bool
    }
    pub fn char_ty(&self) -> TypeId {
        self.ty_char
    }
    pub fn i32_ty(&self) -> TypeId {
        self.ty_i32
    }
    pub fn u32_ty(&self) -> TypeId {
        self.ty_u32
    }
    pub fn isize_ty(&self) -> TypeId {
        self.ty_isize
    }
    pub fn usize_ty(&self) -> TypeId {
        self.ty_usize
    }
    pub fn str_ty(&self) -> TypeId {
        self.ty_str
    }
    pub fn unit_ty(&self) -> TypeId {
        self.ty_unit
    }
    pub fn never_ty(&self) -> TypeId {
        self.ty_never
    }
    pub fn underscore_ty(&self) -> TypeId {
        self.ty_underscore
    }

    pub fn reference(&mut self, pointee: TypeId, is_mutable: bool) -> TypeId {
        self.intern(Ty::Reference {
            pointee,
            is_mutable,
        })
    }

    pub fn array(&mut self, element: TypeId, size: usize) -> TypeId {
        self.intern(Ty::Array { element, size })
    }

    /// Register a struct by name; fields are filled in later so that
    /// recursive references through `&`/arrays can resolve.
    pub fn declare_struct(&mut self, name: impl Into<String>) -> StructId {
        let id = StructId(self.structs.len() as u32);
        self.structs.push(StructInfo {
            name: name.into(),
            fields: Vec::new(),
        });
        id
    }

    pub fn set_struct_fields(&mut self, id: StructId, fields: Vec<(String, TypeId)>) {
        self.structs[id.index()].fields = fields;
    }

    pub fn struct_info(&self, id: StructId) -> &StructInfo {
        &self.structs[id.index()]
    }

    /// Find a struct by name (first declaration wins)
    pub fn struct_by_name(&self, name: &str) -> Option<StructId> {
        self.structs
            .iter()
            .position(|s| s.name == name)
            .map(|i| StructId(i as u32))
    }

    pub fn struct_ty(&mut self, id: StructId) -> TypeId {
        self.intern(Ty::Struct(id))
    }

    pub fn declare_enum(&mut self, name: impl Into<String>, variants: Vec<String>) -> EnumId {
        let id = EnumId(self.enums.len() as u32);
        self.enums.push(EnumInfo {
            name: name.into(),
            variants,
        });
        id
    }

    pub fn enum_info(&self, id: EnumId) -> &EnumInfo {
        &self.enums[id.index()]
    }

    /// Find an enum by name (first declaration wins)
    pub fn enum_by_name(&self, name: &str) -> Option<EnumId> {
        self.enums
            .iter()
            .position(|e| e.name == name)
            .map(|i| EnumId(i as u32))
    }

    pub fn enum_ty(&mut self, id: EnumId) -> TypeId {
        self.intern(Ty::Enum(id))
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Ty::Primitive(
                PrimitiveTy::I32 | PrimitiveTy::U32 | PrimitiveTy::Isize | PrimitiveTy::Usize
            )
        )
    }

    pub fn is_signed_integer(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Ty::Primitive(PrimitiveTy::I32 | PrimitiveTy::Isize)
        )
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        id == self.ty_bool
    }

    pub fn is_never(&self, id: TypeId) -> bool {
        id == self.ty_never
    }

    pub fn is_unit(&self, id: TypeId) -> bool {
        id == self.ty_unit
    }

    /// Human-readable type name for diagnostics
    pub fn name_of(&self, id: TypeId) -> String {
        match self.get(id) {
            Ty::Primitive(PrimitiveTy::Bool) => "bool".to_string(),
            Ty::Primitive(PrimitiveTy::Char) => "char".to_string(),
            Ty::Primitive(PrimitiveTy::I32) => "i32".to_string(),
            Ty::Primitive(PrimitiveTy::U32) => "u32".to_string(),
            Ty::Primitive(PrimitiveTy::Isize) => "isize".to_string(),
            Ty::Primitive(PrimitiveTy::Usize) => "usize".to_string(),
            Ty::Primitive(PrimitiveTy::Str) => "str".to_string(),
            Ty::Unit => "()".to_string(),
            Ty::Never => "!".to_string(),
            Ty::Underscore => "_".to_string(),
            Ty::Struct(sid) => self.struct_info(*sid).name.clone(),
            Ty::Enum(eid) => self.enum_info(*eid).name.clone(),
            Ty::Reference {
                pointee,
                is_mutable,
            } => {
                if *is_mutable {
                    format!("&mut {}", self.name_of(*pointee))
                } else {
                    format!("&{}", self.name_of(*pointee))
                }
            }
            Ty::Array { element, size } => format!("[{}; {}]", self.name_of(*element), size),
        }
    }

    /// Normalize a type for MIR: enums become `usize` discriminants and
    /// references/arrays are normalized recursively. Canonicalizing an
    /// already-canonical id is the identity.
    pub fn canonicalize_for_mir(&mut self, id: TypeId) -> TypeId {
        match self.get(id).clone() {
            Ty::Enum(_) => self.ty_usize,
            Ty::Reference {
                pointee,
                is_mutable,
            } => {
                let pointee = self.canonicalize_for_mir(pointee);
                self.reference(pointee, is_mutable)
            }
            Ty::Array { element, size } => {
                let element = self.canonicalize_for_mir(element);
                self.array(element, size)
            }
            _ => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_interning_dedups() {
        let mut table = TypeTable::new();
        let a = table.reference(table.i32_ty(), false);
        let b = table.reference(table.i32_ty(), false);
        assert_eq!(a, b);

        let c = table.reference(table.i32_ty(), true);
        assert_ne!(a, c);
    }

    #[test]
    fn test_array_identity() {
        let mut table = TypeTable::new();
        let i32_ty = table.i32_ty();
        let a = table.array(i32_ty, 4);
        let b = table.array(i32_ty, 4);
        let c = table.array(i32_ty, 5);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_primitive_classification() {
        let table = TypeTable::new();
        assert!(table.is_integer(table.i32_ty()));
        assert!(table.is_integer(table.usize_ty()));
        assert!(!table.is_integer(table.bool_ty()));
        assert!(table.is_signed_integer(table.isize_ty()));
        assert!(!table.is_signed_integer(table.u32_ty()));
    }

    #[test]
    fn test_struct_identity_by_declaration() {
        let mut table = TypeTable::new();
        let p = table.declare_struct("Point");
        let q = table.declare_struct("Point");
        let pt = table.struct_ty(p);
        let qt = table.struct_ty(q);
        // two declarations are distinct types even with the same name
        assert_ne!(pt, qt);
        assert_eq!(table.struct_ty(p), pt);
    }

    #[test]
    fn test_recursive_struct_fields() {
        let mut table = TypeTable::new();
        let node = table.declare_struct("Node");
        let node_ty = table.struct_ty(node);
        let next_ty = table.reference(node_ty, false);
        let i32_ty = table.i32_ty();
        table.set_struct_fields(
            node,
            vec![("value".into(), i32_ty), ("next".into(), next_ty)],
        );
        assert_eq!(table.struct_info(node).fields.len(), 2);
    }

    #[test]
    fn test_canonicalize_enum_to_usize() {
        let mut table = TypeTable::new();
        let color = table.declare_enum("Color", vec!["Red".into(), "Green".into()]);
        let color_ty = table.enum_ty(color);
        assert_eq!(table.canonicalize_for_mir(color_ty), table.usize_ty());

        // nested: &Color → &usize, [Color; 3] → [usize; 3]
        let ref_color = table.reference(color_ty, false);
        let usize_ty = table.usize_ty();
        let expected_ref = table.reference(usize_ty, false);
        assert_eq!(table.canonicalize_for_mir(ref_color), expected_ref);
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let mut table = TypeTable::new();
        let color = table.declare_enum("Color", vec!["Red".into()]);
        let color_ty = table.enum_ty(color);
        let once = table.canonicalize_for_mir(color_ty);
        let twice = table.canonicalize_for_mir(once);
        assert_eq!(once, twice);

        let i32_ty = table.i32_ty();
        assert_eq!(table.canonicalize_for_mir(i32_ty), i32_ty);
    }

    #[test]
    fn test_name_of() {
        let mut table = TypeTable::new();
        assert_eq!(table.name_of(table.unit_ty()), "()");
        assert_eq!(table.name_of(table.never_ty()), "!");
        let i32_ty = table.i32_ty();
        let r = table.reference(i32_ty, true);
        assert_eq!(table.name_of(r), "&mut i32");
        let a = table.array(r, 3);
        assert_eq!(table.name_of(a), "[&mut i32; 3]");
    }
}
