//! MIR type → LLVM type-name formatting
//!
//! Struct types are emitted as named definitions exactly once, in
//! first-seen order; anonymous structs receive `%anon.struct.N` names.
//! The unit type is the named empty struct `%__rc_unit`.

use crate::error::{CompileError, Result};
use crate::types::{PrimitiveTy, Ty, TypeId, TypeTable};
use std::collections::HashMap;

pub struct TypeFormatter {
    emitted: HashMap<TypeId, String>,
    definition_order: Vec<(String, String)>,
    definition_lookup: HashMap<TypeId, usize>,
    anonymous_counter: usize,
}

impl Default for TypeFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeFormatter {
    pub fn new() -> Self {
        Self {
            emitted: HashMap::new(),
            definition_order: Vec::new(),
            definition_lookup: HashMap::new(),
            anonymous_counter: 0,
        }
    }

    /// The named type definitions discovered so far, in first-seen order
    pub fn definitions(&self) -> &[(String, String)] {
        &self.definition_order
    }

    /// The LLVM spelling of a type, emitting a struct definition when one
    /// is seen for the first time
    pub fn type_name(&mut self, types: &TypeTable, ty: TypeId) -> Result<String> {
        if let Some(name) = self.emitted.get(&ty) {
            return Ok(name.clone());
        }

        let name = match types.get(ty).clone() {
            Ty::Primitive(kind) => primitive_to_llvm(kind).to_string(),
            Ty::Unit => self.emit_special_struct(ty, "__rc_unit", "{}"),
            Ty::Never => {
                return Err(CompileError::codegen(
                    "never type reached the LLVM emitter",
                ));
            }
            Ty::Underscore => {
                return Err(CompileError::codegen(
                    "underscore type reached the LLVM emitter",
                ));
            }
            Ty::Enum(_) => {
                return Err(CompileError::codegen(
                    "enum type was not canonicalized before the LLVM emitter",
                ));
            }
            Ty::Struct(sid) => {
                let info = types.struct_info(sid);
                let mut symbol = info.name.clone();
                if symbol.is_empty() {
                    symbol = format!("anon.struct.{}", self.anonymous_counter);
                    self.anonymous_counter += 1;
                }
                let llvm_name = format!("%{symbol}");
                // reserve the name before formatting the body so
                // recursive references through pointers terminate
                self.emitted.insert(ty, llvm_name.clone());

                let field_tys: Vec<TypeId> =
                    types.struct_info(sid).fields.iter().map(|(_, t)| *t).collect();
                let body = self.format_struct_body(types, &field_tys)?;
                let slot = self.definition_order.len();
                self.definition_lookup.insert(ty, slot);
                self.definition_order.push((symbol, body));
                return Ok(llvm_name);
            }
            Ty::Reference { pointee, .. } => {
                let inner = self.type_name(types, pointee)?;
                format!("{inner}*")
            }
            Ty::Array { element, size } => {
                let inner = self.type_name(types, element)?;
                format!("[{size} x {inner}]")
            }
        };

        self.emitted.insert(ty, name.clone());
        Ok(name)
    }

    /// The pointer-to-`ty` spelling
    pub fn pointer_type_name(&mut self, types: &TypeTable, ty: TypeId) -> Result<String> {
        Ok(format!("{}*", self.type_name(types, ty)?))
    }

    fn emit_special_struct(&mut self, ty: TypeId, symbol: &str, body: &str) -> String {
        let llvm_name = format!("%{symbol}");
        self.emitted.insert(ty, llvm_name.clone());
        let slot = self.definition_order.len();
        self.definition_lookup.insert(ty, slot);
        self.definition_order
            .push((symbol.to_string(), body.to_string()));
        llvm_name
    }

    fn format_struct_body(&mut self, types: &TypeTable, fields: &[TypeId]) -> Result<String> {
        if fields.is_empty() {
            return Ok("{}".to_string());
        }
        let mut parts = Vec::with_capacity(fields.len());
        for &field in fields {
            parts.push(self.type_name(types, field)?);
        }
        Ok(format!("{{ {} }}", parts.join(", ")))
    }
}

fn primitive_to_llvm(kind: PrimitiveTy) -> &'static str {
    match kind {
        PrimitiveTy::I32 | PrimitiveTy::U32 | PrimitiveTy::Isize | PrimitiveTy::Usize => "i32",
        PrimitiveTy::Bool => "i1",
        PrimitiveTy::Char => "i8",
        PrimitiveTy::Str => "i8",
    }
}

/// Bit width used for cast classification
pub fn bit_width(types: &TypeTable, ty: TypeId) -> Option<u32> {
    match types.get(ty) {
        Ty::Primitive(PrimitiveTy::Bool) => Some(1),
        Ty::Primitive(PrimitiveTy::Char) => Some(8),
        Ty::Primitive(
            PrimitiveTy::I32 | PrimitiveTy::U32 | PrimitiveTy::Isize | PrimitiveTy::Usize,
        ) => Some(32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_formatting() {
        let mut types = TypeTable::new();
        let mut fmt = TypeFormatter::new();
        assert_eq!(fmt.type_name(&types, types.bool_ty()).unwrap(), "i1");
        assert_eq!(fmt.type_name(&types, types.char_ty()).unwrap(), "i8");
        assert_eq!(fmt.type_name(&types, types.i32_ty()).unwrap(), "i32");
        assert_eq!(fmt.type_name(&types, types.usize_ty()).unwrap(), "i32");
        let str_ty = types.str_ty();
        let str_ref = types.reference(str_ty, false);
        assert_eq!(fmt.type_name(&types, str_ref).unwrap(), "i8*");
    }

    #[test]
    fn test_unit_is_named_empty_struct() {
        let types = TypeTable::new();
        let mut fmt = TypeFormatter::new();
        assert_eq!(fmt.type_name(&types, types.unit_ty()).unwrap(), "%__rc_unit");
        assert_eq!(
            fmt.definitions(),
            &[("__rc_unit".to_string(), "{}".to_string())]
        );
    }

    #[test]
    fn test_struct_definition_in_first_seen_order() {
        let mut types = TypeTable::new();
        let a = types.declare_struct("A");
        let i32_ty = types.i32_ty();
        types.set_struct_fields(a, vec![("x".into(), i32_ty)]);
        let b = types.declare_struct("B");
        let a_ty = types.struct_ty(a);
        types.set_struct_fields(b, vec![("inner".into(), a_ty)]);
        let b_ty = types.struct_ty(b);

        let mut fmt = TypeFormatter::new();
        assert_eq!(fmt.type_name(&types, b_ty).unwrap(), "%B");
        // A's definition is pulled in while B's body is being formatted,
        // so it lands first
        let defs = fmt.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].0, "A");
        assert_eq!(defs[0].1, "{ i32 }");
        assert_eq!(defs[1].0, "B");
        assert_eq!(defs[1].1, "{ %A }");
    }

    #[test]
    fn test_array_formatting() {
        let mut types = TypeTable::new();
        let i32_ty = types.i32_ty();
        let arr = types.array(i32_ty, 10);
        let mut fmt = TypeFormatter::new();
        assert_eq!(fmt.type_name(&types, arr).unwrap(), "[10 x i32]");
    }

    #[test]
    fn test_formatting_is_cached() {
        let mut types = TypeTable::new();
        let s = types.declare_struct("S");
        let i32_ty = types.i32_ty();
        types.set_struct_fields(s, vec![("x".into(), i32_ty)]);
        let s_ty = types.struct_ty(s);
        let mut fmt = TypeFormatter::new();
        assert_eq!(fmt.type_name(&types, s_ty).unwrap(), "%S");
        assert_eq!(fmt.type_name(&types, s_ty).unwrap(), "%S");
        assert_eq!(fmt.definitions().len(), 1);
    }

    #[test]
    fn test_bit_widths() {
        let types = TypeTable::new();
        assert_eq!(bit_width(&types, types.bool_ty()), Some(1));
        assert_eq!(bit_width(&types, types.char_ty()), Some(8));
        assert_eq!(bit_width(&types, types.i32_ty()), Some(32));
        assert_eq!(bit_width(&types, types.unit_ty()), None);
    }
}
