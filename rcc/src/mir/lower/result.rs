//! The universal adapter for expression lowering results
//!
//! Every lowered expression reports one of three outcomes, and the caller
//! picks the adapter matching its own needs. `Written` is only produced
//! when the caller supplied a destination hint, so the two value adapters
//! treat it as a compiler bug.

use super::FunctionLowerer;
use crate::mir::{InitPattern, Operand, Place, Statement, ValueSource};
use crate::types::TypeId;

/// Outcome of lowering one expression
#[derive(Debug, Clone)]
pub enum LowerResult {
    /// The value sits in a temp or is a constant
    Operand(Operand),
    /// The value is in memory at a known place
    Place(Place),
    /// The caller's destination hint has been fully initialized
    Written,
}

impl LowerResult {
    /// "I need the value itself." Loads from memory when necessary.
    pub fn into_operand(self, lw: &mut FunctionLowerer<'_, '_, '_>, ty: TypeId) -> Operand {
        match self {
            LowerResult::Operand(op) => op,
            LowerResult::Place(place) => {
                let dest = lw.new_temp(ty);
                lw.push_stmt(Statement::Load { dest, src: place });
                Operand::Temp(dest)
            }
            LowerResult::Written => {
                panic!("a Written lower result cannot be adapted to an operand")
            }
        }
    }

    /// "I need a memory address." Spills operands into a synthetic local.
    pub fn into_place(self, lw: &mut FunctionLowerer<'_, '_, '_>, ty: TypeId) -> Place {
        match self {
            LowerResult::Place(place) => place,
            LowerResult::Operand(op) => {
                let local = lw.new_synthetic_local(ty, "_tmp");
                let place = Place::local(local);
                lw.push_stmt(Statement::Assign {
                    dest: place.clone(),
                    src: ValueSource::Operand(op),
                });
                place
            }
            LowerResult::Written => {
                panic!("a Written lower result cannot be adapted to a place")
            }
        }
    }

    /// "Put the value at `dest`." A `Written` result is the copy-elision
    /// success case and needs no further work; a self-copy is dropped.
    pub fn write_to_dest(self, lw: &mut FunctionLowerer<'_, '_, '_>, dest: &Place, _ty: TypeId) {
        match self {
            LowerResult::Written => {}
            LowerResult::Operand(op) => {
                lw.push_stmt(Statement::Assign {
                    dest: dest.clone(),
                    src: ValueSource::Operand(op),
                });
            }
            LowerResult::Place(src) => {
                if src == *dest {
                    return;
                }
                lw.push_stmt(Statement::Init {
                    dest: dest.clone(),
                    pattern: InitPattern::Copy(src),
                });
            }
        }
    }
}
