//! LLVM textual IR generation
//!
//! The emitter produces `.ll` text directly, with no dependency on the
//! LLVM API: a `ModuleBuilder` assembles sections, per-function builders
//! keep names unique, and the type formatter hands out LLVM type
//! spellings while collecting struct definitions.

mod builder;
mod emit;
mod types;

pub use builder::{FunctionBuilder, ModuleBuilder};
pub use emit::emit_module;
pub use types::TypeFormatter;
