//! rcc compiler library
//!
//! The front-end and middle-end of a compiler for a Rust subset: token
//! stream → AST → HIR (resolved) → typed HIR → MIR → LLVM textual IR.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod hir;
pub mod lexer;
pub mod mir;
pub mod parsec;
pub mod parser;
pub mod semantic;
pub mod source;
pub mod types;

pub use ast::Span;
pub use error::{CompileError, Result};

/// Run the full pipeline on one source file and return the LLVM module
/// text.
pub fn compile_to_llvm(filename: &str, source_text: &str) -> Result<String> {
    let mut sources = source::SourceManager::new();
    let file = sources.add_file(filename, source_text);

    let tokens = lexer::tokenize(source_text, file)?;
    let program = parser::parse(&tokens)?;

    let mut types = types::TypeTable::new();
    let mut module = hir::build_module(program, &mut types)?;
    semantic::check_module(&mut module, &mut types)?;
    semantic::exit_check_module(&module)?;

    let mir = mir::lower_module(&module, &mut types)?;
    codegen::emit_module(&mir, &types)
}
