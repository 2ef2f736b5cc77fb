//! rcc compiler CLI

use clap::{Parser, ValueEnum};
use rcc::ast::FileId;
use rcc::error::report_error;
use rcc::lexer::Token;
use rcc::source::SourceManager;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rcc", version, about = "rcc - Rust-subset compiler front end")]
struct Cli {
    /// Source file to compile
    file: PathBuf,

    /// Which artifact to print
    #[arg(long, value_enum, default_value_t = Emit::Ast)]
    emit: Emit,

    /// Stop after semantic and exit-call checking
    #[arg(long)]
    check: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    Hir,
    Mir,
    Llvm,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

fn run(cli: &Cli) -> Result<(), ()> {
    let filename = cli.file.display().to_string();
    let source_text = match std::fs::read_to_string(&cli.file) {
        Ok(text) => text,
        Err(_) => {
            eprintln!("Error: could not open file {filename}");
            return Err(());
        }
    };

    let mut sources = SourceManager::new();
    let file = sources.add_file(&filename, &source_text);

    let tokens = match rcc::lexer::tokenize(&source_text, file) {
        Ok(tokens) => tokens,
        Err(error) => {
            report_error(&filename, &source_text, &error);
            return Err(());
        }
    };

    if cli.emit == Emit::Tokens {
        for token in &tokens {
            println!("{:?} {:?} @ {}..{}", token.kind, token.value, token.span.start, token.span.end);
        }
        return Ok(());
    }

    let program = match rcc::parser::parse_program(&tokens) {
        Ok(program) => program,
        Err(error) => {
            print_parse_failure(&error, &tokens, file, &sources);
            return Err(());
        }
    };

    if cli.emit == Emit::Ast && !cli.check {
        match serde_json::to_string_pretty(&program) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                return Err(());
            }
        }
        return Ok(());
    }

    let mut types = rcc::types::TypeTable::new();
    let analyzed = rcc::hir::build_module(program, &mut types)
        .and_then(|mut module| {
            rcc::semantic::check_module(&mut module, &mut types)?;
            rcc::semantic::exit_check_module(&module)?;
            Ok(module)
        });
    let module = match analyzed {
        Ok(module) => module,
        Err(error) => {
            report_error(&filename, &source_text, &error);
            return Err(());
        }
    };

    if cli.check {
        println!("✓ {filename} passed all checks");
        return Ok(());
    }

    if cli.emit == Emit::Hir {
        // the HIR has no stable dump format; summarize the module
        for f in &module.functions {
            if !f.is_builtin {
                println!("fn {} ({} params)", f.name.name, f.param_tys.len());
            }
        }
        return Ok(());
    }

    let mir = match rcc::mir::lower_module(&module, &mut types) {
        Ok(mir) => mir,
        Err(error) => {
            report_error(&filename, &source_text, &error);
            return Err(());
        }
    };

    if cli.emit == Emit::Mir {
        print!("{}", rcc::mir::format_mir(&mir, &types));
        return Ok(());
    }

    match rcc::codegen::emit_module(&mir, &types) {
        Ok(text) => {
            print!("{text}");
            Ok(())
        }
        Err(error) => {
            report_error(&filename, &source_text, &error);
            Err(())
        }
    }
}

/// Print the parse failure with the offending line underlined
fn print_parse_failure(
    error: &rcc::parsec::ParseError,
    tokens: &[Token],
    file: FileId,
    sources: &SourceManager,
) {
    eprintln!("--> Parsing failed");

    if error.position >= tokens.len() {
        eprintln!("Unexpected end of input.");
        return;
    }

    let token = &tokens[error.position];
    if !token.span.is_valid() {
        eprintln!("Unexpected token: '{}'", token.value);
        return;
    }

    let loc = sources.to_line_col(file, token.span.start);
    eprintln!(
        "Unexpected token: '{}' at {}:{}:{}",
        token.value,
        sources.filename(file),
        loc.line,
        loc.column
    );
    eprintln!();

    let line_text = sources.line_text(file, loc.line);
    eprintln!(" {} | {}", loc.line, line_text);

    let gutter = " ".repeat(loc.line.to_string().len());
    let padding = " ".repeat(loc.column.saturating_sub(1));
    let caret_len = token.span.len().max(1);
    eprintln!(" {gutter} | {padding}{}", "^".repeat(caret_len));
}
