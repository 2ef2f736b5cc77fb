//! Exit-call placement validation
//!
//! Runs after semantic checking. The runtime `exit()` must appear exactly
//! once, as the final statement of `main`; any other use is fatal.

use crate::ast::Span;
use crate::error::{CompileError, Result};
use crate::hir::{Block, Expr, ExprKind, FuncId, Module, RepeatCount, Stmt};

/// Validate every `exit()` call site in the module
pub fn exit_check_module(module: &Module) -> Result<()> {
    let Some(exit_id) = module.function_by_name("exit") else {
        return Ok(());
    };

    for c in &module.consts {
        let mut calls = Vec::new();
        collect_exit_calls_expr(&c.value, exit_id, &mut calls);
        if let Some(&span) = calls.first() {
            return Err(CompileError::exit_check(
                "exit() cannot be used in non-main functions",
                span,
            ));
        }
    }

    for f in &module.functions {
        let Some(body) = &f.body else { continue };
        let is_main = f.owner.is_none() && f.name.name == "main";

        let mut calls = Vec::new();
        collect_exit_calls_block(&body.block, exit_id, &mut calls);

        if !is_main {
            if let Some(&span) = calls.first() {
                let message = if f.is_method() {
                    "exit() cannot be used in methods"
                } else {
                    "exit() cannot be used in non-main functions"
                };
                return Err(CompileError::exit_check(message, span));
            }
            continue;
        }

        let sanctioned = final_exit_statement(&body.block, exit_id);
        match sanctioned {
            Some(sanctioned_span) => {
                if let Some(&extra) = calls.iter().find(|&&s| s != sanctioned_span) {
                    return Err(CompileError::exit_check(
                        "exit() must be the final statement in main function",
                        extra,
                    ));
                }
            }
            None => {
                if calls.is_empty() {
                    return Err(CompileError::exit_check(
                        "main function must have an exit() call as the final statement",
                        f.name.span,
                    ));
                }
                // an exit call exists but something follows it; point at
                // whatever occupies the final position
                let span = body
                    .block
                    .final_expr
                    .as_ref()
                    .map(|e| e.span)
                    .or_else(|| body.block.stmts.last().map(stmt_span))
                    .unwrap_or(f.name.span);
                return Err(CompileError::exit_check(
                    "exit() must be the final statement in main function",
                    span,
                ));
            }
        }
    }

    Ok(())
}

/// The span of `main`'s trailing `exit()` call when the block ends with
/// one: the last statement is a direct call and no final expression
/// follows it.
fn final_exit_statement(block: &Block, exit_id: FuncId) -> Option<Span> {
    if block.final_expr.is_some() {
        return None;
    }
    match block.stmts.last()? {
        Stmt::Expr { expr, .. } => match &expr.kind {
            ExprKind::Call { callee, .. } if is_func_use(callee, exit_id) => Some(expr.span),
            _ => None,
        },
        _ => None,
    }
}

fn is_func_use(expr: &Expr, func: FuncId) -> bool {
    matches!(expr.kind, ExprKind::FuncUse(f) if f == func)
}

fn stmt_span(stmt: &Stmt) -> Span {
    match stmt {
        Stmt::Let { span, .. } => *span,
        Stmt::Expr { expr, .. } => expr.span,
    }
}

fn collect_exit_calls_block(block: &Block, exit_id: FuncId, out: &mut Vec<Span>) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Let { init, .. } => {
                if let Some(init) = init {
                    collect_exit_calls_expr(init, exit_id, out);
                }
            }
            Stmt::Expr { expr, .. } => collect_exit_calls_expr(expr, exit_id, out),
        }
    }
    if let Some(final_expr) = &block.final_expr {
        collect_exit_calls_expr(final_expr, exit_id, out);
    }
}

fn collect_exit_calls_expr(expr: &Expr, exit_id: FuncId, out: &mut Vec<Span>) {
    match &expr.kind {
        ExprKind::Call { callee, args } => {
            if is_func_use(callee, exit_id) {
                out.push(expr.span);
            } else {
                collect_exit_calls_expr(callee, exit_id, out);
            }
            for arg in args {
                collect_exit_calls_expr(arg, exit_id, out);
            }
        }
        ExprKind::Literal(_)
        | ExprKind::Variable(_)
        | ExprKind::ConstUse(_)
        | ExprKind::FuncUse(_)
        | ExprKind::StructConst(_)
        | ExprKind::EnumVariant { .. }
        | ExprKind::Underscore => {}
        ExprKind::Grouped(inner) => collect_exit_calls_expr(inner, exit_id, out),
        ExprKind::Unary { operand, .. } => collect_exit_calls_expr(operand, exit_id, out),
        ExprKind::Binary { left, right, .. } | ExprKind::Assign { left, right, .. } => {
            collect_exit_calls_expr(left, exit_id, out);
            collect_exit_calls_expr(right, exit_id, out);
        }
        ExprKind::Cast { expr: inner, .. } => collect_exit_calls_expr(inner, exit_id, out),
        ExprKind::ArrayInit(elements) => {
            for e in elements {
                collect_exit_calls_expr(e, exit_id, out);
            }
        }
        ExprKind::ArrayRepeat { value, count } => {
            collect_exit_calls_expr(value, exit_id, out);
            if let RepeatCount::Expr(e) = count {
                collect_exit_calls_expr(e, exit_id, out);
            }
        }
        ExprKind::Index { array, index } => {
            collect_exit_calls_expr(array, exit_id, out);
            collect_exit_calls_expr(index, exit_id, out);
        }
        ExprKind::StructLiteral { fields, .. } => {
            for f in fields {
                collect_exit_calls_expr(f, exit_id, out);
            }
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            collect_exit_calls_expr(receiver, exit_id, out);
            for arg in args {
                collect_exit_calls_expr(arg, exit_id, out);
            }
        }
        ExprKind::FieldAccess { object, .. } => collect_exit_calls_expr(object, exit_id, out),
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_exit_calls_expr(condition, exit_id, out);
            collect_exit_calls_block(then_branch, exit_id, out);
            if let Some(e) = else_branch {
                collect_exit_calls_expr(e, exit_id, out);
            }
        }
        ExprKind::Loop { body, .. } => collect_exit_calls_block(body, exit_id, out),
        ExprKind::While {
            condition, body, ..
        } => {
            collect_exit_calls_expr(condition, exit_id, out);
            collect_exit_calls_block(body, exit_id, out);
        }
        ExprKind::Return { value } => {
            if let Some(v) = value {
                collect_exit_calls_expr(v, exit_id, out);
            }
        }
        ExprKind::Break { value, .. } => {
            if let Some(v) = value {
                collect_exit_calls_expr(v, exit_id, out);
            }
        }
        ExprKind::Continue { .. } => {}
        ExprKind::Block(block) => collect_exit_calls_block(block, exit_id, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::build_module;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::semantic::check_module;
    use crate::types::TypeTable;

    fn run_exit_check(source: &str) -> crate::error::Result<()> {
        let tokens = tokenize(source, 0).unwrap();
        let program = parse(&tokens).unwrap();
        let mut types = TypeTable::new();
        let mut module = build_module(program, &mut types).unwrap();
        check_module(&mut module, &mut types).unwrap();
        exit_check_module(&module)
    }

    #[test]
    fn test_main_with_exit_as_final_statement() {
        assert!(run_exit_check("fn main() { exit(0); }").is_ok());
    }

    #[test]
    fn test_main_missing_exit() {
        let err = run_exit_check("fn main() { let x = 1; }").unwrap_err();
        assert_eq!(
            err.message(),
            "main function must have an exit() call as the final statement"
        );
    }

    #[test]
    fn test_main_exit_not_final_due_to_extra_stmt() {
        let err = run_exit_check("fn main() { exit(0); let x = 1; }").unwrap_err();
        assert_eq!(
            err.message(),
            "exit() must be the final statement in main function"
        );
        // the diagnostic points at the trailing statement
        let span = err.span().unwrap();
        assert_eq!(span.start, 21);
    }

    #[test]
    fn test_main_exit_not_final_due_to_final_expr() {
        let err = run_exit_check("fn main() -> i32 { exit(0); 1 }").unwrap_err();
        assert_eq!(
            err.message(),
            "exit() must be the final statement in main function"
        );
    }

    #[test]
    fn test_exit_in_nested_block_of_main() {
        let err = run_exit_check("fn main() { { exit(0); } exit(0); }").unwrap_err();
        assert_eq!(
            err.message(),
            "exit() must be the final statement in main function"
        );
    }

    #[test]
    fn test_exit_in_non_main_function() {
        let err = run_exit_check("fn helper() { exit(0); } fn main() { exit(0); }").unwrap_err();
        assert_eq!(err.message(), "exit() cannot be used in non-main functions");
    }

    #[test]
    fn test_exit_in_method() {
        let err = run_exit_check(
            "struct P { x: i32 }\n\
             impl P { fn f(&self) { exit(0); } }\n\
             fn main() { exit(0); }",
        )
        .unwrap_err();
        assert_eq!(err.message(), "exit() cannot be used in methods");
    }

    #[test]
    fn test_program_without_main_passes() {
        assert!(run_exit_check("fn helper() -> i32 { 1 }").is_ok());
    }
}
