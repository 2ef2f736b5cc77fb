//! Parser tests: source text in, AST shape out

use super::{build_registry, parse, parse_program};
use crate::ast::*;
use crate::lexer::tokenize;
use crate::parsec::ParseContext;

fn program(source: &str) -> Program {
    let tokens = tokenize(source, 0).unwrap();
    parse(&tokens).unwrap()
}

fn expr(source: &str) -> Expr {
    let tokens = tokenize(source, 0).unwrap();
    let registry = build_registry();
    let mut ctx = ParseContext::new(&tokens);
    let e = registry.expr.parse(&mut ctx).unwrap();
    assert!(
        ctx.tokens[ctx.position].is_eof(),
        "expression did not consume all input"
    );
    e
}

fn parse_fails(source: &str) -> crate::parsec::ParseError {
    let tokens = tokenize(source, 0).unwrap();
    parse_program(&tokens).unwrap_err()
}

fn first_function(program: &Program) -> &Function {
    match &program.items[0].kind {
        ItemKind::Function(f) => f,
        other => panic!("expected function, got {other:?}"),
    }
}

// ---------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------

#[test]
fn test_integer_literal_suffixes() {
    assert!(matches!(
        expr("42").kind,
        ExprKind::IntegerLiteral { value: 42, suffix: None }
    ));
    assert!(matches!(
        expr("42u32").kind,
        ExprKind::IntegerLiteral { value: 42, suffix: Some(IntSuffix::U32) }
    ));
    assert!(matches!(
        expr("1_000isize").kind,
        ExprKind::IntegerLiteral { value: 1000, suffix: Some(IntSuffix::Isize) }
    ));
}

#[test]
fn test_bool_char_string_literals() {
    assert!(matches!(expr("true").kind, ExprKind::BoolLiteral(true)));
    assert!(matches!(expr("'x'").kind, ExprKind::CharLiteral('x')));
    assert!(matches!(
        expr("\"hi\"").kind,
        ExprKind::StringLiteral { is_cstyle: false, .. }
    ));
    assert!(matches!(
        expr("c\"hi\"").kind,
        ExprKind::StringLiteral { is_cstyle: true, .. }
    ));
}

#[test]
fn test_underscore_rewrite() {
    assert!(matches!(expr("_").kind, ExprKind::Underscore));
    assert!(matches!(expr("x").kind, ExprKind::Path(_)));
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    // 1 + 2 * 3  →  1 + (2 * 3)
    match expr("1 + 2 * 3").kind {
        ExprKind::Binary { op: BinaryOp::Add, right, .. } => {
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
        }
        other => panic!("expected Add at root, got {other:?}"),
    }
}

#[test]
fn test_shift_binds_looser_than_addition() {
    // a << b + c  →  a << (b + c)
    match expr("a << b + c").kind {
        ExprKind::Binary { op: BinaryOp::Shl, right, .. } => {
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
        }
        other => panic!("expected Shl at root, got {other:?}"),
    }
}

#[test]
fn test_bitwise_precedence_chain() {
    // a | b ^ c & d  →  a | (b ^ (c & d))
    match expr("a | b ^ c & d").kind {
        ExprKind::Binary { op: BinaryOp::BitOr, right, .. } => match right.kind {
            ExprKind::Binary { op: BinaryOp::BitXor, right, .. } => {
                assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::BitAnd, .. }));
            }
            other => panic!("expected BitXor, got {other:?}"),
        },
        other => panic!("expected BitOr at root, got {other:?}"),
    }
}

#[test]
fn test_comparison_looser_than_bitor() {
    // a == b | c  →  a == (b | c)
    match expr("a == b | c").kind {
        ExprKind::Binary { op: BinaryOp::Eq, right, .. } => {
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::BitOr, .. }));
        }
        other => panic!("expected Eq at root, got {other:?}"),
    }
}

#[test]
fn test_logical_operators_looser_than_comparison() {
    // a < b && c < d || e
    match expr("a < b && c < d || e").kind {
        ExprKind::Binary { op: BinaryOp::Or, left, .. } => {
            assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::And, .. }));
        }
        other => panic!("expected Or at root, got {other:?}"),
    }
}

#[test]
fn test_left_associativity_of_subtraction() {
    // 10 - 3 - 2  →  (10 - 3) - 2
    match expr("10 - 3 - 2").kind {
        ExprKind::Binary { op: BinaryOp::Sub, left, right } => {
            assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
            assert!(matches!(right.kind, ExprKind::IntegerLiteral { value: 2, .. }));
        }
        other => panic!("expected Sub at root, got {other:?}"),
    }
}

#[test]
fn test_assignment_is_right_associative() {
    // a = b = c  →  a = (b = c)
    match expr("a = b = c").kind {
        ExprKind::Assign { op: AssignOp::Assign, right, .. } => {
            assert!(matches!(right.kind, ExprKind::Assign { .. }));
        }
        other => panic!("expected Assign at root, got {other:?}"),
    }
}

#[test]
fn test_compound_assignment_forms() {
    for (src, expected) in [
        ("a += 1", AssignOp::AddAssign),
        ("a -= 1", AssignOp::SubAssign),
        ("a <<= 1", AssignOp::ShlAssign),
        ("a >>= 1", AssignOp::ShrAssign),
        ("a ^= 1", AssignOp::BitXorAssign),
    ] {
        match expr(src).kind {
            ExprKind::Assign { op, .. } => assert_eq!(op, expected),
            other => panic!("expected assignment for {src}, got {other:?}"),
        }
    }
}

#[test]
fn test_unary_binds_tighter_than_infix() {
    // !a && b  →  (!a) && b
    match expr("!a && b").kind {
        ExprKind::Binary { op: BinaryOp::And, left, .. } => {
            assert!(matches!(left.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
        }
        other => panic!("expected And at root, got {other:?}"),
    }
}

#[test]
fn test_cast_chain_above_unary() {
    // -x as u32 as i32  →  Cast(Cast(Neg(x), u32), i32)
    match expr("-x as u32 as i32").kind {
        ExprKind::Cast { expr: inner, ty } => {
            assert!(matches!(ty.kind, TypeKind::Primitive(PrimitiveKind::I32)));
            match inner.kind {
                ExprKind::Cast { expr: deeper, .. } => {
                    assert!(matches!(deeper.kind, ExprKind::Unary { op: UnaryOp::Negate, .. }));
                }
                other => panic!("expected nested cast, got {other:?}"),
            }
        }
        other => panic!("expected Cast at root, got {other:?}"),
    }
}

#[test]
fn test_double_reference_prefix() {
    // `&&x` lexes as one token but means two references
    match expr("&&x").kind {
        ExprKind::Unary { op: UnaryOp::Ref, operand } => {
            assert!(matches!(operand.kind, ExprKind::Unary { op: UnaryOp::Ref, .. }));
        }
        other => panic!("expected Ref(Ref(..)), got {other:?}"),
    }
    match expr("&&mut x").kind {
        ExprKind::Unary { op: UnaryOp::Ref, operand } => {
            assert!(matches!(operand.kind, ExprKind::Unary { op: UnaryOp::RefMut, .. }));
        }
        other => panic!("expected Ref(RefMut(..)), got {other:?}"),
    }
}

#[test]
fn test_postfix_chain() {
    // a.b[0].c(1)
    match expr("a.b[0].c(1)").kind {
        ExprKind::MethodCall { receiver, method, args } => {
            assert_eq!(method.name, "c");
            assert_eq!(args.len(), 1);
            match receiver.kind {
                ExprKind::Index { array, .. } => {
                    assert!(matches!(array.kind, ExprKind::FieldAccess { .. }));
                }
                other => panic!("expected Index, got {other:?}"),
            }
        }
        other => panic!("expected method call at root, got {other:?}"),
    }
}

#[test]
fn test_call_vs_method_call() {
    assert!(matches!(expr("f(1, 2)").kind, ExprKind::Call { .. }));
    assert!(matches!(expr("x.f(1)").kind, ExprKind::MethodCall { .. }));
    assert!(matches!(expr("x.f").kind, ExprKind::FieldAccess { .. }));
}

#[test]
fn test_array_literals() {
    assert!(matches!(expr("[]").kind, ExprKind::ArrayInit(ref v) if v.is_empty()));
    assert!(matches!(expr("[1, 2, 3]").kind, ExprKind::ArrayInit(ref v) if v.len() == 3));
    assert!(matches!(expr("[1, 2, 3,]").kind, ExprKind::ArrayInit(ref v) if v.len() == 3));
    assert!(matches!(expr("[0; 10]").kind, ExprKind::ArrayRepeat { .. }));
}

#[test]
fn test_struct_literal_preserves_source_order() {
    match expr("Point { y: 2, x: 1 }").kind {
        ExprKind::StructLiteral { fields, .. } => {
            assert_eq!(fields[0].name.name, "y");
            assert_eq!(fields[1].name.name, "x");
        }
        other => panic!("expected struct literal, got {other:?}"),
    }
}

#[test]
fn test_enum_variant_path_expression() {
    match expr("Color::Red").kind {
        ExprKind::Path(p) => assert_eq!(p.segment_names(), vec!["Color", "Red"]),
        other => panic!("expected path, got {other:?}"),
    }
}

#[test]
fn test_if_else_chain() {
    match expr("if a { 1 } else if b { 2 } else { 3 }").kind {
        ExprKind::If { else_branch, .. } => {
            let else_branch = else_branch.expect("must have else");
            assert!(matches!(else_branch.kind, ExprKind::If { .. }));
        }
        other => panic!("expected if, got {other:?}"),
    }
}

#[test]
fn test_break_with_value_and_bare() {
    assert!(matches!(expr("break").kind, ExprKind::Break { value: None, .. }));
    assert!(matches!(expr("break 7").kind, ExprKind::Break { value: Some(_), .. }));
    assert!(matches!(expr("continue").kind, ExprKind::Continue { .. }));
    assert!(matches!(expr("return").kind, ExprKind::Return { value: None }));
    assert!(matches!(expr("return 1").kind, ExprKind::Return { value: Some(_) }));
}

#[test]
fn test_while_condition_is_not_a_struct_literal() {
    // `i < n` must win over a struct-literal reading of `n { ... }`
    let prog = program("fn f() { while i < n { i += 1; } }");
    let f = first_function(&prog);
    let body = f.body.as_ref().unwrap();
    match &body.final_expr.as_ref().unwrap().kind {
        ExprKind::While { condition, .. } => {
            assert!(matches!(condition.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
        }
        other => panic!("expected while, got {other:?}"),
    }
}

// ---------------------------------------------------------------------
// Statements and blocks
// ---------------------------------------------------------------------

#[test]
fn test_let_statement_forms() {
    let prog = program("fn f() { let x = 1; let y: i32; let mut z: u32 = 2; }");
    let body = first_function(&prog).body.as_ref().unwrap();
    assert_eq!(body.statements.len(), 3);
    assert!(matches!(
        body.statements[0].kind,
        StmtKind::Let { ty: None, init: Some(_), .. }
    ));
    assert!(matches!(
        body.statements[1].kind,
        StmtKind::Let { ty: Some(_), init: None, .. }
    ));
    match &body.statements[2].kind {
        StmtKind::Let { pattern, .. } => {
            assert!(matches!(pattern.kind, PatternKind::Binding { is_mut: true, .. }));
        }
        other => panic!("expected let, got {other:?}"),
    }
}

#[test]
fn test_empty_statement() {
    let prog = program("fn f() { ;; }");
    let body = first_function(&prog).body.as_ref().unwrap();
    assert_eq!(body.statements.len(), 2);
    assert!(matches!(body.statements[0].kind, StmtKind::Empty));
}

#[test]
fn test_final_expression_without_semicolon() {
    let prog = program("fn f() -> i32 { g(); 42 }");
    let body = first_function(&prog).body.as_ref().unwrap();
    assert_eq!(body.statements.len(), 1);
    assert!(matches!(
        body.final_expr.as_ref().unwrap().kind,
        ExprKind::IntegerLiteral { value: 42, .. }
    ));
}

#[test]
fn test_trailing_block_expression_is_promoted() {
    let prog = program("fn f() -> i32 { if c { 1 } else { 2 } }");
    let body = first_function(&prog).body.as_ref().unwrap();
    assert!(body.statements.is_empty());
    assert!(matches!(
        body.final_expr.as_ref().unwrap().kind,
        ExprKind::If { .. }
    ));
}

#[test]
fn test_block_expression_statement_keeps_semicolon_flag() {
    let prog = program("fn f() { loop { break; } g(); }");
    let body = first_function(&prog).body.as_ref().unwrap();
    assert_eq!(body.statements.len(), 2);
    assert!(matches!(
        body.statements[0].kind,
        StmtKind::Expr { has_semicolon: false, .. }
    ));
    assert!(matches!(
        body.statements[1].kind,
        StmtKind::Expr { has_semicolon: true, .. }
    ));
}

#[test]
fn test_nested_item_statement() {
    let prog = program("fn f() { fn g() {} g(); }");
    let body = first_function(&prog).body.as_ref().unwrap();
    assert!(matches!(body.statements[0].kind, StmtKind::Item(_)));
}

// ---------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------

#[test]
fn test_function_signature() {
    let prog = program("fn add(a: i32, b: i32) -> i32 { a + b }");
    let f = first_function(&prog);
    assert_eq!(f.name.name, "add");
    assert!(f.self_param.is_none());
    assert_eq!(f.params.len(), 2);
    assert!(f.return_type.is_some());
    assert!(f.body.is_some());
}

#[test]
fn test_function_without_body() {
    let prog = program("trait T { fn size(&self) -> i32; }");
    match &prog.items[0].kind {
        ItemKind::Trait(t) => match &t.items[0].kind {
            ItemKind::Function(f) => {
                assert!(f.body.is_none());
                assert_eq!(
                    f.self_param,
                    Some(SelfParam { is_reference: true, is_mutable: false })
                );
            }
            other => panic!("expected function, got {other:?}"),
        },
        other => panic!("expected trait, got {other:?}"),
    }
}

#[test]
fn test_self_param_forms() {
    for (src, expected) in [
        ("impl P { fn a(self) {} }", SelfParam { is_reference: false, is_mutable: false }),
        ("impl P { fn b(mut self) {} }", SelfParam { is_reference: false, is_mutable: true }),
        ("impl P { fn c(&self) {} }", SelfParam { is_reference: true, is_mutable: false }),
        ("impl P { fn d(&mut self) {} }", SelfParam { is_reference: true, is_mutable: true }),
    ] {
        let prog = program(src);
        match &prog.items[0].kind {
            ItemKind::Impl(imp) => match &imp.items[0].kind {
                ItemKind::Function(f) => assert_eq!(f.self_param, Some(expected), "{src}"),
                other => panic!("expected function, got {other:?}"),
            },
            other => panic!("expected impl, got {other:?}"),
        }
    }
}

#[test]
fn test_self_param_with_positional_params() {
    let prog = program("impl P { fn shift(&mut self, dx: i32, dy: i32) {} }");
    match &prog.items[0].kind {
        ItemKind::Impl(imp) => match &imp.items[0].kind {
            ItemKind::Function(f) => {
                assert!(f.self_param.is_some());
                assert_eq!(f.params.len(), 2);
            }
            other => panic!("expected function, got {other:?}"),
        },
        other => panic!("expected impl, got {other:?}"),
    }
}

#[test]
fn test_struct_definitions() {
    let prog = program("struct Unit; struct Point { x: i32, y: i32 }");
    match &prog.items[0].kind {
        ItemKind::Struct(s) => assert!(s.fields.is_empty()),
        other => panic!("expected struct, got {other:?}"),
    }
    match &prog.items[1].kind {
        ItemKind::Struct(s) => {
            assert_eq!(s.fields.len(), 2);
            assert_eq!(s.fields[0].name.name, "x");
        }
        other => panic!("expected struct, got {other:?}"),
    }
}

#[test]
fn test_enum_definition() {
    let prog = program("enum Color { Red, Green, Blue }");
    match &prog.items[0].kind {
        ItemKind::Enum(e) => {
            assert_eq!(e.name.name, "Color");
            assert_eq!(e.variants.len(), 3);
        }
        other => panic!("expected enum, got {other:?}"),
    }
}

#[test]
fn test_const_item() {
    let prog = program("const MAX: i32 = 100;");
    match &prog.items[0].kind {
        ItemKind::Const(c) => {
            assert_eq!(c.name.name, "MAX");
            assert!(matches!(c.ty.kind, TypeKind::Primitive(PrimitiveKind::I32)));
        }
        other => panic!("expected const, got {other:?}"),
    }
}

#[test]
fn test_inherent_and_trait_impl() {
    let prog = program("impl Point { fn new() {} } impl Show for Point { fn show(&self) {} }");
    match &prog.items[0].kind {
        ItemKind::Impl(imp) => assert!(imp.trait_path.is_none()),
        other => panic!("expected impl, got {other:?}"),
    }
    match &prog.items[1].kind {
        ItemKind::Impl(imp) => {
            assert_eq!(imp.trait_path.as_ref().unwrap().segment_names(), vec!["Show"]);
        }
        other => panic!("expected impl, got {other:?}"),
    }
}

#[test]
fn test_type_alias() {
    let prog = program("type Size = usize;");
    assert!(matches!(prog.items[0].kind, ItemKind::TypeAlias(_)));
}

// ---------------------------------------------------------------------
// Spans
// ---------------------------------------------------------------------

#[test]
fn test_binary_span_covers_operands() {
    let e = expr("abc + defg");
    assert_eq!(e.span.start, 0);
    assert_eq!(e.span.end, 10);
    match e.kind {
        ExprKind::Binary { left, right, .. } => {
            assert!(e.span.start <= left.span.start);
            assert!(right.span.end <= e.span.end);
        }
        other => panic!("expected binary, got {other:?}"),
    }
}

#[test]
fn test_item_span_covers_body() {
    let prog = program("fn main() { let x = 1; }");
    let item = &prog.items[0];
    assert_eq!(item.span.start, 0);
    assert_eq!(item.span.end, 24);
}

// ---------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------

#[test]
fn test_error_reports_furthest_position() {
    // fails at the missing ')' after consuming `fn f ( a : i32`
    let err = parse_fails("fn f(a: i32 { }");
    let tokens = tokenize("fn f(a: i32 { }", 0).unwrap();
    assert!(err.position > 0);
    assert!(err.position < tokens.len());
}

#[test]
fn test_error_on_missing_semicolon() {
    let err = parse_fails("fn f() { let x = 1 let y = 2; }");
    assert!(!err.expected.is_empty());
}

#[test]
fn test_error_on_garbage_top_level() {
    let err = parse_fails("42");
    assert!(err.expected.iter().any(|e| e.contains("item") || e.contains("end of file")));
}

#[test]
fn test_deeply_nested_expression_parses() {
    let mut src = String::from("fn f() -> i32 { ");
    let depth = 200;
    for _ in 0..depth {
        src.push('(');
    }
    src.push('1');
    for _ in 0..depth {
        src.push(')');
    }
    src.push_str(" }");
    let prog = program(&src);
    assert!(first_function(&prog).body.is_some());
}
