//! Lowering tests: source text in, MIR structure out

use crate::hir::build_module;
use crate::lexer::tokenize;
use crate::mir::*;
use crate::parser::parse;
use crate::semantic::check_module;
use crate::types::TypeTable;
use std::collections::HashMap;

fn lower(source: &str) -> (MirModule, TypeTable) {
    let tokens = tokenize(source, 0).unwrap();
    let program = parse(&tokens).unwrap();
    let mut types = TypeTable::new();
    let mut module = build_module(program, &mut types).unwrap();
    check_module(&mut module, &mut types).unwrap();
    let mir = lower_module(&module, &mut types).unwrap();
    (mir, types)
}

fn function<'m>(mir: &'m MirModule, name: &str) -> &'m MirFunction {
    mir.functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no function named {name}"))
}

/// Count how many times each temp is defined (statements and phis)
fn temp_definitions(func: &MirFunction) -> HashMap<TempId, usize> {
    let mut defs: HashMap<TempId, usize> = HashMap::new();
    for block in &func.blocks {
        for phi in &block.phis {
            *defs.entry(phi.dest).or_default() += 1;
        }
        for stmt in &block.statements {
            match stmt {
                Statement::Define { dest, .. } | Statement::Load { dest, .. } => {
                    *defs.entry(*dest).or_default() += 1;
                }
                Statement::Call { dest: Some(d), .. } => {
                    *defs.entry(*d).or_default() += 1;
                }
                _ => {}
            }
        }
    }
    defs
}

fn assert_wellformed(func: &MirFunction) {
    // exactly one terminator per block
    for (i, block) in func.blocks.iter().enumerate() {
        assert!(
            block.terminator.is_some(),
            "{}: block {i} has no terminator",
            func.name
        );
    }
    // temps defined at most once
    for (temp, count) in temp_definitions(func) {
        assert!(
            count <= 1,
            "{}: temp %t{temp} defined {count} times",
            func.name
        );
    }
    // phi incomings are predecessors
    let preds = func.predecessors();
    for (i, block) in func.blocks.iter().enumerate() {
        for phi in &block.phis {
            for inc in &phi.incoming {
                assert!(
                    preds[i].contains(&inc.block),
                    "{}: phi in block {i} has non-predecessor incoming bb{}",
                    func.name,
                    inc.block
                );
            }
        }
    }
}

// ---------------------------------------------------------------------
// Boundary scenarios
// ---------------------------------------------------------------------

#[test]
fn test_minimal_literal_function() {
    let (mir, types) = lower("fn f() -> i32 { 42 }");
    let f = function(&mir, "f");
    assert_wellformed(f);

    assert_eq!(f.blocks.len(), 1);
    let block = f.block(f.start_block);
    assert!(block.statements.is_empty());
    match block.terminator.as_ref().unwrap() {
        Terminator::Return(Some(Operand::Constant(c))) => {
            assert_eq!(c.ty, types.i32_ty());
            assert!(matches!(c.value, ConstantValue::Int { value: 42, .. }));
        }
        other => panic!("expected return of 42, got {other:?}"),
    }
}

#[test]
fn test_short_circuit_and() {
    let (mir, _) = lower("fn g(a: bool, b: bool) -> bool { a && b }");
    let g = function(&mir, "g");
    assert_wellformed(g);

    // entry, rhs, join
    assert_eq!(g.blocks.len(), 3);
    let entry = g.block(g.start_block);

    // entry evaluates `a` and holds the short-circuit `false` constant
    let false_temp = entry
        .statements
        .iter()
        .find_map(|s| match s {
            Statement::Define {
                dest,
                rvalue: RValue::Constant(c),
            } if matches!(c.value, ConstantValue::Bool(false)) => Some(*dest),
            _ => None,
        })
        .expect("entry defines the short-circuit false");

    let (rhs_block, join_block) = match entry.terminator.as_ref().unwrap() {
        Terminator::SwitchInt {
            targets, otherwise, ..
        } => {
            assert_eq!(targets.len(), 1);
            assert!(matches!(targets[0].value.value, ConstantValue::Bool(true)));
            (targets[0].block, *otherwise)
        }
        other => panic!("expected switch, got {other:?}"),
    };

    // rhs evaluates b and jumps to the join
    let rhs = g.block(rhs_block);
    assert!(matches!(
        rhs.terminator.as_ref().unwrap(),
        Terminator::Goto { target } if *target == join_block
    ));

    // the join phis the short-circuit constant with b
    let join = g.block(join_block);
    assert_eq!(join.phis.len(), 1);
    let phi = &join.phis[0];
    assert_eq!(phi.incoming.len(), 2);
    assert!(phi
        .incoming
        .iter()
        .any(|inc| inc.block == g.start_block && inc.value == false_temp));
    assert!(phi.incoming.iter().any(|inc| inc.block == rhs_block));

    // the function returns the phi result
    assert!(matches!(
        join.terminator.as_ref().unwrap(),
        Terminator::Return(Some(Operand::Temp(t))) if *t == phi.dest
    ));
}

#[test]
fn test_loop_with_break_value() {
    let (mir, _) = lower("fn h() -> i32 { loop { break 7; } }");
    let h = function(&mir, "h");
    assert_wellformed(h);

    // entry jumps into the body
    let entry = h.block(h.start_block);
    let body_block = match entry.terminator.as_ref().unwrap() {
        Terminator::Goto { target } => *target,
        other => panic!("expected goto, got {other:?}"),
    };

    // the body records the break value and jumps to the break block
    let body = h.block(body_block);
    let break_block = match body.terminator.as_ref().unwrap() {
        Terminator::Goto { target } => *target,
        other => panic!("expected goto, got {other:?}"),
    };
    let seven = body
        .statements
        .iter()
        .find_map(|s| match s {
            Statement::Define {
                dest,
                rvalue: RValue::Constant(c),
            } if matches!(c.value, ConstantValue::Int { value: 7, .. }) => Some(*dest),
            _ => None,
        })
        .expect("break value 7 materialized in the body");

    let brk = h.block(break_block);
    assert_eq!(brk.phis.len(), 1);
    assert_eq!(brk.phis[0].incoming.len(), 1);
    assert_eq!(brk.phis[0].incoming[0].block, body_block);
    assert_eq!(brk.phis[0].incoming[0].value, seven);
    assert!(matches!(
        brk.terminator.as_ref().unwrap(),
        Terminator::Return(Some(Operand::Temp(t))) if *t == brk.phis[0].dest
    ));
}

#[test]
fn test_nrvo_elision() {
    let (mir, _) = lower(
        "struct P { x: i32 }\n\
         fn mk() -> P { let p = P { x: 1 }; p }",
    );
    let mk = function(&mir, "mk");
    assert_wellformed(mk);

    // aggregate return goes through SRET at ABI position 0
    assert!(mk.uses_sret());
    assert!(matches!(
        mk.sig.return_desc,
        ReturnDesc::IndirectSRet { sret_index: 0, .. }
    ));
    assert!(matches!(mk.sig.abi_params[0].kind, AbiParamKind::SRet));

    // the local `p` is aliased to the SRET slot
    let p = mk
        .locals
        .iter()
        .position(|l| l.debug_name == "p")
        .expect("local p");
    assert_eq!(mk.locals[p].alias, LocalAlias::AbiParam(0));

    // the struct literal writes straight into the slot, no copy follows
    assert_eq!(mk.blocks.len(), 1);
    let block = mk.block(mk.start_block);
    assert_eq!(block.statements.len(), 1);
    match &block.statements[0] {
        Statement::Init { dest, pattern } => {
            assert_eq!(*dest, Place::local(p as LocalId));
            match pattern {
                InitPattern::Struct(leaves) => {
                    assert_eq!(leaves.len(), 1);
                    assert!(matches!(
                        leaves[0],
                        InitLeaf::Value(ValueSource::Operand(Operand::Constant(_)))
                    ));
                }
                other => panic!("expected struct init, got {other:?}"),
            }
        }
        other => panic!("expected init statement, got {other:?}"),
    }
    assert!(matches!(
        block.terminator.as_ref().unwrap(),
        Terminator::Return(None)
    ));
}

// ---------------------------------------------------------------------
// Structure and invariants
// ---------------------------------------------------------------------

#[test]
fn test_let_aggregate_has_single_init_and_no_copy() {
    let (mir, _) = lower("fn f() { let x = [1, 2, 3]; }");
    let f = function(&mir, "f");
    assert_wellformed(f);

    let inits: Vec<_> = f
        .blocks
        .iter()
        .flat_map(|b| &b.statements)
        .filter(|s| matches!(s, Statement::Init { .. }))
        .collect();
    assert_eq!(inits.len(), 1);
    assert!(matches!(
        inits[0],
        Statement::Init {
            pattern: InitPattern::ArrayLiteral(_),
            ..
        }
    ));
    // no Aggregate rvalue fallback, no copy
    for block in &f.blocks {
        for stmt in &block.statements {
            assert!(!matches!(
                stmt,
                Statement::Define {
                    rvalue: RValue::Aggregate { .. } | RValue::ArrayRepeat { .. },
                    ..
                } | Statement::Init {
                    pattern: InitPattern::Copy(_),
                    ..
                }
            ));
        }
    }
}

#[test]
fn test_nested_struct_literal_deep_elision() {
    let (mir, _) = lower(
        "struct Inner { a: i32 }\n\
         struct Outer { inner: Inner, b: i32 }\n\
         fn f() { let o = Outer { inner: Inner { a: 1 }, b: 2 }; }",
    );
    let f = function(&mir, "f");
    assert_wellformed(f);

    // the inner literal writes through a field projection of `o`; the
    // outer init marks that slot as omitted
    let stmts: Vec<_> = f.blocks.iter().flat_map(|b| &b.statements).collect();
    let inner_init = stmts
        .iter()
        .find_map(|s| match s {
            Statement::Init { dest, pattern } if !dest.projections.is_empty() => {
                Some((dest, pattern))
            }
            _ => None,
        })
        .expect("inner init targets a projected place");
    assert!(matches!(
        inner_init.0.projections[0],
        Projection::Field(0)
    ));

    let outer = stmts
        .iter()
        .find_map(|s| match s {
            Statement::Init {
                dest,
                pattern: InitPattern::Struct(leaves),
            } if dest.projections.is_empty() => Some(leaves),
            _ => None,
        })
        .expect("outer init");
    assert!(matches!(outer[0], InitLeaf::Omitted));
    assert!(matches!(outer[1], InitLeaf::Value(_)));
}

#[test]
fn test_while_loop_structure() {
    let (mir, _) = lower("fn f(n: i32) { let mut i = 0; while i < n { i += 1; } }");
    let f = function(&mir, "f");
    assert_wellformed(f);

    // header re-evaluates the condition; body jumps back to it
    let header = f
        .blocks
        .iter()
        .position(|b| matches!(b.terminator, Some(Terminator::SwitchInt { .. })))
        .expect("condition header block");
    let (body, brk) = match f.blocks[header].terminator.as_ref().unwrap() {
        Terminator::SwitchInt {
            targets, otherwise, ..
        } => (targets[0].block, *otherwise),
        _ => unreachable!(),
    };
    assert!(matches!(
        f.blocks[body as usize].terminator.as_ref().unwrap(),
        Terminator::Goto { target } if *target as usize == header
    ));
    assert!(matches!(
        f.blocks[brk as usize].terminator.as_ref().unwrap(),
        Terminator::Return(None)
    ));
}

#[test]
fn test_string_literals_are_deduplicated() {
    let (mir, _) = lower("fn f() { print(\"hi\"); print(\"hi\"); print(\"other\"); }");
    assert_eq!(mir.globals.len(), 2);
    let GlobalValue::String(first) = &mir.globals[0].value;
    assert_eq!(first.data, "hi");
    assert_eq!(first.length, 2);
}

#[test]
fn test_ref_of_value_materializes_named_temp() {
    let (mir, _) = lower("fn f() { let r = &1; let m = &mut 2; }");
    let f = function(&mir, "f");
    assert_wellformed(f);

    assert!(f.locals.iter().any(|l| l.debug_name.starts_with("_ref_tmp")));
    assert!(f
        .locals
        .iter()
        .any(|l| l.debug_name.starts_with("_ref_mut_tmp")));
    // and a Ref rvalue takes its address
    let refs = f
        .blocks
        .iter()
        .flat_map(|b| &b.statements)
        .filter(|s| matches!(s, Statement::Define { rvalue: RValue::Ref(_), .. }))
        .count();
    assert_eq!(refs, 2);
}

#[test]
fn test_ref_of_place_takes_address_directly() {
    let (mir, _) = lower("fn f() { let x = 1; let r = &x; }");
    let f = function(&mir, "f");
    // no materialization local
    assert!(!f.locals.iter().any(|l| l.debug_name.starts_with("_ref_tmp")));
}

#[test]
fn test_struct_argument_passed_indirectly_as_copy() {
    let (mir, _) = lower(
        "struct P { x: i32 }\n\
         fn use_p(p: P) -> i32 { p.x }\n\
         fn f() { let q = P { x: 3 }; use_p(q); }",
    );
    let f = function(&mir, "f");
    assert_wellformed(f);

    let call = f
        .blocks
        .iter()
        .flat_map(|b| &b.statements)
        .find_map(|s| match s {
            Statement::Call { args, .. } => Some(args),
            _ => None,
        })
        .expect("call statement");
    // the struct argument travels as a place (address of a fresh copy)
    assert!(matches!(call[0], ValueSource::Place(_)));
    assert!(f.locals.iter().any(|l| l.debug_name.starts_with("_arg_tmp")));

    // callee side: the parameter local aliases the incoming pointer
    let use_p = function(&mir, "use_p");
    let param_local = use_p.sig.params[0].local;
    assert!(matches!(
        use_p.local_info(param_local).alias,
        LocalAlias::AbiParam(0)
    ));
}

#[test]
fn test_sret_call_into_let_destination() {
    let (mir, _) = lower(
        "struct P { x: i32 }\n\
         fn mk() -> P { let p = P { x: 1 }; p }\n\
         fn f() { let local = mk(); }",
    );
    let f = function(&mir, "f");
    assert_wellformed(f);

    let call = f
        .blocks
        .iter()
        .flat_map(|b| &b.statements)
        .find_map(|s| match s {
            Statement::Call { sret_dest, .. } => Some(sret_dest.clone()),
            _ => None,
        })
        .expect("call statement");
    // the callee writes straight into `local`'s storage
    let local = f
        .locals
        .iter()
        .position(|l| l.debug_name == "local")
        .unwrap();
    assert_eq!(call, Some(Place::local(local as LocalId)));
}

#[test]
fn test_method_call_takes_receiver_address() {
    let (mir, _) = lower(
        "struct P { x: i32 }\n\
         impl P { fn get(&self) -> i32 { self.x } }\n\
         fn f() { let p = P { x: 1 }; p.get(); }",
    );
    let f = function(&mir, "f");
    assert_wellformed(f);

    // a Ref of p's place feeds the call
    let has_ref = f
        .blocks
        .iter()
        .flat_map(|b| &b.statements)
        .any(|s| matches!(s, Statement::Define { rvalue: RValue::Ref(_), .. }));
    assert!(has_ref);

    // the method itself was lowered under a qualified name
    assert!(mir.functions.iter().any(|func| func.name == "P.get"));
}

#[test]
fn test_enum_variant_lowers_to_usize_discriminant() {
    let (mir, types) = lower(
        "enum Color { Red, Green, Blue }\n\
         fn f() -> Color { Color::Green }",
    );
    let f = function(&mir, "f");
    match f.block(f.start_block).terminator.as_ref().unwrap() {
        Terminator::Return(Some(Operand::Constant(c))) => {
            assert_eq!(c.ty, types.usize_ty());
            assert!(matches!(c.value, ConstantValue::Int { value: 1, .. }));
        }
        other => panic!("expected discriminant return, got {other:?}"),
    }
    // the function's return type canonicalized to usize
    assert!(matches!(f.sig.return_desc, ReturnDesc::Direct(ty) if ty == types.usize_ty()));
}

#[test]
fn test_array_repeat_single_evaluation() {
    let (mir, _) = lower("fn f() { let a = [0; 10]; }");
    let f = function(&mir, "f");
    assert_wellformed(f);

    let init = f
        .blocks
        .iter()
        .flat_map(|b| &b.statements)
        .find_map(|s| match s {
            Statement::Init { pattern, .. } => Some(pattern),
            _ => None,
        })
        .expect("repeat init");
    match init {
        InitPattern::ArrayRepeat { element, count } => {
            assert_eq!(*count, 10);
            assert!(matches!(**element, InitLeaf::Value(_)));
        }
        other => panic!("expected array repeat, got {other:?}"),
    }
}

#[test]
fn test_compound_assignment_loads_once() {
    let (mir, _) = lower("fn f() { let mut x = 1; x += 2; }");
    let f = function(&mir, "f");
    assert_wellformed(f);

    let stmts: Vec<_> = f.blocks.iter().flat_map(|b| &b.statements).collect();
    let loads = stmts
        .iter()
        .filter(|s| matches!(s, Statement::Load { .. }))
        .count();
    assert_eq!(loads, 1);
    let adds = stmts
        .iter()
        .filter(|s| {
            matches!(
                s,
                Statement::Define {
                    rvalue: RValue::Binary {
                        kind: BinOpKind::IAdd,
                        ..
                    },
                    ..
                }
            )
        })
        .count();
    assert_eq!(adds, 1);
}

#[test]
fn test_unsigned_operations_select_unsigned_opcodes() {
    let (mir, _) = lower("fn f(a: u32, b: u32) -> bool { a / b < a }");
    let f = function(&mir, "f");
    let kinds: Vec<BinOpKind> = f
        .blocks
        .iter()
        .flat_map(|b| &b.statements)
        .filter_map(|s| match s {
            Statement::Define {
                rvalue: RValue::Binary { kind, .. },
                ..
            } => Some(*kind),
            _ => None,
        })
        .collect();
    assert!(kinds.contains(&BinOpKind::UDiv));
    assert!(kinds.contains(&BinOpKind::UCmpLt));
}

#[test]
fn test_signed_shift_right_is_arithmetic() {
    let (mir, _) = lower("fn f(a: i32, b: u32) -> i32 { let x = b >> 1u32; a >> 1 }");
    let f = function(&mir, "f");
    let kinds: Vec<BinOpKind> = f
        .blocks
        .iter()
        .flat_map(|b| &b.statements)
        .filter_map(|s| match s {
            Statement::Define {
                rvalue: RValue::Binary { kind, .. },
                ..
            } => Some(*kind),
            _ => None,
        })
        .collect();
    assert!(kinds.contains(&BinOpKind::ShrArithmetic));
    assert!(kinds.contains(&BinOpKind::ShrLogical));
}

#[test]
fn test_builtins_become_external_declarations() {
    let (mir, _) = lower("fn f() { printInt(1); }");
    assert!(mir
        .external_functions
        .iter()
        .any(|e| e.name == "printInt"));
    let f = function(&mir, "f");
    let call = f
        .blocks
        .iter()
        .flat_map(|b| &b.statements)
        .find_map(|s| match s {
            Statement::Call { target, .. } => Some(*target),
            _ => None,
        })
        .expect("call");
    assert_eq!(call.kind, CallTargetKind::External);
}

#[test]
fn test_all_functions_wellformed_in_larger_program() {
    let (mir, _) = lower(
        "struct Vec2 { x: i32, y: i32 }\n\
         impl Vec2 {\n\
           fn dot(&self, other: &Vec2) -> i32 { self.x * other.x + self.y * other.y }\n\
           fn scale(&mut self, k: i32) { self.x *= k; self.y *= k; }\n\
         }\n\
         fn sum(n: i32) -> i32 {\n\
           let mut acc = 0;\n\
           let mut i = 0;\n\
           while i < n { acc += i; i += 1; }\n\
           acc\n\
         }\n\
         fn choose(c: bool) -> i32 { if c { sum(10) } else { 0 } }\n\
         fn main() { let v = Vec2 { x: 1, y: 2 }; printInt(choose(true)); exit(0); }",
    );
    for func in &mir.functions {
        assert_wellformed(func);
    }
}
