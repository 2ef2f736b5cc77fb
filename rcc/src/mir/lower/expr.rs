//! Expression and statement lowering rules

use super::result::LowerResult;
use super::{sig, FunctionLowerer, LoopCtx};
use crate::ast::{AssignOp, BinaryOp};
use crate::error::{CompileError, Result};
use crate::hir;
use crate::mir::{
    AbiParamKind, BinOpKind, Constant, ConstantValue, InitLeaf, InitPattern, Operand, Place,
    PhiIncoming, PhiNode, RValue, Statement, SwitchTarget, TempId, Terminator, UnOpKind,
    ValueSource,
};
use crate::types::{Ty, TypeId};

impl<'a, 't, 'h> FunctionLowerer<'a, 't, 'h> {
    /// The canonicalized type the checker assigned to an expression
    fn expr_ty(&mut self, expr: &hir::Expr) -> TypeId {
        let ty = expr.expect_info().ty;
        self.canon(ty)
    }

    fn usize_const(&mut self, value: u64) -> Operand {
        Operand::Constant(Constant {
            ty: self.env.types.usize_ty(),
            value: ConstantValue::Int {
                value,
                is_negative: false,
                is_signed: false,
            },
        })
    }

    fn bool_const(&mut self, value: bool) -> Constant {
        Constant {
            ty: self.env.types.bool_ty(),
            value: ConstantValue::Bool(value),
        }
    }

    /// Force an operand into a temp (phi incomings require temps)
    fn operand_to_temp(&mut self, op: Operand, ty: TypeId) -> TempId {
        match op {
            Operand::Temp(t) => t,
            Operand::Constant(c) => {
                let dest = self.new_temp(ty);
                self.push_stmt(Statement::Define {
                    dest,
                    rvalue: RValue::Constant(c),
                });
                dest
            }
        }
    }

    // -----------------------------------------------------------------
    // Blocks and statements
    // -----------------------------------------------------------------

    pub(super) fn lower_block(
        &mut self,
        block: &hir::Block,
        dest: Option<&Place>,
    ) -> Result<LowerResult> {
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
            if self.is_terminated() {
                // the rest of the block is unreachable
                return Ok(LowerResult::Operand(self.unit_operand()));
            }
        }
        match &block.final_expr {
            Some(final_expr) => self.lower_expr(final_expr, dest),
            None => Ok(LowerResult::Operand(self.unit_operand())),
        }
    }

    fn lower_stmt(&mut self, stmt: &hir::Stmt) -> Result<()> {
        match stmt {
            hir::Stmt::Let { target, init, .. } => match target {
                hir::LetTarget::Local(local) => {
                    let place = Place::local(local.0);
                    let ty = self.func.locals[local.index()].ty;
                    if let Some(init) = init {
                        let result = self.lower_expr(init, Some(&place))?;
                        if !self.is_terminated() {
                            result.write_to_dest(self, &place, ty);
                        }
                    }
                    Ok(())
                }
                hir::LetTarget::Wildcard => {
                    if let Some(init) = init {
                        // evaluate for effect only
                        self.lower_expr(init, None)?;
                    }
                    Ok(())
                }
            },
            hir::Stmt::Expr { expr, .. } => {
                self.lower_expr(expr, None)?;
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    pub(super) fn lower_expr(
        &mut self,
        expr: &hir::Expr,
        dest: Option<&Place>,
    ) -> Result<LowerResult> {
        stacker::maybe_grow(super::STACK_RED_ZONE, super::STACK_GROW_SIZE, || {
            self.lower_expr_inner(expr, dest)
        })
    }

    fn lower_expr_inner(
        &mut self,
        expr: &hir::Expr,
        dest: Option<&Place>,
    ) -> Result<LowerResult> {
        match &expr.kind {
            hir::ExprKind::Literal(lit) => self.lower_literal(expr, lit),

            hir::ExprKind::Variable(local) => Ok(LowerResult::Place(Place::local(local.0))),

            hir::ExprKind::ConstUse(id) => {
                if self.const_depth > 64 {
                    return Err(CompileError::lowering(
                        "constant definitions form a cycle",
                    ));
                }
                let hir = self.env.hir;
                let value = &hir.consts[id.index()].value;
                self.const_depth += 1;
                let result = self.lower_expr(value, dest);
                self.const_depth -= 1;
                result
            }

            hir::ExprKind::FuncUse(_) => Err(CompileError::lowering(
                "function reference reached lowering outside a call",
            )),

            hir::ExprKind::StructConst(_) => {
                let ty = self.expr_ty(expr);
                self.lower_aggregate(expr, &[], AggregateShape::Struct, ty, dest)
            }

            hir::ExprKind::EnumVariant { variant_index, .. } => {
                let usize_ty = self.env.types.usize_ty();
                Ok(LowerResult::Operand(Operand::Constant(Constant {
                    ty: usize_ty,
                    value: ConstantValue::Int {
                        value: *variant_index as u64,
                        is_negative: false,
                        is_signed: false,
                    },
                })))
            }

            hir::ExprKind::Grouped(inner) => self.lower_expr(inner, dest),

            hir::ExprKind::Underscore => Err(CompileError::lowering(
                "`_` reached lowering outside an assignment",
            )),

            hir::ExprKind::Unary { op, operand } => self.lower_unary(*op, operand),

            hir::ExprKind::Binary { op, left, right } => {
                if op.is_short_circuit() {
                    self.lower_short_circuit(*op, left, right)
                } else {
                    self.lower_binary(expr, *op, left, right)
                }
            }

            hir::ExprKind::Assign { op, left, right } => self.lower_assign(*op, left, right),

            hir::ExprKind::Cast { expr: inner, target_ty } => {
                let inner_ty = self.expr_ty(inner);
                let value = self.lower_expr(inner, None)?.into_operand(self, inner_ty);
                let target = self.canon(*target_ty);
                let dest_temp = self.new_temp(target);
                self.push_stmt(Statement::Define {
                    dest: dest_temp,
                    rvalue: RValue::Cast {
                        value,
                        target_ty: target,
                    },
                });
                Ok(LowerResult::Operand(Operand::Temp(dest_temp)))
            }

            hir::ExprKind::ArrayInit(elements) => {
                let ty = self.expr_ty(expr);
                self.lower_aggregate(expr, elements, AggregateShape::Array, ty, dest)
            }

            hir::ExprKind::ArrayRepeat { value, count } => {
                let count = match count {
                    hir::RepeatCount::Const(n) => *n,
                    hir::RepeatCount::Expr(_) => {
                        return Err(CompileError::lowering(
                            "array repeat count was not a compile-time constant",
                        ));
                    }
                };
                let ty = self.expr_ty(expr);
                self.lower_array_repeat(value, count, ty, dest)
            }

            hir::ExprKind::Index { array, index } => {
                let array_ty = self.expr_ty(array);
                let array_place = self.lower_expr(array, None)?.into_place(self, array_ty);
                let usize_ty = self.env.types.usize_ty();
                let index_op = self.lower_expr(index, None)?.into_operand(self, usize_ty);
                Ok(LowerResult::Place(array_place.index(index_op)))
            }

            hir::ExprKind::StructLiteral { fields, .. } => {
                let ty = self.expr_ty(expr);
                self.lower_aggregate(expr, fields, AggregateShape::Struct, ty, dest)
            }

            hir::ExprKind::Call { callee, args } => {
                let func = match callee_func(callee) {
                    Some(f) => f,
                    None => {
                        return Err(CompileError::lowering(
                            "call target was not a resolved function",
                        ));
                    }
                };
                self.lower_call(func, Vec::new(), args, dest)
            }

            hir::ExprKind::MethodCall {
                receiver,
                resolved,
                args,
                ..
            } => {
                let func = resolved.expect("method resolved by the checker");
                let receiver_src = self.lower_receiver(func, receiver)?;
                self.lower_call(func, vec![receiver_src], args, dest)
            }

            hir::ExprKind::FieldAccess {
                object, resolved, ..
            } => {
                let (_, index) = resolved.expect("field resolved by the checker");
                let object_info_ty = object.expect_info().ty;
                match self.env.types.get(object_info_ty).clone() {
                    Ty::Reference { .. } => {
                        let ref_ty = self.canon(object_info_ty);
                        let ptr = self.lower_expr(object, None)?.into_operand(self, ref_ty);
                        let temp = self.operand_to_temp(ptr, ref_ty);
                        Ok(LowerResult::Place(Place::pointer(temp).field(index)))
                    }
                    _ => {
                        let object_ty = self.canon(object_info_ty);
                        let place = self.lower_expr(object, None)?.into_place(self, object_ty);
                        Ok(LowerResult::Place(place.field(index)))
                    }
                }
            }

            hir::ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(expr, condition, then_branch, else_branch.as_deref(), dest),

            hir::ExprKind::Loop { body, loop_id } => self.lower_loop(expr, body, *loop_id),

            hir::ExprKind::While {
                condition,
                body,
                loop_id,
            } => self.lower_while(condition, body, *loop_id),

            hir::ExprKind::Return { value } => self.lower_return(value.as_deref()),

            hir::ExprKind::Break { value, target } => {
                let target = target.expect("break target resolved by the checker");
                self.lower_break(value.as_deref(), target)
            }

            hir::ExprKind::Continue { target } => {
                let target = target.expect("continue target resolved by the checker");
                let ctx = self
                    .loop_stack
                    .iter()
                    .rev()
                    .find(|c| c.loop_id == target)
                    .expect("continue target is on the loop stack");
                let continue_block = ctx.continue_block;
                self.terminate(Terminator::Goto {
                    target: continue_block,
                });
                Ok(LowerResult::Operand(self.unit_operand()))
            }

            hir::ExprKind::Block(block) => self.lower_block(block, dest),
        }
    }

    fn lower_literal(&mut self, expr: &hir::Expr, lit: &hir::Literal) -> Result<LowerResult> {
        let ty = self.expr_ty(expr);
        match lit {
            hir::Literal::Int { value, .. } => {
                let is_signed = self.env.types.is_signed_integer(ty);
                Ok(LowerResult::Operand(Operand::Constant(Constant {
                    ty,
                    value: ConstantValue::Int {
                        value: *value,
                        is_negative: false,
                        is_signed,
                    },
                })))
            }
            hir::Literal::Bool(b) => Ok(LowerResult::Operand(Operand::Constant(Constant {
                ty,
                value: ConstantValue::Bool(*b),
            }))),
            hir::Literal::Char(c) => Ok(LowerResult::Operand(Operand::Constant(Constant {
                ty,
                value: ConstantValue::Char(*c),
            }))),
            hir::Literal::Str { value, is_cstyle } => {
                let global = self.env.intern_string(value, *is_cstyle);
                Ok(LowerResult::Place(Place::global(global)))
            }
        }
    }

    fn lower_unary(&mut self, op: hir::UnaryOp, operand: &hir::Expr) -> Result<LowerResult> {
        match op {
            hir::UnaryOp::Not | hir::UnaryOp::Negate => {
                let ty = self.expr_ty(operand);
                let value = self.lower_expr(operand, None)?.into_operand(self, ty);
                let dest = self.new_temp(ty);
                let kind = if matches!(op, hir::UnaryOp::Not) {
                    UnOpKind::Not
                } else {
                    UnOpKind::Neg
                };
                self.push_stmt(Statement::Define {
                    dest,
                    rvalue: RValue::Unary {
                        kind,
                        operand: value,
                    },
                });
                Ok(LowerResult::Operand(Operand::Temp(dest)))
            }
            hir::UnaryOp::Deref => {
                let ref_ty = self.expr_ty(operand);
                let value = self.lower_expr(operand, None)?.into_operand(self, ref_ty);
                let temp = self.operand_to_temp(value, ref_ty);
                Ok(LowerResult::Place(Place::pointer(temp)))
            }
            hir::UnaryOp::Ref { is_mut } => {
                let operand_ty = self.expr_ty(operand);
                let result = self.lower_expr(operand, None)?;
                let place = match result {
                    LowerResult::Place(place) => place,
                    LowerResult::Operand(op) => {
                        // materialize the value so it has an address
                        let hint = if is_mut { "_ref_mut_tmp" } else { "_ref_tmp" };
                        let local = self.new_synthetic_local(operand_ty, hint);
                        let place = Place::local(local);
                        self.push_stmt(Statement::Assign {
                            dest: place.clone(),
                            src: ValueSource::Operand(op),
                        });
                        place
                    }
                    LowerResult::Written => {
                        panic!("reference operand lowered without a destination hint")
                    }
                };
                let ref_ty = {
                    let canon = self.canon(operand_ty);
                    self.env.types.reference(canon, is_mut)
                };
                let dest = self.new_temp(ref_ty);
                self.push_stmt(Statement::Define {
                    dest,
                    rvalue: RValue::Ref(place),
                });
                Ok(LowerResult::Operand(Operand::Temp(dest)))
            }
        }
    }

    fn lower_binary(
        &mut self,
        expr: &hir::Expr,
        op: BinaryOp,
        left: &hir::Expr,
        right: &hir::Expr,
    ) -> Result<LowerResult> {
        let operand_ty = self.expr_ty(left);
        let lhs = self.lower_expr(left, None)?.into_operand(self, operand_ty);
        let rhs_ty = self.expr_ty(right);
        let rhs = self.lower_expr(right, None)?.into_operand(self, rhs_ty);

        let result_ty = self.expr_ty(expr);
        let kind = self.binop_kind(op, operand_ty);
        let dest = self.new_temp(result_ty);
        self.push_stmt(Statement::Define {
            dest,
            rvalue: RValue::Binary { kind, lhs, rhs },
        });
        Ok(LowerResult::Operand(Operand::Temp(dest)))
    }

    /// `&&`/`||` evaluate the right-hand side only when needed; the
    /// short-circuit path phis in the determined constant.
    fn lower_short_circuit(
        &mut self,
        op: BinaryOp,
        left: &hir::Expr,
        right: &hir::Expr,
    ) -> Result<LowerResult> {
        let bool_ty = self.env.types.bool_ty();
        let lhs = self.lower_expr(left, None)?.into_operand(self, bool_ty);

        // the phi needs a temp carrying the short-circuit constant
        let short_value = matches!(op, BinaryOp::Or);
        let short_const = self.bool_const(short_value);
        let short_temp = self.new_temp(bool_ty);
        self.push_stmt(Statement::Define {
            dest: short_temp,
            rvalue: RValue::Constant(short_const),
        });

        let rhs_block = self.new_block();
        let join_block = self.new_block();
        let pred_block = self.current_block;

        let true_const = self.bool_const(true);
        let (on_true, otherwise) = if matches!(op, BinaryOp::And) {
            (rhs_block, join_block)
        } else {
            (join_block, rhs_block)
        };
        self.terminate(Terminator::SwitchInt {
            discriminant: lhs,
            targets: vec![SwitchTarget {
                value: true_const,
                block: on_true,
            }],
            otherwise,
        });

        self.switch_to(rhs_block);
        let rhs = self.lower_expr(right, None)?.into_operand(self, bool_ty);
        let rhs_temp = self.operand_to_temp(rhs, bool_ty);
        let rhs_end = self.current_block;
        let rhs_reaches_join = !self.is_terminated();
        if rhs_reaches_join {
            self.terminate(Terminator::Goto { target: join_block });
        }

        let result = self.new_temp(bool_ty);
        let mut incoming = vec![PhiIncoming {
            block: pred_block,
            value: short_temp,
        }];
        if rhs_reaches_join {
            incoming.push(PhiIncoming {
                block: rhs_end,
                value: rhs_temp,
            });
        }
        self.install_phi(join_block, PhiNode {
            dest: result,
            incoming,
        });

        self.switch_to(join_block);
        Ok(LowerResult::Operand(Operand::Temp(result)))
    }

    fn lower_assign(
        &mut self,
        op: AssignOp,
        left: &hir::Expr,
        right: &hir::Expr,
    ) -> Result<LowerResult> {
        if matches!(left.kind, hir::ExprKind::Underscore) {
            // evaluate and discard
            self.lower_expr(right, None)?;
            return Ok(LowerResult::Operand(self.unit_operand()));
        }

        let lhs_ty = self.expr_ty(left);
        let lhs_place = self.lower_expr(left, None)?.into_place(self, lhs_ty);

        match op.binary_op() {
            None => {
                let result = self.lower_expr(right, Some(&lhs_place))?;
                if !self.is_terminated() {
                    result.write_to_dest(self, &lhs_place, lhs_ty);
                }
            }
            Some(bin_op) => {
                let loaded = self.new_temp(lhs_ty);
                self.push_stmt(Statement::Load {
                    dest: loaded,
                    src: lhs_place.clone(),
                });
                let rhs = self.lower_expr(right, None)?.into_operand(self, lhs_ty);
                let kind = self.binop_kind(bin_op, lhs_ty);
                let combined = self.new_temp(lhs_ty);
                self.push_stmt(Statement::Define {
                    dest: combined,
                    rvalue: RValue::Binary {
                        kind,
                        lhs: Operand::Temp(loaded),
                        rhs,
                    },
                });
                self.push_stmt(Statement::Assign {
                    dest: lhs_place,
                    src: ValueSource::Operand(Operand::Temp(combined)),
                });
            }
        }
        Ok(LowerResult::Operand(self.unit_operand()))
    }

    fn lower_if(
        &mut self,
        expr: &hir::Expr,
        condition: &hir::Expr,
        then_branch: &hir::Block,
        else_branch: Option<&hir::Expr>,
        dest: Option<&Place>,
    ) -> Result<LowerResult> {
        let bool_ty = self.env.types.bool_ty();
        let cond = self
            .lower_expr(condition, None)?
            .into_operand(self, bool_ty);

        let then_block = self.new_block();
        let join_block = self.new_block();
        let else_block = match else_branch {
            Some(_) => self.new_block(),
            None => join_block,
        };

        let true_const = self.bool_const(true);
        self.terminate(Terminator::SwitchInt {
            discriminant: cond,
            targets: vec![SwitchTarget {
                value: true_const,
                block: then_block,
            }],
            otherwise: else_block,
        });

        let result_ty = self.expr_ty(expr);
        let produces_value = !self.env.types.is_unit(result_ty)
            && !self.env.types.is_never(result_ty)
            && else_branch.is_some();

        if let Some(dest) = dest {
            // forward the hint so aggregate branches avoid the phi
            self.switch_to(then_block);
            let then_result = self.lower_block(then_branch, Some(dest))?;
            if !self.is_terminated() {
                then_result.write_to_dest(self, dest, result_ty);
                self.terminate(Terminator::Goto { target: join_block });
            }
            if let Some(else_expr) = else_branch {
                self.switch_to(else_block);
                let else_result = self.lower_expr(else_expr, Some(dest))?;
                if !self.is_terminated() {
                    else_result.write_to_dest(self, dest, result_ty);
                    self.terminate(Terminator::Goto { target: join_block });
                }
            }
            self.switch_to(join_block);
            return Ok(LowerResult::Written);
        }

        if produces_value {
            self.switch_to(then_block);
            let then_result = self.lower_block(then_branch, None)?;
            let mut incoming = Vec::new();
            if !self.is_terminated() {
                let op = then_result.into_operand(self, result_ty);
                let temp = self.operand_to_temp(op, result_ty);
                incoming.push(PhiIncoming {
                    block: self.current_block,
                    value: temp,
                });
                self.terminate(Terminator::Goto { target: join_block });
            }

            let else_expr = else_branch.expect("value-producing if has an else branch");
            self.switch_to(else_block);
            let else_result = self.lower_expr(else_expr, None)?;
            if !self.is_terminated() {
                let op = else_result.into_operand(self, result_ty);
                let temp = self.operand_to_temp(op, result_ty);
                incoming.push(PhiIncoming {
                    block: self.current_block,
                    value: temp,
                });
                self.terminate(Terminator::Goto { target: join_block });
            }

            let result = self.new_temp(result_ty);
            if !incoming.is_empty() {
                self.install_phi(join_block, PhiNode {
                    dest: result,
                    incoming,
                });
            }
            self.switch_to(join_block);
            return Ok(LowerResult::Operand(Operand::Temp(result)));
        }

        // unit or diverging result: no value to merge
        self.switch_to(then_block);
        self.lower_block(then_branch, None)?;
        if !self.is_terminated() {
            self.terminate(Terminator::Goto { target: join_block });
        }
        if let Some(else_expr) = else_branch {
            self.switch_to(else_block);
            self.lower_expr(else_expr, None)?;
            if !self.is_terminated() {
                self.terminate(Terminator::Goto { target: join_block });
            }
        }
        self.switch_to(join_block);
        Ok(LowerResult::Operand(self.unit_operand()))
    }

    fn lower_loop(
        &mut self,
        expr: &hir::Expr,
        body: &hir::Block,
        loop_id: hir::LoopId,
    ) -> Result<LowerResult> {
        let body_block = self.new_block();
        let break_block = self.new_block();

        let result_ty = self.expr_ty(expr);
        let break_temp = if self.env.types.is_unit(result_ty) || self.env.types.is_never(result_ty)
        {
            None
        } else {
            Some(self.new_temp(result_ty))
        };

        self.terminate(Terminator::Goto { target: body_block });
        self.switch_to(body_block);

        self.loop_stack.push(LoopCtx {
            loop_id,
            continue_block: body_block,
            break_block,
            break_temp,
            incomings: Vec::new(),
        });
        self.lower_block(body, None)?;
        if !self.is_terminated() {
            self.terminate(Terminator::Goto { target: body_block });
        }
        let ctx = self.loop_stack.pop().expect("loop context pushed above");

        if let Some(temp) = ctx.break_temp {
            if !ctx.incomings.is_empty() {
                self.install_phi(
                    ctx.break_block,
                    PhiNode {
                        dest: temp,
                        incoming: ctx.incomings,
                    },
                );
            }
        }

        self.switch_to(break_block);
        match break_temp {
            Some(temp) => Ok(LowerResult::Operand(Operand::Temp(temp))),
            None => Ok(LowerResult::Operand(self.unit_operand())),
        }
    }

    fn lower_while(
        &mut self,
        condition: &hir::Expr,
        body: &hir::Block,
        loop_id: hir::LoopId,
    ) -> Result<LowerResult> {
        let header_block = self.new_block();
        let body_block = self.new_block();
        let break_block = self.new_block();

        self.terminate(Terminator::Goto {
            target: header_block,
        });
        self.switch_to(header_block);
        let bool_ty = self.env.types.bool_ty();
        let cond = self
            .lower_expr(condition, None)?
            .into_operand(self, bool_ty);
        let true_const = self.bool_const(true);
        self.terminate(Terminator::SwitchInt {
            discriminant: cond,
            targets: vec![SwitchTarget {
                value: true_const,
                block: body_block,
            }],
            otherwise: break_block,
        });

        self.switch_to(body_block);
        self.loop_stack.push(LoopCtx {
            loop_id,
            continue_block: header_block,
            break_block,
            break_temp: None,
            incomings: Vec::new(),
        });
        self.lower_block(body, None)?;
        if !self.is_terminated() {
            self.terminate(Terminator::Goto {
                target: header_block,
            });
        }
        self.loop_stack.pop();

        self.switch_to(break_block);
        Ok(LowerResult::Operand(self.unit_operand()))
    }

    fn lower_break(
        &mut self,
        value: Option<&hir::Expr>,
        target: hir::LoopId,
    ) -> Result<LowerResult> {
        let ctx_index = self
            .loop_stack
            .iter()
            .rposition(|c| c.loop_id == target)
            .expect("break target is on the loop stack");
        let break_block = self.loop_stack[ctx_index].break_block;
        let break_temp = self.loop_stack[ctx_index].break_temp;

        if let (Some(value), Some(temp)) = (value, break_temp) {
            let ty = self.func.temp_types[temp as usize];
            let op = self.lower_expr(value, None)?.into_operand(self, ty);
            let value_temp = self.operand_to_temp(op, ty);
            if !self.is_terminated() {
                let block = self.current_block;
                self.loop_stack[ctx_index].incomings.push(PhiIncoming {
                    block,
                    value: value_temp,
                });
                self.terminate(Terminator::Goto {
                    target: break_block,
                });
            }
        } else {
            if let Some(value) = value {
                // unit payload: evaluate for effect
                self.lower_expr(value, None)?;
            }
            if !self.is_terminated() {
                self.terminate(Terminator::Goto {
                    target: break_block,
                });
            }
        }
        Ok(LowerResult::Operand(self.unit_operand()))
    }

    fn lower_return(&mut self, value: Option<&hir::Expr>) -> Result<LowerResult> {
        match self.func.sig.return_desc {
            crate::mir::ReturnDesc::IndirectSRet { ty, .. } => {
                let place = self.plan.return_place();
                if let Some(value) = value {
                    let result = self.lower_expr(value, Some(&place))?;
                    if !self.is_terminated() {
                        result.write_to_dest(self, &place, ty);
                    }
                }
                if !self.is_terminated() {
                    self.terminate(Terminator::Return(None));
                }
            }
            crate::mir::ReturnDesc::Direct(ty) => {
                let value = value.expect("direct returns carry a value");
                let op = self.lower_expr(value, None)?.into_operand(self, ty);
                if !self.is_terminated() {
                    self.terminate(Terminator::Return(Some(op)));
                }
            }
            crate::mir::ReturnDesc::Void => {
                if let Some(value) = value {
                    self.lower_expr(value, None)?;
                }
                if !self.is_terminated() {
                    self.terminate(Terminator::Return(None));
                }
            }
            crate::mir::ReturnDesc::Never => {
                if let Some(value) = value {
                    self.lower_expr(value, None)?;
                }
                if !self.is_terminated() {
                    self.terminate(Terminator::Unreachable);
                }
            }
        }
        Ok(LowerResult::Operand(self.unit_operand()))
    }

    // -----------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------

    fn lower_aggregate(
        &mut self,
        _expr: &hir::Expr,
        elements: &[hir::Expr],
        shape: AggregateShape,
        ty: TypeId,
        dest: Option<&Place>,
    ) -> Result<LowerResult> {
        match dest {
            Some(dest) => {
                self.write_aggregate(elements, shape, dest)?;
                Ok(LowerResult::Written)
            }
            None => {
                let local = self.new_synthetic_local(ty, "_agg_tmp");
                let place = Place::local(local);
                self.write_aggregate(elements, shape, &place)?;
                Ok(LowerResult::Place(place))
            }
        }
    }

    fn write_aggregate(
        &mut self,
        elements: &[hir::Expr],
        shape: AggregateShape,
        dest: &Place,
    ) -> Result<()> {
        let mut leaves = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let sub_place = match shape {
                AggregateShape::Struct => dest.clone().field(index),
                AggregateShape::Array => {
                    let idx = self.usize_const(index as u64);
                    dest.clone().index(idx)
                }
            };
            let result = self.lower_expr(element, Some(&sub_place))?;
            leaves.push(match result {
                LowerResult::Written => InitLeaf::Omitted,
                LowerResult::Operand(op) => InitLeaf::Value(ValueSource::Operand(op)),
                LowerResult::Place(p) => InitLeaf::Value(ValueSource::Place(p)),
            });
        }
        let pattern = match shape {
            AggregateShape::Struct => InitPattern::Struct(leaves),
            AggregateShape::Array => InitPattern::ArrayLiteral(leaves),
        };
        self.push_stmt(Statement::Init {
            dest: dest.clone(),
            pattern,
        });
        Ok(())
    }

    fn lower_array_repeat(
        &mut self,
        value: &hir::Expr,
        count: usize,
        ty: TypeId,
        dest: Option<&Place>,
    ) -> Result<LowerResult> {
        // the element is evaluated exactly once
        let element = match self.lower_expr(value, None)? {
            LowerResult::Operand(op) => InitLeaf::Value(ValueSource::Operand(op)),
            LowerResult::Place(p) => InitLeaf::Value(ValueSource::Place(p)),
            LowerResult::Written => panic!("repeat element lowered without a destination hint"),
        };
        let pattern = InitPattern::ArrayRepeat {
            element: Box::new(element),
            count,
        };
        match dest {
            Some(dest) => {
                self.push_stmt(Statement::Init {
                    dest: dest.clone(),
                    pattern,
                });
                Ok(LowerResult::Written)
            }
            None => {
                let local = self.new_synthetic_local(ty, "_agg_tmp");
                let place = Place::local(local);
                self.push_stmt(Statement::Init {
                    dest: place.clone(),
                    pattern,
                });
                Ok(LowerResult::Place(place))
            }
        }
    }

    // -----------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------

    /// Prepare the receiver value for a method call
    fn lower_receiver(
        &mut self,
        func: hir::FuncId,
        receiver: &hir::Expr,
    ) -> Result<ValueSource> {
        let hir = self.env.hir;
        let callee = &hir.functions[func.index()];
        let sp = callee
            .self_param
            .expect("method calls target functions with a self param");
        let self_ty = callee.owner.expect("methods have an owner type");

        if sp.is_reference {
            let receiver_ty = receiver.expect_info().ty;
            if matches!(self.env.types.get(receiver_ty), Ty::Reference { .. }) {
                let ref_ty = self.canon(receiver_ty);
                let op = self.lower_expr(receiver, None)?.into_operand(self, ref_ty);
                Ok(ValueSource::Operand(op))
            } else {
                // place receiver: take its address
                let place_ty = self.canon(receiver_ty);
                let place = self.lower_expr(receiver, None)?.into_place(self, place_ty);
                let self_canon = self.canon(self_ty);
                let ref_ty = self.env.types.reference(self_canon, sp.is_mutable);
                let temp = self.new_temp(ref_ty);
                self.push_stmt(Statement::Define {
                    dest: temp,
                    rvalue: RValue::Ref(place),
                });
                Ok(ValueSource::Operand(Operand::Temp(temp)))
            }
        } else {
            let self_canon = self.canon(self_ty);
            self.lower_argument(receiver, self_canon)
        }
    }

    /// Lower one argument according to its ABI kind: aggregates are
    /// copied into a fresh slot and passed by address
    fn lower_argument(&mut self, arg: &hir::Expr, param_canon: TypeId) -> Result<ValueSource> {
        match sig::param_abi_kind(self.env.types, param_canon) {
            AbiParamKind::Direct => {
                let op = self.lower_expr(arg, None)?.into_operand(self, param_canon);
                Ok(ValueSource::Operand(op))
            }
            AbiParamKind::Indirect | AbiParamKind::SRet => {
                let copy_local = self.new_synthetic_local(param_canon, "_arg_tmp");
                let copy_place = Place::local(copy_local);
                let result = self.lower_expr(arg, Some(&copy_place))?;
                if !self.is_terminated() {
                    result.write_to_dest(self, &copy_place, param_canon);
                }
                Ok(ValueSource::Place(copy_place))
            }
        }
    }

    fn lower_call(
        &mut self,
        func: hir::FuncId,
        mut call_args: Vec<ValueSource>,
        args: &[hir::Expr],
        dest: Option<&Place>,
    ) -> Result<LowerResult> {
        let hir = self.env.hir;
        let callee = &hir.functions[func.index()];
        let target = self.env.targets[func.index()];

        let param_canon: Vec<TypeId> = callee
            .param_tys
            .iter()
            .map(|&t| self.canon(t))
            .collect();
        for (arg, &ty) in args.iter().zip(&param_canon) {
            let src = self.lower_argument(arg, ty)?;
            call_args.push(src);
        }

        let ret_canon = self.canon(callee.ret_ty);
        let unit = self.env.types.is_unit(ret_canon);
        let via_sret = !unit && sig::returns_via_sret(self.env.types, ret_canon);

        if via_sret {
            let (sret_place, written) = match dest {
                Some(d) => (d.clone(), true),
                None => {
                    let local = self.new_synthetic_local(ret_canon, "_call_ret");
                    (Place::local(local), false)
                }
            };
            self.push_stmt(Statement::Call {
                dest: None,
                target,
                args: call_args,
                sret_dest: Some(sret_place.clone()),
            });
            if written {
                Ok(LowerResult::Written)
            } else {
                Ok(LowerResult::Place(sret_place))
            }
        } else if unit {
            self.push_stmt(Statement::Call {
                dest: None,
                target,
                args: call_args,
                sret_dest: None,
            });
            Ok(LowerResult::Operand(self.unit_operand()))
        } else {
            let result = self.new_temp(ret_canon);
            self.push_stmt(Statement::Call {
                dest: Some(result),
                target,
                args: call_args,
                sret_dest: None,
            });
            Ok(LowerResult::Operand(Operand::Temp(result)))
        }
    }

    // -----------------------------------------------------------------
    // Operator selection
    // -----------------------------------------------------------------

    fn binop_kind(&self, op: BinaryOp, operand_ty: TypeId) -> BinOpKind {
        let types = &*self.env.types;
        let signed = types.is_signed_integer(operand_ty);
        let is_bool = types.is_bool(operand_ty);
        match op {
            BinaryOp::Add => {
                if signed {
                    BinOpKind::IAdd
                } else {
                    BinOpKind::UAdd
                }
            }
            BinaryOp::Sub => {
                if signed {
                    BinOpKind::ISub
                } else {
                    BinOpKind::USub
                }
            }
            BinaryOp::Mul => {
                if signed {
                    BinOpKind::IMul
                } else {
                    BinOpKind::UMul
                }
            }
            BinaryOp::Div => {
                if signed {
                    BinOpKind::IDiv
                } else {
                    BinOpKind::UDiv
                }
            }
            BinaryOp::Rem => {
                if signed {
                    BinOpKind::IRem
                } else {
                    BinOpKind::URem
                }
            }
            BinaryOp::BitAnd => BinOpKind::BitAnd,
            BinaryOp::BitXor => BinOpKind::BitXor,
            BinaryOp::BitOr => BinOpKind::BitOr,
            BinaryOp::Shl => BinOpKind::Shl,
            BinaryOp::Shr => {
                if signed {
                    BinOpKind::ShrArithmetic
                } else {
                    BinOpKind::ShrLogical
                }
            }
            BinaryOp::Eq => {
                if is_bool {
                    BinOpKind::BoolEq
                } else if signed {
                    BinOpKind::ICmpEq
                } else {
                    BinOpKind::UCmpEq
                }
            }
            BinaryOp::Ne => {
                if is_bool {
                    BinOpKind::BoolNe
                } else if signed {
                    BinOpKind::ICmpNe
                } else {
                    BinOpKind::UCmpNe
                }
            }
            BinaryOp::Lt => {
                if signed {
                    BinOpKind::ICmpLt
                } else {
                    BinOpKind::UCmpLt
                }
            }
            BinaryOp::Le => {
                if signed {
                    BinOpKind::ICmpLe
                } else {
                    BinOpKind::UCmpLe
                }
            }
            BinaryOp::Gt => {
                if signed {
                    BinOpKind::ICmpGt
                } else {
                    BinOpKind::UCmpGt
                }
            }
            BinaryOp::Ge => {
                if signed {
                    BinOpKind::ICmpGe
                } else {
                    BinOpKind::UCmpGe
                }
            }
            BinaryOp::And => BinOpKind::BoolAnd,
            BinaryOp::Or => BinOpKind::BoolOr,
        }
    }
}

/// Which shape of aggregate is being initialized
#[derive(Clone, Copy)]
enum AggregateShape {
    Struct,
    Array,
}

/// The resolved function a call expression targets
fn callee_func(callee: &hir::Expr) -> Option<hir::FuncId> {
    match &callee.kind {
        hir::ExprKind::FuncUse(f) => Some(*f),
        hir::ExprKind::Grouped(inner) => callee_func(inner),
        _ => None,
    }
}
