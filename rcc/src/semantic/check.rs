//! Expression checking: types, places, mutability and endpoints

use crate::ast::{AssignOp, BinaryOp, Span};
use crate::error::{CompileError, Result};
use crate::hir::{
    Block, EndpointSet, Expr, ExprInfo, ExprKind, FuncId, LetTarget, Literal, Local, LoopId,
    Module, RepeatCount, Stmt, UnaryOp,
};
use crate::types::{Ty, TypeId, TypeTable};

const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Check every const value and function body in the module, attaching an
/// `ExprInfo` to each expression. Re-running on an already-checked module
/// recomputes identical results.
pub fn check_module(module: &mut Module, types: &mut TypeTable) -> Result<()> {
    for index in 0..module.consts.len() {
        // detach the value so the checker can still consult other
        // consts' types through the module
        let ty = module.consts[index].ty;
        let placeholder = Expr::new(ExprKind::Underscore, crate::ast::Span::invalid());
        let mut value = std::mem::replace(&mut module.consts[index].value, placeholder);

        let mut cx = FnCtx::for_const();
        let mut checker = Checker { types, module };
        checker.check_expr(&mut cx, &mut value)?;
        checker.expect_type(&mut value, ty)?;

        module.consts[index].value = value;
    }

    for index in 0..module.functions.len() {
        let Some(mut body) = module.functions[index].body.take() else {
            continue;
        };
        let ret_ty = module.functions[index].ret_ty;
        let name_span = module.functions[index].name.span;

        let mut cx = FnCtx {
            locals: std::mem::take(&mut body.locals),
            ret_ty: Some(ret_ty),
            loops: Vec::new(),
        };
        let mut checker = Checker { types, module };
        let info = checker.check_block(&mut cx, &mut body.block)?;

        if !checker.compatible(ret_ty, info.ty) {
            let found = checker.types.name_of(info.ty);
            let expected = checker.types.name_of(ret_ty);
            let span = body
                .block
                .final_expr
                .as_ref()
                .map(|e| e.span)
                .unwrap_or(name_span);
            return Err(CompileError::type_error(
                format!("function body has type `{found}`, expected `{expected}`"),
                span,
            ));
        }

        body.locals = cx.locals;
        module.functions[index].body = Some(body);
    }
    Ok(())
}

/// One enclosing loop during checking
struct LoopFrame {
    id: LoopId,
    is_while: bool,
    break_ty: Option<TypeId>,
}

/// Function-level checking state
struct FnCtx {
    locals: Vec<Local>,
    /// `None` in const contexts, where `return` is illegal
    ret_ty: Option<TypeId>,
    loops: Vec<LoopFrame>,
}

impl FnCtx {
    fn for_const() -> Self {
        Self {
            locals: Vec::new(),
            ret_ty: None,
            loops: Vec::new(),
        }
    }
}

struct Checker<'a> {
    types: &'a mut TypeTable,
    module: &'a Module,
}

impl<'a> Checker<'a> {
    /// Structural equality with `never` as bottom
    fn compatible(&self, expected: TypeId, actual: TypeId) -> bool {
        expected == actual || self.types.is_never(actual)
    }

    fn type_mismatch(&self, expected: TypeId, actual: TypeId, span: Span) -> CompileError {
        CompileError::type_error(
            format!(
                "mismatched types: expected `{}`, found `{}`",
                self.types.name_of(expected),
                self.types.name_of(actual)
            ),
            span,
        )
    }

    /// Retype an unsuffixed integer literal (possibly grouped or negated)
    /// to `target`. Returns true when the expression adapted.
    fn retype_unsuffixed_literal(&mut self, expr: &mut Expr, target: TypeId) -> bool {
        if !self.types.is_integer(target) {
            return false;
        }
        self.retype_literal_inner(expr, target)
    }

    fn retype_literal_inner(&mut self, expr: &mut Expr, target: TypeId) -> bool {
        let adapted = match &mut expr.kind {
            ExprKind::Literal(Literal::Int { suffix: None, .. }) => true,
            ExprKind::Grouped(inner) => self.retype_literal_inner(inner, target),
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand,
            } => {
                self.types.is_signed_integer(target) && self.retype_literal_inner(operand, target)
            }
            _ => false,
        };
        if adapted {
            if let Some(info) = expr.info.as_mut() {
                info.ty = target;
            }
        }
        adapted
    }

    /// Require `expr` (already checked) to have type `expected`, letting
    /// unsuffixed integer literals default to the expected type.
    fn expect_type(&mut self, expr: &mut Expr, expected: TypeId) -> Result<()> {
        let actual = expr.expect_info().ty;
        if self.compatible(expected, actual) {
            return Ok(());
        }
        if self.retype_unsuffixed_literal(expr, expected) {
            return Ok(());
        }
        Err(self.type_mismatch(expected, actual, expr.span))
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn check_expr(&mut self, cx: &mut FnCtx, expr: &mut Expr) -> Result<ExprInfo> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            let mut info = self.check_expr_inner(cx, expr)?;
            // an expression's type is `never` exactly when it diverges
            if info.endpoints.diverges() {
                info.ty = self.types.never_ty();
                info.is_place = false;
                info.is_mut = false;
            }
            expr.info = Some(info.clone());
            Ok(info)
        })
    }

    fn check_expr_inner(&mut self, cx: &mut FnCtx, expr: &mut Expr) -> Result<ExprInfo> {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Literal(lit) => {
                let ty = match lit {
                    Literal::Int { suffix, .. } => match suffix {
                        Some(crate::ast::IntSuffix::I32) => self.types.i32_ty(),
                        Some(crate::ast::IntSuffix::U32) => self.types.u32_ty(),
                        Some(crate::ast::IntSuffix::Isize) => self.types.isize_ty(),
                        Some(crate::ast::IntSuffix::Usize) => self.types.usize_ty(),
                        None => self.types.i32_ty(),
                    },
                    Literal::Bool(_) => self.types.bool_ty(),
                    Literal::Char(_) => self.types.char_ty(),
                    Literal::Str { .. } => {
                        let str_ty = self.types.str_ty();
                        self.types.reference(str_ty, false)
                    }
                };
                Ok(ExprInfo::value(ty))
            }

            ExprKind::Variable(local) => {
                let local = &cx.locals[local.index()];
                if local.ty == self.types.underscore_ty() {
                    return Err(CompileError::type_error(
                        format!("type of `{}` is not known at this use", local.name),
                        span,
                    ));
                }
                Ok(ExprInfo::place(local.ty, local.is_mut))
            }

            ExprKind::ConstUse(id) => {
                let ty = self.module.const_def(*id).ty;
                Ok(ExprInfo::value(ty))
            }

            ExprKind::FuncUse(_) => Err(CompileError::type_error(
                "functions are not first-class values",
                span,
            )),

            ExprKind::StructConst(sid) => {
                let ty = self.types.struct_ty(*sid);
                Ok(ExprInfo::value(ty))
            }

            ExprKind::EnumVariant { enum_id, .. } => {
                let ty = self.types.enum_ty(*enum_id);
                Ok(ExprInfo::value(ty))
            }

            ExprKind::Grouped(inner) => self.check_expr(cx, inner),

            ExprKind::Underscore => Err(CompileError::type_error(
                "`_` can only appear on the left-hand side of an assignment",
                span,
            )),

            ExprKind::Unary { op, operand } => {
                let op = *op;
                let operand_info = self.check_expr(cx, operand)?;
                self.check_unary(op, operand, operand_info, span)
            }

            ExprKind::Binary { op, left, right } => {
                let op = *op;
                let left_info = self.check_expr(cx, left)?;
                let right_info = self.check_expr(cx, right)?;
                self.check_binary(op, left, right, left_info, right_info, span)
            }

            ExprKind::Assign { op, left, right } => {
                let op = *op;
                let right_info = self.check_expr(cx, right)?;

                if matches!(left.kind, ExprKind::Underscore) {
                    if op != AssignOp::Assign {
                        return Err(CompileError::type_error(
                            "`_` is not allowed in compound assignment",
                            span,
                        ));
                    }
                    left.info = Some(ExprInfo::value(right_info.ty));
                    let unit = self.types.unit_ty();
                    return Ok(ExprInfo {
                        ty: unit,
                        is_place: false,
                        is_mut: false,
                        endpoints: right_info.endpoints,
                    });
                }

                let left_info = self.check_expr(cx, left)?;
                if !left_info.is_place {
                    return Err(CompileError::type_error(
                        "left-hand side of assignment is not a place",
                        left.span,
                    ));
                }
                if !left_info.is_mut {
                    return Err(CompileError::type_error(
                        "cannot assign to an immutable place",
                        left.span,
                    ));
                }
                if op != AssignOp::Assign && !self.types.is_integer(left_info.ty) {
                    return Err(CompileError::type_error(
                        format!(
                            "compound assignment requires an integer type, found `{}`",
                            self.types.name_of(left_info.ty)
                        ),
                        left.span,
                    ));
                }
                self.expect_type(right, left_info.ty)?;

                let unit = self.types.unit_ty();
                Ok(ExprInfo {
                    ty: unit,
                    is_place: false,
                    is_mut: false,
                    endpoints: right_info.endpoints.then(&left_info.endpoints),
                })
            }

            ExprKind::Cast { expr: inner, target_ty } => {
                let target = *target_ty;
                let inner_info = self.check_expr(cx, inner)?;
                self.check_cast(inner_info.ty, target, span)?;
                Ok(ExprInfo {
                    ty: target,
                    is_place: false,
                    is_mut: false,
                    endpoints: inner_info.endpoints,
                })
            }

            ExprKind::ArrayInit(elements) => {
                if elements.is_empty() {
                    return Err(CompileError::type_error(
                        "cannot infer the element type of an empty array",
                        span,
                    ));
                }
                let mut endpoints = EndpointSet::normal();
                let mut element_ty: Option<TypeId> = None;
                for element in elements.iter_mut() {
                    let info = self.check_expr(cx, element)?;
                    endpoints = endpoints.then(&info.endpoints);
                    match element_ty {
                        None if !self.types.is_never(info.ty) => element_ty = Some(info.ty),
                        _ => {}
                    }
                }
                let Some(element_ty) = element_ty else {
                    return Err(CompileError::type_error(
                        "cannot infer the element type of this array",
                        span,
                    ));
                };
                for element in elements.iter_mut() {
                    self.expect_type(element, element_ty)?;
                }
                let ty = self.types.array(element_ty, elements.len());
                Ok(ExprInfo {
                    ty,
                    is_place: false,
                    is_mut: false,
                    endpoints,
                })
            }

            ExprKind::ArrayRepeat { value, count } => {
                let value_info = self.check_expr(cx, value)?;
                let count = match count {
                    RepeatCount::Const(n) => *n,
                    RepeatCount::Expr(e) => {
                        return Err(CompileError::type_error(
                            "array size must be a compile-time constant",
                            e.span,
                        ));
                    }
                };
                let ty = self.types.array(value_info.ty, count);
                Ok(ExprInfo {
                    ty,
                    is_place: false,
                    is_mut: false,
                    endpoints: value_info.endpoints,
                })
            }

            ExprKind::Index { array, index } => {
                let array_info = self.check_expr(cx, array)?;
                let index_info = self.check_expr(cx, index)?;
                let usize_ty = self.types.usize_ty();
                self.expect_type(index, usize_ty)?;

                let element = match self.types.get(array_info.ty) {
                    Ty::Array { element, .. } => *element,
                    _ => {
                        return Err(CompileError::type_error(
                            format!(
                                "cannot index a value of type `{}`",
                                self.types.name_of(array_info.ty)
                            ),
                            array.span,
                        ));
                    }
                };
                Ok(ExprInfo {
                    ty: element,
                    is_place: array_info.is_place,
                    is_mut: array_info.is_mut,
                    endpoints: array_info.endpoints.then(&index_info.endpoints),
                })
            }

            ExprKind::StructLiteral { struct_id, fields } => {
                let field_tys: Vec<TypeId> = self
                    .types
                    .struct_info(*struct_id)
                    .fields
                    .iter()
                    .map(|(_, ty)| *ty)
                    .collect();
                let mut endpoints = EndpointSet::normal();
                for (field, field_ty) in fields.iter_mut().zip(field_tys) {
                    let info = self.check_expr(cx, field)?;
                    endpoints = endpoints.then(&info.endpoints);
                    self.expect_type(field, field_ty)?;
                }
                let ty = self.types.struct_ty(*struct_id);
                Ok(ExprInfo {
                    ty,
                    is_place: false,
                    is_mut: false,
                    endpoints,
                })
            }

            ExprKind::Call { callee, args } => {
                let func = match callee_target(callee) {
                    Some(func) => func,
                    None => {
                        return Err(CompileError::type_error(
                            "callee is not a function",
                            callee.span,
                        ));
                    }
                };
                let unit = self.types.unit_ty();
                callee.info = Some(ExprInfo::value(unit));

                let sig_params = self.module.function(func).param_tys.clone();
                let ret_ty = self.module.function(func).ret_ty;
                if args.len() != sig_params.len() {
                    return Err(CompileError::type_error(
                        format!(
                            "function `{}` expects {} argument(s), found {}",
                            self.module.function(func).name.name,
                            sig_params.len(),
                            args.len()
                        ),
                        span,
                    ));
                }
                let mut endpoints = EndpointSet::normal();
                for (arg, param_ty) in args.iter_mut().zip(sig_params) {
                    let info = self.check_expr(cx, arg)?;
                    endpoints = endpoints.then(&info.endpoints);
                    self.expect_type(arg, param_ty)?;
                }
                Ok(ExprInfo {
                    ty: ret_ty,
                    is_place: false,
                    is_mut: false,
                    endpoints,
                })
            }

            ExprKind::MethodCall {
                receiver,
                method,
                resolved,
                args,
            } => {
                let receiver_info = self.check_expr(cx, receiver)?;
                let lookup_ty = match self.types.get(receiver_info.ty) {
                    Ty::Reference { pointee, .. } => *pointee,
                    _ => receiver_info.ty,
                };
                let func = self
                    .module
                    .methods
                    .get(&lookup_ty)
                    .and_then(|table| table.get(&method.name))
                    .copied()
                    .ok_or_else(|| {
                        CompileError::type_error(
                            format!(
                                "no method `{}` on type `{}`",
                                method.name,
                                self.types.name_of(lookup_ty)
                            ),
                            method.span,
                        )
                    })?;
                *resolved = Some(func);

                self.check_receiver(func, lookup_ty, &receiver_info, receiver.span, &method.name)?;

                let sig_params = self.module.function(func).param_tys.clone();
                let ret_ty = self.module.function(func).ret_ty;
                if args.len() != sig_params.len() {
                    return Err(CompileError::type_error(
                        format!(
                            "method `{}` expects {} argument(s), found {}",
                            method.name,
                            sig_params.len(),
                            args.len()
                        ),
                        span,
                    ));
                }
                let mut endpoints = receiver_info.endpoints.clone();
                for (arg, param_ty) in args.iter_mut().zip(sig_params) {
                    let info = self.check_expr(cx, arg)?;
                    endpoints = endpoints.then(&info.endpoints);
                    self.expect_type(arg, param_ty)?;
                }
                Ok(ExprInfo {
                    ty: ret_ty,
                    is_place: false,
                    is_mut: false,
                    endpoints,
                })
            }

            ExprKind::FieldAccess {
                object,
                field,
                resolved,
            } => {
                let object_info = self.check_expr(cx, object)?;
                // one implicit dereference through a reference receiver
                let (base_ty, via_ref) = match self.types.get(object_info.ty) {
                    Ty::Reference {
                        pointee,
                        is_mutable,
                    } => (*pointee, Some(*is_mutable)),
                    _ => (object_info.ty, None),
                };
                let sid = match self.types.get(base_ty) {
                    Ty::Struct(sid) => *sid,
                    _ => {
                        return Err(CompileError::type_error(
                            format!(
                                "no field `{}` on type `{}`",
                                field.name,
                                self.types.name_of(object_info.ty)
                            ),
                            field.span,
                        ));
                    }
                };
                let info = self.types.struct_info(sid);
                let Some(index) = info.fields.iter().position(|(n, _)| *n == field.name) else {
                    return Err(CompileError::type_error(
                        format!("no field `{}` on struct `{}`", field.name, info.name),
                        field.span,
                    ));
                };
                let field_ty = info.fields[index].1;
                *resolved = Some((sid, index));

                let (is_place, is_mut) = match via_ref {
                    Some(ref_mut) => (true, ref_mut),
                    None => (object_info.is_place, object_info.is_mut),
                };
                Ok(ExprInfo {
                    ty: field_ty,
                    is_place,
                    is_mut,
                    endpoints: object_info.endpoints,
                })
            }

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond_info = self.check_expr(cx, condition)?;
                let bool_ty = self.types.bool_ty();
                self.expect_type(condition, bool_ty)?;

                let then_info = self.check_block(cx, then_branch)?;
                match else_branch {
                    None => {
                        let unit = self.types.unit_ty();
                        if !self.compatible(unit, then_info.ty) {
                            return Err(CompileError::type_error(
                                format!(
                                    "`if` without `else` has type `()`, found `{}`",
                                    self.types.name_of(then_info.ty)
                                ),
                                then_branch.span,
                            ));
                        }
                        let endpoints = cond_info
                            .endpoints
                            .then(&then_info.endpoints.union(&EndpointSet::normal()));
                        Ok(ExprInfo {
                            ty: unit,
                            is_place: false,
                            is_mut: false,
                            endpoints,
                        })
                    }
                    Some(else_expr) => {
                        let else_info = self.check_expr(cx, else_expr)?;
                        let ty = if then_info.ty == else_info.ty {
                            then_info.ty
                        } else if self.types.is_never(then_info.ty) {
                            else_info.ty
                        } else if self.types.is_never(else_info.ty) {
                            then_info.ty
                        } else {
                            return Err(CompileError::type_error(
                                format!(
                                    "`if` and `else` have incompatible types: `{}` vs `{}`",
                                    self.types.name_of(then_info.ty),
                                    self.types.name_of(else_info.ty)
                                ),
                                span,
                            ));
                        };
                        let endpoints = cond_info
                            .endpoints
                            .then(&then_info.endpoints.union(&else_info.endpoints));
                        Ok(ExprInfo {
                            ty,
                            is_place: false,
                            is_mut: false,
                            endpoints,
                        })
                    }
                }
            }

            ExprKind::While {
                condition,
                body,
                loop_id,
            } => {
                let loop_id = *loop_id;
                let cond_info = self.check_expr(cx, condition)?;
                let bool_ty = self.types.bool_ty();
                self.expect_type(condition, bool_ty)?;

                cx.loops.push(LoopFrame {
                    id: loop_id,
                    is_while: true,
                    break_ty: None,
                });
                let body_info = self.check_block(cx, body);
                cx.loops.pop();
                let body_info = body_info?;

                let unit = self.types.unit_ty();
                if !self.compatible(unit, body_info.ty) {
                    return Err(CompileError::type_error(
                        format!(
                            "`while` body has type `{}`, expected `()`",
                            self.types.name_of(body_info.ty)
                        ),
                        body.span,
                    ));
                }

                let mut escaped = body_info.endpoints.without_loop(loop_id);
                escaped.normal = false;
                let endpoints = cond_info
                    .endpoints
                    .then(&escaped.union(&EndpointSet::normal()));
                Ok(ExprInfo {
                    ty: unit,
                    is_place: false,
                    is_mut: false,
                    endpoints,
                })
            }

            ExprKind::Loop { body, loop_id } => {
                let loop_id = *loop_id;
                cx.loops.push(LoopFrame {
                    id: loop_id,
                    is_while: false,
                    break_ty: None,
                });
                let body_info = self.check_block(cx, body);
                let frame = cx.loops.pop().expect("loop frame pushed above");
                let body_info = body_info?;

                let unit = self.types.unit_ty();
                if !self.compatible(unit, body_info.ty) {
                    return Err(CompileError::type_error(
                        format!(
                            "`loop` body has type `{}`, expected `()`",
                            self.types.name_of(body_info.ty)
                        ),
                        body.span,
                    ));
                }

                let breaks_out = body_info.endpoints.has_break(loop_id);
                let mut endpoints = body_info.endpoints.without_loop(loop_id);
                endpoints.normal = breaks_out;

                let ty = match frame.break_ty {
                    Some(t) if breaks_out => t,
                    _ => self.types.never_ty(),
                };
                Ok(ExprInfo {
                    ty,
                    is_place: false,
                    is_mut: false,
                    endpoints,
                })
            }

            ExprKind::Break { value, target } => {
                let Some(frame_index) = cx.loops.len().checked_sub(1) else {
                    return Err(CompileError::type_error("`break` outside of a loop", span));
                };
                let loop_id = cx.loops[frame_index].id;
                let is_while = cx.loops[frame_index].is_while;
                *target = Some(loop_id);

                let mut endpoints = EndpointSet::normal();
                let value_ty = match value {
                    Some(v) => {
                        if is_while {
                            return Err(CompileError::type_error(
                                "can only `break` with a value inside `loop`",
                                span,
                            ));
                        }
                        let info = self.check_expr(cx, v)?;
                        endpoints = info.endpoints;
                        info.ty
                    }
                    None => self.types.unit_ty(),
                };

                if !is_while && !self.types.is_never(value_ty) {
                    let frame = &mut cx.loops[frame_index];
                    match frame.break_ty {
                        None => frame.break_ty = Some(value_ty),
                        Some(existing) if existing == value_ty => {}
                        Some(existing) => {
                            // a literal payload may still adapt to the
                            // established break type
                            let adapted = match value {
                                Some(v) => self.retype_unsuffixed_literal(v, existing),
                                None => false,
                            };
                            if !adapted {
                                return Err(self.type_mismatch(existing, value_ty, span));
                            }
                        }
                    }
                }

                Ok(ExprInfo {
                    ty: self.types.never_ty(),
                    is_place: false,
                    is_mut: false,
                    endpoints: endpoints.then(&EndpointSet::breaking(loop_id)),
                })
            }

            ExprKind::Continue { target } => {
                let Some(frame) = cx.loops.last() else {
                    return Err(CompileError::type_error(
                        "`continue` outside of a loop",
                        span,
                    ));
                };
                let loop_id = frame.id;
                *target = Some(loop_id);
                Ok(ExprInfo {
                    ty: self.types.never_ty(),
                    is_place: false,
                    is_mut: false,
                    endpoints: EndpointSet::continuing(loop_id),
                })
            }

            ExprKind::Return { value } => {
                let Some(ret_ty) = cx.ret_ty else {
                    return Err(CompileError::type_error(
                        "`return` outside of a function",
                        span,
                    ));
                };
                let mut endpoints = EndpointSet::normal();
                match value {
                    Some(v) => {
                        let info = self.check_expr(cx, v)?;
                        endpoints = info.endpoints;
                        self.expect_type(v, ret_ty)?;
                    }
                    None => {
                        let unit = self.types.unit_ty();
                        if !self.compatible(ret_ty, unit) {
                            return Err(CompileError::type_error(
                                format!(
                                    "`return;` in a function returning `{}`",
                                    self.types.name_of(ret_ty)
                                ),
                                span,
                            ));
                        }
                    }
                }
                Ok(ExprInfo {
                    ty: self.types.never_ty(),
                    is_place: false,
                    is_mut: false,
                    endpoints: endpoints.then(&EndpointSet::returning()),
                })
            }

            ExprKind::Block(block) => self.check_block(cx, block),
        }
    }

    fn check_unary(
        &mut self,
        op: UnaryOp,
        operand: &mut Expr,
        operand_info: ExprInfo,
        span: Span,
    ) -> Result<ExprInfo> {
        match op {
            UnaryOp::Not => {
                let ty = operand_info.ty;
                if !self.types.is_bool(ty) && !self.types.is_integer(ty) {
                    return Err(CompileError::type_error(
                        format!("cannot apply `!` to `{}`", self.types.name_of(ty)),
                        span,
                    ));
                }
                Ok(ExprInfo {
                    ty,
                    is_place: false,
                    is_mut: false,
                    endpoints: operand_info.endpoints,
                })
            }
            UnaryOp::Negate => {
                let ty = operand_info.ty;
                if !self.types.is_signed_integer(ty) {
                    return Err(CompileError::type_error(
                        format!("cannot negate a value of type `{}`", self.types.name_of(ty)),
                        span,
                    ));
                }
                Ok(ExprInfo {
                    ty,
                    is_place: false,
                    is_mut: false,
                    endpoints: operand_info.endpoints,
                })
            }
            UnaryOp::Deref => {
                let (pointee, is_mutable) = match self.types.get(operand_info.ty) {
                    Ty::Reference {
                        pointee,
                        is_mutable,
                    } => (*pointee, *is_mutable),
                    _ => {
                        return Err(CompileError::type_error(
                            format!(
                                "cannot dereference a value of type `{}`",
                                self.types.name_of(operand_info.ty)
                            ),
                            span,
                        ));
                    }
                };
                Ok(ExprInfo {
                    ty: pointee,
                    is_place: true,
                    is_mut: is_mutable,
                    endpoints: operand_info.endpoints,
                })
            }
            UnaryOp::Ref { is_mut } => {
                if is_mut && operand_info.is_place && !operand_info.is_mut {
                    return Err(CompileError::type_error(
                        "cannot borrow an immutable place as mutable",
                        operand.span,
                    ));
                }
                // non-place operands are left untouched here; MIR lowering
                // materializes the temporary
                let ty = self.types.reference(operand_info.ty, is_mut);
                Ok(ExprInfo {
                    ty,
                    is_place: false,
                    is_mut: false,
                    endpoints: operand_info.endpoints,
                })
            }
        }
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        left: &mut Expr,
        right: &mut Expr,
        left_info: ExprInfo,
        right_info: ExprInfo,
        span: Span,
    ) -> Result<ExprInfo> {
        if op.is_short_circuit() {
            let bool_ty = self.types.bool_ty();
            self.expect_type(left, bool_ty)?;
            self.expect_type(right, bool_ty)?;
            // the right-hand side is conditional: the expression can
            // complete normally even when it diverges
            let endpoints = left_info
                .endpoints
                .then(&right_info.endpoints.union(&EndpointSet::normal()));
            return Ok(ExprInfo {
                ty: bool_ty,
                is_place: false,
                is_mut: false,
                endpoints,
            });
        }

        // unify operand types, letting unsuffixed literals adapt
        let mut lty = left.expect_info().ty;
        let mut rty = right.expect_info().ty;
        if lty != rty {
            if self.retype_unsuffixed_literal(left, rty) {
                lty = rty;
            } else if self.retype_unsuffixed_literal(right, lty) {
                rty = lty;
            }
        }
        let operand_ty = if self.types.is_never(lty) {
            rty
        } else if self.types.is_never(rty) {
            lty
        } else if lty == rty {
            lty
        } else {
            return Err(CompileError::type_error(
                format!(
                    "mismatched operand types for `{op}`: `{}` vs `{}`",
                    self.types.name_of(lty),
                    self.types.name_of(rty)
                ),
                span,
            ));
        };

        let endpoints = left_info.endpoints.then(&right_info.endpoints);
        if op.is_comparison() {
            let eq_only = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
            let ok = self.types.is_integer(operand_ty)
                || operand_ty == self.types.char_ty()
                || (eq_only && self.types.is_bool(operand_ty))
                || self.types.is_never(operand_ty);
            if !ok {
                return Err(CompileError::type_error(
                    format!(
                        "cannot compare values of type `{}`",
                        self.types.name_of(operand_ty)
                    ),
                    span,
                ));
            }
            return Ok(ExprInfo {
                ty: self.types.bool_ty(),
                is_place: false,
                is_mut: false,
                endpoints,
            });
        }

        // arithmetic, bitwise and shifts all require one integer type
        if !self.types.is_integer(operand_ty) && !self.types.is_never(operand_ty) {
            return Err(CompileError::type_error(
                format!(
                    "binary `{op}` requires integer operands, found `{}`",
                    self.types.name_of(operand_ty)
                ),
                span,
            ));
        }
        Ok(ExprInfo {
            ty: operand_ty,
            is_place: false,
            is_mut: false,
            endpoints,
        })
    }

    fn check_cast(&mut self, from: TypeId, to: TypeId, span: Span) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let from_int = self.types.is_integer(from);
        let to_int = self.types.is_integer(to);
        let bool_ty = self.types.bool_ty();
        let char_ty = self.types.char_ty();

        // char takes part as an 8-bit integer in both directions
        let ok = (from_int && (to_int || to == char_ty))
            || (from == bool_ty && (to_int || to == char_ty))
            || (from == char_ty && to_int)
            || self.types.is_never(from);
        if ok {
            Ok(())
        } else {
            Err(CompileError::type_error(
                format!(
                    "invalid cast from `{}` to `{}`",
                    self.types.name_of(from),
                    self.types.name_of(to)
                ),
                span,
            ))
        }
    }

    fn check_receiver(
        &mut self,
        func: FuncId,
        self_ty: TypeId,
        receiver: &ExprInfo,
        span: Span,
        method_name: &str,
    ) -> Result<()> {
        let Some(sp) = self.module.function(func).self_param else {
            return Err(CompileError::type_error(
                format!("associated function `{method_name}` cannot be called as a method"),
                span,
            ));
        };

        if !sp.is_reference {
            // by-value receiver
            if receiver.ty != self_ty {
                return Err(self.type_mismatch(self_ty, receiver.ty, span));
            }
            return Ok(());
        }

        match self.types.get(receiver.ty) {
            Ty::Reference {
                pointee,
                is_mutable,
            } if *pointee == self_ty => {
                if sp.is_mutable && !*is_mutable {
                    return Err(CompileError::type_error(
                        format!("method `{method_name}` requires a mutable receiver"),
                        span,
                    ));
                }
                Ok(())
            }
            _ if receiver.ty == self_ty => {
                // no reference auto-taking; the receiver must itself be a
                // place of sufficient mutability
                if !receiver.is_place {
                    return Err(CompileError::type_error(
                        format!(
                            "method `{method_name}` requires a reference receiver, \
                             and this expression is not a place"
                        ),
                        span,
                    ));
                }
                if sp.is_mutable && !receiver.is_mut {
                    return Err(CompileError::type_error(
                        format!("method `{method_name}` requires a mutable receiver"),
                        span,
                    ));
                }
                Ok(())
            }
            _ => Err(self.type_mismatch(self_ty, receiver.ty, span)),
        }
    }

    // -----------------------------------------------------------------
    // Blocks and statements
    // -----------------------------------------------------------------

    fn check_block(&mut self, cx: &mut FnCtx, block: &mut Block) -> Result<ExprInfo> {
        let mut endpoints = EndpointSet::normal();

        for stmt in block.stmts.iter_mut() {
            let reachable = endpoints.normal;
            let stmt_endpoints = self.check_stmt(cx, stmt)?;
            // unreachable statements are still checked but contribute no
            // endpoints
            if reachable {
                endpoints = endpoints.then(&stmt_endpoints);
            }
        }

        let ty = match block.final_expr.as_mut() {
            Some(final_expr) => {
                let reachable = endpoints.normal;
                let info = self.check_expr(cx, final_expr)?;
                if reachable {
                    endpoints = endpoints.then(&info.endpoints);
                }
                info.ty
            }
            None => self.types.unit_ty(),
        };

        let ty = if endpoints.diverges() {
            self.types.never_ty()
        } else {
            ty
        };
        Ok(ExprInfo {
            ty,
            is_place: false,
            is_mut: false,
            endpoints,
        })
    }

    fn check_stmt(&mut self, cx: &mut FnCtx, stmt: &mut Stmt) -> Result<EndpointSet> {
        match stmt {
            Stmt::Let {
                target,
                declared_ty,
                init,
                span,
            } => {
                let mut endpoints = EndpointSet::normal();
                let init_ty = match init {
                    Some(init_expr) => {
                        let info = self.check_expr(cx, init_expr)?;
                        endpoints = info.endpoints;
                        if let Some(declared) = declared_ty {
                            self.expect_type(init_expr, *declared)?;
                        }
                        Some(init_expr.expect_info().ty)
                    }
                    None => None,
                };

                match target {
                    LetTarget::Local(local) => {
                        let resolved = match (declared_ty, init_ty) {
                            (Some(declared), _) => *declared,
                            (None, Some(init_ty)) if !self.types.is_never(init_ty) => init_ty,
                            (None, Some(_)) => self.types.never_ty(),
                            (None, None) => {
                                return Err(CompileError::type_error(
                                    "binding needs a type annotation or an initializer",
                                    *span,
                                ));
                            }
                        };
                        cx.locals[local.index()].ty = resolved;
                    }
                    LetTarget::Wildcard => {}
                }
                Ok(endpoints)
            }
            Stmt::Expr {
                expr,
                has_semicolon,
            } => {
                let info = self.check_expr(cx, expr)?;
                if !*has_semicolon {
                    // a block-form expression at statement position must
                    // be unit
                    let unit = self.types.unit_ty();
                    if !self.compatible(unit, info.ty) {
                        return Err(CompileError::type_error(
                            format!(
                                "expression statement has type `{}`, expected `()`",
                                self.types.name_of(info.ty)
                            ),
                            expr.span,
                        ));
                    }
                }
                Ok(info.endpoints)
            }
        }
    }
}

/// The function a call expression targets, if its callee is a direct
/// (possibly parenthesized) function reference
fn callee_target(callee: &Expr) -> Option<FuncId> {
    match &callee.kind {
        ExprKind::FuncUse(f) => Some(*f),
        ExprKind::Grouped(inner) => callee_target(inner),
        _ => None,
    }
}
