//! ABI shaping and the return storage plan
//!
//! Struct and array returns go indirect through a hidden SRET pointer at
//! ABI position 0; struct and array parameters are passed indirectly. An
//! NRVO-eligible local is aliased straight onto the SRET slot so the
//! returned aggregate is constructed in the caller's buffer.

use crate::hir;
use crate::mir::{
    AbiParam, AbiParamKind, FunctionSig, LocalAlias, LocalInfo, MirParam, ParamIndex, ReturnDesc,
    ReturnStoragePlan,
};
use crate::types::{Ty, TypeId, TypeTable};

/// Aggregates are returned through a caller-allocated SRET slot
pub(super) fn returns_via_sret(types: &TypeTable, ty: TypeId) -> bool {
    matches!(types.get(ty), Ty::Struct(_) | Ty::Array { .. })
}

/// Aggregate parameters are passed by pointer
pub(super) fn param_abi_kind(types: &TypeTable, ty: TypeId) -> AbiParamKind {
    if matches!(types.get(ty), Ty::Struct(_) | Ty::Array { .. }) {
        AbiParamKind::Indirect
    } else {
        AbiParamKind::Direct
    }
}

/// Build the signature and return storage plan for one function, marking
/// aliased locals (indirect parameters, the SRET slot) along the way.
pub(super) fn build_signature(
    types: &TypeTable,
    body: &hir::FunctionBody,
    locals: &mut Vec<LocalInfo>,
    ret_canon: TypeId,
) -> (FunctionSig, ReturnStoragePlan) {
    let params: Vec<MirParam> = body
        .param_locals
        .iter()
        .map(|&pl| MirParam {
            local: pl.0,
            ty: locals[pl.index()].ty,
            debug_name: body.local(pl).name.clone(),
        })
        .collect();

    let is_sret = !types.is_unit(ret_canon) && returns_via_sret(types, ret_canon);

    let mut abi_params = Vec::new();
    if is_sret {
        abi_params.push(AbiParam {
            param_index: None,
            kind: AbiParamKind::SRet,
        });
    }
    for (index, param) in params.iter().enumerate() {
        let kind = param_abi_kind(types, param.ty);
        if kind == AbiParamKind::Indirect {
            locals[param.local as usize].alias =
                LocalAlias::AbiParam(abi_params.len() as u16);
        }
        abi_params.push(AbiParam {
            param_index: Some(index as ParamIndex),
            kind,
        });
    }

    let return_desc = if types.is_unit(ret_canon) {
        ReturnDesc::Void
    } else if is_sret {
        ReturnDesc::IndirectSRet {
            ty: ret_canon,
            sret_index: 0,
        }
    } else {
        ReturnDesc::Direct(ret_canon)
    };

    let plan = if is_sret {
        match find_nrvo_local(body, ret_canon, locals) {
            Some(local) => {
                locals[local.index()].alias = LocalAlias::AbiParam(0);
                ReturnStoragePlan {
                    is_sret: true,
                    ret_type: ret_canon,
                    sret_abi_index: 0,
                    return_slot_local: local.0,
                    uses_nrvo_local: true,
                }
            }
            None => {
                let id = locals.len() as u32;
                locals.push(LocalInfo {
                    ty: ret_canon,
                    debug_name: "_ret_slot".to_string(),
                    alias: LocalAlias::AbiParam(0),
                });
                ReturnStoragePlan {
                    is_sret: true,
                    ret_type: ret_canon,
                    sret_abi_index: 0,
                    return_slot_local: id,
                    uses_nrvo_local: false,
                }
            }
        }
    } else {
        ReturnStoragePlan::direct(ret_canon)
    };

    (
        FunctionSig {
            return_desc,
            params,
            abi_params,
        },
        plan,
    )
}

/// Signature for an external runtime function (no body, no locals)
pub(super) fn build_external_signature(
    types: &TypeTable,
    param_tys: &[TypeId],
    param_names: &[String],
    ret_ty: TypeId,
) -> FunctionSig {
    let params: Vec<MirParam> = param_tys
        .iter()
        .zip(param_names)
        .enumerate()
        .map(|(i, (&ty, name))| MirParam {
            local: i as u32,
            ty,
            debug_name: name.clone(),
        })
        .collect();
    let abi_params = params
        .iter()
        .enumerate()
        .map(|(i, p)| AbiParam {
            param_index: Some(i as ParamIndex),
            kind: param_abi_kind(types, p.ty),
        })
        .collect();
    let return_desc = if types.is_unit(ret_ty) {
        ReturnDesc::Void
    } else {
        ReturnDesc::Direct(ret_ty)
    };
    FunctionSig {
        return_desc,
        params,
        abi_params,
    }
}

/// A named user local (never a parameter) of the return type that is the
/// exact source of every return site, making it eligible for NRVO.
fn find_nrvo_local(
    body: &hir::FunctionBody,
    ret_canon: TypeId,
    locals: &[LocalInfo],
) -> Option<hir::LocalId> {
    let mut sources: Vec<Option<hir::LocalId>> = Vec::new();
    collect_return_sources_block(&body.block, &mut sources);
    if let Some(final_expr) = &body.block.final_expr {
        sources.push(source_local(final_expr));
    }

    let mut candidate: Option<hir::LocalId> = None;
    if sources.is_empty() {
        return None;
    }
    for source in sources {
        let local = source?;
        match candidate {
            None => candidate = Some(local),
            Some(existing) if existing == local => {}
            Some(_) => return None,
        }
    }
    let local = candidate?;

    if body.param_locals.contains(&local) {
        return None;
    }
    if locals[local.index()].ty != ret_canon {
        return None;
    }
    Some(local)
}

fn source_local(expr: &hir::Expr) -> Option<hir::LocalId> {
    match &expr.kind {
        hir::ExprKind::Variable(local) => Some(*local),
        hir::ExprKind::Grouped(inner) => source_local(inner),
        _ => None,
    }
}

fn collect_return_sources_block(block: &hir::Block, out: &mut Vec<Option<hir::LocalId>>) {
    for stmt in &block.stmts {
        match stmt {
            hir::Stmt::Let { init, .. } => {
                if let Some(init) = init {
                    collect_return_sources_expr(init, out);
                }
            }
            hir::Stmt::Expr { expr, .. } => collect_return_sources_expr(expr, out),
        }
    }
    if let Some(final_expr) = &block.final_expr {
        collect_return_sources_expr(final_expr, out);
    }
}

fn collect_return_sources_expr(expr: &hir::Expr, out: &mut Vec<Option<hir::LocalId>>) {
    match &expr.kind {
        hir::ExprKind::Return { value } => {
            match value {
                Some(v) => {
                    out.push(source_local(v));
                    collect_return_sources_expr(v, out);
                }
                None => out.push(None),
            }
        }
        hir::ExprKind::Literal(_)
        | hir::ExprKind::Variable(_)
        | hir::ExprKind::ConstUse(_)
        | hir::ExprKind::FuncUse(_)
        | hir::ExprKind::StructConst(_)
        | hir::ExprKind::EnumVariant { .. }
        | hir::ExprKind::Underscore => {}
        hir::ExprKind::Grouped(inner) | hir::ExprKind::Cast { expr: inner, .. } => {
            collect_return_sources_expr(inner, out)
        }
        hir::ExprKind::Unary { operand, .. } => collect_return_sources_expr(operand, out),
        hir::ExprKind::Binary { left, right, .. }
        | hir::ExprKind::Assign { left, right, .. } => {
            collect_return_sources_expr(left, out);
            collect_return_sources_expr(right, out);
        }
        hir::ExprKind::ArrayInit(elements) => {
            for e in elements {
                collect_return_sources_expr(e, out);
            }
        }
        hir::ExprKind::ArrayRepeat { value, count } => {
            collect_return_sources_expr(value, out);
            if let hir::RepeatCount::Expr(e) = count {
                collect_return_sources_expr(e, out);
            }
        }
        hir::ExprKind::Index { array, index } => {
            collect_return_sources_expr(array, out);
            collect_return_sources_expr(index, out);
        }
        hir::ExprKind::StructLiteral { fields, .. } => {
            for f in fields {
                collect_return_sources_expr(f, out);
            }
        }
        hir::ExprKind::Call { callee, args } => {
            collect_return_sources_expr(callee, out);
            for a in args {
                collect_return_sources_expr(a, out);
            }
        }
        hir::ExprKind::MethodCall { receiver, args, .. } => {
            collect_return_sources_expr(receiver, out);
            for a in args {
                collect_return_sources_expr(a, out);
            }
        }
        hir::ExprKind::FieldAccess { object, .. } => collect_return_sources_expr(object, out),
        hir::ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_return_sources_expr(condition, out);
            collect_return_sources_block(then_branch, out);
            if let Some(e) = else_branch {
                collect_return_sources_expr(e, out);
            }
        }
        hir::ExprKind::Loop { body, .. } => collect_return_sources_block(body, out),
        hir::ExprKind::While {
            condition, body, ..
        } => {
            collect_return_sources_expr(condition, out);
            collect_return_sources_block(body, out);
        }
        hir::ExprKind::Break { value, .. } => {
            if let Some(v) = value {
                collect_return_sources_expr(v, out);
            }
        }
        hir::ExprKind::Continue { .. } => {}
        hir::ExprKind::Block(block) => collect_return_sources_block(block, out),
    }
}
