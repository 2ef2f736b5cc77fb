//! Typed HIR → MIR lowering
//!
//! The lowering is destination-passing-style: callers that own storage
//! for an aggregate pass a destination hint down, and initializers write
//! straight into it (`LowerResult::Written`) instead of materializing a
//! temporary and copying.

mod expr;
mod result;
mod sig;

#[cfg(test)]
mod tests;

pub use result::LowerResult;

use crate::error::Result;
use crate::hir;
use crate::mir::{
    BasicBlock, BasicBlockId, CallTarget, Constant, ConstantValue, ExternalFunction, ExternalId,
    FunctionId, GlobalId, GlobalValue, LocalAlias, LocalInfo, MirFunction, MirGlobal, MirModule,
    Operand, PhiIncoming, ReturnDesc, ReturnStoragePlan, Statement, StringLiteral, TempId,
    Terminator,
};
use crate::types::{TypeId, TypeTable};
use std::collections::HashMap;

pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Lower a checked HIR module into MIR
pub fn lower_module(hir: &hir::Module, types: &mut TypeTable) -> Result<MirModule> {
    let mut external_functions = Vec::new();
    let mut internal_ids = Vec::new();
    let mut targets = Vec::with_capacity(hir.functions.len());

    for f in &hir.functions {
        if f.is_builtin {
            let id = external_functions.len() as ExternalId;
            let ret_canon = types.canonicalize_for_mir(f.ret_ty);
            let param_canon: Vec<TypeId> = f
                .param_tys
                .iter()
                .map(|&t| types.canonicalize_for_mir(t))
                .collect();
            external_functions.push(ExternalFunction {
                id,
                name: f.name.name.clone(),
                sig: sig::build_external_signature(types, &param_canon, &f.param_names, ret_canon),
            });
            targets.push(CallTarget::external(id));
        } else if f.body.is_some() {
            let id = internal_ids.len() as FunctionId;
            internal_ids.push(hir::FuncId(targets.len() as u32));
            targets.push(CallTarget::internal(id));
        } else {
            // bodiless non-builtin signatures never lower; give them an
            // unreachable slot so the table stays index-aligned
            targets.push(CallTarget::internal(u32::MAX));
        }
    }

    let mut env = ModuleLowerer {
        types,
        hir,
        targets,
        globals: Vec::new(),
        string_ids: HashMap::new(),
    };

    let mut functions = Vec::new();
    for (index, &hir_id) in internal_ids.iter().enumerate() {
        functions.push(lower_function(&mut env, hir_id, index as FunctionId)?);
    }

    Ok(MirModule {
        globals: env.globals,
        functions,
        external_functions,
    })
}

/// Module-wide lowering state shared by every function
pub(super) struct ModuleLowerer<'t, 'h> {
    pub types: &'t mut TypeTable,
    pub hir: &'h hir::Module,
    /// hir function index → call target
    pub targets: Vec<CallTarget>,
    pub globals: Vec<MirGlobal>,
    string_ids: HashMap<(String, bool), GlobalId>,
}

impl<'t, 'h> ModuleLowerer<'t, 'h> {
    pub fn canon(&mut self, ty: TypeId) -> TypeId {
        self.types.canonicalize_for_mir(ty)
    }

    /// Intern a string literal, deduplicated by `(bytes, is_cstyle)`
    pub fn intern_string(&mut self, data: &str, is_cstyle: bool) -> GlobalId {
        let key = (data.to_string(), is_cstyle);
        if let Some(&id) = self.string_ids.get(&key) {
            return id;
        }
        let id = self.globals.len() as GlobalId;
        self.globals.push(MirGlobal {
            value: GlobalValue::String(StringLiteral {
                data: data.to_string(),
                length: data.len(),
                is_cstyle,
            }),
        });
        self.string_ids.insert(key, id);
        id
    }
}

/// One loop being lowered: where `continue` and `break` jump, and the phi
/// bookkeeping for break values
pub(super) struct LoopCtx {
    pub loop_id: hir::LoopId,
    pub continue_block: BasicBlockId,
    pub break_block: BasicBlockId,
    pub break_temp: Option<TempId>,
    pub incomings: Vec<PhiIncoming>,
}

/// Per-function lowering state
pub(super) struct FunctionLowerer<'a, 't, 'h> {
    pub env: &'a mut ModuleLowerer<'t, 'h>,
    pub body: &'h hir::FunctionBody,
    pub func: MirFunction,
    pub plan: ReturnStoragePlan,
    pub current_block: BasicBlockId,
    pub loop_stack: Vec<LoopCtx>,
    synth_counter: u32,
    pub(super) const_depth: u32,
}

impl<'a, 't, 'h> FunctionLowerer<'a, 't, 'h> {
    pub fn canon(&mut self, ty: TypeId) -> TypeId {
        self.env.canon(ty)
    }

    pub fn unit_operand(&mut self) -> Operand {
        Operand::Constant(Constant {
            ty: self.env.types.unit_ty(),
            value: ConstantValue::Unit,
        })
    }

    /// Mint a temp of an already-canonicalized type
    pub fn new_temp(&mut self, ty: TypeId) -> TempId {
        let id = self.func.temp_types.len() as TempId;
        self.func.temp_types.push(ty);
        id
    }

    /// Add a synthetic local; `hint` is suffixed with a counter to keep
    /// debug names unique
    pub fn new_synthetic_local(&mut self, ty: TypeId, hint: &str) -> crate::mir::LocalId {
        let id = self.func.locals.len() as crate::mir::LocalId;
        let debug_name = format!("{hint}{}", self.synth_counter);
        self.synth_counter += 1;
        self.func.locals.push(LocalInfo {
            ty,
            debug_name,
            alias: LocalAlias::None,
        });
        id
    }

    pub fn new_block(&mut self) -> BasicBlockId {
        let id = self.func.blocks.len() as BasicBlockId;
        self.func.blocks.push(BasicBlock::default());
        id
    }

    pub fn switch_to(&mut self, block: BasicBlockId) {
        self.current_block = block;
    }

    pub fn is_terminated(&self) -> bool {
        self.func.blocks[self.current_block as usize]
            .terminator
            .is_some()
    }

    /// Divergent sub-expressions terminate the current block mid-way;
    /// anything lowered after them lands in a fresh unreachable block.
    fn ensure_open(&mut self) {
        if self.is_terminated() {
            let dead = self.new_block();
            self.current_block = dead;
        }
    }

    pub fn push_stmt(&mut self, stmt: Statement) {
        self.ensure_open();
        self.func.blocks[self.current_block as usize]
            .statements
            .push(stmt);
    }

    /// Install the block terminator. Each block is terminated exactly
    /// once; a second terminator belongs to unreachable code and goes to
    /// a dead block instead.
    pub fn terminate(&mut self, terminator: Terminator) {
        self.ensure_open();
        self.func.blocks[self.current_block as usize].terminator = Some(terminator);
    }

    pub fn install_phi(&mut self, block: BasicBlockId, phi: crate::mir::PhiNode) {
        self.func.blocks[block as usize].phis.push(phi);
    }
}

fn lower_function(
    env: &mut ModuleLowerer<'_, '_>,
    hir_id: hir::FuncId,
    mir_id: FunctionId,
) -> Result<MirFunction> {
    let hir = env.hir;
    let hir_fn = &hir.functions[hir_id.index()];
    let body = hir_fn
        .body
        .as_ref()
        .expect("internal functions always have a body");

    let name = match hir_fn.owner {
        Some(owner) => format!("{}.{}", env.types.name_of(owner), hir_fn.name.name),
        None => hir_fn.name.name.clone(),
    };

    let mut locals: Vec<LocalInfo> = Vec::with_capacity(body.locals.len());
    for local in &body.locals {
        let ty = env.canon(local.ty);
        locals.push(LocalInfo {
            ty,
            debug_name: local.name.clone(),
            alias: LocalAlias::None,
        });
    }

    let ret_canon = env.canon(hir_fn.ret_ty);
    let (fn_sig, plan) = sig::build_signature(env.types, body, &mut locals, ret_canon);

    let func = MirFunction {
        id: mir_id,
        name,
        sig: fn_sig,
        temp_types: Vec::new(),
        locals,
        blocks: Vec::new(),
        start_block: 0,
    };

    let mut lw = FunctionLowerer {
        env,
        body,
        func,
        plan,
        current_block: 0,
        loop_stack: Vec::new(),
        synth_counter: 0,
        const_depth: 0,
    };

    let entry = lw.new_block();
    lw.func.start_block = entry;
    lw.current_block = entry;

    let dest = if lw.plan.is_sret {
        Some(lw.plan.return_place())
    } else {
        None
    };
    let result = lw.lower_block(&body.block, dest.as_ref())?;

    if !lw.is_terminated() {
        match lw.func.sig.return_desc {
            ReturnDesc::Void => lw.terminate(Terminator::Return(None)),
            ReturnDesc::Direct(ty) => {
                let op = result.into_operand(&mut lw, ty);
                lw.terminate(Terminator::Return(Some(op)));
            }
            ReturnDesc::IndirectSRet { ty, .. } => {
                let place = lw.plan.return_place();
                result.write_to_dest(&mut lw, &place, ty);
                lw.terminate(Terminator::Return(None));
            }
            ReturnDesc::Never => lw.terminate(Terminator::Unreachable),
        }
    }

    // every block carries exactly one terminator; blocks that lost all
    // their predecessors are unreachable
    for block in &mut lw.func.blocks {
        if block.terminator.is_none() {
            block.terminator = Some(Terminator::Unreachable);
        }
    }

    Ok(lw.func)
}
