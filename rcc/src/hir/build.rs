//! AST → HIR: scoped name resolution and canonicalization
//!
//! Walks the program once in definition order. Type names are declared
//! first so struct fields and signatures can refer to each other; bodies
//! are built last. Nested items inside blocks resolve through the same
//! scope stack.

use super::{
    Block, ConstDef, ConstId, Expr, ExprKind, FuncId, Function, FunctionBody, LetTarget, Literal,
    Local, LocalId, LoopId, Module, RepeatCount, Stmt, UnaryOp,
};
use crate::ast;
use crate::ast::{Identifier, Span};
use crate::error::{CompileError, Result};
use crate::types::{StructId, TypeId, TypeTable};
use std::collections::HashMap;

const CONST_EVAL_DEPTH_LIMIT: u32 = 32;

/// Build the HIR module for a parsed program
pub fn build_module(program: ast::Program, types: &mut TypeTable) -> Result<Module> {
    let mut builder = Builder::new(types);
    builder.register_builtins();
    builder.collect_items(program.items)?;
    builder.build_pending()?;
    builder.finish()
}

#[derive(Clone, Copy)]
enum TypeEntry {
    Struct(StructId),
    Enum(crate::types::EnumId),
    Alias(TypeId),
}

#[derive(Clone, Copy)]
enum ValueEntry {
    Func(FuncId),
    Const(ConstId),
}

/// Per-body state: locals and the lexical scope stack over them
struct BodyCtx {
    locals: Vec<Local>,
    param_locals: Vec<LocalId>,
    scopes: Vec<HashMap<String, LocalId>>,
    self_local: Option<LocalId>,
    next_loop: u32,
}

impl BodyCtx {
    fn new() -> Self {
        Self {
            locals: Vec::new(),
            param_locals: Vec::new(),
            scopes: vec![HashMap::new()],
            self_local: None,
            next_loop: 0,
        }
    }

    fn add_local(&mut self, name: impl Into<String>, ty: TypeId, is_mut: bool, span: Span) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(Local {
            name: name.into(),
            ty,
            is_mut,
            span,
        });
        id
    }

    fn bind(&mut self, name: &str, local: LocalId) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), local);
    }

    fn lookup(&self, name: &str) -> Option<LocalId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn fresh_loop(&mut self) -> LoopId {
        let id = LoopId(self.next_loop);
        self.next_loop += 1;
        id
    }
}

struct Builder<'t> {
    types: &'t mut TypeTable,
    functions: Vec<Function>,
    consts: Vec<ConstDef>,
    /// AST of each const's value, kept for compile-time evaluation
    const_asts: Vec<ast::Expr>,
    methods: HashMap<TypeId, HashMap<String, FuncId>>,
    type_scopes: Vec<HashMap<String, TypeEntry>>,
    value_scopes: Vec<HashMap<String, ValueEntry>>,
    pending_bodies: Vec<(FuncId, ast::Function, Option<TypeId>)>,
    pending_consts: Vec<(ConstId, ast::Expr)>,
    current_self_ty: Option<TypeId>,
}

impl<'t> Builder<'t> {
    fn new(types: &'t mut TypeTable) -> Self {
        Self {
            types,
            functions: Vec::new(),
            consts: Vec::new(),
            const_asts: Vec::new(),
            methods: HashMap::new(),
            type_scopes: vec![HashMap::new()],
            value_scopes: vec![HashMap::new()],
            pending_bodies: Vec::new(),
            pending_consts: Vec::new(),
            current_self_ty: None,
        }
    }

    /// Pre-register the runtime shims so programs can call them without
    /// declaring anything.
    fn register_builtins(&mut self) {
        let str_ty = self.types.str_ty();
        let str_ref = self.types.reference(str_ty, false);
        let i32_ty = self.types.i32_ty();
        let unit = self.types.unit_ty();

        let builtins: Vec<(&str, Vec<TypeId>, TypeId)> = vec![
            ("print", vec![str_ref], unit),
            ("println", vec![str_ref], unit),
            ("printInt", vec![i32_ty], unit),
            ("printlnInt", vec![i32_ty], unit),
            ("getString", vec![], str_ref),
            ("getInt", vec![], i32_ty),
            ("exit", vec![i32_ty], unit),
        ];

        for (name, param_tys, ret_ty) in builtins {
            let id = FuncId(self.functions.len() as u32);
            let param_names = (0..param_tys.len()).map(|i| format!("arg{i}")).collect();
            self.functions.push(Function {
                name: Identifier::synthetic(name),
                self_param: None,
                owner: None,
                param_tys,
                param_names,
                ret_ty,
                is_builtin: true,
                body: None,
            });
            self.value_scopes[0].insert(name.to_string(), ValueEntry::Func(id));
        }
    }

    // -----------------------------------------------------------------
    // Item collection
    // -----------------------------------------------------------------

    fn collect_items(&mut self, items: Vec<ast::Item>) -> Result<()> {
        let mut struct_asts = Vec::new();
        let mut alias_asts = Vec::new();
        let mut fn_asts = Vec::new();
        let mut const_asts = Vec::new();
        let mut impl_asts = Vec::new();

        // declare every type name first so definitions can be mutually
        // recursive through references
        for item in items {
            match item.kind {
                ast::ItemKind::Struct(s) => {
                    let sid = self.types.declare_struct(&s.name.name);
                    self.insert_type(&s.name, TypeEntry::Struct(sid))?;
                    struct_asts.push((sid, s));
                }
                ast::ItemKind::Enum(e) => {
                    let variants = e.variants.iter().map(|v| v.name.clone()).collect();
                    let eid = self.types.declare_enum(&e.name.name, variants);
                    self.insert_type(&e.name, TypeEntry::Enum(eid))?;
                }
                ast::ItemKind::TypeAlias(a) => alias_asts.push(a),
                ast::ItemKind::Function(f) => fn_asts.push(f),
                ast::ItemKind::Const(c) => const_asts.push(c),
                ast::ItemKind::Impl(i) => impl_asts.push(i),
                // traits exist syntactically; no bounds are resolved
                ast::ItemKind::Trait(_) => {}
            }
        }

        for alias in alias_asts {
            let target = self.resolve_type(&alias.ty)?;
            self.insert_type(&alias.name, TypeEntry::Alias(target))?;
        }

        for (sid, s) in struct_asts {
            let mut fields = Vec::new();
            for field in &s.fields {
                if fields.iter().any(|(n, _)| n == &field.name.name) {
                    return Err(CompileError::resolve(
                        format!("duplicate field `{}`", field.name.name),
                        field.name.span,
                    ));
                }
                let ty = self.resolve_type(&field.ty)?;
                fields.push((field.name.name.clone(), ty));
            }
            self.types.set_struct_fields(sid, fields);
        }

        for c in const_asts {
            self.declare_const(c)?;
        }

        for f in fn_asts {
            self.declare_function(f, None, None)?;
        }

        for imp in impl_asts {
            self.collect_impl(imp)?;
        }

        Ok(())
    }

    fn insert_type(&mut self, name: &Identifier, entry: TypeEntry) -> Result<()> {
        let scope = self.type_scopes.last_mut().expect("scope stack");
        if scope.insert(name.name.clone(), entry).is_some() {
            return Err(CompileError::resolve(
                format!("type `{}` is defined twice", name.name),
                name.span,
            ));
        }
        Ok(())
    }

    fn insert_value(&mut self, name: &Identifier, entry: ValueEntry) -> Result<()> {
        let scope = self.value_scopes.last_mut().expect("scope stack");
        if scope.insert(name.name.clone(), entry).is_some() {
            return Err(CompileError::resolve(
                format!("`{}` is defined twice", name.name),
                name.span,
            ));
        }
        Ok(())
    }

    fn declare_const(&mut self, c: ast::ConstItem) -> Result<ConstId> {
        let ty = self.resolve_type(&c.ty)?;
        let id = ConstId(self.consts.len() as u32);
        // value is a placeholder until the pending pass builds it
        self.consts.push(ConstDef {
            name: c.name.clone(),
            ty,
            value: Expr::new(ExprKind::Underscore, c.value.span),
        });
        self.const_asts.push(c.value.clone());
        self.insert_value(&c.name, ValueEntry::Const(id))?;
        self.pending_consts.push((id, c.value));
        Ok(id)
    }

    fn declare_function(
        &mut self,
        f: ast::Function,
        owner: Option<TypeId>,
        method_table: Option<&mut HashMap<String, FuncId>>,
    ) -> Result<FuncId> {
        let mut param_tys = Vec::new();
        let mut param_names = Vec::new();
        for param in &f.params {
            param_tys.push(self.resolve_type(&param.ty)?);
            param_names.push(param_binding_name(&param.pattern));
        }
        let ret_ty = match &f.return_type {
            Some(t) => self.resolve_type(t)?,
            None => self.types.unit_ty(),
        };

        if f.self_param.is_some() && owner.is_none() {
            return Err(CompileError::resolve(
                "`self` parameter outside an impl block",
                f.name.span,
            ));
        }

        let id = FuncId(self.functions.len() as u32);
        self.functions.push(Function {
            name: f.name.clone(),
            self_param: f.self_param,
            owner,
            param_tys,
            param_names,
            ret_ty,
            is_builtin: false,
            body: None,
        });

        match method_table {
            Some(table) => {
                if table.insert(f.name.name.clone(), id).is_some() {
                    return Err(CompileError::resolve(
                        format!("method `{}` is defined twice for this type", f.name.name),
                        f.name.span,
                    ));
                }
            }
            None => self.insert_value(&f.name, ValueEntry::Func(id))?,
        }

        if f.body.is_some() {
            self.pending_bodies.push((id, f, owner));
        }
        Ok(id)
    }

    fn collect_impl(&mut self, imp: ast::ImplBlock) -> Result<()> {
        let self_ty = self.resolve_type(&imp.self_ty)?;
        let is_inherent = imp.trait_path.is_none();
        let mut table = if is_inherent {
            self.methods.remove(&self_ty).unwrap_or_default()
        } else {
            HashMap::new()
        };

        // trait-impl methods are declared into a throwaway table: they are
        // built and checked, but only inherent methods resolve at call sites
        let saved = self.current_self_ty.replace(self_ty);
        let mut outcome = Ok(());
        for item in imp.items {
            match item.kind {
                ast::ItemKind::Function(f) => {
                    if let Err(e) = self.declare_function(f, Some(self_ty), Some(&mut table)) {
                        outcome = Err(e);
                        break;
                    }
                }
                _ => {
                    outcome = Err(CompileError::resolve(
                        "only functions are supported inside impl blocks",
                        item.span,
                    ));
                    break;
                }
            }
        }
        self.current_self_ty = saved;

        if is_inherent {
            self.methods.insert(self_ty, table);
        }
        outcome
    }

    // -----------------------------------------------------------------
    // Pending bodies
    // -----------------------------------------------------------------

    fn build_pending(&mut self) -> Result<()> {
        let pending_consts = std::mem::take(&mut self.pending_consts);
        for (id, value) in pending_consts {
            let mut ctx = BodyCtx::new();
            let value = self.build_expr(&mut ctx, value)?;
            self.consts[id.index()].value = value;
        }

        let pending = std::mem::take(&mut self.pending_bodies);
        for (id, f, self_ty) in pending {
            self.build_fn_body(id, f, self_ty)?;
        }
        Ok(())
    }

    fn build_fn_body(
        &mut self,
        id: FuncId,
        f: ast::Function,
        self_ty: Option<TypeId>,
    ) -> Result<()> {
        let saved_self = self.current_self_ty;
        self.current_self_ty = self_ty;

        let mut ctx = BodyCtx::new();

        if let Some(sp) = f.self_param {
            let self_ty = self_ty.expect("self param implies an impl block");
            let local_ty = if sp.is_reference {
                self.types.reference(self_ty, sp.is_mutable)
            } else {
                self_ty
            };
            let is_mut = !sp.is_reference && sp.is_mutable;
            let local = ctx.add_local("self", local_ty, is_mut, f.name.span);
            ctx.self_local = Some(local);
            ctx.param_locals.push(local);
        }

        for param in &f.params {
            let ty = self.resolve_type(&param.ty)?;
            let (name, is_mut) = match &param.pattern.kind {
                ast::PatternKind::Binding {
                    name,
                    is_ref: false,
                    is_mut,
                } => (name.name.clone(), *is_mut),
                ast::PatternKind::Wildcard => ("_".to_string(), false),
                _ => {
                    return Err(CompileError::resolve(
                        "unsupported parameter pattern",
                        param.pattern.span,
                    ));
                }
            };
            let local = ctx.add_local(&name, ty, is_mut, param.span);
            if name != "_" {
                ctx.bind(&name, local);
            }
            ctx.param_locals.push(local);
        }

        let body_block = f.body.expect("pending bodies always have a block");
        let block = self.build_block(&mut ctx, body_block)?;

        self.functions[id.index()].body = Some(FunctionBody {
            locals: ctx.locals,
            param_locals: ctx.param_locals,
            block,
        });

        self.current_self_ty = saved_self;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Blocks and statements
    // -----------------------------------------------------------------

    fn build_block(&mut self, ctx: &mut BodyCtx, block: ast::Block) -> Result<Block> {
        ctx.scopes.push(HashMap::new());
        self.type_scopes.push(HashMap::new());
        self.value_scopes.push(HashMap::new());

        let result = self.build_block_inner(ctx, block);

        self.value_scopes.pop();
        self.type_scopes.pop();
        ctx.scopes.pop();
        result
    }

    fn build_block_inner(&mut self, ctx: &mut BodyCtx, block: ast::Block) -> Result<Block> {
        let mut stmts = Vec::new();
        for stmt in block.statements {
            match stmt.kind {
                ast::StmtKind::Empty => {}
                ast::StmtKind::Let { pattern, ty, init } => {
                    let declared_ty = match &ty {
                        Some(t) => Some(self.resolve_type(t)?),
                        None => None,
                    };
                    let init = match init {
                        Some(e) => Some(self.build_expr(ctx, e)?),
                        None => None,
                    };
                    let target = match pattern.kind {
                        ast::PatternKind::Binding {
                            name,
                            is_ref: false,
                            is_mut,
                        } => {
                            let ty = declared_ty.unwrap_or_else(|| self.types.underscore_ty());
                            let local = ctx.add_local(&name.name, ty, is_mut, name.span);
                            ctx.bind(&name.name, local);
                            LetTarget::Local(local)
                        }
                        ast::PatternKind::Wildcard => LetTarget::Wildcard,
                        ast::PatternKind::Binding { is_ref: true, .. } => {
                            return Err(CompileError::resolve(
                                "`ref` bindings are not supported",
                                pattern.span,
                            ));
                        }
                        _ => {
                            return Err(CompileError::resolve(
                                "refutable pattern in `let` binding",
                                pattern.span,
                            ));
                        }
                    };
                    stmts.push(Stmt::Let {
                        target,
                        declared_ty,
                        init,
                        span: stmt.span,
                    });
                }
                ast::StmtKind::Expr {
                    expr,
                    has_semicolon,
                } => {
                    let expr = self.build_expr(ctx, expr)?;
                    stmts.push(Stmt::Expr {
                        expr,
                        has_semicolon,
                    });
                }
                ast::StmtKind::Item(item) => self.build_nested_item(*item)?,
            }
        }

        let final_expr = match block.final_expr {
            Some(e) => Some(Box::new(self.build_expr(ctx, *e)?)),
            None => None,
        };

        Ok(Block {
            stmts,
            final_expr,
            span: block.span,
        })
    }

    fn build_nested_item(&mut self, item: ast::Item) -> Result<()> {
        match item.kind {
            ast::ItemKind::Function(f) => {
                self.declare_function(f, None, None)?;
                // build it right away so the pending queue stays flat
                if let Some((id, f, self_ty)) = self.pending_bodies.pop() {
                    self.build_fn_body(id, f, self_ty)?;
                }
                Ok(())
            }
            ast::ItemKind::Struct(s) => {
                let sid = self.types.declare_struct(&s.name.name);
                self.insert_type(&s.name, TypeEntry::Struct(sid))?;
                let mut fields = Vec::new();
                for field in &s.fields {
                    let ty = self.resolve_type(&field.ty)?;
                    fields.push((field.name.name.clone(), ty));
                }
                self.types.set_struct_fields(sid, fields);
                Ok(())
            }
            ast::ItemKind::Enum(e) => {
                let variants = e.variants.iter().map(|v| v.name.clone()).collect();
                let eid = self.types.declare_enum(&e.name.name, variants);
                self.insert_type(&e.name, TypeEntry::Enum(eid))
            }
            ast::ItemKind::Const(c) => {
                let id = self.declare_const(c)?;
                if let Some((pending_id, value)) = self.pending_consts.pop() {
                    debug_assert_eq!(pending_id.index(), id.index());
                    let mut ctx = BodyCtx::new();
                    let value = self.build_expr(&mut ctx, value)?;
                    self.consts[id.index()].value = value;
                }
                Ok(())
            }
            ast::ItemKind::TypeAlias(a) => {
                let target = self.resolve_type(&a.ty)?;
                self.insert_type(&a.name, TypeEntry::Alias(target))
            }
            _ => Err(CompileError::resolve(
                "this item kind is not supported inside a block",
                item.span,
            )),
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn build_expr(&mut self, ctx: &mut BodyCtx, expr: ast::Expr) -> Result<Expr> {
        let span = expr.span;
        let kind = match expr.kind {
            ast::ExprKind::IntegerLiteral { value, suffix } => {
                ExprKind::Literal(Literal::Int { value, suffix })
            }
            ast::ExprKind::BoolLiteral(b) => ExprKind::Literal(Literal::Bool(b)),
            ast::ExprKind::CharLiteral(c) => ExprKind::Literal(Literal::Char(c)),
            ast::ExprKind::StringLiteral { value, is_cstyle } => {
                ExprKind::Literal(Literal::Str { value, is_cstyle })
            }

            ast::ExprKind::Path(path) => self.resolve_value_path(ctx, &path, span)?,
            ast::ExprKind::Underscore => ExprKind::Underscore,
            ast::ExprKind::Grouped(inner) => {
                ExprKind::Grouped(Box::new(self.build_expr(ctx, *inner)?))
            }

            ast::ExprKind::Unary { op, operand } => {
                let operand = Box::new(self.build_expr(ctx, *operand)?);
                let op = match op {
                    ast::UnaryOp::Not => UnaryOp::Not,
                    ast::UnaryOp::Negate => UnaryOp::Negate,
                    ast::UnaryOp::Deref => UnaryOp::Deref,
                    ast::UnaryOp::Ref => UnaryOp::Ref { is_mut: false },
                    ast::UnaryOp::RefMut => UnaryOp::Ref { is_mut: true },
                };
                ExprKind::Unary { op, operand }
            }
            ast::ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op,
                left: Box::new(self.build_expr(ctx, *left)?),
                right: Box::new(self.build_expr(ctx, *right)?),
            },
            ast::ExprKind::Assign { op, left, right } => ExprKind::Assign {
                op,
                left: Box::new(self.build_expr(ctx, *left)?),
                right: Box::new(self.build_expr(ctx, *right)?),
            },
            ast::ExprKind::Cast { expr: inner, ty } => ExprKind::Cast {
                expr: Box::new(self.build_expr(ctx, *inner)?),
                target_ty: self.resolve_type(&ty)?,
            },

            ast::ExprKind::ArrayInit(elements) => {
                let mut built = Vec::with_capacity(elements.len());
                for e in elements {
                    built.push(self.build_expr(ctx, e)?);
                }
                ExprKind::ArrayInit(built)
            }
            ast::ExprKind::ArrayRepeat { value, count } => {
                let count = match self.const_eval_usize(&count, 0) {
                    Some(n) => RepeatCount::Const(n),
                    None => RepeatCount::Expr(Box::new(self.build_expr(ctx, *count)?)),
                };
                ExprKind::ArrayRepeat {
                    value: Box::new(self.build_expr(ctx, *value)?),
                    count,
                }
            }
            ast::ExprKind::Index { array, index } => ExprKind::Index {
                array: Box::new(self.build_expr(ctx, *array)?),
                index: Box::new(self.build_expr(ctx, *index)?),
            },
            ast::ExprKind::StructLiteral { path, fields } => {
                self.build_struct_literal(ctx, &path, fields, span)?
            }

            ast::ExprKind::Call { callee, args } => {
                let callee = Box::new(self.build_expr(ctx, *callee)?);
                let mut built = Vec::with_capacity(args.len());
                for a in args {
                    built.push(self.build_expr(ctx, a)?);
                }
                ExprKind::Call {
                    callee,
                    args: built,
                }
            }
            ast::ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                let receiver = Box::new(self.build_expr(ctx, *receiver)?);
                let mut built = Vec::with_capacity(args.len());
                for a in args {
                    built.push(self.build_expr(ctx, a)?);
                }
                ExprKind::MethodCall {
                    receiver,
                    method,
                    resolved: None,
                    args: built,
                }
            }
            ast::ExprKind::FieldAccess { object, field } => ExprKind::FieldAccess {
                object: Box::new(self.build_expr(ctx, *object)?),
                field,
                resolved: None,
            },

            ast::ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = Box::new(self.build_expr(ctx, *condition)?);
                let then_branch = self.build_block(ctx, *then_branch)?;
                let else_branch = match else_branch {
                    Some(e) => Some(Box::new(self.build_expr(ctx, *e)?)),
                    None => None,
                };
                ExprKind::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            }
            ast::ExprKind::Loop { body } => {
                let loop_id = ctx.fresh_loop();
                ExprKind::Loop {
                    body: self.build_block(ctx, *body)?,
                    loop_id,
                }
            }
            ast::ExprKind::While { condition, body } => {
                let loop_id = ctx.fresh_loop();
                ExprKind::While {
                    condition: Box::new(self.build_expr(ctx, *condition)?),
                    body: self.build_block(ctx, *body)?,
                    loop_id,
                }
            }

            ast::ExprKind::Return { value } => ExprKind::Return {
                value: match value {
                    Some(v) => Some(Box::new(self.build_expr(ctx, *v)?)),
                    None => None,
                },
            },
            ast::ExprKind::Break { label, value } => {
                if let Some(label) = label {
                    return Err(CompileError::resolve(
                        format!("unresolved loop label `{}`", label.name),
                        label.span,
                    ));
                }
                ExprKind::Break {
                    value: match value {
                        Some(v) => Some(Box::new(self.build_expr(ctx, *v)?)),
                        None => None,
                    },
                    target: None,
                }
            }
            ast::ExprKind::Continue { label } => {
                if let Some(label) = label {
                    return Err(CompileError::resolve(
                        format!("unresolved loop label `{}`", label.name),
                        label.span,
                    ));
                }
                ExprKind::Continue { target: None }
            }

            ast::ExprKind::Block(block) => ExprKind::Block(self.build_block(ctx, *block)?),
        };
        Ok(Expr::new(kind, span))
    }

    fn build_struct_literal(
        &mut self,
        ctx: &mut BodyCtx,
        path: &ast::Path,
        fields: Vec<ast::FieldInit>,
        span: Span,
    ) -> Result<ExprKind> {
        let sid = match self.lookup_type_path(path) {
            Some(TypeEntry::Struct(sid)) => sid,
            Some(TypeEntry::Alias(ty)) => match self.types.get(ty) {
                crate::types::Ty::Struct(sid) => *sid,
                _ => {
                    return Err(CompileError::resolve(
                        format!("`{path}` is not a struct"),
                        span,
                    ));
                }
            },
            _ => {
                return Err(CompileError::resolve(
                    format!("unresolved struct `{path}`"),
                    span,
                ));
            }
        };

        let field_names: Vec<String> = self
            .types
            .struct_info(sid)
            .fields
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        let struct_name = self.types.struct_info(sid).name.clone();

        let mut slots: Vec<Option<Expr>> = field_names.iter().map(|_| None).collect();
        for init in fields {
            let Some(index) = field_names.iter().position(|n| *n == init.name.name) else {
                return Err(CompileError::resolve(
                    format!(
                        "struct `{}` has no field named `{}`",
                        struct_name, init.name.name
                    ),
                    init.name.span,
                ));
            };
            if slots[index].is_some() {
                return Err(CompileError::resolve(
                    format!("field `{}` specified more than once", init.name.name),
                    init.name.span,
                ));
            }
            slots[index] = Some(self.build_expr(ctx, init.value)?);
        }

        let mut canonical = Vec::with_capacity(slots.len());
        for (slot, name) in slots.into_iter().zip(field_names.iter()) {
            match slot {
                Some(e) => canonical.push(e),
                None => {
                    return Err(CompileError::resolve(
                        format!("missing field `{name}` in struct literal"),
                        span,
                    ));
                }
            }
        }

        Ok(ExprKind::StructLiteral {
            struct_id: sid,
            fields: canonical,
        })
    }

    /// Resolve a path in expression position
    fn resolve_value_path(
        &mut self,
        ctx: &BodyCtx,
        path: &ast::Path,
        span: Span,
    ) -> Result<ExprKind> {
        match path.segments.as_slice() {
            [ast::PathSegment::SelfValue(_)] => match ctx.self_local {
                Some(local) => Ok(ExprKind::Variable(local)),
                None => Err(CompileError::resolve(
                    "`self` outside of a method",
                    span,
                )),
            },
            [ast::PathSegment::Ident(id)] => {
                if let Some(local) = ctx.lookup(&id.name) {
                    return Ok(ExprKind::Variable(local));
                }
                if let Some(entry) = self.lookup_value(&id.name) {
                    return Ok(match entry {
                        ValueEntry::Func(f) => ExprKind::FuncUse(f),
                        ValueEntry::Const(c) => ExprKind::ConstUse(c),
                    });
                }
                if let Some(TypeEntry::Struct(sid)) = self.lookup_type(&id.name) {
                    if self.types.struct_info(sid).fields.is_empty() {
                        return Ok(ExprKind::StructConst(sid));
                    }
                }
                Err(CompileError::resolve(
                    format!("unresolved identifier `{}`", id.name),
                    span,
                ))
            }
            [ast::PathSegment::Ident(first), ast::PathSegment::Ident(second)] => {
                match self.lookup_type(&first.name) {
                    Some(TypeEntry::Enum(eid)) => {
                        let info = self.types.enum_info(eid);
                        match info.variants.iter().position(|v| *v == second.name) {
                            Some(variant_index) => Ok(ExprKind::EnumVariant {
                                enum_id: eid,
                                variant_index,
                            }),
                            None => Err(CompileError::resolve(
                                format!(
                                    "enum `{}` has no variant `{}`",
                                    first.name, second.name
                                ),
                                second.span,
                            )),
                        }
                    }
                    _ => Err(CompileError::resolve(
                        format!("unresolved path `{path}`"),
                        span,
                    )),
                }
            }
            _ => Err(CompileError::resolve(
                format!("unresolved path `{path}`"),
                span,
            )),
        }
    }

    // -----------------------------------------------------------------
    // Types and const evaluation
    // -----------------------------------------------------------------

    fn lookup_type(&self, name: &str) -> Option<TypeEntry> {
        self.type_scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn lookup_type_path(&self, path: &ast::Path) -> Option<TypeEntry> {
        let id = path.as_single_ident()?;
        self.lookup_type(&id.name)
    }

    fn lookup_value(&self, name: &str) -> Option<ValueEntry> {
        self.value_scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn resolve_type(&mut self, ty: &ast::Type) -> Result<TypeId> {
        match &ty.kind {
            ast::TypeKind::Primitive(kind) => Ok(match kind {
                ast::PrimitiveKind::I32 => self.types.i32_ty(),
                ast::PrimitiveKind::U32 => self.types.u32_ty(),
                ast::PrimitiveKind::Isize => self.types.isize_ty(),
                ast::PrimitiveKind::Usize => self.types.usize_ty(),
                ast::PrimitiveKind::Bool => self.types.bool_ty(),
                ast::PrimitiveKind::Char => self.types.char_ty(),
                ast::PrimitiveKind::Str => self.types.str_ty(),
            }),
            ast::TypeKind::Unit => Ok(self.types.unit_ty()),
            ast::TypeKind::Reference { is_mut, pointee } => {
                let pointee = self.resolve_type(pointee)?;
                Ok(self.types.reference(pointee, *is_mut))
            }
            ast::TypeKind::Array { element, size } => {
                let element = self.resolve_type(element)?;
                let Some(size) = self.const_eval_usize(size, 0) else {
                    return Err(CompileError::resolve(
                        "array size must be a compile-time constant",
                        ty.span,
                    ));
                };
                Ok(self.types.array(element, size))
            }
            ast::TypeKind::Path(path) => {
                if let Some(id) = path.as_single_ident() {
                    if id.name == "Self" {
                        // `Self` is a keyword, not an identifier, so this
                        // arm only matters for synthesized paths
                        if let Some(ty) = self.current_self_ty {
                            return Ok(ty);
                        }
                    }
                    match self.lookup_type(&id.name) {
                        Some(TypeEntry::Struct(sid)) => return Ok(self.types.struct_ty(sid)),
                        Some(TypeEntry::Enum(eid)) => return Ok(self.types.enum_ty(eid)),
                        Some(TypeEntry::Alias(t)) => return Ok(t),
                        None => {}
                    }
                }
                if matches!(path.segments.as_slice(), [ast::PathSegment::SelfType(_)]) {
                    if let Some(ty) = self.current_self_ty {
                        return Ok(ty);
                    }
                    return Err(CompileError::resolve(
                        "`Self` outside of an impl block",
                        ty.span,
                    ));
                }
                Err(CompileError::resolve(
                    format!("unresolved type `{path}`"),
                    ty.span,
                ))
            }
        }
    }

    /// Fold a compile-time `usize` out of an expression: integer
    /// literals, const items and simple arithmetic over them.
    fn const_eval_usize(&self, expr: &ast::Expr, depth: u32) -> Option<usize> {
        if depth > CONST_EVAL_DEPTH_LIMIT {
            return None;
        }
        match &expr.kind {
            ast::ExprKind::IntegerLiteral { value, .. } => usize::try_from(*value).ok(),
            ast::ExprKind::Grouped(inner) => self.const_eval_usize(inner, depth + 1),
            ast::ExprKind::Path(path) => {
                let id = path.as_single_ident()?;
                match self.lookup_value(&id.name)? {
                    ValueEntry::Const(cid) => {
                        self.const_eval_usize(&self.const_asts[cid.index()], depth + 1)
                    }
                    ValueEntry::Func(_) => None,
                }
            }
            ast::ExprKind::Binary { op, left, right } => {
                let l = self.const_eval_usize(left, depth + 1)?;
                let r = self.const_eval_usize(right, depth + 1)?;
                match op {
                    ast::BinaryOp::Add => l.checked_add(r),
                    ast::BinaryOp::Sub => l.checked_sub(r),
                    ast::BinaryOp::Mul => l.checked_mul(r),
                    ast::BinaryOp::Div => l.checked_div(r),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn finish(self) -> Result<Module> {
        Ok(Module {
            functions: self.functions,
            consts: self.consts,
            methods: self.methods,
        })
    }
}

fn param_binding_name(pattern: &ast::Pattern) -> String {
    match &pattern.kind {
        ast::PatternKind::Binding { name, .. } => name.name.clone(),
        _ => "_".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn build(source: &str) -> (Module, TypeTable) {
        let tokens = tokenize(source, 0).unwrap();
        let program = parse(&tokens).unwrap();
        let mut types = TypeTable::new();
        let module = build_module(program, &mut types).unwrap();
        (module, types)
    }

    fn build_err(source: &str) -> CompileError {
        let tokens = tokenize(source, 0).unwrap();
        let program = parse(&tokens).unwrap();
        let mut types = TypeTable::new();
        build_module(program, &mut types).unwrap_err()
    }

    #[test]
    fn test_builtins_are_registered() {
        let (module, _) = build("");
        for name in ["print", "println", "printInt", "printlnInt", "getString", "getInt", "exit"] {
            let id = module.function_by_name(name).unwrap();
            assert!(module.function(id).is_builtin);
        }
    }

    #[test]
    fn test_function_signature_resolution() {
        let (module, types) = build("fn add(a: i32, b: i32) -> i32 { a + b }");
        let id = module.function_by_name("add").unwrap();
        let f = module.function(id);
        assert_eq!(f.param_tys, vec![types.i32_ty(), types.i32_ty()]);
        assert_eq!(f.ret_ty, types.i32_ty());
        let body = f.body.as_ref().unwrap();
        assert_eq!(body.param_locals.len(), 2);
        assert_eq!(body.local(body.param_locals[0]).name, "a");
    }

    #[test]
    fn test_variable_resolution() {
        let (module, _) = build("fn f() -> i32 { let x = 1; x }");
        let id = module.function_by_name("f").unwrap();
        let body = module.function(id).body.as_ref().unwrap();
        match &body.block.final_expr.as_ref().unwrap().kind {
            ExprKind::Variable(local) => {
                assert_eq!(body.local(*local).name, "x");
            }
            _ => panic!("expected resolved variable"),
        }
    }

    #[test]
    fn test_unresolved_identifier_is_fatal() {
        let err = build_err("fn f() -> i32 { y }");
        assert!(err.message().contains("unresolved identifier `y`"));
    }

    #[test]
    fn test_shadowing_resolves_to_innermost() {
        let (module, _) = build("fn f() -> i32 { let x = 1; { let x = 2; x } }");
        let id = module.function_by_name("f").unwrap();
        let body = module.function(id).body.as_ref().unwrap();
        // two distinct locals named x
        assert_eq!(body.locals.iter().filter(|l| l.name == "x").count(), 2);
    }

    #[test]
    fn test_struct_literal_fields_are_canonicalized() {
        let (module, types) = build(
            "struct Point { x: i32, y: i32 }\n\
             fn f() -> Point { Point { y: 2, x: 1 } }",
        );
        let id = module.function_by_name("f").unwrap();
        let body = module.function(id).body.as_ref().unwrap();
        match &body.block.final_expr.as_ref().unwrap().kind {
            ExprKind::StructLiteral { struct_id, fields } => {
                assert_eq!(types.struct_info(*struct_id).name, "Point");
                assert_eq!(fields.len(), 2);
                // canonical order is x then y; `x: 1` comes first now
                match &fields[0].kind {
                    ExprKind::Literal(Literal::Int { value, .. }) => assert_eq!(*value, 1),
                    other => panic!("expected literal, got {other:?}"),
                }
            }
            _ => panic!("expected struct literal"),
        }
    }

    #[test]
    fn test_struct_literal_field_errors() {
        let base = "struct P { x: i32 }\n";
        assert!(build_err(&format!("{base}fn f() -> P {{ P {{ }} }}"))
            .message()
            .contains("missing field `x`"));
        assert!(build_err(&format!("{base}fn f() -> P {{ P {{ x: 1, x: 2 }} }}"))
            .message()
            .contains("more than once"));
        assert!(build_err(&format!("{base}fn f() -> P {{ P {{ x: 1, z: 2 }} }}"))
            .message()
            .contains("no field named `z`"));
    }

    #[test]
    fn test_enum_variant_resolution() {
        let (module, _) = build(
            "enum Color { Red, Green, Blue }\n\
             fn f() -> Color { Color::Green }",
        );
        let id = module.function_by_name("f").unwrap();
        let body = module.function(id).body.as_ref().unwrap();
        match &body.block.final_expr.as_ref().unwrap().kind {
            ExprKind::EnumVariant { variant_index, .. } => assert_eq!(*variant_index, 1),
            _ => panic!("expected enum variant"),
        }
    }

    #[test]
    fn test_unknown_variant_is_fatal() {
        let err = build_err(
            "enum Color { Red }\n\
             fn f() -> Color { Color::Teal }",
        );
        assert!(err.message().contains("no variant `Teal`"));
    }

    #[test]
    fn test_method_registration() {
        let (module, mut types) = build(
            "struct P { x: i32 }\n\
             impl P { fn get(&self) -> i32 { self.x } }",
        );
        let sid = types.struct_by_name("P").unwrap();
        let p_ty = types.struct_ty(sid);
        let table = module.methods.get(&p_ty).expect("method table for P");
        assert!(table.contains_key("get"));
    }

    #[test]
    fn test_duplicate_method_is_fatal() {
        let err = build_err(
            "struct P { x: i32 }\n\
             impl P { fn get(&self) {} fn get(&self) {} }",
        );
        assert!(err.message().contains("defined twice"));
    }

    #[test]
    fn test_const_resolution_and_array_sizes() {
        let (module, types) = build(
            "const N: usize = 4;\n\
             fn f() -> [i32; N] { [0; N] }",
        );
        let id = module.function_by_name("f").unwrap();
        let f = module.function(id);
        match types.get(f.ret_ty) {
            crate::types::Ty::Array { size, .. } => assert_eq!(*size, 4),
            other => panic!("expected array type, got {other:?}"),
        }
        let body = f.body.as_ref().unwrap();
        match &body.block.final_expr.as_ref().unwrap().kind {
            ExprKind::ArrayRepeat { count: RepeatCount::Const(4), .. } => {}
            _ => panic!("expected const repeat count"),
        }
    }

    #[test]
    fn test_const_arithmetic_in_array_size() {
        let (module, types) = build(
            "const N: usize = 2;\n\
             fn f(a: [i32; N * 2 + 1]) {}",
        );
        let id = module.function_by_name("f").unwrap();
        let f = module.function(id);
        match types.get(f.param_tys[0]) {
            crate::types::Ty::Array { size, .. } => assert_eq!(*size, 5),
            other => panic!("expected array type, got {other:?}"),
        }
    }

    #[test]
    fn test_self_resolution_in_method() {
        let (module, _) = build(
            "struct P { x: i32 }\n\
             impl P { fn get(&self) -> i32 { self.x } }",
        );
        // the method body resolved `self` to a local
        let method = module
            .functions
            .iter()
            .find(|f| f.name.name == "get")
            .unwrap();
        let body = method.body.as_ref().unwrap();
        assert_eq!(body.local(body.param_locals[0]).name, "self");
    }

    #[test]
    fn test_nested_function_in_block() {
        let (module, _) = build("fn f() { fn g() {} g(); }");
        assert!(module.functions.iter().any(|f| f.name.name == "g"));
    }
}
