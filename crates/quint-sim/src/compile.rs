//! Compiler: lowering IR into the computable graph
//!
//! The compiler walks a module with a compilation stack: literal and name
//! leaves push computables, applications pop their operands and push a
//! combined computable. No evaluation happens during compilation; built-in
//! operators become closures that implement their semantics when driven,
//! including the short-circuit and state-restoration rules of the action
//! combinators.
//!
//! Compiled definitions live in a context keyed by `(kind, name)`, so a
//! `val`, a `var`, an `arg` and an operator of the same name stay apart.
//! Name lookup tries kinds in a fixed priority order:
//! `shadow > val > var > arg > callable`.
//!
//! Module-level operators are declared first and compiled second, so
//! definition bodies can reference operators defined later in the module,
//! or themselves.

use std::rc::Rc;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use rustc_hash::FxHashMap;

use quint_core::ir::{Def, Expr, Module, NodeId, OpDef, OpQualifier, Param};
use quint_core::{is_builtin, ErrorReport};

use crate::computable::{Callable, CallableHandle, Computable, EvalCtx, OpSlot};
use crate::error::{CompileError, EvalError, EvalResult};
use crate::register::{RegisterBank, RegisterId, RegisterKind, VarPair};
use crate::rng::SeededRng;
use crate::simulator;
use crate::value::{InfiniteSet, LambdaValue, SetValue, SortedElems, Value};

/// The kind half of a context key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Shadow,
    Val,
    Var,
    Arg,
    Callable,
}

/// Name lookup priority.
pub const LOOKUP_ORDER: [ContextKind; 5] = [
    ContextKind::Shadow,
    ContextKind::Val,
    ContextKind::Var,
    ContextKind::Arg,
    ContextKind::Callable,
];

/// A context binding: either a plain computable (vals, registers) or an
/// operator reference.
#[derive(Debug, Clone)]
pub enum ContextEntry {
    Comp(Rc<Computable>),
    Op(CallableHandle),
}

/// The compilation context: `(kind, name) -> binding`.
pub type Context = FxHashMap<(ContextKind, String), ContextEntry>;

/// User-supplied values for `const` declarations.
pub type ConstBindings = FxHashMap<String, Value>;

/// The result of compiling a module: the context of named computables,
/// the register bank they close over, and the errors found on the way.
#[derive(Debug)]
pub struct CompiledModule {
    pub module_name: String,
    pub context: Context,
    pub registers: RegisterBank,
    pub vars: Vec<VarPair>,
    pub shadow_vars: Vec<RegisterId>,
    pub compile_errors: Vec<ErrorReport>,
    /// Errors known at compile time to fire on evaluation (none today;
    /// kept so callers see one report shape for both phases).
    pub runtime_errors: Vec<ErrorReport>,
}

impl CompiledModule {
    /// Look a name up in priority order.
    pub fn lookup(&self, name: &str) -> Option<&ContextEntry> {
        LOOKUP_ORDER
            .iter()
            .find_map(|kind| self.context.get(&(*kind, name.to_string())))
    }

    /// A fresh evaluation context over a copy of the compiled registers.
    pub fn new_ctx(&self, rng: SeededRng) -> EvalCtx {
        EvalCtx::new(self.registers.clone(), rng)
    }

    /// Evaluate a named definition: vals evaluate directly, nullary
    /// operators are invoked.
    pub fn eval_name(&self, ctx: &mut EvalCtx, name: &str) -> EvalResult<Value> {
        match self.lookup(name) {
            Some(ContextEntry::Comp(c)) => Rc::clone(c).eval(ctx),
            Some(ContextEntry::Op(handle)) => handle.clone().invoke(ctx, Vec::new()),
            None => Err(EvalError::Internal {
                message: format!("name {name} not found in the compiled context"),
                id: None,
            }),
        }
    }

    /// The register holding the last recorded trace.
    pub fn last_trace_register(&self) -> RegisterId {
        self.shadow_vars[0]
    }

    /// A plain computable for a named definition: vals as-is, nullary
    /// operators wrapped in an invoking thunk.
    pub fn computable(&self, name: &str) -> Option<Rc<Computable>> {
        self.lookup(name).cloned().map(|entry| match entry {
            ContextEntry::Comp(c) => c,
            ContextEntry::Op(handle) => {
                Computable::from_fn(move |ctx| handle.invoke(ctx, Vec::new()))
            }
        })
    }
}

/// Compile a module against an environment of constant values.
pub fn compile(module: &Module, consts: &ConstBindings) -> CompiledModule {
    let mut compiler = Compiler::new(consts);
    compiler.install_builtins();
    compiler.declare(module);
    compiler.compile_pending();
    compiler.finish(module.name.clone())
}

/// A compiled operand on the compilation stack: an expression computable
/// or an operator reference (lambdas, operators used as arguments).
#[derive(Debug, Clone)]
enum Compiled {
    Expr(Rc<Computable>),
    Op(CallableHandle),
}

impl Compiled {
    /// View as a plain computable. Nullary operators become an invoking
    /// thunk; parameterized operators become a lambda value.
    fn into_comp(self) -> Rc<Computable> {
        match self {
            Compiled::Expr(c) => c,
            Compiled::Op(handle) => {
                if handle.arity() == 0 {
                    Computable::from_fn(move |ctx| handle.invoke(ctx, Vec::new()))
                } else {
                    Computable::constant(Value::Lambda(LambdaValue::new(handle)))
                }
            }
        }
    }
}

/// An operand in operator position: known at compile time, or a value
/// that must evaluate to a lambda at run time (a parameter holding an
/// operator).
#[derive(Clone)]
enum OperandCallable {
    Static(CallableHandle),
    Dynamic(Rc<Computable>),
}

impl OperandCallable {
    fn invoke(&self, ctx: &mut EvalCtx, args: Vec<Value>) -> EvalResult<Value> {
        match self {
            OperandCallable::Static(handle) => handle.invoke(ctx, args),
            OperandCallable::Dynamic(comp) => {
                let v = comp.eval(ctx)?;
                let handle = v.as_lambda().handle.clone();
                handle.invoke(ctx, args)
            }
        }
    }
}

struct Compiler<'a> {
    consts: &'a ConstBindings,
    regs: RegisterBank,
    context: Context,
    stack: Vec<Compiled>,
    /// Variable pairs by name, for `assign` and `next`.
    vars: FxHashMap<String, VarPair>,
    shadow_vars: Vec<RegisterId>,
    last_trace: RegisterId,
    /// Declared operators awaiting body compilation.
    pending: Vec<(Rc<OpSlot>, OpDef)>,
    errors: Vec<CompileError>,
}

impl<'a> Compiler<'a> {
    fn new(consts: &'a ConstBindings) -> Self {
        Compiler {
            consts,
            regs: RegisterBank::new(),
            context: Context::default(),
            stack: Vec::new(),
            vars: FxHashMap::default(),
            shadow_vars: Vec::new(),
            last_trace: RegisterId(0),
            pending: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Pre-populate the context: `Bool`, the infinite `Int`/`Nat` markers,
    /// and the `_lastTrace` shadow variable.
    fn install_builtins(&mut self) {
        self.insert(
            ContextKind::Val,
            "Bool",
            ContextEntry::Comp(Computable::constant(Value::set(vec![
                Value::Bool(false),
                Value::Bool(true),
            ]))),
        );
        self.insert(
            ContextKind::Val,
            "Int",
            ContextEntry::Comp(Computable::constant(Value::Set(SetValue::Infinite(
                InfiniteSet::Int,
            )))),
        );
        self.insert(
            ContextKind::Val,
            "Nat",
            ContextEntry::Comp(Computable::constant(Value::Set(SetValue::Infinite(
                InfiniteSet::Nat,
            )))),
        );

        let reg = self.regs.alloc(RegisterKind::Shadow, "_lastTrace", 0);
        self.last_trace = reg;
        self.shadow_vars.push(reg);
        self.insert(
            ContextKind::Shadow,
            "_lastTrace",
            ContextEntry::Comp(Computable::register(reg)),
        );
    }

    fn finish(self, module_name: String) -> CompiledModule {
        CompiledModule {
            module_name,
            vars: self.regs.var_pairs().to_vec(),
            context: self.context,
            registers: self.regs,
            shadow_vars: self.shadow_vars,
            compile_errors: self.errors.iter().map(CompileError::report).collect(),
            runtime_errors: Vec::new(),
        }
    }

    // === Context plumbing ===

    fn insert(
        &mut self,
        kind: ContextKind,
        name: &str,
        entry: ContextEntry,
    ) -> Option<ContextEntry> {
        self.context.insert((kind, name.to_string()), entry)
    }

    fn restore(&mut self, kind: ContextKind, name: &str, saved: Option<ContextEntry>) {
        let key = (kind, name.to_string());
        match saved {
            Some(entry) => {
                self.context.insert(key, entry);
            }
            None => {
                self.context.remove(&key);
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<&ContextEntry> {
        LOOKUP_ORDER
            .iter()
            .find_map(|kind| self.context.get(&(*kind, name.to_string())))
    }

    // === Declaration pass ===

    /// Declare every definition of a module (and of nested modules) before
    /// compiling any body, so forward references resolve.
    fn declare(&mut self, module: &Module) {
        for def in &module.defs {
            match def {
                Def::Op(op) => self.declare_op(op.clone()),
                Def::Var { id, name, .. } => {
                    let pair = self.regs.alloc_var(name.as_str(), *id);
                    self.insert(
                        ContextKind::Var,
                        name,
                        ContextEntry::Comp(Computable::register(pair.current)),
                    );
                    self.vars.insert(name.clone(), pair);
                }
                Def::Const { id, name, .. } => match self.consts.get(name) {
                    Some(value) => {
                        self.insert(
                            ContextKind::Val,
                            name,
                            ContextEntry::Comp(Computable::constant(value.clone())),
                        );
                    }
                    None => self.errors.push(CompileError::UnboundConstant {
                        name: name.clone(),
                        id: *id,
                    }),
                },
                Def::Assume { id, name, expr } => {
                    // An assumption compiles like a nullary pure val.
                    self.declare_op(OpDef {
                        id: *id,
                        name: name.clone(),
                        qualifier: OpQualifier::PureVal,
                        params: Vec::new(),
                        ret: None,
                        body: expr.clone(),
                    });
                }
                Def::TypeAlias { .. } => {}
                // Imported names are compiled at their defining module and
                // already live in the flat context.
                Def::Import { .. } => {}
                Def::Instance {
                    name, overrides, ..
                } => {
                    // Instance flattening is the frontend's job; the
                    // compiler only exposes the overrides under their
                    // qualified names.
                    for (const_name, expr) in overrides {
                        self.declare_op(OpDef {
                            id: expr.id(),
                            name: format!("{name}::{const_name}"),
                            qualifier: OpQualifier::PureVal,
                            params: Vec::new(),
                            ret: None,
                            body: expr.clone(),
                        });
                    }
                }
                Def::Module(nested) => self.declare(nested),
            }
        }
    }

    fn declare_op(&mut self, def: OpDef) {
        let arity = if def.qualifier.is_nullary() {
            0
        } else {
            op_arity(&def)
        };
        let slot = OpSlot::new(&def.name, arity, def.id);
        let handle = CallableHandle::Deferred(Rc::clone(&slot));
        if def.qualifier.is_nullary() {
            let entry = ContextEntry::Comp(Computable::from_fn(move |ctx| {
                handle.invoke(ctx, Vec::new())
            }));
            self.insert(ContextKind::Val, &def.name, entry);
        } else {
            self.insert(ContextKind::Callable, &def.name, ContextEntry::Op(handle));
        }
        self.pending.push((slot, def));
    }

    /// Compile the bodies of all declared operators.
    fn compile_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (slot, def) in pending {
            self.compile_op_def(&def, &slot);
        }
    }

    /// Allocate a fresh `arg` register for each parameter and bind it in
    /// the context, remembering the shadowed entries for `unbind_params`.
    /// A name repeated within one parameter list is reported: the earlier
    /// occurrence's register can never be addressed.
    fn bind_params(
        &mut self,
        params: &[Param],
    ) -> (Vec<RegisterId>, Vec<(String, Option<ContextEntry>)>) {
        let mut registers = Vec::with_capacity(params.len());
        let mut saved = Vec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            if params[..i].iter().any(|p| p.name == param.name) {
                self.errors.push(CompileError::UnboundParameter {
                    name: param.name.clone(),
                    id: param.id,
                });
            }
            let reg = self
                .regs
                .alloc(RegisterKind::Arg, param.name.as_str(), param.id);
            registers.push(reg);
            saved.push((
                param.name.clone(),
                self.insert(
                    ContextKind::Arg,
                    &param.name,
                    ContextEntry::Comp(Computable::register(reg)),
                ),
            ));
        }
        (registers, saved)
    }

    /// Undo `bind_params`, restoring the shadowed context entries.
    fn unbind_params(&mut self, saved: Vec<(String, Option<ContextEntry>)>) {
        for (name, entry) in saved.into_iter().rev() {
            self.restore(ContextKind::Arg, &name, entry);
        }
    }

    /// Compile one operator definition and fill its slot: fresh `arg`
    /// registers first, then the body, packaged into a callable.
    fn compile_op_def(&mut self, def: &OpDef, slot: &Rc<OpSlot>) {
        let (params, saved) = self.bind_params(&def.params);

        let compiled_body = if def.qualifier == OpQualifier::Temporal {
            let name = def.name.clone();
            let id = def.id;
            Compiled::Expr(Computable::from_fn(move |_ctx| {
                Err(EvalError::Temporal {
                    name: name.clone(),
                    id: Some(id),
                })
            }))
        } else {
            self.compile_expr(&def.body);
            self.pop()
        };

        self.unbind_params(saved);

        let callable = match compiled_body {
            // `def f = (x, y) => e`: the parameters live on the lambda.
            Compiled::Op(CallableHandle::Fixed(lambda))
                if params.is_empty() && !def.qualifier.is_nullary() =>
            {
                Rc::new(Callable {
                    name: Arc::from(def.name.as_str()),
                    params: lambda.params.clone(),
                    body: Rc::clone(&lambda.body),
                    id: def.id,
                })
            }
            other => Rc::new(Callable {
                name: Arc::from(def.name.as_str()),
                params,
                body: other.into_comp(),
                id: def.id,
            }),
        };
        slot.fill(callable);
    }

    // === Stack plumbing ===

    fn push_comp(&mut self, c: Rc<Computable>) {
        self.stack.push(Compiled::Expr(c));
    }

    fn pop(&mut self) -> Compiled {
        self.stack
            .pop()
            .expect("compilation stack must not underflow")
    }

    fn pop_comp(&mut self) -> Rc<Computable> {
        self.pop().into_comp()
    }

    /// Pop `n` operands in source order.
    fn pop_comps(&mut self, n: usize) -> Vec<Rc<Computable>> {
        let mut operands: Vec<Rc<Computable>> = (0..n).map(|_| self.pop_comp()).collect();
        operands.reverse();
        operands
    }

    /// Pop an operand that must be an operator.
    fn pop_operand_callable(&mut self, op: &str, id: NodeId) -> OperandCallable {
        match self.pop() {
            Compiled::Op(handle) => OperandCallable::Static(handle),
            Compiled::Expr(comp) => {
                if let Computable::Const(v) = &*comp {
                    if !matches!(v, Value::Lambda(_)) {
                        self.errors.push(CompileError::NotAnOperator {
                            op: op.to_string(),
                            id,
                        });
                    }
                }
                OperandCallable::Dynamic(comp)
            }
        }
    }

    /// Record a compile error and push a placeholder so the stack stays
    /// balanced.
    fn error(&mut self, err: CompileError) {
        let id = err.reference();
        self.errors.push(err);
        self.push_comp(Computable::from_fn(move |_ctx| {
            Err(EvalError::Internal {
                message: "evaluation of an expression that failed to compile".to_string(),
                id: Some(id),
            })
        }));
    }

    fn check_arity(&mut self, opcode: &str, id: NodeId, got: usize, expected: usize) -> bool {
        if got == expected {
            return true;
        }
        self.error(CompileError::ArityMismatch {
            name: opcode.to_string(),
            expected,
            got,
            id,
        });
        false
    }

    fn check_min_arity(&mut self, opcode: &str, id: NodeId, got: usize, expected: usize) -> bool {
        if got >= expected {
            return true;
        }
        self.error(CompileError::ArityMismatch {
            name: opcode.to_string(),
            expected,
            got,
            id,
        });
        false
    }

    // === Expression compilation ===

    fn compile_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Bool { value, .. } => self.push_comp(Computable::constant(Value::Bool(*value))),
            Expr::Int { value, .. } => {
                self.push_comp(Computable::constant(Value::Int(value.clone())))
            }
            Expr::Str { value, .. } => {
                self.push_comp(Computable::constant(Value::str(value)))
            }
            Expr::Name { id, name } => self.compile_name(*id, name),
            Expr::Lambda { id, params, body } => {
                let (registers, saved) = self.bind_params(params);
                self.compile_expr(body);
                let body = self.pop_comp();
                self.unbind_params(saved);
                let callable = Rc::new(Callable {
                    name: Arc::from("<lambda>"),
                    params: registers,
                    body,
                    id: *id,
                });
                self.stack.push(Compiled::Op(CallableHandle::Fixed(callable)));
            }
            Expr::Let { def, body, .. } => {
                let arity = if def.qualifier.is_nullary() {
                    0
                } else {
                    op_arity(def)
                };
                let slot = OpSlot::new(&def.name, arity, def.id);
                let handle = CallableHandle::Deferred(Rc::clone(&slot));
                let (kind, entry) = if def.qualifier.is_nullary() {
                    let handle = handle.clone();
                    (
                        ContextKind::Val,
                        ContextEntry::Comp(Computable::from_fn(move |ctx| {
                            handle.invoke(ctx, Vec::new())
                        })),
                    )
                } else {
                    (ContextKind::Callable, ContextEntry::Op(handle))
                };
                let saved = self.insert(kind, &def.name, entry);
                self.compile_op_def(def, &slot);
                self.compile_expr(body);
                self.restore(kind, &def.name, saved);
            }
            Expr::App { id, opcode, args } => self.compile_app(*id, opcode, args),
        }
    }

    fn compile_name(&mut self, id: NodeId, name: &str) {
        match self.lookup(name).cloned() {
            Some(ContextEntry::Comp(c)) => self.push_comp(c),
            Some(ContextEntry::Op(handle)) => self.stack.push(Compiled::Op(handle)),
            None => self.error(CompileError::UnknownName {
                name: name.to_string(),
                id,
            }),
        }
    }

    // === Operator application ===

    fn compile_app(&mut self, id: NodeId, opcode: &str, args: &[Expr]) {
        if is_builtin(opcode) {
            self.compile_builtin(id, opcode, args);
        } else {
            self.compile_user_app(id, opcode, args);
        }
    }

    /// Application of a user-defined operator: look the name up, check the
    /// formal arity, and invoke.
    fn compile_user_app(&mut self, id: NodeId, opcode: &str, args: &[Expr]) {
        match self.lookup(opcode).cloned() {
            Some(ContextEntry::Op(handle)) => {
                if !self.check_arity(opcode, id, args.len(), handle.arity()) {
                    return;
                }
                for arg in args {
                    self.compile_expr(arg);
                }
                let operands = self.pop_comps(args.len());
                self.push_comp(Computable::from_fn(move |ctx| {
                    let mut values = Vec::with_capacity(operands.len());
                    for operand in &operands {
                        values.push(operand.eval(ctx)?);
                    }
                    handle.invoke(ctx, values)
                }));
            }
            Some(ContextEntry::Comp(c)) => {
                if args.is_empty() {
                    // A nullary application of a val or register-backed name.
                    self.push_comp(c);
                    return;
                }
                // A parameter holding an operator; resolved at run time.
                for arg in args {
                    self.compile_expr(arg);
                }
                let operands = self.pop_comps(args.len());
                self.push_comp(Computable::from_fn(move |ctx| {
                    let mut values = Vec::with_capacity(operands.len());
                    for operand in &operands {
                        values.push(operand.eval(ctx)?);
                    }
                    let v = c.eval(ctx)?;
                    let handle = v.as_lambda().handle.clone();
                    handle.invoke(ctx, values)
                }));
            }
            None => self.error(CompileError::UnknownOperator {
                name: opcode.to_string(),
                id,
            }),
        }
    }

    // === Built-in operators ===

    fn compile_builtin(&mut self, id: NodeId, opcode: &str, args: &[Expr]) {
        match opcode {
            // --- state ---
            "assign" => self.compile_assign(id, args),
            "next" => self.compile_next(id, args),

            // --- equality and control ---
            "eq" => self.binary(opcode, id, args, |a, b, _| Ok(Value::Bool(a == b))),
            "neq" => self.binary(opcode, id, args, |a, b, _| Ok(Value::Bool(a != b))),
            "ite" => self.compile_ite(id, args),
            "not" => self.unary(opcode, id, args, |v, _| Ok(Value::Bool(!v.as_bool()))),
            "iff" => self.binary(opcode, id, args, |a, b, _| {
                Ok(Value::Bool(a.as_bool() == b.as_bool()))
            }),
            "implies" => self.binary(opcode, id, args, |a, b, _| {
                Ok(Value::Bool(!a.as_bool() || b.as_bool()))
            }),
            "and" => self.compile_and(args),
            "or" => self.compile_or(args),

            // --- action combinators ---
            "actionAll" => self.compile_action_all(args),
            "actionAny" => self.compile_action_any(args),
            "then" => self.compile_then(id, args),
            "repeated" => self.compile_repeated(id, args),

            // --- integers ---
            "iuminus" => self.unary(opcode, id, args, |v, _| Ok(Value::Int(-v.as_int()))),
            "iadd" => self.binary(opcode, id, args, |a, b, _| Ok(Value::Int(a.as_int() + b.as_int()))),
            "isub" => self.binary(opcode, id, args, |a, b, _| Ok(Value::Int(a.as_int() - b.as_int()))),
            "imul" => self.binary(opcode, id, args, |a, b, _| Ok(Value::Int(a.as_int() * b.as_int()))),
            "idiv" => self.binary(opcode, id, args, |a, b, id| {
                if b.as_int().is_zero() {
                    Err(EvalError::DivisionByZero { id: Some(id) })
                } else {
                    Ok(Value::Int(a.as_int() / b.as_int()))
                }
            }),
            "imod" => self.binary(opcode, id, args, |a, b, id| {
                if b.as_int().is_zero() {
                    Err(EvalError::DivisionByZero { id: Some(id) })
                } else {
                    Ok(Value::Int(a.as_int() % b.as_int()))
                }
            }),
            "ipow" => self.binary(opcode, id, args, |a, b, id| int_pow(a.as_int(), b.as_int(), id)),
            "igt" => self.binary(opcode, id, args, |a, b, _| Ok(Value::Bool(a.as_int() > b.as_int()))),
            "ilt" => self.binary(opcode, id, args, |a, b, _| Ok(Value::Bool(a.as_int() < b.as_int()))),
            "igte" => self.binary(opcode, id, args, |a, b, _| {
                Ok(Value::Bool(a.as_int() >= b.as_int()))
            }),
            "ilte" => self.binary(opcode, id, args, |a, b, _| {
                Ok(Value::Bool(a.as_int() <= b.as_int()))
            }),

            // --- tuples ---
            "Tup" => self.nary(opcode, id, args, |values, _| Ok(Value::tuple(values))),
            "item" => self.binary(opcode, id, args, |t, i, id| {
                let index = i.as_int().to_usize().unwrap_or(0);
                t.as_tuple()
                    .get(index.wrapping_sub(1))
                    .cloned()
                    .ok_or_else(|| EvalError::Internal {
                        message: format!("tuple has no component {i}"),
                        id: Some(id),
                    })
            }),
            "tuples" => self.nary(opcode, id, args, |values, _| {
                let components: Vec<SetValue> =
                    values.iter().map(|v| v.as_set().clone()).collect();
                Ok(Value::Set(SetValue::Cross(Arc::from(components))))
            }),

            // --- lists ---
            "List" => self.nary(opcode, id, args, |values, _| Ok(Value::list(values))),
            "range" => self.binary(opcode, id, args, |a, b, id| {
                let (a, b) = (a.as_int().clone(), b.as_int().clone());
                if a > b {
                    return Err(EvalError::InvalidRange {
                        start: a,
                        end: b,
                        id: Some(id),
                    });
                }
                let mut items = Vec::new();
                let mut i = a;
                while i < b {
                    items.push(Value::Int(i.clone()));
                    i += 1;
                }
                Ok(Value::list(items))
            }),
            "nth" => self.binary(opcode, id, args, |l, i, id| {
                let list = l.as_list();
                index_in(i.as_int(), list.len(), id).map(|idx| list[idx].clone())
            }),
            "replaceAt" => self.ternary(opcode, id, args, |l, i, v, id| {
                let list = l.as_list();
                let idx = index_in(i.as_int(), list.len(), id)?;
                Ok(Value::List(list.update(idx, v)))
            }),
            "head" => self.unary(opcode, id, args, |l, id| {
                l.as_list()
                    .front()
                    .cloned()
                    .ok_or(EvalError::EmptyList {
                        op: "head",
                        id: Some(id),
                    })
            }),
            "tail" => self.unary(opcode, id, args, |l, id| {
                let list = l.as_list();
                if list.is_empty() {
                    return Err(EvalError::EmptyList {
                        op: "tail",
                        id: Some(id),
                    });
                }
                Ok(Value::List(list.clone().split_off(1)))
            }),
            "slice" => self.ternary(opcode, id, args, |l, s, e, id| {
                let list = l.as_list();
                match (s.as_int().to_usize(), e.as_int().to_usize()) {
                    (Some(start), Some(end)) if start <= end && end <= list.len() => {
                        Ok(Value::list(
                            list.iter().skip(start).take(end - start).cloned().collect(),
                        ))
                    }
                    _ => Err(EvalError::SliceOutOfBounds {
                        start: s.as_int().clone(),
                        end: e.as_int().clone(),
                        len: list.len(),
                        id: Some(id),
                    }),
                }
            }),
            "length" => self.unary(opcode, id, args, |l, _| Ok(Value::int(l.as_list().len()))),
            "append" => self.binary(opcode, id, args, |l, v, _| {
                let mut list = l.as_list().clone();
                list.push_back(v);
                Ok(Value::List(list))
            }),
            "concat" => self.binary(opcode, id, args, |a, b, _| {
                let mut list = a.as_list().clone();
                list.append(b.as_list().clone());
                Ok(Value::List(list))
            }),
            "indices" => self.unary(opcode, id, args, |l, _| {
                let len = l.as_list().len();
                Ok(Value::Set(SetValue::Interval(
                    BigInt::zero(),
                    BigInt::from(len) - 1,
                )))
            }),

            // --- records ---
            "Rec" => self.compile_rec(id, args),
            "field" => self.binary(opcode, id, args, |r, name, id| {
                let field = name.as_str();
                r.as_record()
                    .get(field)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingField {
                        field: field.to_string(),
                        id: Some(id),
                    })
            }),
            "with" => self.ternary(opcode, id, args, |r, name, v, id| {
                let field = name.as_str();
                let record = r.as_record();
                if !record.contains_key(field) {
                    return Err(EvalError::MissingField {
                        field: field.to_string(),
                        id: Some(id),
                    });
                }
                Ok(Value::Record(record.update(Arc::clone(field), v)))
            }),
            "fieldNames" => self.unary(opcode, id, args, |r, _| {
                Ok(Value::set(
                    r.as_record()
                        .keys()
                        .map(|k| Value::Str(Arc::clone(k)))
                        .collect(),
                ))
            }),

            // --- sets ---
            "Set" => self.nary(opcode, id, args, |values, _| Ok(Value::set(values))),
            "powerset" => self.unary(opcode, id, args, |s, _| {
                Ok(Value::Set(SetValue::Powerset(Arc::new(s.as_set().clone()))))
            }),
            "contains" => self.binary(opcode, id, args, |s, v, id| {
                s.as_set().contains(&v).map(Value::Bool).map_err(|e| e.at(id))
            }),
            "in" => self.binary(opcode, id, args, |v, s, id| {
                s.as_set().contains(&v).map(Value::Bool).map_err(|e| e.at(id))
            }),
            "subseteq" => self.binary(opcode, id, args, |a, b, id| {
                a.as_set()
                    .is_subset(b.as_set())
                    .map(Value::Bool)
                    .map_err(|e| e.at(id))
            }),
            "union" => self.binary(opcode, id, args, |a, b, id| {
                a.as_set()
                    .union(b.as_set())
                    .map(Value::Set)
                    .map_err(|e| e.at(id))
            }),
            "intersect" => self.binary(opcode, id, args, |a, b, id| {
                a.as_set()
                    .intersect(b.as_set())
                    .map(Value::Set)
                    .map_err(|e| e.at(id))
            }),
            "exclude" => self.binary(opcode, id, args, |a, b, id| {
                a.as_set()
                    .subtract(b.as_set())
                    .map(Value::Set)
                    .map_err(|e| e.at(id))
            }),
            "size" => self.unary(opcode, id, args, |s, id| {
                s.as_set()
                    .cardinality()
                    .map(Value::Int)
                    .map_err(|e| e.at(id))
            }),
            "isFinite" => self.unary(opcode, id, args, |_s, _| Ok(Value::Bool(true))),
            "to" => self.binary(opcode, id, args, |a, b, _| {
                Ok(Value::Set(SetValue::Interval(
                    a.as_int().clone(),
                    b.as_int().clone(),
                )))
            }),
            "oneOf" => self.compile_one_of(id, args),

            // --- maps ---
            "Map" => self.nary(opcode, id, args, |values, _| {
                Ok(Value::map(values.into_iter().map(|pair| {
                    let parts = pair.as_tuple();
                    (parts[0].clone(), parts[1].clone())
                })))
            }),
            "setToMap" => self.unary(opcode, id, args, |s, id| {
                let elems = s.as_set().elements().map_err(|e| e.at(id))?;
                Ok(Value::map(elems.iter().map(|pair| {
                    let parts = pair.as_tuple();
                    (parts[0].clone(), parts[1].clone())
                })))
            }),
            "setOfMaps" => self.binary(opcode, id, args, |d, r, _| {
                Ok(Value::Set(SetValue::Maps {
                    domain: Arc::new(d.as_set().clone()),
                    range: Arc::new(r.as_set().clone()),
                }))
            }),
            "get" => self.binary(opcode, id, args, |m, k, id| {
                let key = k.normal_form();
                m.as_map()
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingKey {
                        key: key.to_string(),
                        id: Some(id),
                    })
            }),
            "set" => self.ternary(opcode, id, args, |m, k, v, id| {
                let key = k.normal_form();
                let map = m.as_map();
                if !map.contains_key(&key) {
                    return Err(EvalError::MissingKey {
                        key: key.to_string(),
                        id: Some(id),
                    });
                }
                Ok(Value::Map(map.update(key, v)))
            }),
            "put" => self.ternary(opcode, id, args, |m, k, v, _| {
                Ok(Value::Map(m.as_map().update(k.normal_form(), v)))
            }),
            "keys" => self.unary(opcode, id, args, |m, _| {
                Ok(Value::set(m.as_map().keys().cloned().collect()))
            }),
            "setBy" => self.compile_set_by(id, args),

            // --- higher-order ---
            "fold" | "foldl" => self.compile_fold(id, args, false),
            "foldr" => self.compile_fold(id, args, true),
            "exists" => self.compile_quantifier(id, args, true),
            "forall" => self.compile_quantifier(id, args, false),
            "map" => self.compile_map_over_set(id, args),
            "filter" => self.compile_filter(id, args, false),
            "select" => self.compile_filter(id, args, true),
            "mapBy" => self.compile_map_by(id, args),

            // --- tests and the simulator ---
            "assert" => self.unary(opcode, id, args, |v, id| {
                if v.as_bool() {
                    Ok(Value::Bool(true))
                } else {
                    Err(EvalError::AssertionFailed { id: Some(id) })
                }
            }),
            "fail" => self.compile_fail(id, args),
            "_test" => self.compile_test(id, args),

            // Built-in values (`Bool`, `Int`, `Nat`, `_lastTrace`) arrive
            // as `Name` expressions, never as applications.
            _ => self.error(CompileError::UnknownOperator {
                name: opcode.to_string(),
                id,
            }),
        }
    }

    // === Generic operand shapes ===

    fn unary(
        &mut self,
        opcode: &str,
        id: NodeId,
        args: &[Expr],
        f: impl Fn(Value, NodeId) -> EvalResult<Value> + 'static,
    ) {
        if !self.check_arity(opcode, id, args.len(), 1) {
            return;
        }
        self.compile_expr(&args[0]);
        let operand = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let v = operand.eval(ctx)?;
            f(v, id).map_err(|e| e.at(id))
        }));
    }

    fn binary(
        &mut self,
        opcode: &str,
        id: NodeId,
        args: &[Expr],
        f: impl Fn(Value, Value, NodeId) -> EvalResult<Value> + 'static,
    ) {
        if !self.check_arity(opcode, id, args.len(), 2) {
            return;
        }
        self.compile_expr(&args[0]);
        self.compile_expr(&args[1]);
        let rhs = self.pop_comp();
        let lhs = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let a = lhs.eval(ctx)?;
            let b = rhs.eval(ctx)?;
            f(a, b, id).map_err(|e| e.at(id))
        }));
    }

    fn ternary(
        &mut self,
        opcode: &str,
        id: NodeId,
        args: &[Expr],
        f: impl Fn(Value, Value, Value, NodeId) -> EvalResult<Value> + 'static,
    ) {
        if !self.check_arity(opcode, id, args.len(), 3) {
            return;
        }
        for arg in args {
            self.compile_expr(arg);
        }
        let mut operands = self.pop_comps(3);
        let c = operands.pop().unwrap();
        let b = operands.pop().unwrap();
        let a = operands.pop().unwrap();
        self.push_comp(Computable::from_fn(move |ctx| {
            let x = a.eval(ctx)?;
            let y = b.eval(ctx)?;
            let z = c.eval(ctx)?;
            f(x, y, z, id).map_err(|e| e.at(id))
        }));
    }

    fn nary(
        &mut self,
        _opcode: &str,
        id: NodeId,
        args: &[Expr],
        f: impl Fn(Vec<Value>, NodeId) -> EvalResult<Value> + 'static,
    ) {
        for arg in args {
            self.compile_expr(arg);
        }
        let operands = self.pop_comps(args.len());
        self.push_comp(Computable::from_fn(move |ctx| {
            let mut values = Vec::with_capacity(operands.len());
            for operand in &operands {
                values.push(operand.eval(ctx)?);
            }
            f(values, id).map_err(|e| e.at(id))
        }));
    }

    // === State operators ===

    /// `assign(x, e)`: evaluate `e` into `x`'s next-state register. The
    /// first operand is the variable name itself, not its value.
    fn compile_assign(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("assign", id, args.len(), 2) {
            return;
        }
        let Some(pair) = self.var_pair_of(&args[0]) else {
            let err = CompileError::UnknownName {
                name: assign_target_name(&args[0]),
                id,
            };
            self.error(err);
            return;
        };
        self.compile_expr(&args[1]);
        let rhs = self.pop_comp();
        let next = pair.next;
        self.push_comp(Computable::from_fn(move |ctx| {
            let v = rhs.eval(ctx)?;
            ctx.regs.write(next, v);
            Ok(Value::Bool(true))
        }));
    }

    /// `next(x)`: read `x`'s next-state register.
    fn compile_next(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("next", id, args.len(), 1) {
            return;
        }
        match self.var_pair_of(&args[0]) {
            Some(pair) => self.push_comp(Computable::register(pair.next)),
            None => {
                let err = CompileError::UnknownName {
                    name: assign_target_name(&args[0]),
                    id,
                };
                self.error(err);
            }
        }
    }

    fn var_pair_of(&self, expr: &Expr) -> Option<VarPair> {
        match expr {
            Expr::Name { name, .. } => self.vars.get(name).cloned(),
            _ => None,
        }
    }

    // === Control operators ===

    /// `ite(c, t, e)`: only the taken branch is evaluated.
    fn compile_ite(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("ite", id, args.len(), 3) {
            return;
        }
        for arg in args {
            self.compile_expr(arg);
        }
        let mut operands = self.pop_comps(3);
        let else_branch = operands.pop().unwrap();
        let then_branch = operands.pop().unwrap();
        let cond = operands.pop().unwrap();
        self.push_comp(Computable::from_fn(move |ctx| {
            if cond.eval(ctx)?.as_bool() {
                then_branch.eval(ctx)
            } else {
                else_branch.eval(ctx)
            }
        }));
    }

    /// `and { ... }`: left to right, stops at the first `false`. A failing
    /// operand is coerced to `false` after logging.
    fn compile_and(&mut self, args: &[Expr]) {
        for arg in args {
            self.compile_expr(arg);
        }
        let operands = self.pop_comps(args.len());
        self.push_comp(Computable::from_fn(move |ctx| {
            for operand in &operands {
                match operand.eval(ctx) {
                    Ok(v) => {
                        if !v.as_bool() {
                            return Ok(Value::Bool(false));
                        }
                    }
                    Err(e) => {
                        ctx.log_error(&e);
                        return Ok(Value::Bool(false));
                    }
                }
            }
            Ok(Value::Bool(true))
        }));
    }

    /// `or { ... }`: left to right, stops at the first `true`. A failing
    /// operand counts as `false` and evaluation continues.
    fn compile_or(&mut self, args: &[Expr]) {
        for arg in args {
            self.compile_expr(arg);
        }
        let operands = self.pop_comps(args.len());
        self.push_comp(Computable::from_fn(move |ctx| {
            for operand in &operands {
                match operand.eval(ctx) {
                    Ok(v) => {
                        if v.as_bool() {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Err(e) => ctx.log_error(&e),
                }
            }
            Ok(Value::Bool(false))
        }));
    }

    // === Action combinators ===

    /// `all { A, ..., C }`: actions left to right; on the first `false` or
    /// failure, the next-state registers are restored to their snapshot.
    fn compile_action_all(&mut self, args: &[Expr]) {
        for arg in args {
            self.compile_expr(arg);
        }
        let operands = self.pop_comps(args.len());
        self.push_comp(Computable::from_fn(move |ctx| {
            let snapshot = ctx.regs.snapshot_next();
            for operand in &operands {
                let enabled = match operand.eval(ctx) {
                    Ok(v) => v.as_bool(),
                    Err(e) => {
                        ctx.log_error(&e);
                        false
                    }
                };
                if !enabled {
                    ctx.regs.restore_next(&snapshot);
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }));
    }

    /// `any { A, ..., C }`: every action starts from the pre-snapshot; one
    /// of the succeeding branches is committed uniformly at random.
    fn compile_action_any(&mut self, args: &[Expr]) {
        for arg in args {
            self.compile_expr(arg);
        }
        let operands = self.pop_comps(args.len());
        self.push_comp(Computable::from_fn(move |ctx| {
            let snapshot = ctx.regs.snapshot_next();
            let mut successes = Vec::new();
            for operand in &operands {
                ctx.regs.restore_next(&snapshot);
                match operand.eval(ctx) {
                    Ok(v) => {
                        if v.as_bool() {
                            successes.push(ctx.regs.snapshot_next());
                        }
                    }
                    Err(e) => ctx.log_error(&e),
                }
            }
            if successes.is_empty() {
                ctx.regs.restore_next(&snapshot);
                return Ok(Value::Bool(false));
            }
            let choice = ctx.rng.next_index(successes.len());
            ctx.regs.restore_next(&successes[choice]);
            Ok(Value::Bool(true))
        }));
    }

    /// `A.then(B)...`: like `all`, but between actions the next-state
    /// registers are shifted into the current state.
    fn compile_then(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_min_arity("then", id, args.len(), 2) {
            return;
        }
        for arg in args {
            self.compile_expr(arg);
        }
        let operands = self.pop_comps(args.len());
        self.push_comp(Computable::from_fn(move |ctx| {
            let snapshot = ctx.regs.snapshot_next();
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    ctx.regs.shift();
                }
                let enabled = match operand.eval(ctx) {
                    Ok(v) => v.as_bool(),
                    Err(e) => {
                        ctx.log_error(&e);
                        false
                    }
                };
                if !enabled {
                    ctx.regs.restore_next(&snapshot);
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }));
    }

    /// `A.repeated(n)`: `then(A, ..., A)` with `n` copies.
    fn compile_repeated(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("repeated", id, args.len(), 2) {
            return;
        }
        self.compile_expr(&args[0]);
        self.compile_expr(&args[1]);
        let count = self.pop_comp();
        let action = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let n = count.eval(ctx)?;
            let n = n.as_int().to_usize().ok_or_else(|| EvalError::Internal {
                message: format!("repetition count {} is not a natural number", n),
                id: Some(id),
            })?;
            let snapshot = ctx.regs.snapshot_next();
            for i in 0..n {
                if i > 0 {
                    ctx.regs.shift();
                }
                let enabled = match action.eval(ctx) {
                    Ok(v) => v.as_bool(),
                    Err(e) => {
                        ctx.log_error(&e);
                        false
                    }
                };
                if !enabled {
                    ctx.regs.restore_next(&snapshot);
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }));
    }

    // === Records and maps with literal structure ===

    /// `Rec(k1, v1, ..., kn, vn)`: keys are evaluated, then used literally.
    fn compile_rec(&mut self, id: NodeId, args: &[Expr]) {
        if args.len() % 2 != 0 {
            self.error(CompileError::ArityMismatch {
                name: "Rec".to_string(),
                expected: args.len() + 1,
                got: args.len(),
                id,
            });
            return;
        }
        self.nary("Rec", id, args, |values, _| {
            let mut fields = Vec::with_capacity(values.len() / 2);
            let mut iter = values.into_iter();
            while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                fields.push((Arc::clone(key.as_str()), value));
            }
            Ok(Value::record(fields))
        });
    }

    /// `m.setBy(k, f)`: transform the value under an existing key.
    fn compile_set_by(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("setBy", id, args.len(), 3) {
            return;
        }
        self.compile_expr(&args[0]);
        self.compile_expr(&args[1]);
        self.compile_expr(&args[2]);
        let op = self.pop_operand_callable("setBy", id);
        let key = self.pop_comp();
        let map = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let m = map.eval(ctx)?;
            let k = key.eval(ctx)?.normal_form();
            let entries = m.as_map();
            let old = entries
                .get(&k)
                .cloned()
                .ok_or_else(|| EvalError::MissingKey {
                    key: k.to_string(),
                    id: Some(id),
                })?;
            let new = op.invoke(ctx, vec![old])?;
            Ok(Value::Map(entries.update(k, new)))
        }));
    }

    // === Higher-order operators over collections ===

    /// `fold`/`foldl` iterate forward with `(accumulator, element)`;
    /// `foldr` reverses the sequence and takes `(element, accumulator)`.
    fn compile_fold(&mut self, id: NodeId, args: &[Expr], reverse: bool) {
        if !self.check_arity("fold", id, args.len(), 3) {
            return;
        }
        self.compile_expr(&args[0]);
        self.compile_expr(&args[1]);
        self.compile_expr(&args[2]);
        let op = self.pop_operand_callable("fold", id);
        let init = self.pop_comp();
        let collection = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let coll = collection.eval(ctx)?;
            let mut items = collection_items(&coll, id)?;
            if reverse {
                items.reverse();
            }
            let mut acc = init.eval(ctx)?;
            for item in items {
                acc = if reverse {
                    op.invoke(ctx, vec![item, acc])?
                } else {
                    op.invoke(ctx, vec![acc, item])?
                };
            }
            Ok(acc)
        }));
    }

    /// `exists`/`forall`: short-circuit on the first witness or
    /// counterexample.
    fn compile_quantifier(&mut self, id: NodeId, args: &[Expr], existential: bool) {
        let name = if existential { "exists" } else { "forall" };
        if !self.check_arity(name, id, args.len(), 2) {
            return;
        }
        self.compile_expr(&args[0]);
        self.compile_expr(&args[1]);
        let pred = self.pop_operand_callable(name, id);
        let set = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let s = set.eval(ctx)?;
            let elems = s.as_set().elements().map_err(|e| e.at(id))?;
            for item in elems.iter() {
                let holds = pred.invoke(ctx, vec![item.clone()])?.as_bool();
                if holds == existential {
                    return Ok(Value::Bool(existential));
                }
            }
            Ok(Value::Bool(!existential))
        }));
    }

    /// `S.map(f)`: the image of a set under an operator.
    fn compile_map_over_set(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("map", id, args.len(), 2) {
            return;
        }
        self.compile_expr(&args[0]);
        self.compile_expr(&args[1]);
        let op = self.pop_operand_callable("map", id);
        let set = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let s = set.eval(ctx)?;
            let elems = s.as_set().elements().map_err(|e| e.at(id))?;
            let mut image = Vec::with_capacity(elems.len());
            for item in elems.iter() {
                image.push(op.invoke(ctx, vec![item.clone()])?);
            }
            Ok(Value::set(image))
        }));
    }

    /// `S.filter(p)` on sets; `l.select(p)` on lists.
    fn compile_filter(&mut self, id: NodeId, args: &[Expr], list: bool) {
        let name = if list { "select" } else { "filter" };
        if !self.check_arity(name, id, args.len(), 2) {
            return;
        }
        self.compile_expr(&args[0]);
        self.compile_expr(&args[1]);
        let pred = self.pop_operand_callable(name, id);
        let collection = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let coll = collection.eval(ctx)?;
            let items = collection_items(&coll, id)?;
            let mut kept = Vec::new();
            for item in items {
                if pred.invoke(ctx, vec![item.clone()])?.as_bool() {
                    kept.push(item);
                }
            }
            if list {
                Ok(Value::list(kept))
            } else {
                Ok(Value::Set(SetValue::Explicit(SortedElems::from_sorted_vec(
                    kept,
                ))))
            }
        }));
    }

    /// `S.mapBy(f)`: the map from each element to its image.
    fn compile_map_by(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("mapBy", id, args.len(), 2) {
            return;
        }
        self.compile_expr(&args[0]);
        self.compile_expr(&args[1]);
        let op = self.pop_operand_callable("mapBy", id);
        let set = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let s = set.eval(ctx)?;
            let elems = s.as_set().elements().map_err(|e| e.at(id))?;
            let mut entries = Vec::with_capacity(elems.len());
            for item in elems.iter() {
                let value = op.invoke(ctx, vec![item.clone()])?;
                entries.push((item.clone(), value));
            }
            Ok(Value::map(entries))
        }));
    }

    // === Simulator-facing operators ===

    /// `oneOf(S)`: a uniformly random element, deterministic under the
    /// context's seed.
    fn compile_one_of(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("oneOf", id, args.len(), 1) {
            return;
        }
        self.compile_expr(&args[0]);
        let set = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            let s = set.eval(ctx)?;
            let position = ctx.rng.next_position();
            s.as_set().pick(position).map_err(|e| e.at(id))
        }));
    }

    /// `fail(A)`: invert the truth value; a failing action is `true`.
    fn compile_fail(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("fail", id, args.len(), 1) {
            return;
        }
        self.compile_expr(&args[0]);
        let operand = self.pop_comp();
        self.push_comp(Computable::from_fn(move |ctx| {
            match operand.eval(ctx) {
                Ok(v) => Ok(Value::Bool(!v.as_bool())),
                Err(e) => {
                    ctx.log_error(&e);
                    Ok(Value::Bool(true))
                }
            }
        }));
    }

    /// `_test(nruns, nsteps, init, step, inv)`: run the simulator.
    fn compile_test(&mut self, id: NodeId, args: &[Expr]) {
        if !self.check_arity("_test", id, args.len(), 5) {
            return;
        }
        for arg in args {
            self.compile_expr(arg);
        }
        let mut operands = self.pop_comps(5);
        let inv = operands.pop().unwrap();
        let step = operands.pop().unwrap();
        let init = operands.pop().unwrap();
        let nsteps = operands.pop().unwrap();
        let nruns = operands.pop().unwrap();
        let last_trace = self.last_trace;
        self.push_comp(Computable::from_fn(move |ctx| {
            let runs = nruns.eval(ctx)?;
            let steps = nsteps.eval(ctx)?;
            let runs = runs.as_int().to_usize().ok_or_else(|| EvalError::Internal {
                message: format!("run count {} is not a natural number", runs),
                id: Some(id),
            })?;
            let steps = steps
                .as_int()
                .to_usize()
                .ok_or_else(|| EvalError::Internal {
                    message: format!("step count {} is not a natural number", steps),
                    id: Some(id),
                })?;
            let ok = simulator::run_graph(ctx, runs, steps, &init, &step, &inv, last_trace)?;
            Ok(Value::Bool(ok))
        }));
    }
}

/// The arity of an operator definition: its own formal parameters, or the
/// parameters of its body when the definition is written as a lambda.
fn op_arity(def: &OpDef) -> usize {
    if !def.params.is_empty() {
        return def.params.len();
    }
    match &def.body {
        Expr::Lambda { params, .. } => params.len(),
        _ => 0,
    }
}

/// The name `assign`/`next` was applied to, for error messages.
fn assign_target_name(expr: &Expr) -> String {
    match expr {
        Expr::Name { name, .. } => name.clone(),
        other => format!("<expression {}>", other.id()),
    }
}

fn int_pow(base: &BigInt, exp: &BigInt, id: NodeId) -> EvalResult<Value> {
    if exp.is_negative() || (base.is_zero() && exp.is_zero()) {
        return Err(EvalError::InvalidPower { id: Some(id) });
    }
    let e = exp.to_u32().ok_or_else(|| EvalError::Internal {
        message: format!("exponent {exp} is too large"),
        id: Some(id),
    })?;
    Ok(Value::Int(num_traits::Pow::pow(base, e)))
}

/// Check a 0-based list index, mapping failures to the out-of-bounds
/// runtime error.
fn index_in(index: &BigInt, len: usize, id: NodeId) -> EvalResult<usize> {
    index
        .to_usize()
        .filter(|i| *i < len)
        .ok_or_else(|| EvalError::IndexOutOfBounds {
            index: index.clone(),
            len,
            id: Some(id),
        })
}

/// The items of a set in canonical order, or of a list in its own order.
fn collection_items(v: &Value, id: NodeId) -> EvalResult<Vec<Value>> {
    match v {
        Value::Set(s) => {
            let elems = s.elements().map_err(|e| e.at(id))?;
            Ok(elems.iter().cloned().collect())
        }
        Value::List(l) => Ok(l.iter().cloned().collect()),
        _ => unreachable!("type checker admits only sets and lists here"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quint_core::IrBuilder;

    fn eval_one(build: impl FnOnce(&IrBuilder) -> Expr) -> EvalResult<Value> {
        let b = IrBuilder::new();
        let body = build(&b);
        let module = b.module("T", vec![b.val("out", body)]);
        let compiled = compile(&module, &ConstBindings::default());
        assert!(
            compiled.compile_errors.is_empty(),
            "compile errors: {:?}",
            compiled.compile_errors
        );
        let mut ctx = compiled.new_ctx(SeededRng::new(0));
        compiled.eval_name(&mut ctx, "out")
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        let q = eval_one(|b| b.app("idiv", vec![b.int(-7), b.int(2)])).unwrap();
        assert_eq!(q, Value::int(-3));
        let r = eval_one(|b| b.app("imod", vec![b.int(-7), b.int(2)])).unwrap();
        assert_eq!(r, Value::int(-1));
    }

    #[test]
    fn power_edge_cases_fail() {
        assert!(matches!(
            eval_one(|b| b.app("ipow", vec![b.int(2), b.int(-1)])),
            Err(EvalError::InvalidPower { .. })
        ));
        assert!(matches!(
            eval_one(|b| b.app("ipow", vec![b.int(0), b.int(0)])),
            Err(EvalError::InvalidPower { .. })
        ));
        let v = eval_one(|b| b.app("ipow", vec![b.int(2), b.int(10)])).unwrap();
        assert_eq!(v, Value::int(1024));
    }

    #[test]
    fn ite_evaluates_only_the_taken_branch() {
        let v = eval_one(|b| {
            b.app(
                "ite",
                vec![
                    b.bool(true),
                    b.int(1),
                    b.app("idiv", vec![b.int(1), b.int(0)]),
                ],
            )
        })
        .unwrap();
        assert_eq!(v, Value::int(1));
    }

    #[test]
    fn lookup_priority_prefers_vals_over_vars() {
        let b = IrBuilder::new();
        let module = b.module(
            "T",
            vec![
                b.var_decl("v", b.int_type()),
                b.val("v", b.int(7)),
            ],
        );
        let compiled = compile(&module, &ConstBindings::default());
        let mut ctx = compiled.new_ctx(SeededRng::new(0));
        // The var register is unset; the val wins the lookup.
        assert_eq!(compiled.eval_name(&mut ctx, "v").unwrap(), Value::int(7));
    }

    #[test]
    fn unknown_operator_is_a_compile_error_with_a_balanced_stack() {
        let b = IrBuilder::new();
        let module = b.module(
            "T",
            vec![b.val("out", b.app("frobnicate", vec![b.int(1)]))],
        );
        let compiled = compile(&module, &ConstBindings::default());
        assert_eq!(compiled.compile_errors.len(), 1);
        assert!(compiled.compile_errors[0]
            .explanation
            .contains("frobnicate"));

        let mut ctx = compiled.new_ctx(SeededRng::new(0));
        assert!(compiled.eval_name(&mut ctx, "out").is_err());
    }

    #[test]
    fn record_construction_and_update() {
        let v = eval_one(|b| {
            let rec = b.app(
                "Rec",
                vec![b.str("a"), b.int(1), b.str("b"), b.int(2)],
            );
            let updated = b.app("with", vec![rec, b.str("a"), b.int(10)]);
            b.app("field", vec![updated, b.str("a")])
        })
        .unwrap();
        assert_eq!(v, Value::int(10));

        assert!(matches!(
            eval_one(|b| {
                let rec = b.app("Rec", vec![b.str("a"), b.int(1)]);
                b.app("field", vec![rec, b.str("zzz")])
            }),
            Err(EvalError::MissingField { .. })
        ));
    }

    #[test]
    fn map_access_distinguishes_set_and_put() {
        let empty_map = |b: &IrBuilder| b.app("Map", vec![]);
        assert!(matches!(
            eval_one(|b| b.app("set", vec![empty_map(b), b.str("k"), b.int(1)])),
            Err(EvalError::MissingKey { .. })
        ));

        let v = eval_one(|b| {
            let m = b.app("put", vec![empty_map(b), b.str("k"), b.int(1)]);
            b.app("get", vec![m, b.str("k")])
        })
        .unwrap();
        assert_eq!(v, Value::int(1));
    }

    #[test]
    fn list_operators_check_their_bounds() {
        let v = eval_one(|b| {
            let l = b.app("range", vec![b.int(0), b.int(5)]);
            b.app("nth", vec![l, b.int(4)])
        })
        .unwrap();
        assert_eq!(v, Value::int(4));

        assert!(matches!(
            eval_one(|b| {
                let l = b.app("List", vec![b.int(1)]);
                b.app("nth", vec![l, b.int(5)])
            }),
            Err(EvalError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            eval_one(|b| b.app("head", vec![b.app("List", vec![])])),
            Err(EvalError::EmptyList { op: "head", .. })
        ));
        assert!(matches!(
            eval_one(|b| b.app("range", vec![b.int(3), b.int(1)])),
            Err(EvalError::InvalidRange { .. })
        ));
    }

    #[test]
    fn indices_are_an_interval() {
        let v = eval_one(|b| {
            let l = b.app("List", vec![b.int(5), b.int(6), b.int(7)]);
            b.app("indices", vec![l])
        })
        .unwrap();
        assert_eq!(
            v,
            Value::Set(SetValue::Interval(0.into(), 2.into()))
        );
    }

    #[test]
    fn quantifiers_scan_intervals() {
        let v = eval_one(|b| {
            let s = b.app("to", vec![b.int(1), b.int(10)]);
            let big = b.lambda(&["x"], b.app("igt", vec![b.name("x"), b.int(5)]));
            b.app("exists", vec![s, big])
        })
        .unwrap();
        assert_eq!(v, Value::Bool(true));

        let v = eval_one(|b| {
            let s = b.app("to", vec![b.int(1), b.int(10)]);
            let big = b.lambda(&["x"], b.app("igt", vec![b.name("x"), b.int(5)]));
            b.app("forall", vec![s, big])
        })
        .unwrap();
        assert_eq!(v, Value::Bool(false));
    }

    #[test]
    fn cross_products_stay_symbolic() {
        let v = eval_one(|b| {
            let product = b.app(
                "tuples",
                vec![
                    b.app("to", vec![b.int(1), b.int(1000)]),
                    b.app("to", vec![b.int(1), b.int(1000)]),
                ],
            );
            let pair = b.app("Tup", vec![b.int(3), b.int(999)]);
            b.app("contains", vec![product, pair])
        })
        .unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn assert_reports_failure() {
        assert_eq!(
            eval_one(|b| b.app("assert", vec![b.bool(true)])).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            eval_one(|b| b.app("assert", vec![b.bool(false)])),
            Err(EvalError::AssertionFailed { .. })
        ));
    }

    #[test]
    fn lambda_bodied_definitions_take_the_lambda_arity() {
        let b = IrBuilder::new();
        let double = b.op_def(
            quint_core::OpQualifier::Def,
            "double",
            &[],
            b.lambda(&["x"], b.app("imul", vec![b.name("x"), b.int(2)])),
        );
        let module = b.module(
            "T",
            vec![
                quint_core::Def::Op(double),
                b.val("out", b.app("double", vec![b.int(21)])),
            ],
        );
        let compiled = compile(&module, &ConstBindings::default());
        assert!(
            compiled.compile_errors.is_empty(),
            "compile errors: {:?}",
            compiled.compile_errors
        );
        let mut ctx = compiled.new_ctx(SeededRng::new(0));
        assert_eq!(compiled.eval_name(&mut ctx, "out").unwrap(), Value::int(42));
    }

    #[test]
    fn repeated_lambda_parameters_are_reported_as_unbound() {
        let b = IrBuilder::new();
        let lam = b.lambda(&["x", "x"], b.name("x"));
        let module = b.module("T", vec![b.val("f", lam)]);
        let compiled = compile(&module, &ConstBindings::default());
        assert_eq!(compiled.compile_errors.len(), 1);
        assert!(compiled.compile_errors[0]
            .explanation
            .contains("Parameter x is declared twice"));
    }

    #[test]
    fn repeated_operator_parameters_are_reported_as_unbound() {
        let b = IrBuilder::new();
        let def = b.op_def(
            quint_core::OpQualifier::Def,
            "same",
            &["a", "a"],
            b.name("a"),
        );
        let module = b.module("T", vec![quint_core::Def::Op(def)]);
        let compiled = compile(&module, &ConstBindings::default());
        assert_eq!(compiled.compile_errors.len(), 1);
        assert!(compiled.compile_errors[0]
            .explanation
            .contains("Parameter a is declared twice"));
    }

    #[test]
    fn map_by_builds_a_map_from_a_set() {
        let v = eval_one(|b| {
            let s = b.app("to", vec![b.int(1), b.int(3)]);
            let double = b.lambda(&["x"], b.app("imul", vec![b.name("x"), b.int(2)]));
            b.app("mapBy", vec![s, double])
        })
        .unwrap();
        assert_eq!(
            v,
            Value::map(vec![
                (Value::int(1), Value::int(2)),
                (Value::int(2), Value::int(4)),
                (Value::int(3), Value::int(6)),
            ])
        );
    }
}
