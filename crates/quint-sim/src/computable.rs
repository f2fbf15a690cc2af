//! Computables: the lazy evaluation graph
//!
//! The compiler lowers IR into a closed graph of computables instead of
//! walking the tree on demand: a definition is compiled once and invoked
//! many times during a simulation run. A computable is one of:
//!
//! - a constant,
//! - a register read, or
//! - a function closing over its operand computables.
//!
//! Nothing evaluates during compilation; evaluation happens when a
//! computable is driven with an [`EvalCtx`], which owns the register bank,
//! the seeded RNG and the runtime-error log. Evaluation is synchronous and
//! single-threaded; the only guard is a recursion-depth limit that turns
//! runaway user recursion into a clean error instead of a stack crash.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use quint_core::{ErrorReport, NodeId};

use crate::error::{EvalError, EvalResult};
use crate::register::{RegisterBank, RegisterId};
use crate::rng::SeededRng;
use crate::value::Value;

/// Maximum depth of nested callable invocations. Deep user recursion is
/// reported as `EvalError::StackOverflow` before the process stack is at
/// risk.
pub const MAX_EVAL_DEPTH: usize = 1024;

/// Everything an evaluation reads and writes: the register slab, the
/// random source, and the log of runtime errors observed so far.
pub struct EvalCtx {
    pub regs: RegisterBank,
    pub rng: SeededRng,
    pub runtime_errors: Vec<ErrorReport>,
    depth: usize,
}

impl EvalCtx {
    pub fn new(regs: RegisterBank, rng: SeededRng) -> Self {
        EvalCtx {
            regs,
            rng,
            runtime_errors: Vec::new(),
            depth: 0,
        }
    }

    /// Append a runtime error to the log. Called where an error is
    /// swallowed by a coercing combinator or surfaces to a driver, so each
    /// failure is recorded exactly once.
    pub fn log_error(&mut self, err: &EvalError) {
        self.runtime_errors.push(err.report());
    }

    fn enter(&mut self, at: NodeId) -> EvalResult<()> {
        self.depth += 1;
        if self.depth > MAX_EVAL_DEPTH {
            self.depth -= 1;
            return Err(EvalError::StackOverflow {
                limit: MAX_EVAL_DEPTH,
                id: Some(at),
            });
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }
}

/// The function flavor of a computable.
pub type EvalFn = Box<dyn Fn(&mut EvalCtx) -> EvalResult<Value>>;

/// A lazy thunk producing a value or a runtime error.
pub enum Computable {
    /// A fixed value.
    Const(Value),
    /// The current content of a register; fails while the register is
    /// unset.
    Register(RegisterId),
    /// Computed on demand from other computables captured in the closure.
    Fun(EvalFn),
}

impl Computable {
    pub fn constant(value: Value) -> Rc<Computable> {
        Rc::new(Computable::Const(value))
    }

    pub fn register(id: RegisterId) -> Rc<Computable> {
        Rc::new(Computable::Register(id))
    }

    pub fn from_fn(f: impl Fn(&mut EvalCtx) -> EvalResult<Value> + 'static) -> Rc<Computable> {
        Rc::new(Computable::Fun(Box::new(f)))
    }

    pub fn eval(&self, ctx: &mut EvalCtx) -> EvalResult<Value> {
        match self {
            Computable::Const(v) => Ok(v.clone()),
            Computable::Register(id) => ctx.regs.read(*id),
            Computable::Fun(f) => f(ctx),
        }
    }
}

impl fmt::Debug for Computable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Computable::Const(v) => write!(f, "Const({v})"),
            Computable::Register(id) => write!(f, "Register({})", id.0),
            Computable::Fun(_) => write!(f, "Fun(..)"),
        }
    }
}

/// A computable paired with its parameter registers. Invocation stores the
/// arguments into the registers, then evaluates the body.
pub struct Callable {
    pub name: Arc<str>,
    pub params: Vec<RegisterId>,
    pub body: Rc<Computable>,
    /// The defining node, for attribution.
    pub id: NodeId,
}

impl Callable {
    pub fn invoke(&self, ctx: &mut EvalCtx, args: Vec<Value>) -> EvalResult<Value> {
        if args.len() != self.params.len() {
            return Err(EvalError::ArityMismatch {
                name: self.name.to_string(),
                expected: self.params.len(),
                got: args.len(),
                id: Some(self.id),
            });
        }
        ctx.enter(self.id)?;
        for (register, arg) in self.params.iter().zip(args) {
            ctx.regs.write(*register, arg);
        }
        let result = self.body.eval(ctx);
        ctx.exit();
        result
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({}, arity {})", self.name, self.params.len())
    }
}

/// A named operator slot filled after all definitions are declared, so
/// definition bodies can reference operators defined later in the module
/// (and themselves, recursively).
pub struct OpSlot {
    pub name: String,
    pub arity: usize,
    pub id: NodeId,
    cell: RefCell<Option<Rc<Callable>>>,
}

impl OpSlot {
    pub fn new(name: impl Into<String>, arity: usize, id: NodeId) -> Rc<Self> {
        Rc::new(OpSlot {
            name: name.into(),
            arity,
            id,
            cell: RefCell::new(None),
        })
    }

    pub fn fill(&self, callable: Rc<Callable>) {
        *self.cell.borrow_mut() = Some(callable);
    }

    pub fn resolve(&self) -> EvalResult<Rc<Callable>> {
        self.cell
            .borrow()
            .clone()
            .ok_or_else(|| EvalError::Internal {
                message: format!("operator {} was never compiled", self.name),
                id: Some(self.id),
            })
    }
}

impl fmt::Debug for OpSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpSlot({}, arity {})", self.name, self.arity)
    }
}

/// A reference to an operator: either a finished callable (lambdas,
/// let-bound definitions) or a slot resolved at invocation time
/// (module-level definitions, which may be forward or recursive
/// references).
#[derive(Clone, Debug)]
pub enum CallableHandle {
    Fixed(Rc<Callable>),
    Deferred(Rc<OpSlot>),
}

impl CallableHandle {
    pub fn arity(&self) -> usize {
        match self {
            CallableHandle::Fixed(c) => c.params.len(),
            CallableHandle::Deferred(slot) => slot.arity,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            CallableHandle::Fixed(c) => c.id,
            CallableHandle::Deferred(slot) => slot.id,
        }
    }

    pub fn invoke(&self, ctx: &mut EvalCtx, args: Vec<Value>) -> EvalResult<Value> {
        match self {
            CallableHandle::Fixed(c) => c.invoke(ctx, args),
            CallableHandle::Deferred(slot) => slot.resolve()?.invoke(ctx, args),
        }
    }
}
