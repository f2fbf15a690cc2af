//! quint-sim - compiler and randomized simulator for Quint
//!
//! This crate provides:
//! - **Value domain**: persistent runtime values with structural equality,
//!   including lazily represented sets ([`value`])
//! - **Registers**: the slab of mutable slots holding variable, parameter
//!   and bookkeeping state ([`register`])
//! - **Computables**: the lazy evaluation graph the compiler produces
//!   ([`computable`])
//! - **Compiler**: lowering resolved IR into named computables ([`compile`])
//! - **Simulator**: randomized multi-step runs with invariant checking and
//!   replayable seeds ([`simulator`])
//!
//! # Quick start
//!
//! ```rust
//! use quint_core::IrBuilder;
//! use quint_sim::compile::{compile, ConstBindings};
//! use quint_sim::simulator::{SimulationConfig, Simulator};
//!
//! // var n: int; init: n' = 0; step: n' = n + 1; inv: n >= 0
//! let b = IrBuilder::new();
//! let module = b.module(
//!     "Counter",
//!     vec![
//!         b.var_decl("n", b.int_type()),
//!         b.action("init", b.app("assign", vec![b.name("n"), b.int(0)])),
//!         b.action(
//!             "step",
//!             b.app(
//!                 "assign",
//!                 vec![b.name("n"), b.app("iadd", vec![b.name("n"), b.int(1)])],
//!             ),
//!         ),
//!         b.val("inv", b.app("igte", vec![b.name("n"), b.int(0)])),
//!     ],
//! );
//!
//! let compiled = compile(&module, &ConstBindings::default());
//! assert!(compiled.compile_errors.is_empty());
//!
//! let config = SimulationConfig {
//!     runs: 10,
//!     steps: 5,
//!     seed: Some(1),
//!     ..SimulationConfig::default()
//! };
//! assert!(Simulator::new(&compiled, config).run().is_passed());
//! ```

pub mod compile;
pub mod computable;
pub mod error;
pub mod register;
pub mod rng;
pub mod simulator;
pub mod value;

pub use compile::{compile, CompiledModule, ConstBindings, Context, ContextEntry, ContextKind};
pub use computable::{Callable, CallableHandle, Computable, EvalCtx, OpSlot, MAX_EVAL_DEPTH};
pub use error::{CompileError, EvalError, EvalResult};
pub use register::{Register, RegisterBank, RegisterId, RegisterKind, Snapshot, VarPair};
pub use rng::SeededRng;
pub use simulator::{run_graph, SimulationConfig, Simulator, TestResult, TestStats, Trace};
pub use value::{InfiniteSet, LambdaValue, SetValue, SortedElems, Value};
