//! quint-core - IR and name analysis for the Quint specification language
//!
//! This crate provides:
//! - **IR types**: modules, definitions, expressions and types, every node
//!   carrying a unique integer identity ([`ir`])
//! - **Walker**: depth-first enter/exit traversal shared by all passes
//!   ([`walk`])
//! - **Scope model**: the scope tree and per-module definition tables
//!   ([`scope`])
//! - **Name resolver**: verifies every reference against the scope model,
//!   aggregating all errors ([`resolve`])
//! - **Diagnostics**: the `{ explanation, references }` report shape shared
//!   with the evaluator and the embedding layer ([`diagnostic`])
//!
//! Parsing and type checking live in an external frontend; this crate
//! consumes the IR it produces (see the serde shape on the [`ir`] types).

pub mod builder;
pub mod diagnostic;
pub mod ir;
pub mod resolve;
pub mod scope;
pub mod walk;

pub use builder::IrBuilder;
pub use diagnostic::ErrorReport;
pub use ir::{Def, Expr, Module, NodeId, OpDef, OpQualifier, Param, Type};
pub use resolve::{is_builtin, resolve, NameError, NameErrorKind, BUILTIN_NAMES};
pub use scope::{DefLookup, DefTables, ScopeTree, TypeDef, ValueDef, ValueDefKind};
pub use walk::{walk_def, walk_expr, walk_module, walk_op_def, walk_type, IrVisitor};
