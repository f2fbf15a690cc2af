//! Evaluation and compilation errors
//!
//! Two strictly separate taxonomies:
//!
//! - [`CompileError`]: structural problems found while lowering IR into the
//!   computable graph. Not recoverable within a run.
//! - [`EvalError`]: failures of a single evaluation attempt. The simulator
//!   recovers from these by dropping the run; action combinators coerce
//!   them per their short-circuit rules.
//!
//! Every variant carries the identity of the IR node it is attributed to
//! (`None` until the evaluating computable attaches one). Both convert to
//! the wire-level [`ErrorReport`] shape.

use quint_core::{ErrorReport, NodeId};
use thiserror::Error;

/// A failure of one evaluation attempt.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// Read of a register that holds no value
    #[error("Variable {name} is not set")]
    UnsetRegister { name: String, id: Option<NodeId> },

    /// Integer division or modulo by zero
    #[error("Division by zero")]
    DivisionByZero { id: Option<NodeId> },

    /// `ipow` with a negative exponent or `0^0`
    #[error("Power is undefined for negative exponents and for 0^0")]
    InvalidPower { id: Option<NodeId> },

    /// List access outside `[0, len)`
    #[error("List index {index} out of bounds (length {len})")]
    IndexOutOfBounds {
        index: num_bigint::BigInt,
        len: usize,
        id: Option<NodeId>,
    },

    /// `head`/`tail` on an empty list
    #[error("Called {op} on an empty list")]
    EmptyList {
        op: &'static str,
        id: Option<NodeId>,
    },

    /// `slice` outside `0 <= start <= end <= len`
    #[error("slice({start}, {end}) is out of bounds for a list of length {len}")]
    SliceOutOfBounds {
        start: num_bigint::BigInt,
        end: num_bigint::BigInt,
        len: usize,
        id: Option<NodeId>,
    },

    /// Record access of a field the record does not have
    #[error("Record does not have field {field}")]
    MissingField { field: String, id: Option<NodeId> },

    /// Map access of an absent key
    #[error("Map does not have key {key}")]
    MissingKey { key: String, id: Option<NodeId> },

    /// `assert` with a false condition
    #[error("Assertion failed")]
    AssertionFailed { id: Option<NodeId> },

    /// `oneOf`/`pick` on an empty set
    #[error("Cannot pick an element of an empty set")]
    EmptySet { id: Option<NodeId> },

    /// `range(a, b)` with `a > b`
    #[error("range({start}, {end}) requires start <= end")]
    InvalidRange {
        start: num_bigint::BigInt,
        end: num_bigint::BigInt,
        id: Option<NodeId>,
    },

    /// An operation that would enumerate `Int` or `Nat`
    #[error("Cannot enumerate the infinite set {name}")]
    InfiniteSet {
        name: &'static str,
        id: Option<NodeId>,
    },

    /// Invocation of a lambda with the wrong number of arguments
    #[error("Operator {name} expects {expected} arguments, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
        id: Option<NodeId>,
    },

    /// Evaluation of a `temporal` definition
    #[error("Temporal operator {name} cannot be executed by the simulator")]
    Temporal { name: String, id: Option<NodeId> },

    /// User-defined recursion exceeded the evaluation depth limit
    #[error("Evaluation exceeded the recursion depth limit ({limit})")]
    StackOverflow { limit: usize, id: Option<NodeId> },

    /// Bug in the evaluator
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        id: Option<NodeId>,
    },
}

impl EvalError {
    /// The IR node this error is attributed to, if known.
    pub fn reference(&self) -> Option<NodeId> {
        match self {
            EvalError::UnsetRegister { id, .. }
            | EvalError::DivisionByZero { id }
            | EvalError::InvalidPower { id }
            | EvalError::IndexOutOfBounds { id, .. }
            | EvalError::EmptyList { id, .. }
            | EvalError::SliceOutOfBounds { id, .. }
            | EvalError::MissingField { id, .. }
            | EvalError::MissingKey { id, .. }
            | EvalError::AssertionFailed { id }
            | EvalError::EmptySet { id }
            | EvalError::InvalidRange { id, .. }
            | EvalError::InfiniteSet { id, .. }
            | EvalError::ArityMismatch { id, .. }
            | EvalError::Temporal { id, .. }
            | EvalError::StackOverflow { id, .. }
            | EvalError::Internal { id, .. } => *id,
        }
    }

    /// Attach a source identity if the error does not carry one yet.
    /// Inner attributions win, so the innermost failing node is reported.
    pub fn at(mut self, node: NodeId) -> Self {
        let id = match &mut self {
            EvalError::UnsetRegister { id, .. }
            | EvalError::DivisionByZero { id }
            | EvalError::InvalidPower { id }
            | EvalError::IndexOutOfBounds { id, .. }
            | EvalError::EmptyList { id, .. }
            | EvalError::SliceOutOfBounds { id, .. }
            | EvalError::MissingField { id, .. }
            | EvalError::MissingKey { id, .. }
            | EvalError::AssertionFailed { id }
            | EvalError::EmptySet { id }
            | EvalError::InvalidRange { id, .. }
            | EvalError::InfiniteSet { id, .. }
            | EvalError::ArityMismatch { id, .. }
            | EvalError::Temporal { id, .. }
            | EvalError::StackOverflow { id, .. }
            | EvalError::Internal { id, .. } => id,
        };
        if id.is_none() {
            *id = Some(node);
        }
        self
    }

    /// Convert to the wire-level report shape.
    pub fn report(&self) -> ErrorReport {
        ErrorReport::new(self.to_string(), self.reference().into_iter().collect())
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

/// A structural problem found during compilation.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// Application of an operator the compiler does not know
    #[error("Unknown operator {name}")]
    UnknownOperator { name: String, id: NodeId },

    /// Reference to a name with no definition in the compilation context
    #[error("Name {name} not found")]
    UnknownName { name: String, id: NodeId },

    /// Application with the wrong number of arguments
    #[error("Operator {name} expects {expected} arguments, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
        id: NodeId,
    },

    /// An operand that must be an operator (e.g. the body of `fold`) is a
    /// plain value
    #[error("Expected an operator as the argument of {op}")]
    NotAnOperator { op: String, id: NodeId },

    /// A parameter repeated within one binder: the earlier occurrence
    /// allocates a register that no name can ever address
    #[error("Parameter {name} is declared twice; the first declaration is never bound")]
    UnboundParameter { name: String, id: NodeId },

    /// A `const` declaration with no binding in the constants environment
    #[error("Constant {name} has no value; bind it before compiling")]
    UnboundConstant { name: String, id: NodeId },
}

impl CompileError {
    /// The IR node this error is attributed to.
    pub fn reference(&self) -> NodeId {
        match self {
            CompileError::UnknownOperator { id, .. }
            | CompileError::UnknownName { id, .. }
            | CompileError::ArityMismatch { id, .. }
            | CompileError::NotAnOperator { id, .. }
            | CompileError::UnboundParameter { id, .. }
            | CompileError::UnboundConstant { id, .. } => *id,
        }
    }

    /// Convert to the wire-level report shape.
    pub fn report(&self) -> ErrorReport {
        ErrorReport::at(self.to_string(), self.reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    // Error message stability: downstream tooling matches on these.

    #[test]
    fn snapshot_unset_register() {
        let err = EvalError::UnsetRegister {
            name: "n".to_string(),
            id: Some(4),
        };
        assert_snapshot!(err.to_string(), @"Variable n is not set");
    }

    #[test]
    fn snapshot_division_by_zero() {
        let err = EvalError::DivisionByZero { id: None };
        assert_snapshot!(err.to_string(), @"Division by zero");
    }

    #[test]
    fn snapshot_assertion_failed() {
        let err = EvalError::AssertionFailed { id: Some(9) };
        assert_snapshot!(err.to_string(), @"Assertion failed");
    }

    #[test]
    fn snapshot_index_out_of_bounds() {
        let err = EvalError::IndexOutOfBounds {
            index: 7.into(),
            len: 3,
            id: None,
        };
        assert_snapshot!(err.to_string(), @"List index 7 out of bounds (length 3)");
    }

    #[test]
    fn snapshot_infinite_set() {
        let err = EvalError::InfiniteSet {
            name: "Nat",
            id: None,
        };
        assert_snapshot!(err.to_string(), @"Cannot enumerate the infinite set Nat");
    }

    #[test]
    fn snapshot_unknown_operator() {
        let err = CompileError::UnknownOperator {
            name: "frobnicate".to_string(),
            id: 3,
        };
        assert_snapshot!(err.to_string(), @"Unknown operator frobnicate");
    }

    #[test]
    fn snapshot_unbound_parameter() {
        let err = CompileError::UnboundParameter {
            name: "x".to_string(),
            id: 6,
        };
        assert_snapshot!(
            err.to_string(),
            @"Parameter x is declared twice; the first declaration is never bound"
        );
    }

    #[test]
    fn attribution_keeps_innermost_node() {
        let err = EvalError::DivisionByZero { id: None }.at(10).at(20);
        assert_eq!(err.reference(), Some(10));
    }

    #[test]
    fn report_carries_reference() {
        let err = EvalError::AssertionFailed { id: Some(42) };
        let report = err.report();
        assert_eq!(report.references, vec![42]);
        assert_eq!(report.explanation, "Assertion failed");
    }
}
