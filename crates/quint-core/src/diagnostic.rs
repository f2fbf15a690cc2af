//! Error reports exchanged with the embedding layer
//!
//! Compile-time and runtime failures both surface as [`ErrorReport`]s: a
//! human-readable explanation plus the identities of the IR nodes involved.
//! The embedding frontend owns the mapping from identities back to source
//! locations, so reports carry no spans of their own.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::NodeId;

/// A rendered error with the IR nodes it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Human-readable description of what went wrong.
    pub explanation: String,
    /// Identities of the nodes this error is attributed to.
    pub references: Vec<NodeId>,
}

impl ErrorReport {
    pub fn new(explanation: impl Into<String>, references: Vec<NodeId>) -> Self {
        ErrorReport {
            explanation: explanation.into(),
            references,
        }
    }

    /// A report attributed to a single node.
    pub fn at(explanation: impl Into<String>, reference: NodeId) -> Self {
        ErrorReport::new(explanation, vec![reference])
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.explanation)?;
        if !self.references.is_empty() {
            let ids: Vec<String> = self.references.iter().map(|id| id.to_string()).collect();
            write!(f, " (node {})", ids.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_references() {
        let report = ErrorReport::at("Division by zero", 12);
        assert_eq!(report.to_string(), "Division by zero (node 12)");
    }

    #[test]
    fn display_without_references() {
        let report = ErrorReport::new("no init operator", vec![]);
        assert_eq!(report.to_string(), "no init operator");
    }
}
