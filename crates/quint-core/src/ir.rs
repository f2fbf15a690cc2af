//! Intermediate representation of Quint modules
//!
//! This module defines the IR types shared by the resolver, the compiler
//! and the simulator. The IR is designed to be:
//! - Complete: represents all definition and expression forms of the language
//! - Identity-aware: every node carries a `NodeId` unique within a parse
//! - Immutable: suitable for caching and sharing
//!
//! The IR is produced by an external frontend (parser + type checker) and
//! consumed here as data, typically via the serde `kind`-tagged JSON shape.
//! Node identities index the scope tree and attribute errors; mapping them
//! back to source locations is the frontend's job.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// Unique identity of an IR node within a parse.
pub type NodeId = u64;

/// A Quint module: a named sequence of definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: NodeId,
    pub name: String,
    pub defs: Vec<Def>,
}

/// The qualifier of an operator definition.
///
/// `PureVal` and `PureDef` are statically state-independent versions of
/// `Val` and `Def`. `Action` may write next-state registers, `Run` composes
/// actions sequentially, and `Temporal` is accepted by the frontend but not
/// executable by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpQualifier {
    Val,
    Def,
    PureVal,
    PureDef,
    Action,
    Run,
    Temporal,
}

impl OpQualifier {
    /// Whether definitions with this qualifier take no parameters.
    pub fn is_nullary(self) -> bool {
        matches!(self, OpQualifier::Val | OpQualifier::PureVal)
    }
}

/// A formal parameter of an operator or lambda.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub id: NodeId,
    pub name: String,
}

/// An operator definition: `qualifier name(params) = body`.
///
/// Also used for the single definition bound by a let expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpDef {
    pub id: NodeId,
    pub name: String,
    pub qualifier: OpQualifier,
    #[serde(default)]
    pub params: Vec<Param>,
    /// Declared return type, if the frontend kept one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ret: Option<Type>,
    pub body: Expr,
}

/// A top-level definition in a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Def {
    /// Operator definition (`val`, `def`, `action`, ...).
    Op(OpDef),

    /// State variable declaration: `var x: T`.
    Var { id: NodeId, name: String, ty: Type },

    /// Constant declaration: `const c: T`. Bound by the embedding
    /// environment before compilation.
    Const { id: NodeId, name: String, ty: Type },

    /// Named assumption over constants: `assume name = expr`.
    Assume { id: NodeId, name: String, expr: Expr },

    /// Type alias: `type Name = T`.
    TypeAlias { id: NodeId, name: String, ty: Type },

    /// Module import: `import M.*` brings M's unscoped definitions in.
    Import { id: NodeId, module: String },

    /// Module instantiation: `import M(c = e, ...) as name`.
    Instance {
        id: NodeId,
        module: String,
        name: String,
        overrides: Vec<(String, Expr)>,
    },

    /// A nested module definition.
    Module(Module),
}

impl Def {
    /// The identity of this definition node.
    pub fn id(&self) -> NodeId {
        match self {
            Def::Op(d) => d.id,
            Def::Var { id, .. }
            | Def::Const { id, .. }
            | Def::Assume { id, .. }
            | Def::TypeAlias { id, .. }
            | Def::Import { id, .. }
            | Def::Instance { id, .. } => *id,
            Def::Module(m) => m.id,
        }
    }

    /// The name this definition introduces, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Def::Op(d) => Some(&d.name),
            Def::Var { name, .. }
            | Def::Const { name, .. }
            | Def::Assume { name, .. }
            | Def::TypeAlias { name, .. }
            | Def::Instance { name, .. } => Some(name),
            Def::Import { .. } => None,
            Def::Module(m) => Some(&m.name),
        }
    }
}

/// A Quint expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Expr {
    /// Boolean literal.
    Bool { id: NodeId, value: bool },

    /// Integer literal (arbitrary precision).
    Int { id: NodeId, value: BigInt },

    /// String literal.
    Str { id: NodeId, value: String },

    /// Name reference: a variable, constant, parameter or operator.
    Name { id: NodeId, name: String },

    /// Operator application. `opcode` is either a built-in operator name
    /// or the name of a user-defined operator.
    App {
        id: NodeId,
        opcode: String,
        args: Vec<Expr>,
    },

    /// Anonymous operator: `(p1, ..., pn) => body`.
    Lambda {
        id: NodeId,
        params: Vec<Param>,
        body: Box<Expr>,
    },

    /// Let binding: `def` in scope over `body`.
    Let {
        id: NodeId,
        def: Box<OpDef>,
        body: Box<Expr>,
    },
}

impl Expr {
    /// The identity of this expression node.
    pub fn id(&self) -> NodeId {
        match self {
            Expr::Bool { id, .. }
            | Expr::Int { id, .. }
            | Expr::Str { id, .. }
            | Expr::Name { id, .. }
            | Expr::App { id, .. }
            | Expr::Lambda { id, .. }
            | Expr::Let { id, .. } => *id,
        }
    }
}

/// A field of a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecField {
    pub name: String,
    pub ty: Type,
}

/// One variant of a union-of-records type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionVariant {
    /// The literal value of the tag field selecting this variant.
    pub tag_value: String,
    pub fields: Vec<RecField>,
}

/// A Quint type. Types are carried through for diagnostics and for the
/// external type checker; the evaluator itself never inspects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Type {
    Bool { id: NodeId },
    Int { id: NodeId },
    Str { id: NodeId },

    /// Reference to a named (user-defined) type.
    Const { id: NodeId, name: String },

    /// Type variable.
    Var { id: NodeId, name: String },

    /// Function (map) type: `arg -> res`.
    Fun {
        id: NodeId,
        arg: Box<Type>,
        res: Box<Type>,
    },

    /// Operator type: `(args) => res`.
    Oper {
        id: NodeId,
        args: Vec<Type>,
        res: Box<Type>,
    },

    Set { id: NodeId, elem: Box<Type> },
    List { id: NodeId, elem: Box<Type> },
    Tup { id: NodeId, elems: Vec<Type> },
    Rec { id: NodeId, fields: Vec<RecField> },

    /// Union of records discriminated by a tag field.
    Union {
        id: NodeId,
        tag: String,
        variants: Vec<UnionVariant>,
    },
}

impl Type {
    /// The identity of this type node.
    pub fn id(&self) -> NodeId {
        match self {
            Type::Bool { id }
            | Type::Int { id }
            | Type::Str { id }
            | Type::Const { id, .. }
            | Type::Var { id, .. }
            | Type::Fun { id, .. }
            | Type::Oper { id, .. }
            | Type::Set { id, .. }
            | Type::List { id, .. }
            | Type::Tup { id, .. }
            | Type::Rec { id, .. }
            | Type::Union { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;

    #[test]
    fn expr_ids_are_stable() {
        let mut b = IrBuilder::new();
        let e = b.app("iadd", vec![b.int(1), b.int(2)]);
        match &e {
            Expr::App { opcode, args, .. } => {
                assert_eq!(opcode, "iadd");
                assert_eq!(args.len(), 2);
                assert_ne!(args[0].id(), args[1].id());
            }
            _ => panic!("expected app"),
        }
    }

    #[test]
    fn json_round_trip() {
        let mut b = IrBuilder::new();
        let body = b.app("iadd", vec![b.name("x"), b.int(1)]);
        let def = b.op_def(OpQualifier::Def, "inc", &["x"], body);
        let module = b.module("M", vec![Def::Op(def)]);

        let json = serde_json::to_string(&module).unwrap();
        let back: Module = serde_json::from_str(&json).unwrap();
        assert_eq!(module, back);
    }

    #[test]
    fn json_shape_is_kind_tagged() {
        let mut b = IrBuilder::new();
        let e = b.name("x");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "name");
        assert_eq!(json["name"], "x");
    }
}
