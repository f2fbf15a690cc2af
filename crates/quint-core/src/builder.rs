//! Programmatic IR construction
//!
//! `IrBuilder` hands out fresh node identities so that IR assembled in
//! tests (or by an embedding frontend) satisfies the uniqueness contract.
//! The id counter uses interior mutability so nested construction reads
//! naturally: `b.app("iadd", vec![b.int(1), b.name("x")])`.

use std::cell::Cell;

use num_bigint::BigInt;

use crate::ir::{Def, Expr, Module, NodeId, OpDef, OpQualifier, Param, RecField, Type};

/// Builds IR nodes with fresh, unique identities.
#[derive(Debug, Default)]
pub struct IrBuilder {
    next: Cell<NodeId>,
}

impl IrBuilder {
    pub fn new() -> Self {
        IrBuilder { next: Cell::new(0) }
    }

    /// Allocate a fresh node identity.
    pub fn id(&self) -> NodeId {
        let id = self.next.get() + 1;
        self.next.set(id);
        id
    }

    // === Expressions ===

    pub fn bool(&self, value: bool) -> Expr {
        Expr::Bool {
            id: self.id(),
            value,
        }
    }

    pub fn int(&self, value: impl Into<BigInt>) -> Expr {
        Expr::Int {
            id: self.id(),
            value: value.into(),
        }
    }

    pub fn str(&self, value: impl Into<String>) -> Expr {
        Expr::Str {
            id: self.id(),
            value: value.into(),
        }
    }

    pub fn name(&self, name: impl Into<String>) -> Expr {
        Expr::Name {
            id: self.id(),
            name: name.into(),
        }
    }

    pub fn app(&self, opcode: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::App {
            id: self.id(),
            opcode: opcode.into(),
            args,
        }
    }

    pub fn lambda(&self, params: &[&str], body: Expr) -> Expr {
        Expr::Lambda {
            id: self.id(),
            params: params.iter().map(|p| self.param(p)).collect(),
            body: Box::new(body),
        }
    }

    pub fn let_in(&self, def: OpDef, body: Expr) -> Expr {
        Expr::Let {
            id: self.id(),
            def: Box::new(def),
            body: Box::new(body),
        }
    }

    // === Definitions ===

    pub fn param(&self, name: &str) -> Param {
        Param {
            id: self.id(),
            name: name.to_string(),
        }
    }

    pub fn op_def(
        &self,
        qualifier: OpQualifier,
        name: impl Into<String>,
        params: &[&str],
        body: Expr,
    ) -> OpDef {
        OpDef {
            id: self.id(),
            name: name.into(),
            qualifier,
            params: params.iter().map(|p| self.param(p)).collect(),
            ret: None,
            body,
        }
    }

    /// Shorthand for a nullary `val` definition.
    pub fn val(&self, name: impl Into<String>, body: Expr) -> Def {
        Def::Op(self.op_def(OpQualifier::Val, name, &[], body))
    }

    /// Shorthand for a nullary `action` definition.
    pub fn action(&self, name: impl Into<String>, body: Expr) -> Def {
        Def::Op(self.op_def(OpQualifier::Action, name, &[], body))
    }

    pub fn var_decl(&self, name: impl Into<String>, ty: Type) -> Def {
        Def::Var {
            id: self.id(),
            name: name.into(),
            ty,
        }
    }

    pub fn const_decl(&self, name: impl Into<String>, ty: Type) -> Def {
        Def::Const {
            id: self.id(),
            name: name.into(),
            ty,
        }
    }

    pub fn module(&self, name: impl Into<String>, defs: Vec<Def>) -> Module {
        Module {
            id: self.id(),
            name: name.into(),
            defs,
        }
    }

    // === Types ===

    pub fn int_type(&self) -> Type {
        Type::Int { id: self.id() }
    }

    pub fn bool_type(&self) -> Type {
        Type::Bool { id: self.id() }
    }

    pub fn str_type(&self) -> Type {
        Type::Str { id: self.id() }
    }

    pub fn const_type(&self, name: impl Into<String>) -> Type {
        Type::Const {
            id: self.id(),
            name: name.into(),
        }
    }

    pub fn set_type(&self, elem: Type) -> Type {
        Type::Set {
            id: self.id(),
            elem: Box::new(elem),
        }
    }

    pub fn rec_type(&self, fields: Vec<(&str, Type)>) -> Type {
        Type::Rec {
            id: self.id(),
            fields: fields
                .into_iter()
                .map(|(name, ty)| RecField {
                    name: name.to_string(),
                    ty,
                })
                .collect(),
        }
    }
}
