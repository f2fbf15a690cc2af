//! Depth-first IR traversal with enter/exit hooks
//!
//! `IrVisitor` is the single walk interface shared by the scope builder,
//! the name resolver and the compiler. The walker visits definitions and
//! expressions in source order, children before a node's `exit_*` hook,
//! and descends into nested modules so visitors can maintain a module
//! stack via `enter_module`/`exit_module`.

use crate::ir::{Def, Expr, Module, NodeId, OpDef, Param, Type};

/// Visitor over the IR. All hooks default to no-ops; implementors override
/// the ones they care about.
///
/// For composite nodes both an `enter_*` and an `exit_*` hook fire, with
/// all children walked in between. Generic hooks (`enter_def`,
/// `enter_expr`) fire before the per-kind hook of the same node.
#[allow(unused_variables)]
pub trait IrVisitor {
    // === Modules ===

    fn enter_module(&mut self, module: &Module) {}
    fn exit_module(&mut self, module: &Module) {}

    // === Definitions ===

    fn enter_def(&mut self, def: &Def) {}
    fn exit_def(&mut self, def: &Def) {}

    fn enter_op_def(&mut self, def: &OpDef) {}
    fn exit_op_def(&mut self, def: &OpDef) {}

    fn enter_var(&mut self, id: NodeId, name: &str, ty: &Type) {}
    fn enter_const(&mut self, id: NodeId, name: &str, ty: &Type) {}
    fn enter_assume(&mut self, id: NodeId, name: &str, expr: &Expr) {}
    fn enter_type_alias(&mut self, id: NodeId, name: &str, ty: &Type) {}
    fn enter_import(&mut self, id: NodeId, module: &str) {}
    fn enter_instance(&mut self, id: NodeId, module: &str, name: &str) {}

    fn enter_param(&mut self, param: &Param) {}

    // === Expressions ===

    fn enter_expr(&mut self, expr: &Expr) {}
    fn exit_expr(&mut self, expr: &Expr) {}

    fn enter_literal(&mut self, id: NodeId) {}
    fn enter_name(&mut self, id: NodeId, name: &str) {}

    fn enter_app(&mut self, id: NodeId, opcode: &str, args: &[Expr]) {}
    fn exit_app(&mut self, id: NodeId, opcode: &str, args: &[Expr]) {}

    fn enter_lambda(&mut self, id: NodeId, params: &[Param], body: &Expr) {}
    fn exit_lambda(&mut self, id: NodeId, params: &[Param], body: &Expr) {}

    fn enter_let(&mut self, id: NodeId, def: &OpDef, body: &Expr) {}
    fn exit_let(&mut self, id: NodeId, def: &OpDef, body: &Expr) {}

    // === Types ===

    fn enter_type(&mut self, ty: &Type) {}
    fn exit_type(&mut self, ty: &Type) {}

    fn enter_const_type(&mut self, id: NodeId, name: &str) {}
    fn enter_var_type(&mut self, id: NodeId, name: &str) {}
}

/// Walk a module: the module hook pair around all definitions in order.
pub fn walk_module<V: IrVisitor + ?Sized>(visitor: &mut V, module: &Module) {
    visitor.enter_module(module);
    for def in &module.defs {
        walk_def(visitor, def);
    }
    visitor.exit_module(module);
}

/// Walk a single definition.
pub fn walk_def<V: IrVisitor + ?Sized>(visitor: &mut V, def: &Def) {
    visitor.enter_def(def);
    match def {
        Def::Op(op) => walk_op_def(visitor, op),
        Def::Var { id, name, ty } => {
            visitor.enter_var(*id, name, ty);
            walk_type(visitor, ty);
        }
        Def::Const { id, name, ty } => {
            visitor.enter_const(*id, name, ty);
            walk_type(visitor, ty);
        }
        Def::Assume { id, name, expr } => {
            visitor.enter_assume(*id, name, expr);
            walk_expr(visitor, expr);
        }
        Def::TypeAlias { id, name, ty } => {
            visitor.enter_type_alias(*id, name, ty);
            walk_type(visitor, ty);
        }
        Def::Import { id, module } => {
            visitor.enter_import(*id, module);
        }
        Def::Instance {
            id,
            module,
            name,
            overrides,
        } => {
            visitor.enter_instance(*id, module, name);
            for (_, expr) in overrides {
                walk_expr(visitor, expr);
            }
        }
        Def::Module(nested) => walk_module(visitor, nested),
    }
    visitor.exit_def(def);
}

/// Walk an operator definition: params, declared type, then the body.
pub fn walk_op_def<V: IrVisitor + ?Sized>(visitor: &mut V, def: &OpDef) {
    visitor.enter_op_def(def);
    for param in &def.params {
        visitor.enter_param(param);
    }
    if let Some(ret) = &def.ret {
        walk_type(visitor, ret);
    }
    walk_expr(visitor, &def.body);
    visitor.exit_op_def(def);
}

/// Walk an expression tree.
pub fn walk_expr<V: IrVisitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    visitor.enter_expr(expr);
    match expr {
        Expr::Bool { id, .. } | Expr::Int { id, .. } | Expr::Str { id, .. } => {
            visitor.enter_literal(*id);
        }
        Expr::Name { id, name } => {
            visitor.enter_name(*id, name);
        }
        Expr::App { id, opcode, args } => {
            visitor.enter_app(*id, opcode, args);
            for arg in args {
                walk_expr(visitor, arg);
            }
            visitor.exit_app(*id, opcode, args);
        }
        Expr::Lambda { id, params, body } => {
            visitor.enter_lambda(*id, params, body);
            for param in params {
                visitor.enter_param(param);
            }
            walk_expr(visitor, body);
            visitor.exit_lambda(*id, params, body);
        }
        Expr::Let { id, def, body } => {
            visitor.enter_let(*id, def, body);
            walk_op_def(visitor, def);
            walk_expr(visitor, body);
            visitor.exit_let(*id, def, body);
        }
    }
    visitor.exit_expr(expr);
}

/// Walk a type tree.
pub fn walk_type<V: IrVisitor + ?Sized>(visitor: &mut V, ty: &Type) {
    visitor.enter_type(ty);
    match ty {
        Type::Bool { .. } | Type::Int { .. } | Type::Str { .. } => {}
        Type::Const { id, name } => visitor.enter_const_type(*id, name),
        Type::Var { id, name } => visitor.enter_var_type(*id, name),
        Type::Fun { arg, res, .. } => {
            walk_type(visitor, arg);
            walk_type(visitor, res);
        }
        Type::Oper { args, res, .. } => {
            for arg in args {
                walk_type(visitor, arg);
            }
            walk_type(visitor, res);
        }
        Type::Set { elem, .. } | Type::List { elem, .. } => walk_type(visitor, elem),
        Type::Tup { elems, .. } => {
            for elem in elems {
                walk_type(visitor, elem);
            }
        }
        Type::Rec { fields, .. } => {
            for field in fields {
                walk_type(visitor, &field.ty);
            }
        }
        Type::Union { variants, .. } => {
            for variant in variants {
                for field in &variant.fields {
                    walk_type(visitor, &field.ty);
                }
            }
        }
    }
    visitor.exit_type(ty);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::ir::OpQualifier;

    /// Records the order of interesting hook firings.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl IrVisitor for Recorder {
        fn enter_module(&mut self, m: &Module) {
            self.events.push(format!("+module {}", m.name));
        }
        fn exit_module(&mut self, m: &Module) {
            self.events.push(format!("-module {}", m.name));
        }
        fn enter_op_def(&mut self, d: &OpDef) {
            self.events.push(format!("+op {}", d.name));
        }
        fn exit_op_def(&mut self, d: &OpDef) {
            self.events.push(format!("-op {}", d.name));
        }
        fn enter_name(&mut self, _id: NodeId, name: &str) {
            self.events.push(format!("name {}", name));
        }
        fn enter_app(&mut self, _id: NodeId, opcode: &str, _args: &[Expr]) {
            self.events.push(format!("+app {}", opcode));
        }
    }

    #[test]
    fn source_order_depth_first() {
        let b = IrBuilder::new();
        let body = b.app("iadd", vec![b.name("x"), b.name("y")]);
        let def = b.op_def(OpQualifier::Def, "sum", &["x", "y"], body);
        let module = b.module("M", vec![crate::ir::Def::Op(def)]);

        let mut rec = Recorder::default();
        walk_module(&mut rec, &module);

        assert_eq!(
            rec.events,
            vec![
                "+module M",
                "+op sum",
                "+app iadd",
                "name x",
                "name y",
                "-op sum",
                "-module M",
            ]
        );
    }

    #[test]
    fn nested_modules_are_walked() {
        let b = IrBuilder::new();
        let inner = b.module("Inner", vec![b.val("one", b.int(1))]);
        let outer = b.module("Outer", vec![crate::ir::Def::Module(inner)]);

        let mut rec = Recorder::default();
        walk_module(&mut rec, &outer);

        assert_eq!(
            rec.events,
            vec![
                "+module Outer",
                "+module Inner",
                "+op one",
                "-op one",
                "-module Inner",
                "-module Outer",
            ]
        );
    }
}
