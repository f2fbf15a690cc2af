//! Scope tree and definition tables
//!
//! Two id-indexed structures derived from a module in one walker pass each:
//!
//! - [`ScopeTree`] maps every node identity to the identities of its
//!   enclosing scopes, innermost first. Scope-introducing nodes are module
//!   definitions, operator definitions, lambdas and let expressions.
//! - [`DefLookup`] holds per-module tables of value and type definitions.
//!   A value definition is either unscoped (module-global) or scoped to
//!   the node that introduced it; a name reference resolves to it only if
//!   that scope encloses the reference site.
//!
//! Resolution is a bounded linear search over the tables; no symbol
//! interning is needed at the module sizes this tool works with.

use rustc_hash::FxHashMap;

use crate::ir::{Def, Expr, Module, NodeId, OpDef, OpQualifier, Param};
use crate::walk::{walk_module, IrVisitor};

/// Maps each node identity to its enclosing scope identities.
#[derive(Debug, Default, Clone)]
pub struct ScopeTree {
    scopes: FxHashMap<NodeId, Vec<NodeId>>,
}

impl ScopeTree {
    /// Build the scope tree for a module (including nested modules).
    pub fn from_module(module: &Module) -> Self {
        let mut builder = ScopeBuilder::default();
        walk_module(&mut builder, module);
        ScopeTree {
            scopes: builder.map,
        }
    }

    /// All scopes enclosing the node, innermost first. Empty for unknown
    /// identities.
    pub fn scopes_for(&self, id: NodeId) -> &[NodeId] {
        self.scopes.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of nodes recorded.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[derive(Default)]
struct ScopeBuilder {
    stack: Vec<NodeId>,
    map: FxHashMap<NodeId, Vec<NodeId>>,
}

impl ScopeBuilder {
    fn record(&mut self, id: NodeId) {
        let enclosing: Vec<NodeId> = self.stack.iter().rev().copied().collect();
        self.map.insert(id, enclosing);
    }
}

impl IrVisitor for ScopeBuilder {
    fn enter_module(&mut self, module: &Module) {
        self.record(module.id);
        self.stack.push(module.id);
    }

    fn exit_module(&mut self, _module: &Module) {
        self.stack.pop();
    }

    fn enter_def(&mut self, def: &Def) {
        // Op and Module record themselves in their dedicated hooks.
        if !matches!(def, Def::Op(_) | Def::Module(_)) {
            self.record(def.id());
        }
    }

    fn enter_op_def(&mut self, def: &OpDef) {
        self.record(def.id);
        self.stack.push(def.id);
    }

    fn exit_op_def(&mut self, _def: &OpDef) {
        self.stack.pop();
    }

    fn enter_param(&mut self, param: &Param) {
        self.record(param.id);
    }

    fn enter_expr(&mut self, expr: &Expr) {
        self.record(expr.id());
        if matches!(expr, Expr::Lambda { .. } | Expr::Let { .. }) {
            self.stack.push(expr.id());
        }
    }

    fn exit_expr(&mut self, expr: &Expr) {
        if matches!(expr, Expr::Lambda { .. } | Expr::Let { .. }) {
            self.stack.pop();
        }
    }

    fn enter_type(&mut self, ty: &crate::ir::Type) {
        self.record(ty.id());
    }
}

/// What kind of binding a value definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDefKind {
    Op(OpQualifier),
    Var,
    Const,
    Assume,
    Param,
}

/// A value definition: a name bound to a variable, constant, parameter or
/// operator. Unscoped definitions are visible module-wide.
#[derive(Debug, Clone)]
pub struct ValueDef {
    pub name: String,
    pub kind: ValueDefKind,
    /// Scope node this definition is confined to; `None` = module-global.
    pub scope: Option<NodeId>,
    /// Identity of the defining node.
    pub id: NodeId,
}

/// A type definition. Type definitions are currently always module-global.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub id: NodeId,
}

/// A recorded module instantiation, for the compiler's constant binding.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub id: NodeId,
    pub module: String,
    pub name: String,
}

/// Value and type definition tables of a single module.
#[derive(Debug, Default, Clone)]
pub struct DefTables {
    pub values: Vec<ValueDef>,
    pub types: Vec<TypeDef>,
}

impl DefTables {
    /// Resolve a value name at a reference site with the given enclosing
    /// scopes (innermost first). Scoped definitions shadow outer and
    /// module-global ones.
    pub fn resolve_value(&self, name: &str, scopes: &[NodeId]) -> Option<&ValueDef> {
        let mut unscoped = None;
        let mut best: Option<(usize, &ValueDef)> = None;
        for def in &self.values {
            if def.name != name {
                continue;
            }
            match def.scope {
                None => unscoped = Some(def),
                Some(scope) => {
                    if let Some(depth) = scopes.iter().position(|s| *s == scope) {
                        if best.map_or(true, |(d, _)| depth < d) {
                            best = Some((depth, def));
                        }
                    }
                }
            }
        }
        best.map(|(_, def)| def).or(unscoped)
    }

    /// Resolve a type name. Type definitions carry no scope, so this is a
    /// plain name lookup.
    pub fn resolve_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|def| def.name == name)
    }
}

/// Definition tables for every module in a parse, keyed by module name.
#[derive(Debug, Default, Clone)]
pub struct DefLookup {
    by_module: FxHashMap<String, DefTables>,
    pub instances: Vec<InstanceInfo>,
}

impl DefLookup {
    /// Collect definition tables for a module tree. Nested modules get
    /// their own tables; `import`/`instance` definitions copy the target
    /// module's module-global definitions into the importing module.
    pub fn from_module(module: &Module) -> Self {
        let mut collector = DefCollector::default();
        walk_module(&mut collector, module);
        DefLookup {
            by_module: collector.done,
            instances: collector.instances,
        }
    }

    pub fn table(&self, module: &str) -> Option<&DefTables> {
        self.by_module.get(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&String, &DefTables)> {
        self.by_module.iter()
    }
}

#[derive(Default)]
struct DefCollector {
    /// Tables of modules whose walk has completed.
    done: FxHashMap<String, DefTables>,
    /// Tables of modules currently being walked, innermost last.
    open: Vec<(String, DefTables)>,
    /// Scope-introducing definition nodes currently open (op defs, lambdas,
    /// lets), innermost last. Parameters bind to the top of this stack.
    binders: Vec<NodeId>,
    instances: Vec<InstanceInfo>,
}

impl DefCollector {
    fn current(&mut self) -> &mut DefTables {
        &mut self
            .open
            .last_mut()
            .expect("definition outside any module")
            .1
    }

    fn add_value(&mut self, name: &str, kind: ValueDefKind, scope: Option<NodeId>, id: NodeId) {
        let def = ValueDef {
            name: name.to_string(),
            kind,
            scope,
            id,
        };
        self.current().values.push(def);
    }
}

impl IrVisitor for DefCollector {
    fn enter_module(&mut self, module: &Module) {
        self.open.push((module.name.clone(), DefTables::default()));
    }

    fn exit_module(&mut self, module: &Module) {
        let (name, table) = self.open.pop().expect("unbalanced module walk");
        debug_assert_eq!(name, module.name);
        self.done.insert(name, table);
    }

    fn enter_def(&mut self, def: &Def) {
        match def {
            Def::Op(op) => {
                // Module-level operator: visible module-wide.
                self.add_value(&op.name, ValueDefKind::Op(op.qualifier), None, op.id);
            }
            Def::Var { id, name, .. } => self.add_value(name, ValueDefKind::Var, None, *id),
            Def::Const { id, name, .. } => self.add_value(name, ValueDefKind::Const, None, *id),
            Def::Assume { id, name, .. } => self.add_value(name, ValueDefKind::Assume, None, *id),
            Def::TypeAlias { id, name, .. } => {
                let td = TypeDef {
                    name: name.clone(),
                    id: *id,
                };
                self.current().types.push(td);
            }
            Def::Import { module, .. } => {
                if let Some(table) = self.done.get(module).cloned() {
                    let current = self.current();
                    current
                        .values
                        .extend(table.values.iter().filter(|d| d.scope.is_none()).cloned());
                    current.types.extend(table.types.iter().cloned());
                }
            }
            Def::Instance {
                id, module, name, ..
            } => {
                self.instances.push(InstanceInfo {
                    id: *id,
                    module: module.clone(),
                    name: name.clone(),
                });
                if let Some(table) = self.done.get(module).cloned() {
                    let current = self.current();
                    current
                        .values
                        .extend(table.values.iter().filter(|d| d.scope.is_none()).cloned());
                    current.types.extend(table.types.iter().cloned());
                }
            }
            Def::Module(_) => {}
        }
    }

    fn enter_op_def(&mut self, def: &OpDef) {
        self.binders.push(def.id);
    }

    fn exit_op_def(&mut self, _def: &OpDef) {
        self.binders.pop();
    }

    fn enter_param(&mut self, param: &Param) {
        let scope = self.binders.last().copied();
        self.add_value(&param.name, ValueDefKind::Param, scope, param.id);
    }

    fn enter_expr(&mut self, expr: &Expr) {
        if let Expr::Let { id, def, .. } = expr {
            // The bound operator is visible in the let body and in its own
            // body (recursive definitions resolve through the let scope).
            self.add_value(
                &def.name,
                ValueDefKind::Op(def.qualifier),
                Some(*id),
                def.id,
            );
        }
        if matches!(expr, Expr::Lambda { .. }) {
            self.binders.push(expr.id());
        }
    }

    fn exit_expr(&mut self, expr: &Expr) {
        if matches!(expr, Expr::Lambda { .. }) {
            self.binders.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::ir::OpQualifier;

    #[test]
    fn scopes_are_innermost_first() {
        let b = IrBuilder::new();
        let body = b.name("x");
        let body_id = body.id();
        let lam = b.lambda(&["x"], body);
        let lam_id = lam.id();
        let def = b.op_def(OpQualifier::Def, "f", &[], lam);
        let def_id = def.id;
        let module = b.module("M", vec![Def::Op(def)]);
        let module_id = module.id;

        let tree = ScopeTree::from_module(&module);
        assert_eq!(tree.scopes_for(body_id), &[lam_id, def_id, module_id]);
        assert_eq!(tree.scopes_for(lam_id), &[def_id, module_id]);
    }

    #[test]
    fn every_expression_is_recorded() {
        let b = IrBuilder::new();
        let sum = b.app("iadd", vec![b.int(1), b.int(2)]);
        let module = b.module("M", vec![b.val("three", sum)]);

        let tree = ScopeTree::from_module(&module);
        // module + opdef + app + two literals
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn lambda_params_are_scoped() {
        let b = IrBuilder::new();
        let body = b.name("x");
        let body_id = body.id();
        let lam = b.lambda(&["x"], body);
        let lam_id = lam.id();
        let module = b.module("M", vec![b.val("f", lam)]);

        let lookup = DefLookup::from_module(&module);
        let table = lookup.table("M").unwrap();
        let tree = ScopeTree::from_module(&module);

        let def = table
            .resolve_value("x", tree.scopes_for(body_id))
            .expect("x in scope inside the lambda");
        assert_eq!(def.scope, Some(lam_id));
        assert_eq!(def.kind, ValueDefKind::Param);

        // Outside the lambda, x is not visible.
        assert!(table.resolve_value("x", tree.scopes_for(lam_id)).is_none());
    }

    #[test]
    fn let_defs_shadow_module_defs() {
        let b = IrBuilder::new();
        let outer = b.val("c", b.int(1));
        let use_site = b.name("c");
        let use_id = use_site.id();
        let inner = b.op_def(OpQualifier::Val, "c", &[], b.int(2));
        let inner_id = inner.id;
        let let_expr = b.let_in(inner, use_site);
        let module = b.module("M", vec![outer, b.val("main", let_expr)]);

        let lookup = DefLookup::from_module(&module);
        let table = lookup.table("M").unwrap();
        let tree = ScopeTree::from_module(&module);

        let def = table.resolve_value("c", tree.scopes_for(use_id)).unwrap();
        assert_eq!(def.id, inner_id, "the let-bound c shadows the val c");
    }

    #[test]
    fn import_copies_module_globals() {
        let b = IrBuilder::new();
        let lib = b.module("Lib", vec![b.val("answer", b.int(42))]);
        let use_site = b.name("answer");
        let use_id = use_site.id();
        let main = Module {
            id: b.id(),
            name: "Main".to_string(),
            defs: vec![
                Def::Module(lib),
                Def::Import {
                    id: b.id(),
                    module: "Lib".to_string(),
                },
                b.val("x", use_site),
            ],
        };

        let lookup = DefLookup::from_module(&main);
        let table = lookup.table("Main").unwrap();
        let tree = ScopeTree::from_module(&main);
        assert!(table
            .resolve_value("answer", tree.scopes_for(use_id))
            .is_some());
    }
}
