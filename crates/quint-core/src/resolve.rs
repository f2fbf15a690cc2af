//! Name resolution
//!
//! A single walker pass that verifies every name reference (value names,
//! operator applications and type references) against the definition
//! tables and the scope tree. All failures are aggregated; the resolver
//! never stops at the first error.
//!
//! Built-in operators and values (`iadd`, `Set`, `Bool`, ...) resolve
//! implicitly, the same way a standard library prelude would.

use std::fmt;

use crate::ir::{Def, Expr, Module, NodeId, OpDef};
use crate::scope::{DefLookup, ScopeTree};
use crate::walk::{walk_module, IrVisitor};

/// Names of all built-in operators and values known to the evaluator.
pub const BUILTIN_NAMES: &[&str] = &[
    // actions and control
    "next", "assign", "eq", "neq", "ite", "not", "iff", "implies", "and", "or", "actionAll",
    "actionAny", "then", "repeated", "assert", "fail", "_test", "oneOf",
    // integers
    "iuminus", "iadd", "isub", "imul", "idiv", "imod", "ipow", "igt", "ilt", "igte", "ilte",
    // tuples
    "Tup", "item", "tuples",
    // lists
    "List", "range", "nth", "replaceAt", "head", "tail", "slice", "length", "append", "concat",
    "indices", "select", "foldl", "foldr",
    // records
    "Rec", "field", "with", "fieldNames",
    // sets
    "Set", "powerset", "contains", "in", "subseteq", "union", "intersect", "exclude", "size",
    "isFinite", "to", "fold", "exists", "forall", "map", "filter", "mapBy",
    // maps
    "Map", "setToMap", "setOfMaps", "get", "set", "setBy", "put", "keys",
    // built-in values
    "Bool", "Int", "Nat", "_lastTrace",
];

/// Whether `name` is a built-in operator or value.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Which table a failed lookup was against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameErrorKind {
    Value,
    Type,
}

/// An unresolved name reference.
#[derive(Debug, Clone)]
pub struct NameError {
    pub kind: NameErrorKind,
    /// The name that failed to resolve.
    pub name: String,
    /// Name of the definition whose body contains the reference.
    pub definition_name: String,
    /// Name of the module containing the reference.
    pub module_name: String,
    /// Identity of the referencing node.
    pub reference_id: NodeId,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NameErrorKind::Value => write!(
                f,
                "Failed to resolve name {} in definition for {}, in module {}",
                self.name, self.definition_name, self.module_name
            ),
            NameErrorKind::Type => write!(
                f,
                "Failed to resolve type alias {} in definition for {}, in module {}",
                self.name, self.definition_name, self.module_name
            ),
        }
    }
}

/// Verify all name references in a module. Returns `Ok(())` when every
/// reference resolves, or the full list of failures otherwise.
pub fn resolve(
    module: &Module,
    defs: &DefLookup,
    tree: &ScopeTree,
) -> Result<(), Vec<NameError>> {
    let mut resolver = Resolver {
        defs,
        tree,
        modules: Vec::new(),
        definitions: Vec::new(),
        errors: Vec::new(),
    };
    walk_module(&mut resolver, module);
    if resolver.errors.is_empty() {
        Ok(())
    } else {
        Err(resolver.errors)
    }
}

struct Resolver<'a> {
    defs: &'a DefLookup,
    tree: &'a ScopeTree,
    /// Module name stack; the top is the module being walked.
    modules: Vec<String>,
    /// Definition name stack for error attribution.
    definitions: Vec<String>,
    errors: Vec<NameError>,
}

impl Resolver<'_> {
    fn module_name(&self) -> String {
        self.modules.last().cloned().unwrap_or_default()
    }

    fn definition_name(&self) -> String {
        self.definitions
            .last()
            .cloned()
            .unwrap_or_else(|| "<module>".to_string())
    }

    fn check_value(&mut self, id: NodeId, name: &str) {
        if is_builtin(name) {
            return;
        }
        let table = self.modules.last().and_then(|m| self.defs.table(m));
        let found = table
            .and_then(|t| t.resolve_value(name, self.tree.scopes_for(id)))
            .is_some();
        if !found {
            self.errors.push(NameError {
                kind: NameErrorKind::Value,
                name: name.to_string(),
                definition_name: self.definition_name(),
                module_name: self.module_name(),
                reference_id: id,
            });
        }
    }

    fn check_type(&mut self, id: NodeId, name: &str) {
        let table = self.modules.last().and_then(|m| self.defs.table(m));
        let found = table.and_then(|t| t.resolve_type(name)).is_some();
        if !found {
            self.errors.push(NameError {
                kind: NameErrorKind::Type,
                name: name.to_string(),
                definition_name: self.definition_name(),
                module_name: self.module_name(),
                reference_id: id,
            });
        }
    }
}

impl IrVisitor for Resolver<'_> {
    fn enter_module(&mut self, module: &Module) {
        self.modules.push(module.name.clone());
    }

    fn exit_module(&mut self, _module: &Module) {
        self.modules.pop();
    }

    fn enter_def(&mut self, def: &Def) {
        // Operator definitions push their name in `enter_op_def`; the
        // remaining defs with expression bodies are attributed here.
        if let Def::Assume { name, .. } | Def::Instance { name, .. } = def {
            self.definitions.push(name.clone());
        }
    }

    fn exit_def(&mut self, def: &Def) {
        if matches!(def, Def::Assume { .. } | Def::Instance { .. }) {
            self.definitions.pop();
        }
    }

    fn enter_op_def(&mut self, def: &OpDef) {
        self.definitions.push(def.name.clone());
    }

    fn exit_op_def(&mut self, _def: &OpDef) {
        self.definitions.pop();
    }

    fn enter_name(&mut self, id: NodeId, name: &str) {
        self.check_value(id, name);
    }

    fn enter_app(&mut self, id: NodeId, opcode: &str, _args: &[Expr]) {
        self.check_value(id, opcode);
    }

    fn enter_const_type(&mut self, id: NodeId, name: &str) {
        self.check_type(id, name);
    }

    fn enter_var_type(&mut self, _id: NodeId, _name: &str) {
        // Type variables are introduced by the external type checker and
        // carry no definition to resolve against.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::ir::OpQualifier;

    fn resolve_module(module: &Module) -> Result<(), Vec<NameError>> {
        let defs = DefLookup::from_module(module);
        let tree = ScopeTree::from_module(module);
        resolve(module, &defs, &tree)
    }

    #[test]
    fn builtins_resolve_implicitly() {
        let b = IrBuilder::new();
        let body = b.app("iadd", vec![b.int(1), b.int(2)]);
        let module = b.module("M", vec![b.val("three", body)]);
        assert!(resolve_module(&module).is_ok());
    }

    #[test]
    fn undefined_name_is_reported() {
        let b = IrBuilder::new();
        let body = b.app("iadd", vec![b.name("y"), b.int(1)]);
        let module = b.module("M", vec![b.val("x", body)]);

        let errors = resolve_module(&module).unwrap_err();
        assert_eq!(errors.len(), 1);
        let err = &errors[0];
        assert_eq!(err.kind, NameErrorKind::Value);
        assert_eq!(err.name, "y");
        assert_eq!(err.definition_name, "x");
        assert_eq!(err.module_name, "M");
    }

    #[test]
    fn all_errors_are_aggregated() {
        let b = IrBuilder::new();
        let body = b.app("iadd", vec![b.name("y"), b.name("z")]);
        let module = b.module("M", vec![b.val("x", body)]);

        let errors = resolve_module(&module).unwrap_err();
        let names: Vec<&str> = errors.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["y", "z"]);
    }

    #[test]
    fn lambda_params_resolve_in_body_only() {
        let b = IrBuilder::new();
        let inside = b.lambda(&["p"], b.name("p"));
        let outside = b.name("p");
        let module = b.module("M", vec![b.val("f", inside), b.val("bad", outside)]);

        let errors = resolve_module(&module).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].definition_name, "bad");
    }

    #[test]
    fn unknown_operator_application_is_reported() {
        let b = IrBuilder::new();
        let body = b.app("frobnicate", vec![b.int(1)]);
        let module = b.module("M", vec![b.val("x", body)]);

        let errors = resolve_module(&module).unwrap_err();
        assert_eq!(errors[0].name, "frobnicate");
    }

    #[test]
    fn user_operators_resolve_as_opcodes() {
        let b = IrBuilder::new();
        let double = b.op_def(
            OpQualifier::Def,
            "double",
            &["x"],
            b.app("imul", vec![b.name("x"), b.int(2)]),
        );
        let use_site = b.app("double", vec![b.int(21)]);
        let module = b.module("M", vec![Def::Op(double), b.val("answer", use_site)]);
        assert!(resolve_module(&module).is_ok());
    }

    #[test]
    fn forward_references_resolve() {
        let b = IrBuilder::new();
        let first = b.val("uses", b.name("defined_later"));
        let second = b.val("defined_later", b.int(1));
        let module = b.module("M", vec![first, second]);
        assert!(resolve_module(&module).is_ok());
    }

    #[test]
    fn unknown_type_alias_is_reported() {
        let b = IrBuilder::new();
        let module = b.module(
            "M",
            vec![b.var_decl("x", b.const_type("UndeclaredType"))],
        );

        let errors = resolve_module(&module).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, NameErrorKind::Type);
        assert_eq!(errors[0].name, "UndeclaredType");
    }

    #[test]
    fn type_aliases_resolve() {
        let b = IrBuilder::new();
        let alias = Def::TypeAlias {
            id: b.id(),
            name: "Money".to_string(),
            ty: b.int_type(),
        };
        let module = b.module("M", vec![alias, b.var_decl("cash", b.const_type("Money"))]);
        assert!(resolve_module(&module).is_ok());
    }

    #[test]
    fn nested_module_attribution() {
        let b = IrBuilder::new();
        let inner = b.module("Inner", vec![b.val("x", b.name("ghost"))]);
        let outer = b.module("Outer", vec![Def::Module(inner)]);

        let errors = resolve_module(&outer).unwrap_err();
        assert_eq!(errors[0].module_name, "Inner");
        assert_eq!(errors[0].definition_name, "x");
    }
}
