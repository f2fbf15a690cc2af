//! Registers: the mutable state of an evaluation
//!
//! A register is a named slot holding an optional value. The bank owns
//! every slot in a single slab; computables refer to slots by index, so
//! there is no shared-ownership cycle between the compiled graph and the
//! state it reads and writes.
//!
//! Register kinds:
//! - `Var`: current-state value of a state variable
//! - `NextVar`: the variable's speculative next value, consumed by `shift`
//! - `Arg`: a lambda or operator parameter
//! - `Shadow`: simulator bookkeeping (e.g. the last recorded trace)
//!
//! Snapshots copy the `Option<Value>` column. Values are persistent, so a
//! snapshot is O(number of registers) and independent of later writes.

use std::sync::Arc;

use quint_core::NodeId;

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// Index of a register in the bank's slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterId(pub usize);

/// What a register slot is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Var,
    NextVar,
    Arg,
    Shadow,
}

/// A single mutable slot.
#[derive(Debug, Clone)]
pub struct Register {
    pub kind: RegisterKind,
    pub name: Arc<str>,
    /// Declaration site, used to attribute reads of unset slots.
    pub origin: NodeId,
    pub value: Option<Value>,
}

/// The current- and next-state registers of one state variable.
#[derive(Debug, Clone)]
pub struct VarPair {
    pub name: Arc<str>,
    pub current: RegisterId,
    pub next: RegisterId,
    /// The variable declaration node.
    pub decl: NodeId,
}

/// A copy of the full register column.
#[derive(Debug, Clone)]
pub struct Snapshot(Vec<Option<Value>>);

/// A copy of the next-state column only, for action combinators.
#[derive(Debug, Clone)]
pub struct NextSnapshot(Vec<(RegisterId, Option<Value>)>);

/// The slab of registers for one compiled module.
#[derive(Debug, Default, Clone)]
pub struct RegisterBank {
    slots: Vec<Register>,
    pairs: Vec<VarPair>,
}

impl RegisterBank {
    pub fn new() -> Self {
        RegisterBank::default()
    }

    /// Allocate a fresh, unset register.
    pub fn alloc(&mut self, kind: RegisterKind, name: impl Into<Arc<str>>, origin: NodeId) -> RegisterId {
        let id = RegisterId(self.slots.len());
        self.slots.push(Register {
            kind,
            name: name.into(),
            origin,
            value: None,
        });
        id
    }

    /// Allocate the current- and next-state registers of a state variable
    /// and record them as a pair.
    pub fn alloc_var(&mut self, name: impl Into<Arc<str>>, decl: NodeId) -> VarPair {
        let name = name.into();
        let current = self.alloc(RegisterKind::Var, Arc::clone(&name), decl);
        let next = self.alloc(RegisterKind::NextVar, Arc::clone(&name), decl);
        let pair = VarPair {
            name,
            current,
            next,
            decl,
        };
        self.pairs.push(pair.clone());
        pair
    }

    pub fn register(&self, id: RegisterId) -> &Register {
        &self.slots[id.0]
    }

    /// Read a register; an unset slot is a runtime error attributed to the
    /// declaration site.
    pub fn read(&self, id: RegisterId) -> EvalResult<Value> {
        let slot = &self.slots[id.0];
        slot.value.clone().ok_or_else(|| EvalError::UnsetRegister {
            name: slot.name.to_string(),
            id: Some(slot.origin),
        })
    }

    /// Read a register without failing on unset slots.
    pub fn peek(&self, id: RegisterId) -> Option<&Value> {
        self.slots[id.0].value.as_ref()
    }

    pub fn write(&mut self, id: RegisterId, value: Value) {
        self.slots[id.0].value = Some(value);
    }

    pub fn clear(&mut self, id: RegisterId) {
        self.slots[id.0].value = None;
    }

    /// The variable pairs in declaration order.
    pub fn var_pairs(&self) -> &[VarPair] {
        &self.pairs
    }

    /// Copy the full register column.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.slots.iter().map(|slot| slot.value.clone()).collect())
    }

    /// Restore a full-column snapshot taken from this bank.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        debug_assert_eq!(snapshot.0.len(), self.slots.len());
        for (slot, value) in self.slots.iter_mut().zip(snapshot.0.iter()) {
            slot.value = value.clone();
        }
    }

    /// Copy the next-state column.
    pub fn snapshot_next(&self) -> NextSnapshot {
        NextSnapshot(
            self.pairs
                .iter()
                .map(|pair| (pair.next, self.slots[pair.next.0].value.clone()))
                .collect(),
        )
    }

    /// Restore a next-state snapshot taken from this bank.
    pub fn restore_next(&mut self, snapshot: &NextSnapshot) {
        for (id, value) in &snapshot.0 {
            self.slots[id.0].value = value.clone();
        }
    }

    /// Copy every next-state register into its current-state register and
    /// clear the next-state column.
    pub fn shift(&mut self) {
        for i in 0..self.pairs.len() {
            let (current, next) = (self.pairs[i].current, self.pairs[i].next);
            self.slots[current.0].value = self.slots[next.0].value.take();
        }
    }

    /// A record of the current-state variables, one field per variable
    /// that holds a value.
    pub fn state_record(&self) -> Value {
        Value::Record(
            self.pairs
                .iter()
                .filter_map(|pair| {
                    self.slots[pair.current.0]
                        .value
                        .clone()
                        .map(|v| (Arc::clone(&pair.name), v))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_with_var() -> (RegisterBank, VarPair) {
        let mut bank = RegisterBank::new();
        let pair = bank.alloc_var("n", 1);
        (bank, pair)
    }

    #[test]
    fn unset_read_is_attributed_to_declaration() {
        let (bank, pair) = bank_with_var();
        match bank.read(pair.current) {
            Err(EvalError::UnsetRegister { name, id }) => {
                assert_eq!(name, "n");
                assert_eq!(id, Some(1));
            }
            other => panic!("expected unset register error, got {other:?}"),
        }
    }

    #[test]
    fn shift_moves_next_into_current() {
        let (mut bank, pair) = bank_with_var();
        bank.write(pair.next, Value::int(5));
        bank.shift();
        assert_eq!(bank.read(pair.current).unwrap(), Value::int(5));
        assert!(bank.peek(pair.next).is_none());
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let (mut bank, pair) = bank_with_var();
        bank.write(pair.current, Value::int(3));
        bank.write(pair.next, Value::int(4));
        let snapshot = bank.snapshot();

        bank.write(pair.current, Value::int(100));
        bank.clear(pair.next);
        bank.restore(&snapshot);

        assert_eq!(bank.read(pair.current).unwrap(), Value::int(3));
        assert_eq!(bank.read(pair.next).unwrap(), Value::int(4));
    }

    #[test]
    fn snapshots_are_independent_of_later_writes() {
        let (mut bank, pair) = bank_with_var();
        bank.write(pair.current, Value::list(vec![Value::int(1)]));
        let snapshot = bank.snapshot();
        bank.write(pair.current, Value::list(vec![Value::int(9)]));
        bank.restore(&snapshot);
        assert_eq!(
            bank.read(pair.current).unwrap(),
            Value::list(vec![Value::int(1)])
        );
    }

    #[test]
    fn next_snapshot_covers_only_next_registers() {
        let (mut bank, pair) = bank_with_var();
        bank.write(pair.current, Value::int(1));
        bank.write(pair.next, Value::int(2));
        let snapshot = bank.snapshot_next();

        bank.write(pair.current, Value::int(10));
        bank.write(pair.next, Value::int(20));
        bank.restore_next(&snapshot);

        assert_eq!(bank.read(pair.current).unwrap(), Value::int(10));
        assert_eq!(bank.read(pair.next).unwrap(), Value::int(2));
    }

    #[test]
    fn state_record_skips_unset_variables() {
        let mut bank = RegisterBank::new();
        let a = bank.alloc_var("a", 1);
        let _b = bank.alloc_var("b", 2);
        bank.write(a.current, Value::int(7));
        let record = bank.state_record();
        assert_eq!(record, Value::record(vec![("a", Value::int(7))]));
    }
}
