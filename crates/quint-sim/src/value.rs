//! Runtime values
//!
//! The values produced by evaluation. Values are designed to be:
//! - Immutable: containers are persistent, every update returns a new value
//! - Cheap to clone: heap payloads sit behind `Arc` or `im` structural sharing
//! - Comparable: a total order gives sets and maps a canonical element order
//!
//! | Quint type | Rust representation |
//! |------------|---------------------|
//! | bool       | `Value::Bool(bool)` |
//! | int        | `Value::Int(BigInt)` |
//! | str        | `Value::Str(Arc<str>)` |
//! | tuple      | `Value::Tuple(Arc<[Value]>)` |
//! | record     | `Value::Record(OrdMap<Arc<str>, Value>)` |
//! | list       | `Value::List(Vector<Value>)` |
//! | set        | `Value::Set(SetValue)` |
//! | map        | `Value::Map(OrdMap<Value, Value>)` |
//!
//! Sets keep several representations: explicit sorted arrays, integer
//! intervals, powersets, cross products and map spaces stay symbolic until
//! an operation needs their elements. Equality and ordering are defined on
//! the canonical enumeration, so two representations of the same finite
//! set always compare equal. The `Int` and `Nat` markers fail any
//! operation that would enumerate them.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use im::{OrdMap, Vector};
use num_bigint::BigInt;
use num_traits::{Pow, Signed, ToPrimitive, Zero};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::computable::CallableHandle;
use crate::error::{EvalError, EvalResult};

// ============================================================================
// SortedElems - sorted, deduplicated element array
// ============================================================================

/// A sorted, deduplicated array of values stored in an `Arc<[Value]>`.
///
/// This is the explicit set representation: a single allocation, O(1)
/// clone, O(log n) membership via binary search, and O(n + m) merge-based
/// union/intersection/difference.
///
/// Invariants: elements are sorted ascending by `Value::cmp`, no
/// duplicates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortedElems {
    elems: Arc<[Value]>,
}

impl SortedElems {
    /// The empty element array.
    pub fn empty() -> Self {
        SortedElems {
            elems: Arc::from(Vec::new()),
        }
    }

    /// Sort and deduplicate arbitrary values.
    pub fn from_values(mut values: Vec<Value>) -> Self {
        values.sort();
        values.dedup();
        SortedElems {
            elems: Arc::from(values),
        }
    }

    /// Wrap a vector that is already sorted; only deduplicates.
    pub fn from_sorted_vec(mut values: Vec<Value>) -> Self {
        values.dedup();
        SortedElems {
            elems: Arc::from(values),
        }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Membership via binary search.
    pub fn contains(&self, v: &Value) -> bool {
        self.elems.binary_search(v).is_ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.elems.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.elems
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.elems.get(index)
    }

    /// Union by merging two sorted sequences (O(n + m)).
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }

        let a = self.as_slice();
        let b = other.as_slice();
        let mut result = Vec::with_capacity(a.len() + b.len());
        let mut i = 0;
        let mut j = 0;

        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => {
                    result.push(a[i].clone());
                    i += 1;
                }
                Ordering::Greater => {
                    result.push(b[j].clone());
                    j += 1;
                }
                Ordering::Equal => {
                    result.push(a[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        result.extend_from_slice(&a[i..]);
        result.extend_from_slice(&b[j..]);

        SortedElems::from_sorted_vec(result)
    }

    /// Intersection by merge (O(n + m)).
    pub fn intersection(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return SortedElems::empty();
        }

        let a = self.as_slice();
        let b = other.as_slice();
        let mut result = Vec::new();
        let mut i = 0;
        let mut j = 0;

        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    result.push(a[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }

        SortedElems::from_sorted_vec(result)
    }

    /// Difference `self \ other` by merge (O(n + m)).
    pub fn difference(&self, other: &Self) -> Self {
        if self.is_empty() {
            return SortedElems::empty();
        }
        if other.is_empty() {
            return self.clone();
        }

        let a = self.as_slice();
        let b = other.as_slice();
        let mut result = Vec::new();
        let mut i = 0;
        let mut j = 0;

        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => {
                    result.push(a[i].clone());
                    i += 1;
                }
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        result.extend_from_slice(&a[i..]);

        SortedElems::from_sorted_vec(result)
    }

    /// Whether every element of `self` is in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        if self.len() > other.len() {
            return false;
        }
        let b = other.as_slice();
        let mut j = 0;
        for v in self.iter() {
            while j < b.len() && b[j] < *v {
                j += 1;
            }
            if j >= b.len() || b[j] != *v {
                return false;
            }
            j += 1;
        }
        true
    }
}

impl FromIterator<Value> for SortedElems {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        SortedElems::from_values(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SortedElems {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
// SetValue - finite and symbolic set representations
// ============================================================================

/// The two infinite sets the language can name but never build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InfiniteSet {
    Int,
    Nat,
}

impl InfiniteSet {
    pub fn name(self) -> &'static str {
        match self {
            InfiniteSet::Int => "Int",
            InfiniteSet::Nat => "Nat",
        }
    }
}

/// A set value. Beyond explicit element arrays, several constructors stay
/// symbolic so that `2.to(100).contains(n)` or picking from a powerset
/// never materializes the whole set.
#[derive(Debug, Clone)]
pub enum SetValue {
    /// Explicit elements, sorted and deduplicated.
    Explicit(SortedElems),
    /// Integer interval `[a, b]`, empty when `a > b`.
    Interval(BigInt, BigInt),
    /// All subsets of the inner set.
    Powerset(Arc<SetValue>),
    /// Cross product; elements are tuples.
    Cross(Arc<[SetValue]>),
    /// All maps from `domain` to `range`.
    Maps {
        domain: Arc<SetValue>,
        range: Arc<SetValue>,
    },
    /// `Int` or `Nat`.
    Infinite(InfiniteSet),
}

impl SetValue {
    pub fn empty() -> Self {
        SetValue::Explicit(SortedElems::empty())
    }

    pub fn of(values: Vec<Value>) -> Self {
        SetValue::Explicit(SortedElems::from_values(values))
    }

    /// Number of elements. Fails only on the infinite markers.
    pub fn cardinality(&self) -> EvalResult<BigInt> {
        match self {
            SetValue::Explicit(elems) => Ok(BigInt::from(elems.len())),
            SetValue::Interval(a, b) => {
                if a > b {
                    Ok(BigInt::zero())
                } else {
                    Ok(b - a + 1)
                }
            }
            SetValue::Powerset(inner) => {
                let n = small_size(&inner.cardinality()?)?;
                Ok(BigInt::from(2).pow(n))
            }
            SetValue::Cross(components) => {
                let mut product = BigInt::from(1);
                for c in components.iter() {
                    product *= c.cardinality()?;
                }
                Ok(product)
            }
            SetValue::Maps { domain, range } => {
                let d = small_size(&domain.cardinality()?)?;
                if d == 0 {
                    // Exactly one map out of an empty domain: the empty map.
                    return Ok(BigInt::from(1));
                }
                Ok(range.cardinality()?.pow(d))
            }
            SetValue::Infinite(marker) => Err(EvalError::InfiniteSet {
                name: marker.name(),
                id: None,
            }),
        }
    }

    /// Membership. Symbolic shapes answer without enumerating themselves.
    pub fn contains(&self, v: &Value) -> EvalResult<bool> {
        match self {
            SetValue::Explicit(elems) => Ok(elems.contains(v)),
            SetValue::Interval(a, b) => {
                let n = v.as_int();
                Ok(n >= a && n <= b)
            }
            SetValue::Powerset(inner) => v.as_set().is_subset(inner),
            SetValue::Cross(components) => {
                let parts = v.as_tuple();
                if parts.len() != components.len() {
                    return Ok(false);
                }
                for (part, component) in parts.iter().zip(components.iter()) {
                    if !component.contains(part)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            SetValue::Maps { domain, range } => {
                let map = v.as_map();
                let keys: SortedElems = map.keys().cloned().collect();
                let domain_elems = domain.elements()?;
                if keys != domain_elems {
                    return Ok(false);
                }
                for value in map.values() {
                    if !range.contains(value)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            SetValue::Infinite(InfiniteSet::Int) => Ok(matches!(v, Value::Int(_))),
            SetValue::Infinite(InfiniteSet::Nat) => Ok(!v.as_int().is_negative()),
        }
    }

    /// Whether every element of `self` is in `other`. Enumerates `self`
    /// but only probes `other`.
    pub fn is_subset(&self, other: &SetValue) -> EvalResult<bool> {
        if let (SetValue::Explicit(a), SetValue::Explicit(b)) = (self, other) {
            return Ok(a.is_subset(b));
        }
        for v in self.elements()?.iter() {
            if !other.contains(v)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn union(&self, other: &SetValue) -> EvalResult<SetValue> {
        let a = self.elements()?;
        let b = other.elements()?;
        Ok(SetValue::Explicit(a.union(&b)))
    }

    pub fn intersect(&self, other: &SetValue) -> EvalResult<SetValue> {
        let a = self.elements()?;
        let b = other.elements()?;
        Ok(SetValue::Explicit(a.intersection(&b)))
    }

    pub fn subtract(&self, other: &SetValue) -> EvalResult<SetValue> {
        let a = self.elements()?;
        let b = other.elements()?;
        Ok(SetValue::Explicit(a.difference(&b)))
    }

    /// The canonical enumeration: sorted, deduplicated, with lazily
    /// normalized elements. Fails on the infinite markers.
    pub fn elements(&self) -> EvalResult<SortedElems> {
        match self {
            SetValue::Explicit(elems) => Ok(elems.clone()),
            _ => {
                let size = small_size(&self.cardinality()?)?;
                let mut values = Vec::with_capacity(size as usize);
                for i in 0..size {
                    values.push(self.nth(&BigInt::from(i))?);
                }
                Ok(SortedElems::from_values(values))
            }
        }
    }

    /// The element at `index` in this set's stable enumeration order:
    /// explicit sets by canonical order, intervals ascending, powersets by
    /// bitmask over the inner enumeration, cross products and map spaces
    /// in mixed-radix order. The decode never materializes the set.
    pub fn nth(&self, index: &BigInt) -> EvalResult<Value> {
        match self {
            SetValue::Explicit(elems) => {
                let i = index
                    .to_usize()
                    .filter(|i| *i < elems.len())
                    .ok_or_else(|| EvalError::Internal {
                        message: format!("set index {index} out of range"),
                        id: None,
                    })?;
                Ok(elems.as_slice()[i].clone())
            }
            SetValue::Interval(a, _) => Ok(Value::Int(a + index)),
            SetValue::Powerset(inner) => {
                let base = inner.elements()?;
                let two = BigInt::from(2);
                let mut members = Vec::new();
                let mut bits = index.clone();
                for v in base.iter() {
                    if !(&bits % &two).is_zero() {
                        members.push(v.clone());
                    }
                    bits = &bits / &two;
                }
                Ok(Value::Set(SetValue::Explicit(SortedElems::from_sorted_vec(
                    members,
                ))))
            }
            SetValue::Cross(components) => {
                let mut digits = Vec::with_capacity(components.len());
                let mut rest = index.clone();
                for component in components.iter().rev() {
                    let size = component.cardinality()?;
                    let digit = &rest % &size;
                    rest = &rest / &size;
                    digits.push(component.nth(&digit)?);
                }
                digits.reverse();
                Ok(Value::Tuple(Arc::from(digits)))
            }
            SetValue::Maps { domain, range } => {
                let keys = domain.elements()?;
                let size = range.cardinality()?;
                let mut rest = index.clone();
                let mut map = OrdMap::new();
                for key in keys.iter() {
                    let digit = &rest % &size;
                    rest = &rest / &size;
                    map.insert(key.normal_form(), range.nth(&digit)?);
                }
                Ok(Value::Map(map))
            }
            SetValue::Infinite(marker) => Err(EvalError::InfiniteSet {
                name: marker.name(),
                id: None,
            }),
        }
    }

    /// Pick the element at position `r` in `[0, 1)`: element
    /// `floor(r * |S|)` of the stable enumeration. Deterministic given
    /// `r`; fails on the empty set.
    pub fn pick(&self, position: f64) -> EvalResult<Value> {
        let card = self.cardinality()?;
        if card.is_zero() {
            return Err(EvalError::EmptySet { id: None });
        }
        let scaled = position * card.to_f64().unwrap_or(f64::MAX);
        let mut index = BigInt::from(scaled.floor() as u128);
        if index >= card {
            index = card - 1;
        }
        self.nth(&index)
    }

    /// Canonical element order for equality/ordering, or `None` when the
    /// set cannot be enumerated.
    fn canon(&self) -> Option<SortedElems> {
        self.elements().ok()
    }

    fn shape_rank(&self) -> u8 {
        match self {
            SetValue::Explicit(_) => 0,
            SetValue::Interval(_, _) => 1,
            SetValue::Powerset(_) => 2,
            SetValue::Cross(_) => 3,
            SetValue::Maps { .. } => 4,
            SetValue::Infinite(_) => 5,
        }
    }
}

/// A set size small enough to enumerate or use as an exponent.
fn small_size(card: &BigInt) -> EvalResult<u32> {
    card.to_u32().ok_or_else(|| EvalError::Internal {
        message: format!("set of cardinality {card} is too large to enumerate"),
        id: None,
    })
}

impl PartialEq for SetValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SetValue {}

impl PartialOrd for SetValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SetValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use SetValue::*;
        match (self, other) {
            (Infinite(a), Infinite(b)) => a.cmp(b),
            // Finite (or at least non-marker) sets sort below the markers.
            (Infinite(_), _) => Ordering::Greater,
            (_, Infinite(_)) => Ordering::Less,
            (Explicit(a), Explicit(b)) => a.cmp(b),
            _ => match (self.canon(), other.canon()) {
                (Some(a), Some(b)) => a.cmp(&b),
                // Unenumerable non-marker shapes (e.g. a powerset over
                // Int): fall back to a structural order. Such sets are
                // never equal to any enumerable set.
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => self
                    .shape_rank()
                    .cmp(&other.shape_rank())
                    .then_with(|| match (self, other) {
                        (Powerset(a), Powerset(b)) => a.cmp(b),
                        (Cross(a), Cross(b)) => a.cmp(b),
                        (
                            Maps {
                                domain: d1,
                                range: r1,
                            },
                            Maps {
                                domain: d2,
                                range: r2,
                            },
                        ) => d1.cmp(d2).then_with(|| r1.cmp(r2)),
                        _ => Ordering::Equal,
                    }),
            },
        }
    }
}

impl fmt::Display for SetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetValue::Explicit(elems) => {
                write!(f, "Set(")?;
                for (i, v) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            SetValue::Interval(a, b) => write!(f, "{a}.to({b})"),
            SetValue::Powerset(inner) => write!(f, "powerset({inner})"),
            SetValue::Cross(components) => {
                write!(f, "tuples(")?;
                for (i, c) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            SetValue::Maps { domain, range } => write!(f, "setOfMaps({domain}, {range})"),
            SetValue::Infinite(marker) => write!(f, "{}", marker.name()),
        }
    }
}

// ============================================================================
// LambdaValue - operators flowing as arguments
// ============================================================================

static LAMBDA_TAG: AtomicU64 = AtomicU64::new(0);

/// A compiled operator passed as a value to another operator. Lambdas have
/// no structural content; identity is a creation tag, which gives them a
/// total order without making distinct lambdas equal.
#[derive(Clone)]
pub struct LambdaValue {
    tag: u64,
    pub handle: CallableHandle,
}

impl LambdaValue {
    pub fn new(handle: CallableHandle) -> Self {
        LambdaValue {
            tag: LAMBDA_TAG.fetch_add(1, AtomicOrdering::Relaxed),
            handle,
        }
    }

    pub fn arity(&self) -> usize {
        self.handle.arity()
    }

    fn tag(&self) -> u64 {
        self.tag
    }
}

impl fmt::Debug for LambdaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LambdaValue(arity {})", self.arity())
    }
}

// ============================================================================
// Value
// ============================================================================

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(BigInt),
    Str(Arc<str>),
    Tuple(Arc<[Value]>),
    Record(OrdMap<Arc<str>, Value>),
    List(Vector<Value>),
    Set(SetValue),
    Map(OrdMap<Value, Value>),
    /// An operator flowing as an argument; never stored in state variables.
    Lambda(LambdaValue),
}

impl Value {
    // === Constructors ===

    pub fn int(value: impl Into<BigInt>) -> Value {
        Value::Int(value.into())
    }

    pub fn str(value: &str) -> Value {
        Value::Str(Arc::from(value))
    }

    pub fn tuple(values: Vec<Value>) -> Value {
        Value::Tuple(Arc::from(values))
    }

    pub fn list(values: Vec<Value>) -> Value {
        Value::List(Vector::from(values))
    }

    pub fn record(fields: impl IntoIterator<Item = (impl Into<Arc<str>>, Value)>) -> Value {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn set(values: Vec<Value>) -> Value {
        Value::Set(SetValue::of(values))
    }

    pub fn interval(a: impl Into<BigInt>, b: impl Into<BigInt>) -> Value {
        Value::Set(SetValue::Interval(a.into(), b.into()))
    }

    /// Build a map; keys are put in normal form.
    pub fn map(pairs: impl IntoIterator<Item = (Value, Value)>) -> Value {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.normal_form(), v))
                .collect(),
        )
    }

    // === Coercions ===
    //
    // The frontend type checker has already run; a shape mismatch here is
    // a bug in the compiler, not a user error.

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => unreachable!("type checker admits only booleans here"),
        }
    }

    pub fn as_int(&self) -> &BigInt {
        match self {
            Value::Int(i) => i,
            _ => unreachable!("type checker admits only integers here"),
        }
    }

    pub fn as_str(&self) -> &Arc<str> {
        match self {
            Value::Str(s) => s,
            _ => unreachable!("type checker admits only strings here"),
        }
    }

    pub fn as_tuple(&self) -> &[Value] {
        match self {
            Value::Tuple(t) => t,
            _ => unreachable!("type checker admits only tuples here"),
        }
    }

    pub fn as_record(&self) -> &OrdMap<Arc<str>, Value> {
        match self {
            Value::Record(r) => r,
            _ => unreachable!("type checker admits only records here"),
        }
    }

    pub fn as_list(&self) -> &Vector<Value> {
        match self {
            Value::List(l) => l,
            _ => unreachable!("type checker admits only lists here"),
        }
    }

    pub fn as_set(&self) -> &SetValue {
        match self {
            Value::Set(s) => s,
            _ => unreachable!("type checker admits only sets here"),
        }
    }

    pub fn as_map(&self) -> &OrdMap<Value, Value> {
        match self {
            Value::Map(m) => m,
            _ => unreachable!("type checker admits only maps here"),
        }
    }

    pub fn as_lambda(&self) -> &LambdaValue {
        match self {
            Value::Lambda(l) => l,
            _ => unreachable!("type checker admits only operators here"),
        }
    }

    /// The canonical representation used as a map key: all symbolic sets
    /// become explicit element arrays, recursively. Values containing the
    /// infinite markers keep them (the markers are their own normal form).
    pub fn normal_form(&self) -> Value {
        match self {
            Value::Bool(_) | Value::Int(_) | Value::Str(_) | Value::Lambda(_) => self.clone(),
            Value::Tuple(items) => {
                Value::tuple(items.iter().map(Value::normal_form).collect())
            }
            Value::Record(fields) => Value::Record(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.normal_form()))
                    .collect(),
            ),
            Value::List(items) => Value::List(items.iter().map(Value::normal_form).collect()),
            Value::Set(set) => match set.elements() {
                Ok(elems) => Value::Set(SetValue::Explicit(
                    elems.iter().map(Value::normal_form).collect(),
                )),
                Err(_) => self.clone(),
            },
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.normal_form(), v.normal_form()))
                    .collect(),
            ),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) => 1,
            Value::Str(_) => 2,
            Value::Tuple(_) => 3,
            Value::Record(_) => 4,
            Value::List(_) => 5,
            Value::Set(_) => 6,
            Value::Map(_) => 7,
            Value::Lambda(_) => 8,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
            (Value::Record(a), Value::Record(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (Value::Lambda(a), Value::Lambda(b)) => a.tag().cmp(&b.tag()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Record(fields) => {
                write!(f, "{{ ")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, " }}")
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Set(set) => write!(f, "{set}"),
            Value::Map(map) => {
                write!(f, "Map(")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} -> {v}")?;
                }
                write!(f, ")")
            }
            Value::Lambda(l) => write!(f, "<operator of arity {}>", l.arity()),
        }
    }
}

// JSON shape for traces, after the Informal Trace Format conventions:
// integers beyond i64 as {"#bigint": "..."}, sets as {"#set": [...]},
// tuples as {"#tup": [...]}, maps as {"#map": [[k, v], ...]}.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => match i.to_i64() {
                Some(n) => serializer.serialize_i64(n),
                None => {
                    let mut map = serializer.serialize_map(Some(1))?;
                    map.serialize_entry("#bigint", &i.to_string())?;
                    map.end()
                }
            },
            Value::Str(s) => serializer.serialize_str(s),
            Value::Tuple(items) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("#tup", &items.as_ref())?;
                map.end()
            }
            Value::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    map.serialize_entry(k.as_ref(), v)?;
                }
                map.end()
            }
            Value::List(items) => {
                let values: Vec<&Value> = items.iter().collect();
                values.serialize(serializer)
            }
            Value::Set(set) => match set {
                SetValue::Infinite(marker) => {
                    let mut map = serializer.serialize_map(Some(1))?;
                    map.serialize_entry("#infiniteSet", marker.name())?;
                    map.end()
                }
                _ => match set.elements() {
                    Ok(elems) => {
                        let mut map = serializer.serialize_map(Some(1))?;
                        map.serialize_entry("#set", elems.as_slice())?;
                        map.end()
                    }
                    Err(_) => serializer.serialize_str(&self.to_string()),
                },
            },
            Value::Map(entries) => {
                let pairs: Vec<(&Value, &Value)> = entries.iter().collect();
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("#map", &pairs)?;
                map.end()
            }
            Value::Lambda(_) => serializer.serialize_str("<operator>"),
        }
    }
}
