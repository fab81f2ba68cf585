/*
 * Copyright Cedar Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::ast::{EntityUID, Literal, StaticallyTyped, Type};
use crate::evaluator::{EvaluationError, Result};
use crate::extensions::ExtensionValue;
use nonempty::nonempty;
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// This describes all the values which could be the dynamic result of
/// evaluating an `Expr`. Cloning is O(1).
#[derive(Debug, Clone, PartialOrd, Ord)]
pub enum Value {
    /// anything that is a Literal can also be the dynamic result of
    /// evaluating an `Expr`
    Lit(Literal),
    /// Evaluating an `Expr` can result in a first-class set
    Set(Set),
    /// Evaluating an `Expr` can result in a first-class anonymous record
    /// (keyed on String)
    Record(Arc<BTreeMap<SmolStr, Value>>),
    /// Evaluating an `Expr` can result in an extension value
    Ext(ExtensionValue),
}

/// `Value`'s internal representation of a `Set`
#[derive(Debug, Clone)]
pub struct Set {
    /// the values in the set, stored in a `BTreeSet`
    pub authoritative: Arc<BTreeSet<Value>>,
    /// if possible, `HashSet<Literal>` representation of the set.
    /// (This is possible if all the elements are literals.)
    /// Some operations are much faster in this case.
    ///
    /// INVARIANT (FastRepr)
    /// we guarantee that if the elements are all literals, then this will
    /// be `Some`. (This allows us to further optimize e.g. equality checks
    /// between sets: for instance, we know that if one set has `fast` and
    /// another does not, the sets can't be equal.)
    pub fast: Option<Arc<HashSet<Literal>>>,
}

impl Set {
    /// Get the number of items in the set
    pub fn len(&self) -> usize {
        self.authoritative.len()
    }

    /// Convenience method to check if a set is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrowed iterator
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.authoritative.iter()
    }

    /// Whether the set contains the given value
    pub fn contains(&self, v: &Value) -> bool {
        match (&self.fast, v) {
            (Some(fast), Value::Lit(lit)) => fast.contains(lit),
            // due to the FastRepr invariant, a fast set contains no non-literals
            (Some(_), _) => false,
            (None, _) => self.authoritative.contains(v),
        }
    }
}

impl FromIterator<Value> for Set {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        let authoritative: BTreeSet<Value> = iter.into_iter().collect();
        // INVARIANT (FastRepr): `fast` is `Some` iff every element is a literal
        let fast: Option<HashSet<Literal>> = authoritative
            .iter()
            .map(|v| v.try_as_lit().cloned())
            .collect();
        Self {
            authoritative: Arc::new(authoritative),
            fast: fast.map(Arc::new),
        }
    }
}

// PartialEq on Set compares only the `authoritative` version, except that
// the fast reprs let us conclude inequality early
impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        match (&self.fast, &other.fast) {
            (Some(f1), Some(f2)) => f1 == f2,
            // due to the FastRepr invariant, one set contains a non-literal
            // and the other does not
            (Some(_), None) | (None, Some(_)) => false,
            (None, None) => self.authoritative.as_ref() == other.authoritative.as_ref(),
        }
    }
}

impl Eq for Set {}

// PartialOrd/Ord on Set compare only the `authoritative` version; note that
// HashSet doesn't implement Ord
impl PartialOrd for Set {
    fn partial_cmp(&self, other: &Set) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Set {
    fn cmp(&self, other: &Set) -> std::cmp::Ordering {
        self.authoritative
            .as_ref()
            .cmp(other.authoritative.as_ref())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Lit(l1), Value::Lit(l2)) => l1 == l2,
            (Value::Set(s1), Value::Set(s2)) => s1 == s2,
            (Value::Record(r1), Value::Record(r2)) => r1 == r2,
            (Value::Ext(e1), Value::Ext(e2)) => e1 == e2,
            (_, _) => false, // values of different types are not equal
        }
    }
}

impl Eq for Value {}

impl StaticallyTyped for Value {
    fn type_of(&self) -> Type {
        match self {
            Self::Lit(lit) => lit.type_of(),
            Self::Set(_) => Type::Set,
            Self::Record(_) => Type::Record,
            Self::Ext(ev) => ev.type_of(),
        }
    }
}

impl Value {
    /// Create a new empty set
    pub fn empty_set() -> Self {
        Self::Set(Set {
            authoritative: Arc::new(BTreeSet::new()),
            fast: Some(Arc::new(HashSet::new())),
        })
    }

    /// Create a new empty record
    pub fn empty_record() -> Self {
        Self::Record(Arc::new(BTreeMap::new()))
    }

    /// Create a set with the given `Value`s as elements
    pub fn set(vals: impl IntoIterator<Item = Value>) -> Self {
        Self::Set(vals.into_iter().collect())
    }

    /// Create a record with the given (key, value) pairs
    pub fn record<K: Into<SmolStr>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Record(Arc::new(
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// If the value is a Literal, get a reference to the underlying Literal
    pub(crate) fn try_as_lit(&self) -> Option<&Literal> {
        match self {
            Self::Lit(lit) => Some(lit),
            _ => None,
        }
    }

    /// Get the underlying `bool`, or a type error
    pub fn get_as_bool(&self) -> Result<bool> {
        match self {
            Self::Lit(Literal::Bool(b)) => Ok(*b),
            _ => Err(EvaluationError::type_error(
                nonempty![Type::Bool],
                self.type_of(),
            )),
        }
    }

    /// Get the underlying `i64`, or a type error
    pub fn get_as_long(&self) -> Result<i64> {
        match self {
            Self::Lit(Literal::Long(i)) => Ok(*i),
            _ => Err(EvaluationError::type_error(
                nonempty![Type::Long],
                self.type_of(),
            )),
        }
    }

    /// Get the underlying string, or a type error
    pub fn get_as_string(&self) -> Result<&SmolStr> {
        match self {
            Self::Lit(Literal::String(s)) => Ok(s),
            _ => Err(EvaluationError::type_error(
                nonempty![Type::String],
                self.type_of(),
            )),
        }
    }

    /// Get the underlying `Set`, or a type error
    pub fn get_as_set(&self) -> Result<&Set> {
        match self {
            Self::Set(s) => Ok(s),
            _ => Err(EvaluationError::type_error(
                nonempty![Type::Set],
                self.type_of(),
            )),
        }
    }

    /// Get the underlying record, or a type error
    pub fn get_as_record(&self) -> Result<&Arc<BTreeMap<SmolStr, Value>>> {
        match self {
            Self::Record(r) => Ok(r),
            _ => Err(EvaluationError::type_error(
                nonempty![Type::Record],
                self.type_of(),
            )),
        }
    }

    /// Get the underlying entity UID, or a type error
    pub fn get_as_entity(&self) -> Result<&Arc<EntityUID>> {
        match self {
            Self::Lit(Literal::EntityUID(uid)) => Ok(uid),
            _ => Err(EvaluationError::type_error(
                nonempty![Type::Entity],
                self.type_of(),
            )),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lit(lit) => write!(f, "{lit}"),
            Self::Set(set) => match set.len() {
                0 => write!(f, "[]"),
                1..=5 => {
                    write!(f, "[")?;
                    for item in set.iter() {
                        write!(f, "{item}, ")?;
                    }
                    write!(f, "]")
                }
                n => write!(f, "<set with {n} elements>"),
            },
            Self::Record(record) => write!(f, "<first-class record with {} fields>", record.len()),
            Self::Ext(ev) => write!(f, "{ev}"),
        }
    }
}

/// Create a `Value` directly from a `Vec<Value>`, or `Vec<T> where
/// T: Into<Value>` (so `Vec<i64>`, `Vec<String>`, etc)
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::set(v.into_iter().map(Into::into))
    }
}

/// Create a `Value::Record` from a map of `SmolStr` to `Value`
impl From<BTreeMap<SmolStr, Value>> for Value {
    fn from(map: BTreeMap<SmolStr, Value>) -> Self {
        Self::Record(Arc::new(map))
    }
}

/// Create a `Value` directly from a `Literal`, or from anything that
/// implements `Into<Literal>` (so `i64`, `&str`, `EntityUID`, etc)
impl<T: Into<Literal>> From<T> for Value {
    fn from(lit: T) -> Self {
        Self::Lit(lit.into())
    }
}

impl From<ExtensionValue> for Value {
    fn from(ev: ExtensionValue) -> Self {
        Self::Ext(ev)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn values() {
        assert_eq!(Value::from(true), Value::Lit(Literal::Bool(true)));
        assert_eq!(Value::from(23), Value::Lit(Literal::Long(23)));
        assert_eq!(
            Value::from("hello"),
            Value::Lit(Literal::String("hello".into()))
        );
        assert_eq!(
            Value::from(vec![2, -3, 40]),
            Value::set(vec![Value::from(2), Value::from(-3), Value::from(40)])
        );
        assert_eq!(
            Value::from(EntityUID::new("User", "alice")),
            Value::Lit(Literal::EntityUID(Arc::new(EntityUID::new("User", "alice"))))
        );
    }

    #[test]
    fn cross_variant_equality_is_false() {
        assert_ne!(Value::from(false), Value::from(0));
        assert_ne!(Value::from("1"), Value::from(1));
        assert_ne!(Value::from(1), Value::set([Value::from(1)]));
        assert_ne!(Value::empty_set(), Value::empty_record());
    }

    #[test]
    fn set_dedup_and_order_insensitivity() {
        assert_eq!(
            Value::set([Value::from(1), Value::from(2), Value::from(1)]),
            Value::set([Value::from(2), Value::from(1)])
        );
    }

    #[test]
    fn set_fast_repr() {
        // all literals: fast repr must be present
        let s: Set = [Value::from(1), Value::from("a")].into_iter().collect();
        assert!(s.fast.is_some());
        // a nested set is not a literal: no fast repr
        let s: Set = [Value::from(1), Value::empty_set()].into_iter().collect();
        assert!(s.fast.is_none());
        // fast and non-fast sets are never equal
        let fast: Set = [Value::from(1)].into_iter().collect();
        let slow: Set = [Value::empty_set()].into_iter().collect();
        assert_ne!(Value::Set(fast), Value::Set(slow));
    }

    #[test]
    fn set_contains() {
        let s: Set = [Value::from(1), Value::from("a")].into_iter().collect();
        assert!(s.contains(&Value::from(1)));
        assert!(s.contains(&Value::from("a")));
        assert!(!s.contains(&Value::from(2)));
        assert!(!s.contains(&Value::empty_set()));
    }

    #[test]
    fn value_types() {
        assert_eq!(Value::from(false).type_of(), Type::Bool);
        assert_eq!(Value::from(23).type_of(), Type::Long);
        assert_eq!(Value::from("hello").type_of(), Type::String);
        assert_eq!(Value::empty_set().type_of(), Type::Set);
        assert_eq!(Value::empty_record().type_of(), Type::Record);
        assert_eq!(
            Value::from(EntityUID::new("User", "alice")).type_of(),
            Type::Entity
        );
    }
}
