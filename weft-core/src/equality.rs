//! Equality Engine
//!
//! Everywhere the library deduplicates notifications it goes through one
//! of three comparators:
//!
//! - [`strict_eq`]: scalars by value, composites by shared-pointer
//!   identity. Replacing a record with a freshly built, structurally equal
//!   record *is* a change under this comparator.
//! - [`shallow_eq`]: same kind and length, each direct child compared with
//!   [`strict_eq`].
//! - [`deep_eq`]: full structural comparison.
//!
//! Generic stores use an [`Equality`] gate instead: by default every `set`
//! counts as a change, and callers opt into structural or custom
//! comparison per subscription.

use std::sync::Arc;

use crate::value::Value;

/// Scalars by value, composites by `Arc` identity.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::List(x), Value::List(y)) => Arc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Arc::ptr_eq(x, y),
        (Value::Record(x), Value::Record(y)) => Arc::ptr_eq(x, y),
        (Value::Map(x), Value::Map(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// One level of structure, children compared with [`strict_eq`].
pub fn shallow_eq(a: &Value, b: &Value) -> bool {
    if strict_eq(a, b) {
        return true;
    }
    match (a, b) {
        (Value::List(x), Value::List(y)) | (Value::Set(x), Value::Set(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(u, v)| strict_eq(u, v))
        }
        (Value::Record(x), Value::Record(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, u)| y.get(k).is_some_and(|v| strict_eq(u, v)))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, u)| y.get(k).is_some_and(|v| strict_eq(u, v)))
        }
        _ => false,
    }
}

/// Full structural comparison.
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    a == b
}

/// The comparator a subscription uses to decide whether a newly delivered
/// value counts as a change.
#[derive(Clone)]
pub enum Equality<T> {
    /// Every delivery counts as a change. This is the default and matches
    /// strict comparison for values rebuilt on each `set`.
    Always,
    /// Deliveries equal to the last delivered value (per the comparator)
    /// are suppressed.
    By(Arc<dyn Fn(&T, &T) -> bool + Send + Sync>),
}

impl<T> Equality<T> {
    /// Gate on the given comparator.
    pub fn by(compare: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        Equality::By(Arc::new(compare))
    }

    /// Gate on `PartialEq` (structural comparison for [`Value`]).
    pub fn structural() -> Self
    where
        T: PartialEq,
    {
        Equality::by(|a: &T, b: &T| a == b)
    }

    /// Whether `next` should be considered unchanged relative to `last`.
    pub fn is_equal(&self, last: &T, next: &T) -> bool {
        match self {
            Equality::Always => false,
            Equality::By(compare) => compare(last, next),
        }
    }
}

impl<T> Default for Equality<T> {
    fn default() -> Self {
        Equality::Always
    }
}

impl Equality<Value> {
    /// Gate on [`strict_eq`].
    pub fn strict() -> Self {
        Equality::by(strict_eq)
    }

    /// Gate on [`shallow_eq`].
    pub fn shallow() -> Self {
        Equality::by(shallow_eq)
    }

    /// Gate on [`deep_eq`].
    pub fn deep() -> Self {
        Equality::by(deep_eq)
    }
}
