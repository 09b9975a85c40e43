//! Value Model
//!
//! Stores that participate in diffing, patching, and synchronization hold
//! a [`Value`]: a tagged variant over the container kinds the library
//! understands. Choosing the kind at construction time lets every
//! downstream engine dispatch on the tag instead of probing the runtime
//! shape of the data.
//!
//! # Structural Sharing
//!
//! Composite variants keep their children behind an [`Arc`]. Cloning a
//! `Value` is cheap, and patch application uses [`Arc::make_mut`] to copy
//! only the nodes along the edited path. The shared pointers also give the
//! equality engine a real notion of identity: two values built
//! independently are never identical, even when they are structurally
//! equal.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One path element addressing into a composite [`Value`].
///
/// Record fields and map string-keys address by [`Key::Text`]; list
/// elements, set elements, and map integer-keys address by [`Key::Index`].
/// On the wire a key is a bare string or number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// A positional key (list index, set position, or integer map key).
    Index(usize),
    /// A named key (record field or string map key).
    Text(String),
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Text(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Text(name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Text(s) => write!(f, "{s}"),
        }
    }
}

/// The container kind of a [`Value`], used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Bool,
    Int,
    Float,
    Text,
    List,
    Record,
    Map,
    Set,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Null => "null",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Text => "text",
            Kind::List => "list",
            Kind::Record => "record",
            Kind::Map => "map",
            Kind::Set => "set",
        };
        f.write_str(name)
    }
}

/// A structured value held by a diffable store.
///
/// # Variants
///
/// - Scalars: `Null`, `Bool`, `Int`, `Float`, `Text`.
/// - `List`: ordered, index-addressed.
/// - `Record`: string-keyed, insertion-ordered.
/// - `Map`: keyed by [`Key`] (string or integer), insertion-ordered.
/// - `Set`: ordered collection diffed by iteration position. Two sets with
///   the same elements in different insertion order are *not* treated as
///   equal by the diff engine; this mirrors the upstream behavior and is a
///   documented limitation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Arc<Vec<Value>>),
    Record(Arc<IndexMap<String, Value>>),
    Map(#[serde(with = "map_entries")] Arc<IndexMap<Key, Value>>),
    Set(Arc<Vec<Value>>),
}

impl Value {
    /// Build a list from an iterator of values.
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    /// Build a record from `(name, value)` pairs, preserving order.
    pub fn record<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Record(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Build a map from `(key, value)` pairs, preserving order.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        Value::Map(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Build a set from an iterator of values, preserving iteration order.
    pub fn set<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::Set(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    /// The container kind of this value.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Text(_) => Kind::Text,
            Value::List(_) => Kind::List,
            Value::Record(_) => Kind::Record,
            Value::Map(_) => Kind::Map,
            Value::Set(_) => Kind::Set,
        }
    }

    /// True for `List`, `Record`, `Map`, and `Set`.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Value::List(_) | Value::Record(_) | Value::Map(_) | Value::Set(_)
        )
    }

    /// Number of direct children, or 0 for scalars.
    pub fn len(&self) -> usize {
        match self {
            Value::List(items) | Value::Set(items) => items.len(),
            Value::Record(entries) => entries.len(),
            Value::Map(entries) => entries.len(),
            _ => 0,
        }
    }

    /// True when the value has no direct children.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a direct child by key.
    ///
    /// Positional keys address lists and sets; text keys address records;
    /// maps accept either.
    pub fn child(&self, key: &Key) -> Option<&Value> {
        match (self, key) {
            (Value::List(items), Key::Index(i)) => items.get(*i),
            (Value::Set(items), Key::Index(i)) => items.get(*i),
            (Value::Record(entries), Key::Text(name)) => entries.get(name),
            (Value::Map(entries), _) => entries.get(key),
            _ => None,
        }
    }

    /// Iterate `(key, child)` pairs of a composite value.
    ///
    /// Scalars yield nothing.
    pub fn children(&self) -> Vec<(Key, &Value)> {
        match self {
            Value::List(items) | Value::Set(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::Index(i), v))
                .collect(),
            Value::Record(entries) => entries
                .iter()
                .map(|(k, v)| (Key::Text(k.clone()), v))
                .collect(),
            Value::Map(entries) => entries.iter().map(|(k, v)| (k.clone(), v)).collect(),
            _ => Vec::new(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Serialize map entries as a sequence of `[key, value]` pairs.
///
/// JSON object keys must be strings, but map keys may be integers, so the
/// wire representation is an entry list rather than an object.
mod map_entries {
    use super::{Key, Value};
    use indexmap::IndexMap;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(entries: &Arc<IndexMap<Key, Value>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(entries.len()))?;
        for pair in entries.iter() {
            seq.serialize_element(&pair)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<IndexMap<Key, Value>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs = Vec::<(Key, Value)>::deserialize(deserializer)?;
        Ok(Arc::new(pairs.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_lookup_by_kind() {
        let list = Value::list([1, 2, 3]);
        assert_eq!(list.child(&Key::Index(1)), Some(&Value::Int(2)));
        assert_eq!(list.child(&Key::Index(9)), None);
        assert_eq!(list.child(&Key::from("a")), None);

        let record = Value::record([("a", 1), ("b", 2)]);
        assert_eq!(record.child(&Key::from("b")), Some(&Value::Int(2)));

        let map = Value::map([(Key::Index(7), "seven")]);
        assert_eq!(
            map.child(&Key::Index(7)),
            Some(&Value::Text("seven".to_string()))
        );
    }

    #[test]
    fn children_enumerate_in_order() {
        let record = Value::record([("x", 1), ("y", 2)]);
        let keys: Vec<Key> = record.children().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Key::from("x"), Key::from("y")]);

        let set = Value::set(["a", "b"]);
        let keys: Vec<Key> = set.children().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Key::Index(0), Key::Index(1)]);
    }

    #[test]
    fn structural_equality_ignores_sharing() {
        let a = Value::record([("a", 1)]);
        let b = Value::record([("a", 1)]);
        assert_eq!(a, b);

        let c = a.clone();
        assert_eq!(a, c);
    }

    #[test]
    fn keys_serialize_bare() {
        let index = serde_json::to_string(&Key::Index(3)).unwrap();
        assert_eq!(index, "3");
        let text = serde_json::to_string(&Key::from("name")).unwrap();
        assert_eq!(text, "\"name\"");

        let back: Key = serde_json::from_str("3").unwrap();
        assert_eq!(back, Key::Index(3));
        let back: Key = serde_json::from_str("\"name\"").unwrap();
        assert_eq!(back, Key::from("name"));
    }

    #[test]
    fn value_round_trips_through_json() {
        let value = Value::record([
            ("title", Value::from("weft")),
            ("tags", Value::set(["a", "b"])),
            ("ratios", Value::list([1.5, 2.5])),
            ("index", Value::map([(Key::Index(1), Value::from(true))])),
        ]);

        let text = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, back);
    }
}
