//! Typed container actions for `Store<Value>`.
//!
//! Domain mutators are attached to a store as explicit handles over the
//! store rather than methods patched onto a shared type. Each handle
//! checks the container kind on every operation and reports
//! [`StoreError::KindMismatch`] when the store holds something else.
//!
//! Handles clone cheaply (they hold a store handle) and compose freely:
//! several handles over the same store stay coherent because every
//! mutation goes through the store's own `set`.

use std::sync::Arc;

use crate::equality::deep_eq;
use crate::error::StoreError;
use crate::value::{Key, Kind, Value};

use super::core::Store;

impl Store<Value> {
    /// List operations over this store. Fails per-operation if the store
    /// does not currently hold a list.
    pub fn as_list(&self) -> ListHandle {
        ListHandle {
            store: self.clone(),
        }
    }

    /// Record operations over this store.
    pub fn as_record(&self) -> RecordHandle {
        RecordHandle {
            store: self.clone(),
        }
    }

    /// Map operations over this store.
    pub fn as_map(&self) -> MapHandle {
        MapHandle {
            store: self.clone(),
        }
    }

    /// Set operations over this store. Membership is decided by deep
    /// equality; iteration order is insertion order.
    pub fn as_set(&self) -> SetHandle {
        SetHandle {
            store: self.clone(),
        }
    }
}

fn expect_kind(value: &Value, expected: Kind) -> Result<(), StoreError> {
    if value.kind() == expected {
        Ok(())
    } else {
        Err(StoreError::KindMismatch {
            expected,
            found: value.kind(),
        })
    }
}

/// Mutators for a store holding a [`Value::List`].
#[derive(Clone)]
pub struct ListHandle {
    store: Store<Value>,
}

impl ListHandle {
    /// Append an element.
    pub fn push(&self, item: impl Into<Value>) -> Result<(), StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::List)?;
        if let Value::List(items) = current {
            let mut next = (*items).clone();
            next.push(item.into());
            self.store.set(Value::List(Arc::new(next)));
        }
        Ok(())
    }

    /// Remove and return the element at `index`, if present.
    pub fn remove(&self, index: usize) -> Result<Option<Value>, StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::List)?;
        if let Value::List(items) = current {
            if index >= items.len() {
                return Ok(None);
            }
            let mut next = (*items).clone();
            let removed = next.remove(index);
            self.store.set(Value::List(Arc::new(next)));
            return Ok(Some(removed));
        }
        Ok(None)
    }

    /// Replace the element at `index`. Out-of-range indexes are ignored.
    pub fn set_at(&self, index: usize, item: impl Into<Value>) -> Result<(), StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::List)?;
        if let Value::List(items) = current {
            if index < items.len() {
                let mut next = (*items).clone();
                next[index] = item.into();
                self.store.set(Value::List(Arc::new(next)));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::List)?;
        Ok(current.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Mutators for a store holding a [`Value::Record`].
#[derive(Clone)]
pub struct RecordHandle {
    store: Store<Value>,
}

impl RecordHandle {
    /// Insert or replace a field, returning the previous value.
    pub fn insert(
        &self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::Record)?;
        if let Value::Record(entries) = current {
            let mut next = (*entries).clone();
            let previous = next.insert(name.into(), value.into());
            self.store.set(Value::Record(Arc::new(next)));
            return Ok(previous);
        }
        Ok(None)
    }

    /// Remove a field, returning its value. Preserves field order.
    pub fn remove(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::Record)?;
        if let Value::Record(entries) = current {
            if !entries.contains_key(name) {
                return Ok(None);
            }
            let mut next = (*entries).clone();
            let removed = next.shift_remove(name);
            self.store.set(Value::Record(Arc::new(next)));
            return Ok(removed);
        }
        Ok(None)
    }
}

/// Mutators for a store holding a [`Value::Map`].
#[derive(Clone)]
pub struct MapHandle {
    store: Store<Value>,
}

impl MapHandle {
    /// Insert or replace an entry, returning the previous value.
    pub fn insert(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::Map)?;
        if let Value::Map(entries) = current {
            let mut next = (*entries).clone();
            let previous = next.insert(key.into(), value.into());
            self.store.set(Value::Map(Arc::new(next)));
            return Ok(previous);
        }
        Ok(None)
    }

    /// Remove an entry, returning its value. Preserves entry order.
    pub fn remove(&self, key: &Key) -> Result<Option<Value>, StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::Map)?;
        if let Value::Map(entries) = current {
            if !entries.contains_key(key) {
                return Ok(None);
            }
            let mut next = (*entries).clone();
            let removed = next.shift_remove(key);
            self.store.set(Value::Map(Arc::new(next)));
            return Ok(removed);
        }
        Ok(None)
    }
}

/// Mutators for a store holding a [`Value::Set`].
#[derive(Clone)]
pub struct SetHandle {
    store: Store<Value>,
}

impl SetHandle {
    /// Insert an element if no deep-equal element is present. Returns
    /// whether the set changed.
    pub fn insert(&self, item: impl Into<Value>) -> Result<bool, StoreError> {
        let item = item.into();
        let current = self.store.get();
        expect_kind(&current, Kind::Set)?;
        if let Value::Set(items) = current {
            if items.iter().any(|existing| deep_eq(existing, &item)) {
                return Ok(false);
            }
            let mut next = (*items).clone();
            next.push(item);
            self.store.set(Value::Set(Arc::new(next)));
            return Ok(true);
        }
        Ok(false)
    }

    /// Remove the first deep-equal element. Returns whether the set
    /// changed.
    pub fn remove(&self, item: &Value) -> Result<bool, StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::Set)?;
        if let Value::Set(items) = current {
            let Some(position) = items.iter().position(|existing| deep_eq(existing, item)) else {
                return Ok(false);
            };
            let mut next = (*items).clone();
            next.remove(position);
            self.store.set(Value::Set(Arc::new(next)));
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether a deep-equal element is present.
    pub fn contains(&self, item: &Value) -> Result<bool, StoreError> {
        let current = self.store.get();
        expect_kind(&current, Kind::Set)?;
        if let Value::Set(items) = current {
            return Ok(items.iter().any(|existing| deep_eq(existing, item)));
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_handle_mutates_through_set() {
        let store = Store::new(Value::list([1, 2]));
        let list = store.as_list();

        list.push(3).unwrap();
        assert_eq!(store.get(), Value::list([1, 2, 3]));

        assert_eq!(list.remove(0).unwrap(), Some(Value::Int(1)));
        assert_eq!(store.get(), Value::list([2, 3]));

        list.set_at(1, 9).unwrap();
        assert_eq!(store.get(), Value::list([2, 9]));
        assert_eq!(list.len().unwrap(), 2);
    }

    #[test]
    fn record_handle_preserves_order_on_remove() {
        let store = Store::new(Value::record([("a", 1), ("b", 2), ("c", 3)]));
        let record = store.as_record();

        assert_eq!(record.remove("b").unwrap(), Some(Value::Int(2)));
        assert_eq!(store.get(), Value::record([("a", 1), ("c", 3)]));

        record.insert("d", 4).unwrap();
        assert_eq!(store.get(), Value::record([("a", 1), ("c", 3), ("d", 4)]));
    }

    #[test]
    fn set_handle_dedups_by_deep_equality() {
        let store = Store::new(Value::set([Value::record([("id", 1)])]));
        let set = store.as_set();

        // Structurally equal element: no change.
        assert!(!set.insert(Value::record([("id", 1)])).unwrap());
        assert!(set.insert(Value::record([("id", 2)])).unwrap());
        assert!(set.contains(&Value::record([("id", 2)])).unwrap());
        assert!(set.remove(&Value::record([("id", 1)])).unwrap());
        assert_eq!(store.get().len(), 1);
    }

    #[test]
    fn handle_reports_kind_mismatch() {
        let store = Store::new(Value::Int(3));
        let err = store.as_list().push(1).unwrap_err();
        assert_eq!(
            err,
            StoreError::KindMismatch {
                expected: Kind::List,
                found: Kind::Int,
            }
        );
    }

    #[test]
    fn map_handle_accepts_mixed_keys() {
        let store = Store::new(Value::map([(Key::from("a"), Value::Int(1))]));
        let map = store.as_map();

        map.insert(Key::Index(2), "two").unwrap();
        assert_eq!(
            store.get().child(&Key::Index(2)),
            Some(&Value::Text("two".to_string()))
        );
        assert_eq!(map.remove(&Key::from("a")).unwrap(), Some(Value::Int(1)));
    }
}
