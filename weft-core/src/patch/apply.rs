//! Pure patch application with structural sharing.
//!
//! The input value is never mutated: the walk clones the root handle and
//! uses [`Arc::make_mut`] along the patched path, so only the spine from
//! the root to each edit is copied and every untouched subtree stays
//! shared with the input.

use std::sync::Arc;

use crate::error::PatchError;
use crate::value::{Key, Kind, Value};

use super::{Patch, PatchOp};

/// Apply `patches` in order to `value`, returning the patched copy.
///
/// Fails on the first patch whose path does not resolve, leaving no
/// partial result.
pub fn apply_patches(value: &Value, patches: &[Patch]) -> Result<Value, PatchError> {
    let mut result = value.clone();
    for patch in patches {
        apply_at(&mut result, &patch.path, 0, patch)?;
    }
    Ok(result)
}

fn apply_at(value: &mut Value, path: &[Key], depth: usize, patch: &Patch) -> Result<(), PatchError> {
    let Some((key, rest)) = path.split_first() else {
        // Only a whole-value replace makes sense at the root.
        return match patch.op {
            PatchOp::Replace => {
                *value = required_value(patch)?;
                Ok(())
            }
            PatchOp::Add | PatchOp::Remove => Err(PatchError::WrongContainer {
                kind: value.kind(),
                key: Key::Index(0),
                depth,
            }),
        };
    };

    if rest.is_empty() {
        return apply_op(value, key, depth, patch);
    }

    let child = descend(value, key, depth)?;
    apply_at(child, rest, depth + 1, patch)
}

/// Mutable access to the child at `key`, copying the container if it is
/// shared.
fn descend<'a>(value: &'a mut Value, key: &Key, depth: usize) -> Result<&'a mut Value, PatchError> {
    let kind = value.kind();
    match value {
        Value::List(items) | Value::Set(items) => {
            let index = index_key(kind, key, depth)?;
            Arc::make_mut(items)
                .get_mut(index)
                .ok_or(PatchError::PathNotFound {
                    key: key.clone(),
                    depth,
                })
        }
        Value::Record(entries) => {
            let Key::Text(name) = key else {
                return Err(PatchError::WrongContainer {
                    kind,
                    key: key.clone(),
                    depth,
                });
            };
            Arc::make_mut(entries)
                .get_mut(name)
                .ok_or(PatchError::PathNotFound {
                    key: key.clone(),
                    depth,
                })
        }
        Value::Map(entries) => {
            Arc::make_mut(entries)
                .get_mut(key)
                .ok_or(PatchError::PathNotFound {
                    key: key.clone(),
                    depth,
                })
        }
        _ => Err(PatchError::WrongContainer {
            kind,
            key: key.clone(),
            depth,
        }),
    }
}

fn apply_op(value: &mut Value, key: &Key, depth: usize, patch: &Patch) -> Result<(), PatchError> {
    let kind = value.kind();
    match value {
        Value::List(items) | Value::Set(items) => {
            let index = index_key(kind, key, depth)?;
            let items = Arc::make_mut(items);
            match patch.op {
                PatchOp::Add => {
                    if index > items.len() {
                        return Err(PatchError::IndexOutOfRange {
                            index,
                            len: items.len(),
                        });
                    }
                    items.insert(index, required_value(patch)?);
                }
                PatchOp::Remove => {
                    if index >= items.len() {
                        return Err(PatchError::PathNotFound {
                            key: key.clone(),
                            depth,
                        });
                    }
                    items.remove(index);
                }
                PatchOp::Replace => {
                    let slot = items.get_mut(index).ok_or(PatchError::PathNotFound {
                        key: key.clone(),
                        depth,
                    })?;
                    *slot = required_value(patch)?;
                }
            }
            Ok(())
        }
        Value::Record(entries) => {
            let Key::Text(name) = key else {
                return Err(PatchError::WrongContainer {
                    kind,
                    key: key.clone(),
                    depth,
                });
            };
            let entries = Arc::make_mut(entries);
            match patch.op {
                PatchOp::Add => {
                    entries.insert(name.clone(), required_value(patch)?);
                }
                PatchOp::Remove => {
                    entries
                        .shift_remove(name)
                        .ok_or(PatchError::PathNotFound {
                            key: key.clone(),
                            depth,
                        })?;
                }
                PatchOp::Replace => {
                    let slot = entries.get_mut(name).ok_or(PatchError::PathNotFound {
                        key: key.clone(),
                        depth,
                    })?;
                    *slot = required_value(patch)?;
                }
            }
            Ok(())
        }
        Value::Map(entries) => {
            let entries = Arc::make_mut(entries);
            match patch.op {
                PatchOp::Add => {
                    entries.insert(key.clone(), required_value(patch)?);
                }
                PatchOp::Remove => {
                    entries.shift_remove(key).ok_or(PatchError::PathNotFound {
                        key: key.clone(),
                        depth,
                    })?;
                }
                PatchOp::Replace => {
                    let slot = entries.get_mut(key).ok_or(PatchError::PathNotFound {
                        key: key.clone(),
                        depth,
                    })?;
                    *slot = required_value(patch)?;
                }
            }
            Ok(())
        }
        _ => Err(PatchError::WrongContainer {
            kind,
            key: key.clone(),
            depth,
        }),
    }
}

fn index_key(kind: Kind, key: &Key, depth: usize) -> Result<usize, PatchError> {
    match key {
        Key::Index(index) => Ok(*index),
        Key::Text(_) => Err(PatchError::WrongContainer {
            kind,
            key: key.clone(),
            depth,
        }),
    }
}

fn required_value(patch: &Patch) -> Result<Value, PatchError> {
    patch.value.clone().ok_or(PatchError::MissingValue {
        op: patch.op.name(),
    })
}
