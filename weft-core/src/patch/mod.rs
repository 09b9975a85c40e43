//! Structural diffing and patching of [`Value`] trees.
//!
//! [`diff`] compares two values and produces a forward patch list plus an
//! inverse list; [`apply_patches`] replays a list against a value without
//! mutating it, sharing every untouched subtree with the input. The two
//! compose: applying the forward patches to the old value yields the new
//! one, and applying the inverse patches to the new value yields the old
//! one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{Key, Value};

mod apply;
mod diff;
mod store_ext;

pub use apply::apply_patches;
pub use diff::{diff, diff_with, DiffOptions, StopAt};

/// The three patch operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

impl PatchOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Replace => "replace",
        }
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One structural edit: an operation, the path it applies at, and (for
/// `add`/`replace`) the value it carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub op: PatchOp,
    pub path: Vec<Key>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Patch {
    pub fn add(path: Vec<Key>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value: Some(value),
        }
    }

    pub fn remove(path: Vec<Key>) -> Self {
        Self {
            op: PatchOp::Remove,
            path,
            value: None,
        }
    }

    pub fn replace(path: Vec<Key>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path,
            value: Some(value),
        }
    }
}

/// Forward and inverse patch lists produced by one diff.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiffResult {
    /// Applied in order to the old value, produce the new value.
    pub patches: Vec<Patch>,

    /// Applied in order to the new value, produce the old value.
    pub inverse: Vec<Patch>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_serializes_without_null_value() {
        let patch = Patch::remove(vec![Key::from("name")]);
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"op":"remove","path":["name"]}"#);

        let patch = Patch::add(vec![Key::from(0usize)], Value::from(3i64));
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"op":"add","path":[0],"value":{"int":3}}"#);

        let back: Patch = serde_json::from_str(&json).unwrap();
        assert_eq!(back.op, PatchOp::Add);
        assert_eq!(back.value, Some(Value::from(3i64)));
    }
}
