//! Structural diff between two values.
//!
//! The walk uses the strict equality of [`crate::equality`]: a shared
//! composite (`Arc`-identical) or an equal scalar produces no patches, so
//! diffing a value against an updated copy only visits the spine that was
//! actually rewritten. Kind changes and scalar changes emit a single
//! `replace` of the subtree; composites of the same kind are descended
//! key by key. Lists and sets are compared positionally, with length
//! changes expressed as `add`/`remove` at the tail.

use std::sync::Arc;

use crate::equality::{deep_eq, strict_eq};
use crate::value::{Key, Value};

use super::{DiffResult, Patch};

/// A bound on how deep the diff descends. At the boundary the whole
/// subtree is replaced instead of being walked.
pub enum StopAt {
    /// Stop at paths of this length. `Depth(0)` never descends: any
    /// difference is one root replace.
    Depth(usize),

    /// Stop wherever the predicate holds for the subtree's path.
    Where(Arc<dyn Fn(&[Key]) -> bool + Send + Sync>),
}

impl StopAt {
    pub fn at(predicate: impl Fn(&[Key]) -> bool + Send + Sync + 'static) -> Self {
        StopAt::Where(Arc::new(predicate))
    }

    fn stops(&self, path: &[Key]) -> bool {
        match self {
            StopAt::Depth(limit) => path.len() >= *limit,
            StopAt::Where(predicate) => predicate(path),
        }
    }
}

impl Clone for StopAt {
    fn clone(&self) -> Self {
        match self {
            StopAt::Depth(limit) => StopAt::Depth(*limit),
            StopAt::Where(predicate) => StopAt::Where(Arc::clone(predicate)),
        }
    }
}

#[derive(Clone, Default)]
pub struct DiffOptions {
    pub stop_at: Option<StopAt>,
}

impl DiffOptions {
    pub fn stop_at(mut self, stop_at: StopAt) -> Self {
        self.stop_at = Some(stop_at);
        self
    }
}

/// Diff `old` against `new` with default options (unbounded descent).
pub fn diff(old: &Value, new: &Value) -> DiffResult {
    diff_with(old, new, &DiffOptions::default())
}

/// Diff `old` against `new`.
pub fn diff_with(old: &Value, new: &Value, options: &DiffOptions) -> DiffResult {
    let mut out = DiffResult::default();
    let mut path = Vec::new();
    diff_into(old, new, &mut path, options, &mut out);
    out
}

fn diff_into(
    old: &Value,
    new: &Value,
    path: &mut Vec<Key>,
    options: &DiffOptions,
    out: &mut DiffResult,
) {
    if strict_eq(old, new) {
        return;
    }

    let bounded = options
        .stop_at
        .as_ref()
        .is_some_and(|stop| stop.stops(path));
    if bounded && deep_eq(old, new) {
        // At the boundary identity no longer decides; a rebuilt but
        // structurally equal subtree is not a change.
        return;
    }
    if old.kind() != new.kind() || !old.is_composite() || bounded {
        out.patches.push(Patch::replace(path.clone(), new.clone()));
        out.inverse.push(Patch::replace(path.clone(), old.clone()));
        return;
    }

    match (old, new) {
        (Value::Record(a), Value::Record(b)) => {
            for (name, old_child) in a.iter() {
                path.push(Key::Text(name.clone()));
                match b.get(name) {
                    Some(new_child) => diff_into(old_child, new_child, path, options, out),
                    None => {
                        out.patches.push(Patch::remove(path.clone()));
                        out.inverse.push(Patch::add(path.clone(), old_child.clone()));
                    }
                }
                path.pop();
            }
            for (name, new_child) in b.iter() {
                if a.contains_key(name) {
                    continue;
                }
                path.push(Key::Text(name.clone()));
                out.patches.push(Patch::add(path.clone(), new_child.clone()));
                out.inverse.push(Patch::remove(path.clone()));
                path.pop();
            }
        }
        (Value::Map(a), Value::Map(b)) => {
            for (key, old_child) in a.iter() {
                path.push(key.clone());
                match b.get(key) {
                    Some(new_child) => diff_into(old_child, new_child, path, options, out),
                    None => {
                        out.patches.push(Patch::remove(path.clone()));
                        out.inverse.push(Patch::add(path.clone(), old_child.clone()));
                    }
                }
                path.pop();
            }
            for (key, new_child) in b.iter() {
                if a.contains_key(key) {
                    continue;
                }
                path.push(key.clone());
                out.patches.push(Patch::add(path.clone(), new_child.clone()));
                out.inverse.push(Patch::remove(path.clone()));
                path.pop();
            }
        }
        (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => {
            diff_indexed(a, b, path, options, out);
        }
        // Kinds are equal and composite, so the pairs above are
        // exhaustive; anything else was handled as a replace.
        _ => {
            out.patches.push(Patch::replace(path.clone(), new.clone()));
            out.inverse.push(Patch::replace(path.clone(), old.clone()));
        }
    }
}

fn diff_indexed(
    a: &[Value],
    b: &[Value],
    path: &mut Vec<Key>,
    options: &DiffOptions,
    out: &mut DiffResult,
) {
    let shared = a.len().min(b.len());
    for index in 0..shared {
        path.push(Key::Index(index));
        diff_into(&a[index], &b[index], path, options, out);
        path.pop();
    }

    if b.len() > a.len() {
        // Grown: forward adds ascending, inverse removes descending so
        // each operates on a stable prefix.
        for index in shared..b.len() {
            let mut at = path.clone();
            at.push(Key::Index(index));
            out.patches.push(Patch::add(at, b[index].clone()));
        }
        for index in (shared..b.len()).rev() {
            let mut at = path.clone();
            at.push(Key::Index(index));
            out.inverse.push(Patch::remove(at));
        }
    } else if a.len() > b.len() {
        for index in (shared..a.len()).rev() {
            let mut at = path.clone();
            at.push(Key::Index(index));
            out.patches.push(Patch::remove(at));
        }
        for index in shared..a.len() {
            let mut at = path.clone();
            at.push(Key::Index(index));
            out.inverse.push(Patch::add(at, a[index].clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchOp;

    fn user(name: &str, age: i64) -> Value {
        Value::record([
            ("name".to_string(), Value::from(name)),
            ("age".to_string(), Value::from(age)),
        ])
    }

    #[test]
    fn identical_values_produce_no_patches() {
        let value = user("ada", 36);
        assert!(diff(&value, &value).is_empty());
        assert!(diff(&value, &value.clone()).is_empty());
    }

    #[test]
    fn scalar_field_change_is_a_replace_at_the_leaf() {
        let result = diff(&user("ada", 36), &user("ada", 37));
        assert_eq!(
            result.patches,
            vec![Patch::replace(vec![Key::from("age")], Value::from(37i64))]
        );
        assert_eq!(
            result.inverse,
            vec![Patch::replace(vec![Key::from("age")], Value::from(36i64))]
        );
    }

    #[test]
    fn added_and_removed_fields_invert_each_other() {
        let old = Value::record([("a".to_string(), Value::from(1i64))]);
        let new = Value::record([("b".to_string(), Value::from(2i64))]);
        let result = diff(&old, &new);

        assert_eq!(
            result.patches,
            vec![
                Patch::remove(vec![Key::from("a")]),
                Patch::add(vec![Key::from("b")], Value::from(2i64)),
            ]
        );
        assert_eq!(
            result.inverse,
            vec![
                Patch::add(vec![Key::from("a")], Value::from(1i64)),
                Patch::remove(vec![Key::from("b")]),
            ]
        );
    }

    #[test]
    fn kind_change_replaces_the_whole_subtree() {
        let old = Value::record([("data".to_string(), Value::list([1i64, 2]))]);
        let new = Value::record([("data".to_string(), Value::from("gone"))]);
        let result = diff(&old, &new);
        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].op, PatchOp::Replace);
        assert_eq!(result.patches[0].path, vec![Key::from("data")]);
    }

    #[test]
    fn list_growth_adds_at_the_tail() {
        let result = diff(&Value::list([1i64]), &Value::list([1i64, 2, 3]));
        assert_eq!(
            result.patches,
            vec![
                Patch::add(vec![Key::Index(1)], Value::from(2i64)),
                Patch::add(vec![Key::Index(2)], Value::from(3i64)),
            ]
        );
        // Inverse removes run tail-first.
        assert_eq!(
            result.inverse,
            vec![
                Patch::remove(vec![Key::Index(2)]),
                Patch::remove(vec![Key::Index(1)]),
            ]
        );
    }

    #[test]
    fn list_shrink_removes_tail_first() {
        let result = diff(&Value::list([1i64, 2, 3]), &Value::list([1i64]));
        assert_eq!(
            result.patches,
            vec![
                Patch::remove(vec![Key::Index(2)]),
                Patch::remove(vec![Key::Index(1)]),
            ]
        );
    }

    #[test]
    fn untouched_siblings_are_not_visited() {
        // Shared Arc subtrees short-circuit on identity, so only the
        // rewritten spine shows up in the patch list.
        let heavy = Value::list((0..100i64).collect::<Vec<_>>());
        let old = Value::record([
            ("heavy".to_string(), heavy.clone()),
            ("count".to_string(), Value::from(1i64)),
        ]);
        let new = Value::record([
            ("heavy".to_string(), heavy),
            ("count".to_string(), Value::from(2i64)),
        ]);
        let result = diff(&old, &new);
        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].path, vec![Key::from("count")]);
    }

    #[test]
    fn depth_bound_replaces_below_the_boundary() {
        let old = Value::record([("user".to_string(), user("ada", 36))]);
        let new = Value::record([("user".to_string(), user("ada", 37))]);

        let options = DiffOptions::default().stop_at(StopAt::Depth(1));
        let result = diff_with(&old, &new, &options);
        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].path, vec![Key::from("user")]);
        assert_eq!(result.patches[0].value, Some(user("ada", 37)));
    }

    #[test]
    fn depth_bound_elides_deep_equal_subtrees() {
        // The rebuilt subtree is not Arc-identical, but at the boundary
        // structural equality decides.
        let old = Value::record([("user".to_string(), user("ada", 36))]);
        let new = Value::record([("user".to_string(), user("ada", 36))]);
        let options = DiffOptions::default().stop_at(StopAt::Depth(1));
        assert!(diff_with(&old, &new, &options).is_empty());
    }

    #[test]
    fn predicate_bound_stops_at_matching_paths() {
        let old = Value::record([("user".to_string(), user("ada", 36))]);
        let new = Value::record([("user".to_string(), user("grace", 36))]);

        let options = DiffOptions::default()
            .stop_at(StopAt::at(|path| path.first() == Some(&Key::from("user"))));
        let result = diff_with(&old, &new, &options);
        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].path, vec![Key::from("user")]);
    }

    #[test]
    fn structurally_equal_rebuild_diffs_empty() {
        // Identity only short-circuits the walk; distinct Arcs with equal
        // contents still bottom out at equal scalars.
        let old = Value::record([("tags".to_string(), Value::list(["a", "b"]))]);
        let new = Value::record([("tags".to_string(), Value::list(["a", "b"]))]);
        assert!(diff(&old, &new).is_empty());
    }
}
