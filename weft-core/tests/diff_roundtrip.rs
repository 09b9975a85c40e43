//! Property tests for the diff/patch round-trip law.

use proptest::prelude::*;

use weft_core::patch::{apply_patches, diff};
use weft_core::value::{Key, Value};

fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        (0usize..8).prop_map(Key::Index),
        "[a-z]{1,4}".prop_map(|s| Key::Text(s)),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1000i64..1000).prop_map(Value::from),
        (-1000.0..1000.0f64).prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::list),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::set),
            prop::collection::vec(("[a-z]{1,4}", inner.clone()), 0..4).prop_map(Value::record),
            prop::collection::vec((key_strategy(), inner), 0..4).prop_map(Value::map),
        ]
    })
}

proptest! {
    /// Forward patches turn the old value into the new one; inverse
    /// patches turn the new value back into the old one.
    #[test]
    fn diff_and_apply_round_trip(old in value_strategy(), new in value_strategy()) {
        let result = diff(&old, &new);
        prop_assert_eq!(apply_patches(&old, &result.patches).unwrap(), new.clone());
        prop_assert_eq!(apply_patches(&new, &result.inverse).unwrap(), old);
    }

    /// Diffing a value against itself is always empty.
    #[test]
    fn self_diff_is_empty(value in value_strategy()) {
        prop_assert!(diff(&value, &value).is_empty());
    }

    /// Applying an empty patch list is the identity.
    #[test]
    fn empty_patch_list_is_identity(value in value_strategy()) {
        prop_assert_eq!(apply_patches(&value, &[]).unwrap(), value);
    }
}
