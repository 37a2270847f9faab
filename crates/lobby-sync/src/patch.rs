//! Structural diff/apply/merge over JSON snapshots with
//! JSON-merge-patch semantics.
//!
//! Conventions: a `null` value in an object patch deletes that key; nested
//! objects are diffed recursively; arrays are never element-diffed — any
//! difference replaces the whole array; non-object replacements are
//! wholesale. `generate` returns `None` when the inputs are deeply equal,
//! which is distinct from `Some({})` — an empty-object patch is
//! structurally present with zero changes and must not be read as
//! "nothing happened".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys that abort a merge at their nesting level. A patch arriving from a
/// JS peer could otherwise smuggle prototype-pollution payloads through
/// shared tooling on the other side of the wire.
const UNSAFE_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// The patch that crosses the real-time boundary, plus the `modifiedAtMs`
/// it was computed against. Receivers compare `old_modified_at_ms` with
/// their cached value; a mismatch means a prior patch was missed and this
/// one must be discarded in favor of a full re-fetch. Absent for a
/// brand-new resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEnvelope {
    /// Object patch, or `null` meaning the resource was removed.
    pub patch: Value,
    #[serde(
        rename = "oldModifiedAtMs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub old_modified_at_ms: Option<i64>,
}

/// Smallest patch such that `apply(before, patch) == after`, or `None`
/// when `before` and `after` are deeply equal.
pub fn generate(before: &Value, after: &Value) -> Option<Value> {
    if before == after {
        return None;
    }
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut patch = Map::new();
            for key in b.keys() {
                if !a.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            for (key, after_value) in a {
                match b.get(key) {
                    None => {
                        patch.insert(key.clone(), after_value.clone());
                    }
                    Some(before_value) => {
                        if let Some(sub) = generate(before_value, after_value) {
                            patch.insert(key.clone(), sub);
                        }
                    }
                }
            }
            Some(Value::Object(patch))
        }
        // Arrays and scalars replace wholesale.
        _ => Some(after.clone()),
    }
}

/// Apply a patch to a target value.
///
/// A non-object patch (including arrays and `null`) fully replaces the
/// target. For an object patch, each `null`-valued key deletes that key if
/// present and every other key recurses. An unsafe key anywhere in the
/// patch object leaves the target unchanged at that nesting level.
pub fn apply(target: &Value, patch: &Value) -> Value {
    let Value::Object(patch_obj) = patch else {
        return patch.clone();
    };
    if patch_obj.keys().any(|k| UNSAFE_KEYS.contains(&k.as_str())) {
        return target.clone();
    }
    let mut result = match target {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for (key, value) in patch_obj {
        if value.is_null() {
            result.remove(key);
        } else {
            let existing = result.get(key).cloned().unwrap_or(Value::Null);
            result.insert(key.clone(), apply(&existing, value));
        }
    }
    Value::Object(result)
}

/// Compose two sequential patches into one:
/// `apply(apply(x, first), second) == apply(x, merge(first, second))`.
///
/// When either side is not an object (a wholesale replacement), the second
/// patch wins outright, matching reference JSON-merge-patch composition.
///
/// The composition property cannot hold for every patch pair: merge-patch
/// algebra has no way to say "replace this subtree" short of a non-object
/// value. When `first` deletes a key (`null`) and `second` re-adds it as an
/// object, the merged patch carries the re-added object and `apply` merges
/// it into whatever the target still holds under that key, resurrecting
/// fields the sequential application would have dropped. Reference
/// JSON-merge-patch composition behaves identically; callers needing exact
/// replay of such a sequence must apply the patches one at a time.
pub fn merge(first: &Value, second: &Value) -> Value {
    let (Value::Object(first_obj), Value::Object(second_obj)) = (first, second) else {
        return second.clone();
    };
    let mut out = first_obj.clone();
    for (key, second_value) in second_obj {
        match first_obj.get(key) {
            Some(first_value) if !second_value.is_null() => {
                out.insert(key.clone(), merge(first_value, second_value));
            }
            _ => {
                out.insert(key.clone(), second_value.clone());
            }
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generate_on_equal_values_is_no_patch_sentinel() {
        let x = json!({"a": 1, "b": {"c": [1, 2]}});
        assert_eq!(generate(&x, &x), None);
        assert_eq!(generate(&json!(null), &json!(null)), None);
    }

    #[test]
    fn no_patch_sentinel_differs_from_empty_object_patch() {
        // An empty-object patch is a real value with zero changes.
        let patch = Some(json!({}));
        assert_ne!(generate(&json!({"a": 1}), &json!({"a": 1})), patch);
        assert_eq!(apply(&json!({"a": 1}), &json!({})), json!({"a": 1}));
    }

    #[test]
    fn roundtrip_added_and_removed_keys() {
        let before = json!({"a": 1, "b": 2});
        let after = json!({"a": 1, "c": 3});
        let patch = generate(&before, &after).unwrap();
        assert_eq!(patch, json!({"b": null, "c": 3}));
        assert_eq!(apply(&before, &patch), after);
    }

    #[test]
    fn roundtrip_nested_objects() {
        let before = json!({"outer": {"keep": true, "drop": 1, "deep": {"n": 1}}});
        let after = json!({"outer": {"keep": true, "deep": {"n": 2}}});
        let patch = generate(&before, &after).unwrap();
        assert_eq!(patch, json!({"outer": {"drop": null, "deep": {"n": 2}}}));
        assert_eq!(apply(&before, &patch), after);
    }

    #[test]
    fn arrays_replace_wholesale() {
        let before = json!({"items": [1, 2, 3]});
        let after = json!({"items": [1, 2]});
        let patch = generate(&before, &after).unwrap();
        // Length change replaces the whole array, never element-diffs.
        assert_eq!(patch, json!({"items": [1, 2]}));
        assert_eq!(apply(&before, &patch), after);

        let after = json!({"items": [9, 2, 3]});
        let patch = generate(&before, &after).unwrap();
        assert_eq!(patch, json!({"items": [9, 2, 3]}));
        assert_eq!(apply(&before, &patch), after);
    }

    #[test]
    fn scalar_replacement_is_wholesale() {
        let patch = generate(&json!(1), &json!({"a": 1})).unwrap();
        assert_eq!(apply(&json!(1), &patch), json!({"a": 1}));

        let patch = generate(&json!({"a": 1}), &json!("s")).unwrap();
        assert_eq!(patch, json!("s"));
        assert_eq!(apply(&json!({"a": 1}), &patch), json!("s"));
    }

    #[test]
    fn null_patch_deletes_missing_key_without_effect() {
        assert_eq!(apply(&json!({"a": 1}), &json!({"b": null})), json!({"a": 1}));
    }

    #[test]
    fn apply_object_patch_to_scalar_builds_from_empty() {
        assert_eq!(apply(&json!(5), &json!({"a": 1, "b": null})), json!({"a": 1}));
    }

    #[test]
    fn unsafe_keys_abort_merge_at_their_level() {
        let target = json!({"a": {"safe": 1}});
        assert_eq!(apply(&target, &json!({"__proto__": {"polluted": true}})), target);
        assert_eq!(apply(&target, &json!({"constructor": 1})), target);
        assert_eq!(apply(&target, &json!({"prototype": 1})), target);

        // Nested: only the poisoned level is left unchanged.
        let patched = apply(
            &target,
            &json!({"a": {"__proto__": {"polluted": true}}, "b": 2}),
        );
        assert_eq!(patched, json!({"a": {"safe": 1}, "b": 2}));
    }

    #[test]
    fn merge_composes_sequential_generated_patches() {
        let x = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [1, 2]});
        let y = json!({"a": 1, "b": {"c": 9}, "e": [1, 2, 3], "f": "new"});
        let z = json!({"b": {"c": 9, "g": true}, "e": [1, 2, 3]});

        let first = generate(&x, &y).unwrap();
        let second = generate(&y, &z).unwrap();
        let merged = merge(&first, &second);

        assert_eq!(apply(&apply(&x, &first), &second), z);
        assert_eq!(apply(&x, &merged), z);
    }

    #[test]
    fn merge_second_deletion_wins() {
        let first = json!({"a": {"x": 1}, "b": 2});
        let second = json!({"a": null});
        let merged = merge(&first, &second);
        assert_eq!(merged, json!({"a": null, "b": 2}));

        let x = json!({"a": {"old": true}, "keep": 0});
        assert_eq!(apply(&apply(&x, &first), &second), apply(&x, &merged));
    }

    #[test]
    fn merge_delete_then_readd_keeps_surviving_target_fields() {
        // A delete-then-re-add pair is the known composition gap: the
        // merged patch can no longer express "replace the subtree", so
        // applying it merges into the original value instead. Pinned to
        // the reference JSON-merge-patch behavior.
        let x = json!({"a": {"y": 2}});
        let first = generate(&x, &json!({})).unwrap();
        assert_eq!(first, json!({"a": null}));
        let second = generate(&json!({}), &json!({"a": {"x": 1}})).unwrap();
        assert_eq!(second, json!({"a": {"x": 1}}));

        assert_eq!(apply(&apply(&x, &first), &second), json!({"a": {"x": 1}}));
        let merged = merge(&first, &second);
        assert_eq!(merged, json!({"a": {"x": 1}}));
        assert_eq!(apply(&x, &merged), json!({"a": {"y": 2, "x": 1}}));
    }

    #[test]
    fn merge_with_non_object_second_patch_replaces() {
        let first = json!({"a": 1});
        let second = json!([1, 2, 3]);
        let merged = merge(&first, &second);
        assert_eq!(merged, second);

        let x = json!({"z": true});
        assert_eq!(apply(&apply(&x, &first), &second), apply(&x, &merged));
    }

    #[test]
    fn patch_envelope_wire_shape() {
        let envelope = PatchEnvelope {
            patch: json!({"phase": "playing"}),
            old_modified_at_ms: Some(1234),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"patch": {"phase": "playing"}, "oldModifiedAtMs": 1234})
        );

        let fresh = PatchEnvelope {
            patch: json!({"phase": "open"}),
            old_modified_at_ms: None,
        };
        let value = serde_json::to_value(&fresh).unwrap();
        assert!(value.get("oldModifiedAtMs").is_none());
    }
}
