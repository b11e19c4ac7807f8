//! Depth-first flattening of a JSON document into dotted key paths.
//!
//! `{"a": {"b": [10, {"c": true}]}}` becomes
//! `a.b[1] = "10"`, `a.b[2].c = "true"`. Array positions are 1-based.

use serde_json::Value;

use crate::fields::FieldMap;

/// Flattens `value` into an ordered [`FieldMap`].
///
/// Object keys keep their document order. Scalar leaves are rendered as text
/// (strings unquoted, `null` as `"null"`). Empty objects and arrays contribute
/// no entries. A scalar at the root is stored under the empty key.
#[must_use]
pub fn flatten_with_dot_notation(value: &Value) -> FieldMap {
    let mut acc = FieldMap::new();
    flatten_into("", value, &mut acc);
    acc
}

fn flatten_into(prefix: &str, node: &Value, acc: &mut FieldMap) {
    match node {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let index = i + 1;
                let path = if prefix.is_empty() {
                    index.to_string()
                } else {
                    format!("{prefix}[{index}]")
                };
                flatten_into(&path, item, acc);
            }
        }
        Value::Object(entries) => {
            for (key, item) in entries {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&path, item, acc);
            }
        }
        Value::String(s) => {
            acc.insert(prefix, s.as_str());
        }
        other => {
            acc.insert(prefix, other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn flattens_nested_objects_and_arrays() {
        let doc = json!({
            "a": {
                "aa": 11,
                "aab": {
                    "aaba": 1121,
                    "aabb": ["x", "y", [1, 2, 3, 4, 5, 6, {"seven": "sept"}]],
                    "aabc": {"aabca": "foo"}
                }
            }
        });

        let expected = FieldMap::from([
            ("a.aa", "11"),
            ("a.aab.aaba", "1121"),
            ("a.aab.aabb[1]", "x"),
            ("a.aab.aabb[2]", "y"),
            ("a.aab.aabb[3][1]", "1"),
            ("a.aab.aabb[3][2]", "2"),
            ("a.aab.aabb[3][3]", "3"),
            ("a.aab.aabb[3][4]", "4"),
            ("a.aab.aabb[3][5]", "5"),
            ("a.aab.aabb[3][6]", "6"),
            ("a.aab.aabb[3][7].seven", "sept"),
            ("a.aab.aabc.aabca", "foo"),
        ]);

        assert_eq!(flatten_with_dot_notation(&doc), expected);
    }

    #[test]
    fn renders_null_and_bool_as_text() {
        let doc = json!({"n": null, "t": true});
        let flat = flatten_with_dot_notation(&doc);
        assert_eq!(flat.get("n"), Some("null"));
        assert_eq!(flat.get("t"), Some("true"));
    }

    #[test]
    fn empty_containers_contribute_nothing() {
        let doc = json!({"a": {}, "b": [], "c": "x"});
        assert_eq!(flatten_with_dot_notation(&doc), FieldMap::from([("c", "x")]));
    }

    #[test]
    fn root_array_uses_bare_indices() {
        let doc = json!(["x", {"y": 1}]);
        assert_eq!(
            flatten_with_dot_notation(&doc),
            FieldMap::from([("1", "x"), ("2.y", "1")])
        );
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,8}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn flat_object_of_scalars_keeps_every_key_in_order(
            entries in proptest::collection::vec(("[a-z]{1,6}", leaf()), 0..12)
        ) {
            let mut obj = serde_json::Map::new();
            for (k, v) in &entries {
                obj.insert(k.clone(), v.clone());
            }
            let flat = flatten_with_dot_notation(&Value::Object(obj.clone()));
            prop_assert_eq!(flat.len(), obj.len());
            let keys: Vec<&str> = flat.keys().collect();
            let expected: Vec<&str> = obj.keys().map(String::as_str).collect();
            prop_assert_eq!(keys, expected);
        }

        #[test]
        fn array_length_matches_entry_count(items in proptest::collection::vec(leaf(), 0..16)) {
            let flat = flatten_with_dot_notation(&json!({ "list": items }));
            prop_assert_eq!(flat.len(), items.len());
            if !items.is_empty() {
                prop_assert!(flat.contains_key("list[1]"));
                let last = format!("list[{}]", items.len());
                prop_assert!(flat.contains_key(&last));
            }
        }
    }
}
