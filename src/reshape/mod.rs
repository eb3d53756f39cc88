//! Folds flat, join-duplicated row sets back into nested object graphs.
//!
//! Two column-naming conventions drive the reshape:
//!
//! - dot-separated keys (`"owner.name"`) expand into nested objects;
//! - keys with a trailing `[]` (`"tag[]"`) gather into deduplicated, sorted
//!   arrays, one element per row in the group.
//!
//! Rows group by a caller-chosen attribute (default `id`). Input rows are
//! never mutated; the output is a fresh tree.

use crate::util::{array, object, value as value_util};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Suffix marking a row key as a collection.
pub const COLLECTION_SUFFIX: &str = "[]";

/// Reshape a row set, grouping by `id`. See [`reshape_by`].
pub fn reshape(results: Value) -> Value {
    reshape_by(results, "id")
}

/// Reshape rows already held as a vector, returning a vector.
pub fn reshape_rows(rows: Vec<Value>, group_key: &str) -> Vec<Value> {
    match reshape_by(Value::Array(rows), group_key) {
        Value::Array(rows) => rows,
        single => vec![single],
    }
}

/// Reshape a row set or a single row. An array in, an array out; a single
/// object in collapses back to a single object when it reshapes to exactly
/// one group. Empty input and non-object scalars pass through unchanged.
pub fn reshape_by(results: Value, group_key: &str) -> Value {
    match results {
        Value::Array(rows) => {
            if rows.is_empty() {
                return Value::Array(rows);
            }
            let rows = rows.into_iter().map(expand_row).collect();
            group_rows(rows, group_key, false)
        }
        Value::Object(map) => {
            let row = expand_row(Value::Object(map));
            group_rows(vec![row], group_key, true)
        }
        other => other,
    }
}

/// Stage one: expand dot-separated keys into nested paths. A compound key
/// with an absent value still pins its first segment to `null`, so the
/// attribute is present in the output either way. Runs before grouping so
/// nested objects take part in deduplication comparisons.
fn expand_row(row: Value) -> Value {
    let Value::Object(map) = row else { return row };
    let mut out = Map::new();
    for (key, val) in map {
        if !key.contains('.') {
            out.insert(key, val);
            continue;
        }
        let segments: Vec<&str> = key.split('.').collect();
        let first = segments[0];
        if value_util::has_value(&val) {
            if !out.get(first).map(Value::is_object).unwrap_or(false) {
                out.insert(first.to_string(), Value::Null);
            }
            object::set_path(&mut out, &segments, val);
        } else if !out.get(first).map(Value::is_object).unwrap_or(false) {
            out.insert(first.to_string(), Value::Null);
        }
    }
    Value::Object(out)
}

/// Stage two: partition keys into plain and collection sets, recurse into
/// nested values, then either dedup (no collections) or group-and-gather.
fn group_rows(rows: Vec<Value>, group_key: &str, as_object: bool) -> Value {
    if !rows.first().map(Value::is_object).unwrap_or(false) {
        // A scalar row set (e.g. a bare count) has nothing to reshape.
        return finish(rows, as_object);
    }

    let mut plain_keys: Vec<String> = Vec::new();
    let mut collection_keys: Vec<String> = Vec::new();
    let mut processed: Vec<Value> = Vec::with_capacity(rows.len());

    for row in rows {
        let Value::Object(map) = row else {
            processed.push(row);
            continue;
        };
        let mut out = Map::new();
        for (key, val) in map {
            let keys = if key.ends_with(COLLECTION_SUFFIX) {
                &mut collection_keys
            } else {
                &mut plain_keys
            };
            if !keys.contains(&key) {
                keys.push(key.clone());
            }
            let val = match val {
                Value::Object(_) | Value::Array(_) => reshape_by(val, group_key),
                other => other,
            };
            out.insert(key, val);
        }
        processed.push(Value::Object(out));
    }

    if collection_keys.is_empty() {
        let projected: Vec<Value> = processed
            .into_iter()
            .map(|row| pick(&row, &plain_keys))
            .collect();
        let deduped = if projected
            .first()
            .and_then(|r| r.get(group_key))
            .map(value_util::has_value)
            .unwrap_or(false)
        {
            array::unique_by(projected, group_key, true)
        } else {
            projected
        };
        return finish(deduped, as_object);
    }

    let mut groups: IndexMap<GroupToken, Vec<Value>> = IndexMap::new();
    for (index, row) in processed.into_iter().enumerate() {
        let token = row
            .get(group_key)
            .filter(|v| value_util::has_value(v))
            .map(|v| GroupToken::Key(v.clone()))
            // A row with no grouping attribute stays its own group: it can
            // never be collapsed into a neighbor, and it is never dropped.
            .unwrap_or(GroupToken::Singleton(index));
        groups.entry(token).or_default().push(row);
    }

    let mut results: Vec<Value> = Vec::with_capacity(groups.len());
    for members in groups.into_values() {
        let mut record = pick(&members[0], &plain_keys);
        for key in &collection_keys {
            let gathered: Vec<Value> = members
                .iter()
                .filter_map(|m| m.get(key.as_str()).cloned())
                .collect();
            let mut values = array::dedup_values(array::compact(gathered));
            if values
                .first()
                .and_then(|v| v.get(group_key))
                .map(value_util::has_value)
                .unwrap_or(false)
            {
                values = array::unique_by(values, group_key, true);
            }
            sort_collection(&mut values, group_key);
            let plain_name = key.trim_end_matches(COLLECTION_SUFFIX).to_string();
            if let Value::Object(map) = &mut record {
                map.insert(plain_name, Value::Array(values));
            }
        }
        results.push(record);
    }
    finish(results, as_object)
}

/// Collapse to the bare object when the input was a single object and one
/// group came out; otherwise keep the sequence.
fn finish(results: Vec<Value>, as_object: bool) -> Value {
    if as_object && results.len() == 1 {
        results.into_iter().next().expect("one result")
    } else {
        Value::Array(results)
    }
}

#[derive(PartialEq, Eq)]
enum GroupToken {
    Key(Value),
    Singleton(usize),
}

/// Group keys are scalars in practice; hashing their JSON text avoids
/// needing Hash on Value itself.
impl std::hash::Hash for GroupToken {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            GroupToken::Key(v) => {
                0u8.hash(state);
                v.to_string().hash(state);
            }
            GroupToken::Singleton(i) => {
                1u8.hash(state);
                i.hash(state);
            }
        }
    }
}

fn sort_collection(values: &mut [Value], group_key: &str) {
    values.sort_by(|a, b| {
        let ka = collection_sort_key(a, group_key);
        let kb = collection_sort_key(b, group_key);
        match (ka, kb) {
            (Some(ka), Some(kb)) => value_util::cmp_values(ka, kb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}

/// Objects sort by their grouping attribute, scalars by themselves.
fn collection_sort_key<'a>(value: &'a Value, group_key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(group_key),
        other => Some(other),
    }
}

/// Project a row down to the named keys, in key-list order.
fn pick(row: &Value, keys: &[String]) -> Value {
    let Value::Object(map) = row else { return row.clone() };
    let mut out = Map::new();
    for key in keys {
        if let Some(val) = map.get(key) {
            out.insert(key.clone(), val.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_input_is_returned_unchanged() {
        assert_eq!(reshape(json!([])), json!([]));
    }

    #[test]
    fn scalar_rows_pass_through() {
        assert_eq!(reshape(json!(["a", "b"])), json!(["a", "b"]));
        assert_eq!(reshape(json!(5)), json!(5));
    }

    #[test]
    fn dotted_keys_expand_into_nested_objects() {
        let out = reshape(json!([{"id": 1, "owner.name": "ada", "owner.role": "admin"}]));
        assert_eq!(out, json!([{"id": 1, "owner": {"name": "ada", "role": "admin"}}]));
    }

    #[test]
    fn sibling_dotted_keys_merge_under_one_parent() {
        let out = reshape(json!([{"a.b": 5, "a.c": 6}]));
        assert_eq!(out, json!([{"a": {"b": 5, "c": 6}}]));
    }

    #[test]
    fn absent_dotted_value_pins_parent_to_null() {
        let out = reshape(json!([{"id": 1, "owner.name": null}]));
        assert_eq!(out, json!([{"id": 1, "owner": null}]));
    }

    #[test]
    fn bracket_keys_group_dedup_and_sort() {
        let rows = json!([
            {"id": 1, "tag[]": "y"},
            {"id": 1, "tag[]": "x"},
            {"id": 1, "tag[]": "x"}
        ]);
        assert_eq!(reshape(rows), json!([{"id": 1, "tag": ["x", "y"]}]));
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let rows = json!([
            {"id": 2, "tag[]": "a"},
            {"id": 1, "tag[]": "b"},
            {"id": 2, "tag[]": "c"}
        ]);
        assert_eq!(
            reshape(rows),
            json!([{"id": 2, "tag": ["a", "c"]}, {"id": 1, "tag": ["b"]}])
        );
    }

    #[test]
    fn object_collections_dedup_and_sort_by_group_key() {
        let rows = json!([
            {"id": 1, "order[]": {"id": 30, "total": 8}},
            {"id": 1, "order[]": {"id": 10, "total": 3}},
            {"id": 1, "order[]": {"id": 30, "total": 8}}
        ]);
        assert_eq!(
            reshape(rows),
            json!([{"id": 1, "order": [{"id": 10, "total": 3}, {"id": 30, "total": 8}]}])
        );
    }

    #[test]
    fn absent_collection_values_are_dropped() {
        let rows = json!([
            {"id": 1, "tag[]": "x"},
            {"id": 1, "tag[]": null},
            {"id": 1, "tag[]": ""}
        ]);
        assert_eq!(reshape(rows), json!([{"id": 1, "tag": ["x"]}]));
    }

    #[test]
    fn row_without_group_key_stays_a_singleton() {
        let rows = json!([
            {"id": 1, "tag[]": "x"},
            {"name": "stray", "tag[]": "y"},
            {"name": "stray", "tag[]": "z"}
        ]);
        let out = reshape(rows);
        // The two stray rows collapse into neither each other nor id 1.
        assert_eq!(
            out,
            json!([
                {"id": 1, "tag": ["x"]},
                {"name": "stray", "tag": ["y"]},
                {"name": "stray", "tag": ["z"]}
            ])
        );
    }

    #[test]
    fn single_object_input_collapses_to_bare_object() {
        let out = reshape(json!({"id": 1, "tag[]": "x"}));
        assert_eq!(out, json!({"id": 1, "tag": ["x"]}));
    }

    #[test]
    fn plain_rows_dedup_by_group_key_first_seen_wins() {
        let rows = json!([
            {"id": 1, "name": "first"},
            {"id": 2, "name": "two"},
            {"id": 1, "name": "later"}
        ]);
        assert_eq!(
            reshape(rows),
            json!([{"id": 1, "name": "first"}, {"id": 2, "name": "two"}])
        );
    }

    #[test]
    fn dedup_merges_array_attributes_of_duplicates() {
        let rows = json!([
            {"id": 1, "tags": ["x"]},
            {"id": 1, "tags": ["y"]}
        ]);
        assert_eq!(reshape(rows), json!([{"id": 1, "tags": ["x", "y"]}]));
    }

    #[test]
    fn nested_values_reshape_recursively() {
        let rows = json!([
            {"id": 1, "child[]": {"id": 5, "part[]": "a"}},
            {"id": 1, "child[]": {"id": 5, "part[]": "b"}}
        ]);
        let out = reshape(rows);
        assert_eq!(out, json!([{"id": 1, "child": [{"id": 5, "part": ["a", "b"]}]}]));
    }

    #[test]
    fn reshape_is_idempotent_on_nested_output() {
        let nested = json!([
            {"id": 1, "owner": {"name": "ada"}, "tag": ["x", "y"]},
            {"id": 2, "owner": {"name": "bob"}, "tag": []}
        ]);
        assert_eq!(reshape(nested.clone()), nested);
    }

    #[test]
    fn grouping_attribute_is_configurable() {
        let rows = json!([
            {"sku": "a1", "stock[]": 3},
            {"sku": "a1", "stock[]": 1}
        ]);
        assert_eq!(
            reshape_by(rows, "sku"),
            json!([{"sku": "a1", "stock": [1, 3]}])
        );
    }

    #[test]
    fn mixed_dotted_and_bracket_keys_reshape_together() {
        let rows = json!([
            {"id": 7, "owner.name": "ada", "tag[]": "b"},
            {"id": 7, "owner.name": "ada", "tag[]": "a"}
        ]);
        assert_eq!(
            reshape(rows),
            json!([{"id": 7, "owner": {"name": "ada"}, "tag": ["a", "b"]}])
        );
    }
}
