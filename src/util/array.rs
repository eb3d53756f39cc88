//! Array compaction and keyed deduplication.

use crate::util::{object, value};
use serde_json::Value;

/// Drop elements that carry no data. Object elements are compacted first and
/// dropped when nothing remains.
pub fn compact(items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => {
                let map = object::compact(&map, true);
                if map.is_empty() {
                    None
                } else {
                    Some(Value::Object(map))
                }
            }
            other if value::has_value(&other) => Some(other),
            _ => None,
        })
        .collect()
}

/// Order-preserving dedup by value equality.
pub fn dedup_values(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Dedup object rows by the value at `key_path` (a dot path), keeping the
/// first occurrence. Rows without a value at the path are always kept.
///
/// With `merge_nested_arrays`, array-valued attributes of a dropped
/// duplicate are concatenated into the kept row and re-deduplicated, by
/// `key_path` again when the elements are objects.
pub fn unique_by(items: Vec<Value>, key_path: &str, merge_nested_arrays: bool) -> Vec<Value> {
    let mut seen: Vec<(Value, usize)> = Vec::new();
    let mut kept: Vec<Value> = Vec::new();

    for item in items {
        let key = object::get_path(&item, key_path)
            .filter(|v| value::has_value(v))
            .cloned();
        let Some(key) = key else {
            kept.push(item);
            continue;
        };
        match seen.iter().find(|(k, _)| *k == key) {
            None => {
                seen.push((key, kept.len()));
                kept.push(item);
            }
            Some(&(_, index)) => {
                if merge_nested_arrays {
                    merge_arrays_into(&mut kept[index], &item, key_path);
                }
            }
        }
    }
    kept
}

/// Concatenate every array attribute of `dropped` into the matching
/// attribute of `target`, then dedup the combined array.
fn merge_arrays_into(target: &mut Value, dropped: &Value, key_path: &str) {
    let (Some(target), Some(dropped)) = (target.as_object_mut(), dropped.as_object()) else {
        return;
    };
    for (key, val) in dropped {
        let Value::Array(extra) = val else { continue };
        let mut combined = match target.get(key) {
            Some(Value::Array(existing)) => existing.clone(),
            _ => Vec::new(),
        };
        combined.extend(extra.iter().cloned());
        let merged = if combined.first().map(Value::is_object).unwrap_or(false) {
            unique_by(combined, key_path, false)
        } else {
            dedup_values(combined)
        };
        target.insert(key.clone(), Value::Array(merged));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_drops_falsy_and_empty() {
        let out = compact(vec![json!(1), json!(null), json!(""), json!({}), json!(0)]);
        assert_eq!(out, vec![json!(1), json!(0)]);
    }

    #[test]
    fn unique_by_keeps_first_occurrence() {
        let rows = vec![
            json!({"id": 1, "name": "a"}),
            json!({"id": 2, "name": "b"}),
            json!({"id": 1, "name": "dup"}),
        ];
        let out = unique_by(rows, "id", false);
        assert_eq!(out, vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})]);
    }

    #[test]
    fn unique_by_keeps_rows_without_key() {
        let rows = vec![json!({"id": 1}), json!({"name": "x"}), json!({"id": 1})];
        let out = unique_by(rows, "id", false);
        assert_eq!(out, vec![json!({"id": 1}), json!({"name": "x"})]);
    }

    #[test]
    fn unique_by_deduplicates_on_nested_path() {
        let rows = vec![
            json!({"owner": {"id": 7}, "n": 1}),
            json!({"owner": {"id": 7}, "n": 2}),
        ];
        let out = unique_by(rows, "owner.id", false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["n"], json!(1));
    }

    #[test]
    fn unique_by_merges_nested_arrays_from_duplicates() {
        let rows = vec![
            json!({"id": 1, "tags": ["x"]}),
            json!({"id": 1, "tags": ["y", "x"]}),
        ];
        let out = unique_by(rows, "id", true);
        assert_eq!(out, vec![json!({"id": 1, "tags": ["x", "y"]})]);
    }

    #[test]
    fn unique_by_merges_object_arrays_by_key() {
        let rows = vec![
            json!({"id": 1, "items": [{"id": 10}]}),
            json!({"id": 1, "items": [{"id": 11}, {"id": 10}]}),
        ];
        let out = unique_by(rows, "id", true);
        assert_eq!(
            out,
            vec![json!({"id": 1, "items": [{"id": 10}, {"id": 11}]})]
        );
    }
}
