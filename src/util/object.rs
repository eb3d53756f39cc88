//! Deep path access and compaction for JSON objects.

use crate::util::array;
use serde_json::{Map, Value};

/// Read a value at a dot-separated path. Descends into the first element of
/// any array met along the way.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        if let Value::Array(items) = current {
            current = items.first()?;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a value at a path, creating intermediate objects as needed.
/// Non-object intermediates are replaced.
pub fn set_path(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        target.insert((*head).to_string(), value);
        return;
    }
    let slot = target
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    set_path(slot.as_object_mut().expect("slot is an object"), rest, value);
}

/// Copy an object without its absent attributes (nulls, empty strings,
/// arrays that compact to nothing). With `remove_empty`, nested objects are
/// compacted recursively and dropped when nothing remains.
pub fn compact(map: &Map<String, Value>, remove_empty: bool) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, val) in map {
        let kept = match val {
            Value::Null => continue,
            Value::String(s) if s.is_empty() => continue,
            Value::Array(items) => {
                let items = array::compact(items.clone());
                if items.is_empty() {
                    continue;
                }
                Value::Array(items)
            }
            Value::Object(inner) if remove_empty => {
                let inner = compact(inner, true);
                if inner.is_empty() {
                    continue;
                }
                Value::Object(inner)
            }
            other => other.clone(),
        };
        out.insert(key.clone(), kept);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gets_nested_path() {
        let v = json!({"a": {"b": {"c": 5}}});
        assert_eq!(get_path(&v, "a.b.c"), Some(&json!(5)));
        assert_eq!(get_path(&v, "a.x"), None);
    }

    #[test]
    fn gets_through_first_array_element() {
        let v = json!({"a": [{"b": 1}, {"b": 2}]});
        assert_eq!(get_path(&v, "a.b"), Some(&json!(1)));
    }

    #[test]
    fn sets_nested_path_creating_intermediates() {
        let mut map = Map::new();
        set_path(&mut map, &["a", "b"], json!(5));
        set_path(&mut map, &["a", "c"], json!(6));
        assert_eq!(Value::Object(map), json!({"a": {"b": 5, "c": 6}}));
    }

    #[test]
    fn set_path_replaces_scalar_intermediate() {
        let mut map = Map::new();
        map.insert("a".into(), json!(null));
        set_path(&mut map, &["a", "b"], json!(1));
        assert_eq!(Value::Object(map), json!({"a": {"b": 1}}));
    }

    #[test]
    fn compact_drops_absent_attributes() {
        let map = json!({"a": 1, "b": null, "c": "", "d": 0, "e": false});
        let out = compact(map.as_object().unwrap(), true);
        assert_eq!(Value::Object(out), json!({"a": 1, "d": 0, "e": false}));
    }

    #[test]
    fn compact_removes_empty_nested_objects() {
        let map = json!({"a": {"b": null}, "c": {"d": 2}});
        let out = compact(map.as_object().unwrap(), true);
        assert_eq!(Value::Object(out), json!({"c": {"d": 2}}));
    }
}
