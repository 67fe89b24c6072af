//! 🥞 Flattening: squashing nested JSON into dotted keys, and puffing it back up.
//!
//! Insertion is happy with nested objects. Search is not: a query string can't address
//! `{"key2": {"key3": "value3"}}`, it wants `key2.key3:"value3"`. So before we verify a
//! document field by field, we flatten it:
//!
//! ```text
//! {"key1": "value1", "key2": {"key3": "value3"}}
//!   -> {"key1": "value1", "key2.key3": "value3"}
//! ```
//!
//! Top-level scalars keep their name. Arrays are leaves. JSON is a tree, so no cycle
//! detection, no drama. 🦆

use serde_json::{Map, Value};

/// 🥞 Flatten nested objects into a single level of dot-joined keys.
pub(crate) fn flatten(nested: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(&mut flat, None, nested);
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: Option<&str>, nested: &Map<String, Value>) {
    for (key, value) in nested {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(child) => flatten_into(flat, Some(&path), child),
            leaf => {
                flat.insert(path, leaf.clone());
            }
        }
    }
}

/// 🎈 The inverse: split dotted keys back into nested objects.
///
/// Used when shaping partial updates, so `{"a.b": 1}` goes over the wire as
/// `{"a": {"b": 1}}` and older clusters don't choke on dots in field names.
/// If a scalar and a deeper path collide (`"a"` and `"a.b"`), the deeper path wins.
pub(crate) fn unflatten(flat: &Map<String, Value>) -> Map<String, Value> {
    let mut nested = Map::new();
    for (key, value) in flat {
        let segments: Vec<&str> = key.split('.').collect();
        insert_path(&mut nested, &segments, value.clone());
    }
    nested
}

fn insert_path(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            // -- a deeper path already built an object here: keep the object
            if !target.get(*last).is_some_and(Value::is_object) {
                target.insert((*last).to_string(), value);
            }
        }
        [head, rest @ ..] => {
            let slot = target
                .entry(*head)
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_path(child, rest, value);
            }
        }
    }
}
