//! Dotted-path access into `serde_json::Value` trees.
//!
//! `"user.room.id"` walks object keys; numeric segments index arrays
//! (`"items.0.name"`). Shared by the settings handle, structured-data
//! matchers and the storage adapters' query params.

use serde_json::Value;

/// Resolve `path` inside `value`. An empty path yields the value itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Mutable variant of [`lookup`]. Does not create missing segments.
pub fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// JavaScript-style truthiness, used wherever "any non-empty value" counts
/// as a positive result (custom predicates, match results).
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Whether a payload counts as "empty" for structured-data matching:
/// null, an empty object/array, or an empty string.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let doc = json!({"user": {"rooms": [{"id": "r1"}, {"id": "r2"}]}});
        assert_eq!(lookup(&doc, "user.rooms.1.id"), Some(&json!("r2")));
        assert_eq!(lookup(&doc, "user.missing"), None);
        assert_eq!(lookup(&doc, "user.rooms.x"), None);
    }

    #[test]
    fn lookup_mut_replaces_in_place() {
        let mut doc = json!({"bot": {"name": "bot"}});
        *lookup_mut(&mut doc, "bot.name").unwrap() = json!("hal");
        assert_eq!(doc["bot"]["name"], "hal");
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!(2.5)));
    }
}
