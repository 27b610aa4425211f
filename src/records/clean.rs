// src/records/clean.rs
//! Coercion of loosely-shaped JSON (saved files, API bodies, other scrapers) into
//! the typed records. Scalars become one-element sequences, sets become lists.

use serde_json::Value;

/// Turn any value into a list of items: arrays are unpacked, `null` is empty,
/// everything else (objects included) is wrapped.
pub(crate) fn as_items(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// String form of a scalar item. Objects and arrays fall back to their JSON text.
pub(crate) fn item_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Non-empty string value, if any.
pub(crate) fn opt_string(v: Option<&Value>) -> Option<String> {
    v.and_then(item_string).filter(|s| !s.is_empty())
}

/// Collect string items from the first key present among `keys`, then the rest, in order.
pub(crate) fn string_list(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for k in keys {
        if let Some(v) = obj.get(*k) {
            for item in as_items(v) {
                if let Some(s) = item_string(&item) {
                    if !s.is_empty() {
                        super::add_unique(&mut out, s);
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_become_lists() {
        assert_eq!(as_items(&json!("a@x.org")), vec![json!("a@x.org")]);
        assert_eq!(as_items(&json!({"k": 1})), vec![json!({"k": 1})]);
        assert!(as_items(&Value::Null).is_empty());
        assert_eq!(as_items(&json!([1, 2])).len(), 2);
    }

    #[test]
    fn string_list_merges_aliases_without_repeats() {
        let obj = json!({
            "emails": ["a@x.org", "b@x.org"],
            "Emails": "a@x.org",
            "email": ""
        });
        let got = string_list(obj.as_object().unwrap(), &["emails", "Emails", "email"]);
        assert_eq!(got, vec!["a@x.org".to_string(), "b@x.org".to_string()]);
    }
}
