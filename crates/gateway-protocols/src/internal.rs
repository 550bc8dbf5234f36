//! Internal-only body keys.
//!
//! Keys prefixed with `__` carry routing and debug hints from the caller. They
//! are read on the way in and must never reach an upstream.

use serde_json::{Map, Value};

/// Prefix marking a key as internal
pub const INTERNAL_PREFIX: &str = "__";
/// Explicit protocol hint
pub const PROTOCOL_KEY: &str = "__protocol";
/// Explicit routing category
pub const CATEGORY_KEY: &str = "__route_category";
/// Per-request debug switch
pub const DEBUG_KEY: &str = "__debug";

/// Routing hints found in a caller body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalHints {
    /// `__route_category`
    pub category: Option<String>,
    /// `__debug`
    pub debug: bool,
}

impl InternalHints {
    /// Read hints from the top level of `body`
    #[must_use]
    pub fn from_body(body: &Value) -> Self {
        let category = body
            .get(CATEGORY_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let debug = match body.get(DEBUG_KEY) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "1" | "true" | "yes"),
            Some(Value::Number(n)) => n.as_u64().is_some_and(|n| n > 0),
            _ => false,
        };
        Self { category, debug }
    }
}

/// Remove every internal key, at any depth. Returns how many were removed.
pub fn strip_internal_keys(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => strip_map(map),
        Value::Array(items) => items.iter_mut().map(strip_internal_keys).sum(),
        _ => 0,
    }
}

fn strip_map(map: &mut Map<String, Value>) -> usize {
    let before = map.len();
    map.retain(|k, _| !k.starts_with(INTERNAL_PREFIX));
    let removed = before - map.len();
    removed + map.values_mut().map(strip_internal_keys).sum::<usize>()
}

/// Whether any internal key remains in `value`
#[must_use]
pub fn has_internal_keys(value: &Value) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| k.starts_with(INTERNAL_PREFIX) || has_internal_keys(v)),
        Value::Array(items) => items.iter().any(has_internal_keys),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_nested() {
        let mut body = json!({
            "model": "m",
            "__route_category": "tools",
            "metadata": {"__debug": true, "user": "u"},
            "messages": [{"role": "user", "content": "hi", "__trace": 1}]
        });
        assert_eq!(strip_internal_keys(&mut body), 3);
        assert!(!has_internal_keys(&body));
        assert_eq!(body["metadata"], json!({"user": "u"}));
    }

    #[test]
    fn test_hints() {
        let hints = InternalHints::from_body(&json!({"__route_category": " coding ", "__debug": "1"}));
        assert_eq!(hints.category.as_deref(), Some("coding"));
        assert!(hints.debug);
        assert_eq!(InternalHints::from_body(&json!({})), InternalHints::default());
    }
}
