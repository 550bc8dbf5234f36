//! Compatibility field mapper.
//!
//! Minimal provider-specific adjustments of native bodies, expressed as three
//! primitives applied left to right: copy, typed conversion and default-fill.
//! Tool-call semantics never live here.

use gateway_config::{CompatibilityProfile, Conversion, MappingRule};
use gateway_core::{GatewayError, GatewayResult};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Applies one provider's compatibility profile
#[derive(Debug, Clone, Default)]
pub struct CompatibilityMapper {
    name: Option<String>,
    profile: CompatibilityProfile,
}

impl CompatibilityMapper {
    /// Mapper for a named profile
    #[must_use]
    pub fn new(name: impl Into<String>, profile: CompatibilityProfile) -> Self {
        Self {
            name: Some(name.into()),
            profile,
        }
    }

    /// Mapper that changes nothing
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Profile name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Reject requests without a model; no default is ever filled in
    pub fn check_model(model: &str) -> GatewayResult<()> {
        if model.trim().is_empty() {
            return Err(GatewayError::validation(
                "model is required",
                Some("model".to_string()),
                "missing_model",
            ));
        }
        Ok(())
    }

    /// Adjust an upstream request body
    pub fn apply_request(&self, body: &mut Value) {
        apply_rules(&self.profile.request, body);
        for path in &self.profile.strip_request_fields {
            remove_path(body, path);
        }
    }

    /// Adjust an upstream response body or one stream event
    pub fn apply_response(&self, body: &mut Value) {
        apply_rules(&self.profile.response, body);
        for path in &self.profile.strip_response_fields {
            remove_path(body, path);
        }
    }

    /// Whether response bodies are left untouched
    #[must_use]
    pub fn is_response_passthrough(&self) -> bool {
        self.profile.response.is_empty() && self.profile.strip_response_fields.is_empty()
    }
}

fn apply_rules(rules: &[MappingRule], body: &mut Value) {
    for rule in rules {
        match rule {
            MappingRule::Copy { from, to } => {
                if let Some(value) = get_path(body, from).cloned() {
                    set_path(body, to, value);
                }
            }
            MappingRule::Convert { from, to, via } => {
                let Some(source) = get_path(body, from) else {
                    continue;
                };
                match convert(source, *via) {
                    Some(value) => set_path(body, to, value),
                    None => warn!(from = %from, via = ?via, "Conversion not applicable, rule skipped"),
                }
            }
            MappingRule::Default { to, value } => {
                if get_path(body, to).map_or(true, Value::is_null) {
                    debug!(to = %to, "Filling default");
                    set_path(body, to, value.clone());
                }
            }
        }
    }
}

/// Typed value conversion; `None` when the value cannot be converted
#[must_use]
pub fn convert(value: &Value, via: Conversion) -> Option<Value> {
    match via {
        Conversion::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        Conversion::Number => match value {
            Value::Number(n) => n.as_f64().map(Value::from),
            Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
            _ => None,
        },
        Conversion::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .map(Value::from),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        Conversion::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::Number(n) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        Conversion::Array => match value {
            Value::Array(_) => Some(value.clone()),
            other => Some(Value::Array(vec![other.clone()])),
        },
        Conversion::Lowercase => value.as_str().map(|s| Value::String(s.to_lowercase())),
        Conversion::Uppercase => value.as_str().map(|s| Value::String(s.to_uppercase())),
        Conversion::JsonString => Some(Value::String(value.to_string())),
        Conversion::ParseJson => value.as_str().and_then(|s| serde_json::from_str(s).ok()),
    }
}

/// Read a dotted path; numeric segments index arrays
#[must_use]
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write a dotted path, creating intermediate objects
pub fn set_path(value: &mut Value, path: &str, new_value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = value;
    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        if let Value::Array(items) = current {
            let Some(slot) = segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) else {
                return;
            };
            if last {
                *slot = new_value;
                return;
            }
            current = slot;
            continue;
        }
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if last {
            map.insert(segment.to_string(), new_value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Remove a dotted path if present
pub fn remove_path(value: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (get_path_mut(value, parent), leaf),
        None => (Some(value), path),
    };
    match parent {
        Some(Value::Object(map)) => {
            map.remove(leaf);
        }
        Some(Value::Array(items)) => {
            if let Some(i) = leaf.parse::<usize>().ok().filter(|i| *i < items.len()) {
                items.remove(i);
            }
        }
        _ => {}
    }
}

fn get_path_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    })
}
