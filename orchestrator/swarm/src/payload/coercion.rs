// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Key-suffix driven type coercion for step inputs.
//!
//! | Suffix | Result | On failure |
//! |--------|--------|------------|
//! | `_json` | parsed JSON | raw string, warning |
//! | `_number` | finite `f64` | raw string |
//! | `_boolean` | `true` for `true/yes/1/on`, else `false` | n/a |
//! | `_array` | JSON array, else comma split | n/a |
//!
//! Only string values are coerced; anything else is already typed.

use serde_json::{Map, Number, Value};
use tracing::warn;

/// Coerce every string value whose key carries a known suffix, descending
/// into nested objects.
pub fn coerce_inputs(inputs: &mut Map<String, Value>) {
    for (key, value) in inputs.iter_mut() {
        let coerced = match value {
            Value::Object(nested) => {
                coerce_inputs(nested);
                None
            }
            Value::String(raw) => coerce(key, raw),
            _ => None,
        };
        if let Some(coerced) = coerced {
            *value = coerced;
        }
    }
}

fn coerce(key: &str, raw: &str) -> Option<Value> {
    if key.ends_with("_json") {
        match serde_json::from_str(raw) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(key, error = %e, "Input is not valid JSON, keeping raw string");
                None
            }
        }
    } else if key.ends_with("_number") {
        raw.trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
    } else if key.ends_with("_boolean") {
        let truthy = matches!(
            raw.trim().to_lowercase().as_str(),
            "true" | "yes" | "1" | "on"
        );
        Some(Value::Bool(truthy))
    } else if key.ends_with("_array") {
        Some(parse_array(raw))
    } else {
        None
    }
}

fn parse_array(raw: &str) -> Value {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return Value::Array(items);
    }
    Value::Array(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    )
}
