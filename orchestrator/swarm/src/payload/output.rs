// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde_json::{Map, Number, Value};
use tracing::warn;

use hive_core::domain::execution::{OutputSchema, OutputTransform};

use crate::context::path::lookup;

/// Wrap anything that is not an object as `{"result": raw}`.
pub fn normalize(raw: Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

/// Project `outputs` through `schema`. Fields whose source path is absent
/// are omitted.
pub fn apply_schema(outputs: &Map<String, Value>, schema: &OutputSchema) -> Map<String, Value> {
    let source = Value::Object(outputs.clone());
    let mut mapped = Map::new();
    for field in &schema.fields {
        let path = field.source.as_deref().unwrap_or(&field.name);
        let Some(value) = lookup(&source, path) else {
            warn!(field = %field.name, source = path, "Output field source not found");
            continue;
        };
        let value = match field.transform {
            Some(transform) => apply_transform(transform, value.clone()),
            None => value.clone(),
        };
        mapped.insert(field.name.clone(), value);
    }
    mapped
}

pub fn apply_transform(transform: OutputTransform, value: Value) -> Value {
    match (transform, value) {
        (OutputTransform::Trim, Value::String(s)) => Value::String(s.trim().to_string()),
        (OutputTransform::Uppercase, Value::String(s)) => Value::String(s.to_uppercase()),
        (OutputTransform::Lowercase, Value::String(s)) => Value::String(s.to_lowercase()),
        (OutputTransform::Stringify, Value::String(s)) => Value::String(s),
        (OutputTransform::Stringify, other) => Value::String(other.to_string()),
        (OutputTransform::ParseNumber, Value::String(s)) => {
            match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
                Some(n) => Value::Number(n),
                None => {
                    warn!(value = %s, "Output is not a number, keeping raw value");
                    Value::String(s)
                }
            }
        }
        (OutputTransform::ParseJson, Value::String(s)) => match serde_json::from_str(&s) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Output is not valid JSON, keeping raw value");
                Value::String(s)
            }
        },
        (_, other) => other,
    }
}
