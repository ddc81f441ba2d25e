// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Interpreters for the two string-encoded reference forms in step inputs.
//!
//! - `{{path.to.value}}` placeholders, rendered against a JSON view. Strings
//!   are inserted verbatim, other values as compact JSON. A placeholder whose
//!   path does not resolve is left untouched.
//! - `$ref:stepId.output.key` strings, replaced by a prior step's output.
//!   The step id is everything before the first dot.
//!
//! Both are pure functions of their arguments.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::context::path::lookup;

pub const REF_PREFIX: &str = "$ref:";

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
            .expect("placeholder pattern is a valid regex")
    })
}

/// Render every `{{path}}` in `template` against `view`.
pub fn render(template: &str, view: &Value) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| match lookup(view, &caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render placeholders in every string nested inside `value`.
pub fn render_value(value: &Value, view: &Value) -> Value {
    match value {
        Value::String(s) if s.contains("{{") => Value::String(render(s, view)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, view)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, view)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Split `$ref:step.key.path` into `("step", "key.path")`.
pub fn parse_ref(raw: &str) -> Option<(&str, &str)> {
    let body = raw.strip_prefix(REF_PREFIX)?.trim();
    let (step, key) = body.split_once('.')?;
    if step.is_empty() || key.is_empty() {
        return None;
    }
    Some((step, key))
}

/// Replace every `$ref:` string nested inside `value` using `resolve`.
/// Unresolvable references become `null` and are reported through `dangling`.
pub fn resolve_refs<F, D>(value: &Value, resolve: &F, dangling: &mut D) -> Value
where
    F: Fn(&str, &str) -> Option<Value>,
    D: FnMut(&str),
{
    match value {
        Value::String(s) if s.starts_with(REF_PREFIX) => {
            match parse_ref(s).and_then(|(step, key)| resolve(step, key)) {
                Some(resolved) => resolved,
                None => {
                    dangling(s);
                    Value::Null
                }
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_refs(v, resolve, dangling))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_refs(v, resolve, dangling));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}
