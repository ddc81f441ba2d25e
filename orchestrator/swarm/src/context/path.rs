// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dotted-path helpers over JSON documents: deep merge, change detection,
//! lookup and watch-path matching.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

/// Recursively merge `patch` into `target`. Objects merge key by key; any
/// other value (arrays and `null` included) replaces what was there.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && target.get(key).is_some_and(Value::is_object);
                match target.get_mut(key) {
                    Some(existing) if nested => deep_merge(existing, value),
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Every dotted path whose value differs between `before` and `after`.
///
/// A changed leaf reports all of its ancestors too, and a subtree that was
/// added, removed or replaced reports each of its descendants.
pub fn changed_paths(before: &Value, after: &Value) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    diff_into(None, before, after, &mut out);
    out
}

fn diff_into(prefix: Option<&str>, before: &Value, after: &Value, out: &mut BTreeSet<String>) -> bool {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            let mut changed = false;
            let keys = old.keys().chain(new.keys().filter(|k| !old.contains_key(*k)));
            for key in keys {
                let path = join(prefix, key);
                let child_changed = match (old.get(key), new.get(key)) {
                    (Some(a), Some(b)) => diff_into(Some(&path), a, b, out),
                    (Some(v), None) | (None, Some(v)) => {
                        descendants_into(&path, v, out);
                        true
                    }
                    (None, None) => false,
                };
                if child_changed {
                    out.insert(path);
                    changed = true;
                }
            }
            changed
        }
        _ if before == after => false,
        _ => {
            if let Some(prefix) = prefix {
                descendants_into(prefix, before, out);
                descendants_into(prefix, after, out);
            }
            true
        }
    }
}

fn descendants_into(prefix: &str, value: &Value, out: &mut BTreeSet<String>) {
    if let Value::Object(map) = value {
        for (key, child) in map {
            let path = join(Some(prefix), key);
            descendants_into(&path, child, out);
            out.insert(path);
        }
    }
}

fn join(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{key}"),
        None => key.to_string(),
    }
}

/// Resolve a dotted path. Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// A parsed watch path: `*`, `a.b.*` or an exact `a.b.c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchPath {
    All,
    Descendants(String),
    Exact(String),
}

impl WatchPath {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "*" {
            WatchPath::All
        } else if let Some(prefix) = raw.strip_suffix(".*") {
            WatchPath::Descendants(prefix.to_string())
        } else {
            WatchPath::Exact(raw.to_string())
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            WatchPath::All => true,
            WatchPath::Exact(exact) => exact == path,
            WatchPath::Descendants(prefix) => path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.')),
        }
    }
}

impl fmt::Display for WatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchPath::All => f.write_str("*"),
            WatchPath::Descendants(prefix) => write!(f, "{prefix}.*"),
            WatchPath::Exact(path) => f.write_str(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge_objects_and_replaces_leaves() {
        let mut doc = json!({"policy": {"maxTokensPerRequest": 100, "requireApproval": false}, "tags": [1, 2]});
        deep_merge(&mut doc, &json!({"policy": {"maxTokensPerRequest": 200}, "tags": [3]}));
        assert_eq!(
            doc,
            json!({"policy": {"maxTokensPerRequest": 200, "requireApproval": false}, "tags": [3]})
        );
    }

    #[test]
    fn test_changed_paths_include_ancestors() {
        let before = json!({"policy": {"maxTokensPerRequest": 100, "requireApproval": false}});
        let after = json!({"policy": {"maxTokensPerRequest": 200, "requireApproval": false}});
        let changed: Vec<_> = changed_paths(&before, &after).into_iter().collect();
        assert_eq!(changed, vec!["policy", "policy.maxTokensPerRequest"]);
    }

    #[test]
    fn test_changed_paths_cover_added_subtrees() {
        let before = json!({"goal": "x"});
        let after = json!({"goal": "x", "runs": {"r1": {"steps": {"s1": {"result": 1}}}}});
        let changed = changed_paths(&before, &after);
        for path in ["runs", "runs.r1", "runs.r1.steps", "runs.r1.steps.s1", "runs.r1.steps.s1.result"] {
            assert!(changed.contains(path), "missing {path}");
        }
        assert!(!changed.contains("goal"));
    }

    #[test]
    fn test_replacing_object_with_scalar_reports_old_children() {
        let before = json!({"configuration": {"model": "a"}});
        let after = json!({"configuration": null});
        let changed = changed_paths(&before, &after);
        assert!(changed.contains("configuration"));
        assert!(changed.contains("configuration.model"));
    }

    #[test]
    fn test_no_change_yields_empty_set() {
        let doc = json!({"a": {"b": [1, 2, 3]}});
        assert!(changed_paths(&doc, &doc.clone()).is_empty());
    }

    #[test]
    fn test_watch_path_grammar() {
        assert!(WatchPath::parse("*").matches("anything.at.all"));
        let descendants = WatchPath::parse("policy.*");
        assert!(descendants.matches("policy.maxTokensPerRequest"));
        assert!(!descendants.matches("policy"));
        assert!(!descendants.matches("policyOther.x"));
        let exact = WatchPath::parse("policy.maxTokensPerRequest");
        assert!(exact.matches("policy.maxTokensPerRequest"));
        assert!(!exact.matches("policy.maxTokensPerRequest.inner"));
    }

    #[test]
    fn test_lookup_walks_objects_and_arrays() {
        let doc = json!({"result": {"items": [{"name": "a"}, {"name": "b"}]}});
        assert_eq!(lookup(&doc, "result.items.1.name"), Some(&json!("b")));
        assert_eq!(lookup(&doc, "result.missing"), None);
    }
}
