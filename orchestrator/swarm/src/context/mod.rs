// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Context Store
//!
//! One path-addressable JSON document per swarm, seeded from a typed
//! [`SwarmContext`] and extended freely (per-run step outputs live under
//! `runs.<runId>.steps.<stepId>`).
//!
//! Updates are deep merges. Each committed update bumps `updatedAt`, computes
//! the set of changed dotted paths and hands it to the [`SubscriptionBroker`]
//! while the swarm's lock is still held, so subscribers observe commits in
//! order. Locks are per swarm.

pub mod path;
pub mod subscription;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use hive_core::domain::context::SwarmContext;
use hive_core::domain::swarm::SwarmId;

pub use path::WatchPath;
pub use subscription::{
    ContextChange, ContextChangeHandler, SubscriptionBroker, SubscriptionId, SubscriptionRequest,
};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Context already exists for swarm {0}")]
    AlreadyExists(SwarmId),

    #[error("No context for swarm {0}")]
    NotFound(SwarmId),

    #[error("Context updates must be JSON objects, got {0}")]
    InvalidPartial(&'static str),

    #[error("Context serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of a committed update.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextUpdate {
    pub version: u64,
    pub changed_paths: Vec<String>,
    pub notified: usize,
}

struct ContextEntry {
    document: Value,
    version: u64,
}

#[derive(Default)]
pub struct ContextStore {
    documents: DashMap<SwarmId, Arc<Mutex<ContextEntry>>>,
    broker: SubscriptionBroker,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broker(&self) -> &SubscriptionBroker {
        &self.broker
    }

    /// Store the initial context. Creation does not notify subscribers.
    pub fn create_context(&self, swarm_id: SwarmId, context: &SwarmContext) -> Result<(), ContextError> {
        use dashmap::mapref::entry::Entry;

        let document = serde_json::to_value(context)?;
        match self.documents.entry(swarm_id) {
            Entry::Occupied(_) => Err(ContextError::AlreadyExists(swarm_id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(ContextEntry {
                    document,
                    version: 0,
                })));
                debug!(swarm_id = %swarm_id, "Context created");
                Ok(())
            }
        }
    }

    pub fn get_context(&self, swarm_id: SwarmId) -> Option<SwarmContext> {
        let document = self.get_document(swarm_id)?;
        match serde_json::from_value(document) {
            Ok(context) => Some(context),
            Err(e) => {
                warn!(swarm_id = %swarm_id, error = %e, "Context no longer matches the typed schema");
                None
            }
        }
    }

    /// Raw document, including extension paths such as `runs.*`.
    pub fn get_document(&self, swarm_id: SwarmId) -> Option<Value> {
        let entry = self.entry(swarm_id)?;
        let document = entry.lock().document.clone();
        Some(document)
    }

    pub fn update_context(&self, swarm_id: SwarmId, partial: &Value) -> Result<ContextUpdate, ContextError> {
        if !partial.is_object() {
            return Err(ContextError::InvalidPartial(json_kind(partial)));
        }
        let entry = self.entry(swarm_id).ok_or(ContextError::NotFound(swarm_id))?;
        let mut guard = entry.lock();

        let mut next = guard.document.clone();
        path::deep_merge(&mut next, partial);
        let mut changed = path::changed_paths(&guard.document, &next);
        if changed.is_empty() {
            return Ok(ContextUpdate {
                version: guard.version,
                changed_paths: Vec::new(),
                notified: 0,
            });
        }

        if let Value::Object(map) = &mut next {
            map.insert("updatedAt".to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        changed.insert("updatedAt".to_string());

        guard.version += 1;
        guard.document = next;
        let version = guard.version;
        let changed: Vec<String> = changed.into_iter().collect();
        let snapshot = Arc::new(guard.document.clone());
        let notified = self.broker.dispatch(swarm_id, version, &changed, &snapshot);
        drop(guard);

        debug!(swarm_id = %swarm_id, version, changed = changed.len(), notified, "Context updated");
        Ok(ContextUpdate {
            version,
            changed_paths: changed,
            notified,
        })
    }

    /// Remove a context. Deleting a missing context is not an error.
    pub fn delete_context(&self, swarm_id: SwarmId) -> bool {
        self.documents.remove(&swarm_id).is_some()
    }

    pub fn subscribe(&self, request: SubscriptionRequest) -> SubscriptionId {
        self.broker.subscribe(request)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.broker.unsubscribe(id)
    }

    fn entry(&self, swarm_id: SwarmId) -> Option<Arc<Mutex<ContextEntry>>> {
        self.documents.get(&swarm_id).map(|e| Arc::clone(e.value()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
