// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! A subscriber watching a path is notified exactly when a matching path
//! changed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use hive_core::domain::context::{ContextPolicy, SwarmContext};
use hive_core::domain::resources::{ResourceAllocation, ResourceAmount};
use hive_core::domain::swarm::SwarmId;
use hive_swarm::context::{ContextChange, ContextStore, SubscriptionRequest, WatchPath};

fn context(swarm_id: SwarmId) -> SwarmContext {
    SwarmContext {
        swarm_id,
        goal: "keep the lights on".to_string(),
        strategy: None,
        policy: ContextPolicy::default(),
        resources: ResourceAllocation::new(ResourceAmount::new(10, 10, 10)),
        configuration: Default::default(),
        status: "RUNNING".to_string(),
        participants: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn watch(
    store: &ContextStore,
    swarm_id: SwarmId,
    path: &str,
) -> mpsc::UnboundedReceiver<ContextChange> {
    let (tx, rx) = mpsc::unbounded_channel();
    store.subscribe(SubscriptionRequest {
        swarm_id,
        subscriber_id: format!("watcher:{path}"),
        watch_paths: vec![path.to_string()],
        handler: Arc::new(tx),
    });
    rx
}

async fn drain(rx: &mut mpsc::UnboundedReceiver<ContextChange>) -> Vec<ContextChange> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut changes = Vec::new();
    while let Ok(change) = rx.try_recv() {
        changes.push(change);
    }
    changes
}

#[tokio::test]
async fn test_subscriber_invoked_iff_matching_path_changed() {
    let swarm_id = SwarmId::new();

    let updates: Vec<Value> = vec![
        json!({"policy": {"maxTokensPerRequest": 256}}),
        json!({"goal": "keep the lights on"}),
        json!({"configuration": {"temperature": 0.3}}),
        json!({"policy": {"allowedModels": ["small"]}}),
        json!({"runs": {"r1": {"steps": {"s1": {"result": 1}}}}}),
        json!({"policy": {"maxTokensPerRequest": 256}}),
        json!({"policy": {"maxTokensPerRequest": 512}}),
    ];

    for pattern in ["policy.maxTokensPerRequest", "policy", "policy.*", "runs.*", "*"] {
        let store = ContextStore::new();
        store.create_context(swarm_id, &context(swarm_id)).unwrap();
        let watch_path = WatchPath::parse(pattern);
        let mut rx = watch(&store, swarm_id, pattern);

        let mut expected = 0;
        for update in &updates {
            let committed = store.update_context(swarm_id, update).unwrap();
            if committed.changed_paths.iter().any(|p| watch_path.matches(p)) {
                expected += 1;
            }
        }

        let changes = drain(&mut rx).await;
        assert_eq!(changes.len(), expected, "pattern {pattern}");
        assert!(changes.windows(2).all(|w| w[0].version < w[1].version));
        for change in &changes {
            assert!(!change.matched_paths.is_empty());
        }
    }
}

#[tokio::test]
async fn test_unchanged_update_notifies_nobody() {
    let store = ContextStore::new();
    let swarm_id = SwarmId::new();
    store.create_context(swarm_id, &context(swarm_id)).unwrap();
    let mut rx = watch(&store, swarm_id, "*");

    let update = store
        .update_context(swarm_id, &json!({"status": "RUNNING"}))
        .unwrap();
    assert!(update.changed_paths.is_empty());
    assert!(drain(&mut rx).await.is_empty());
}

#[tokio::test]
async fn test_delete_then_get_and_double_delete() {
    let store = ContextStore::new();
    let swarm_id = SwarmId::new();
    store.create_context(swarm_id, &context(swarm_id)).unwrap();
    assert!(store.delete_context(swarm_id));
    assert!(store.get_context(swarm_id).is_none());
    assert!(!store.delete_context(swarm_id));
}
