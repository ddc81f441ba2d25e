// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Subscription Broker
//!
//! Watchers register interest in dotted context paths for one swarm. Each
//! subscription owns an unbounded queue drained by a dedicated task, so a
//! context update only enqueues and never waits on a handler. Changes reach a
//! given subscriber in commit order.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use hive_core::domain::swarm::SwarmId;

use super::path::WatchPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivered to a subscriber after a committed update touched a watched path.
#[derive(Debug, Clone)]
pub struct ContextChange {
    pub swarm_id: SwarmId,
    pub subscription_id: SubscriptionId,
    /// Per-swarm commit counter; strictly increasing per subscriber.
    pub version: u64,
    /// Every path the update changed, sorted.
    pub changed_paths: Vec<String>,
    /// The subset of `changed_paths` this subscription watches.
    pub matched_paths: Vec<String>,
    /// Document as committed by the update.
    pub document: Arc<Value>,
}

#[async_trait]
pub trait ContextChangeHandler: Send + Sync {
    async fn handle(&self, change: ContextChange);
}

/// Forwarding into a channel lets callers consume changes as a stream.
#[async_trait]
impl ContextChangeHandler for mpsc::UnboundedSender<ContextChange> {
    async fn handle(&self, change: ContextChange) {
        if self.send(change).is_err() {
            debug!("Context change receiver dropped");
        }
    }
}

pub struct SubscriptionRequest {
    pub swarm_id: SwarmId,
    pub subscriber_id: String,
    pub watch_paths: Vec<String>,
    pub handler: Arc<dyn ContextChangeHandler>,
}

struct Subscription {
    id: SubscriptionId,
    subscriber_id: String,
    watch_paths: Vec<WatchPath>,
    queue: mpsc::UnboundedSender<ContextChange>,
}

impl Subscription {
    fn matched<'a>(&self, changed: &'a [String]) -> Vec<&'a String> {
        changed
            .iter()
            .filter(|path| self.watch_paths.iter().any(|w| w.matches(path)))
            .collect()
    }
}

#[derive(Default)]
pub struct SubscriptionBroker {
    by_swarm: DashMap<SwarmId, Vec<Subscription>>,
    index: DashMap<SubscriptionId, SwarmId>,
}

impl SubscriptionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher. Must be called from within a Tokio runtime: the
    /// delivery task is spawned here.
    pub fn subscribe(&self, request: SubscriptionRequest) -> SubscriptionId {
        let id = SubscriptionId::new();
        let (queue, mut rx) = mpsc::unbounded_channel::<ContextChange>();
        let handler = request.handler;
        let subscriber_id = request.subscriber_id;

        let task_subscriber = subscriber_id.clone();
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                handler.handle(change).await;
            }
            debug!(subscription_id = %id, subscriber = %task_subscriber, "Subscription drained");
        });

        let watch_paths: Vec<WatchPath> =
            request.watch_paths.iter().map(|p| WatchPath::parse(p)).collect();
        if watch_paths.is_empty() {
            warn!(subscription_id = %id, "Subscription has no watch paths and will never fire");
        }

        debug!(
            swarm_id = %request.swarm_id,
            subscription_id = %id,
            subscriber = %subscriber_id,
            paths = ?request.watch_paths,
            "Context subscription registered"
        );

        self.by_swarm
            .entry(request.swarm_id)
            .or_default()
            .push(Subscription {
                id,
                subscriber_id,
                watch_paths,
                queue,
            });
        self.index.insert(id, request.swarm_id);
        id
    }

    /// Remove a subscription. Already-queued changes are still delivered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some((_, swarm_id)) = self.index.remove(&id) else {
            return false;
        };
        if let Some(mut subs) = self.by_swarm.get_mut(&swarm_id) {
            subs.retain(|s| s.id != id);
        }
        self.by_swarm.remove_if(&swarm_id, |_, subs| subs.is_empty());
        true
    }

    /// Drop every subscription of a swarm, returning how many were removed.
    pub fn unsubscribe_swarm(&self, swarm_id: SwarmId) -> usize {
        let Some((_, subs)) = self.by_swarm.remove(&swarm_id) else {
            return 0;
        };
        for sub in &subs {
            self.index.remove(&sub.id);
        }
        subs.len()
    }

    pub fn subscription_count(&self, swarm_id: SwarmId) -> usize {
        self.by_swarm.get(&swarm_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Queue a change for every matching subscription of `swarm_id`. Callers
    /// hold the swarm's document lock, which fixes the delivery order.
    pub(crate) fn dispatch(
        &self,
        swarm_id: SwarmId,
        version: u64,
        changed: &[String],
        document: &Arc<Value>,
    ) -> usize {
        let Some(subs) = self.by_swarm.get(&swarm_id) else {
            return 0;
        };
        let mut delivered = 0;
        for sub in subs.iter() {
            let matched = sub.matched(changed);
            if matched.is_empty() {
                continue;
            }
            let change = ContextChange {
                swarm_id,
                subscription_id: sub.id,
                version,
                changed_paths: changed.to_vec(),
                matched_paths: matched.into_iter().cloned().collect(),
                document: Arc::clone(document),
            };
            if sub.queue.send(change).is_ok() {
                delivered += 1;
            } else {
                warn!(subscription_id = %sub.id, subscriber = %sub.subscriber_id, "Subscription task has stopped");
            }
        }
        delivered
    }
}
