// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming using tokio broadcast channels. Every event has a
// dotted topic (`swarm.started`, `run.completed`, ...) and belongs to exactly
// one swarm. Delivery is at-most-once per receiver; a slow receiver lags and
// loses the oldest events, so consumers must be idempotent.

use crate::domain::events::{InsightEvent, ResourceEvent, RunEvent, StrategyEvent, SwarmEvent};
use crate::domain::swarm::SwarmId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Swarm(SwarmEvent),
    Run(RunEvent),
    Resource(ResourceEvent),
    Insight(InsightEvent),
    Strategy(StrategyEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::Swarm(SwarmEvent::SwarmStarted { .. }) => "swarm.started",
            DomainEvent::Swarm(SwarmEvent::SwarmCancelled { .. }) => "swarm.cancelled",
            DomainEvent::Swarm(SwarmEvent::SwarmStateChanged { .. }) => "swarm.state_changed",
            DomainEvent::Run(RunEvent::RunCompleted { .. }) => "run.completed",
            DomainEvent::Resource(ResourceEvent::ResourcesLow { .. }) => "resources.low",
            DomainEvent::Resource(ResourceEvent::ResourcesExhausted { .. }) => {
                "resources.exhausted"
            }
            DomainEvent::Insight(InsightEvent::MetacognitiveInsight { .. }) => {
                "metacognitive.insight"
            }
            DomainEvent::Strategy(StrategyEvent::StrategyOverride { .. }) => "strategy.override",
            DomainEvent::Strategy(StrategyEvent::GraduationConsidered { .. }) => {
                "strategy.graduation_considered"
            }
        }
    }

    pub fn swarm_id(&self) -> SwarmId {
        match self {
            DomainEvent::Swarm(
                SwarmEvent::SwarmStarted { swarm_id, .. }
                | SwarmEvent::SwarmCancelled { swarm_id, .. }
                | SwarmEvent::SwarmStateChanged { swarm_id, .. },
            ) => *swarm_id,
            DomainEvent::Run(RunEvent::RunCompleted { swarm_id, .. }) => *swarm_id,
            DomainEvent::Resource(
                ResourceEvent::ResourcesLow { swarm_id, .. }
                | ResourceEvent::ResourcesExhausted { swarm_id, .. },
            ) => *swarm_id,
            DomainEvent::Insight(InsightEvent::MetacognitiveInsight { swarm_id, .. }) => *swarm_id,
            DomainEvent::Strategy(
                StrategyEvent::StrategyOverride { swarm_id, .. }
                | StrategyEvent::GraduationConsidered { swarm_id, .. },
            ) => *swarm_id,
        }
    }
}

impl From<SwarmEvent> for DomainEvent {
    fn from(event: SwarmEvent) -> Self {
        DomainEvent::Swarm(event)
    }
}

impl From<RunEvent> for DomainEvent {
    fn from(event: RunEvent) -> Self {
        DomainEvent::Run(event)
    }
}

impl From<ResourceEvent> for DomainEvent {
    fn from(event: ResourceEvent) -> Self {
        DomainEvent::Resource(event)
    }
}

impl From<InsightEvent> for DomainEvent {
    fn from(event: InsightEvent) -> Self {
        DomainEvent::Insight(event)
    }
}

impl From<StrategyEvent> for DomainEvent {
    fn from(event: StrategyEvent) -> Self {
        DomainEvent::Strategy(event)
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Capacity determines how many events can be buffered before dropping old ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a domain event to all subscribers
    pub fn publish(&self, event: impl Into<DomainEvent>) {
        let event = event.into();
        debug!(topic = event.topic(), swarm_id = %event.swarm_id(), "Publishing event");

        // send() only fails when nobody is listening
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to a set of topics. A pattern ending in `.*` matches every
    /// topic under that prefix (`resources.*`).
    pub fn subscribe_topics<I, S>(&self, topics: I) -> TopicReceiver
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TopicReceiver {
            receiver: self.sender.subscribe(),
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }

    pub fn subscribe_topic(&self, topic: impl Into<String>) -> TopicReceiver {
        self.subscribe_topics([topic.into()])
    }

    /// Subscribe and filter for a single swarm
    pub fn subscribe_swarm(&self, swarm_id: SwarmId) -> SwarmEventReceiver {
        SwarmEventReceiver {
            receiver: self.sender.subscribe(),
            swarm_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered by topic
pub struct TopicReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    topics: Vec<String>,
}

impl TopicReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if self.matches(event.topic()) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, topic: &str) -> bool {
        self.topics.iter().any(|pattern| match pattern.strip_suffix(".*") {
            Some(prefix) => topic
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => pattern == topic,
        })
    }
}

/// Receiver for a single swarm's events
pub struct SwarmEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    swarm_id: SwarmId,
}

impl SwarmEventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.swarm_id() == self.swarm_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
