// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use hive_core::domain::backend::AgentBackend;
use hive_core::domain::node_config::{LifecycleConfig, OrchestratorConfigSpec};
use hive_core::domain::repository::SwarmRepository;
use hive_core::infrastructure::event_bus::EventBus;

use crate::context::ContextStore;
use crate::ledger::ResourceLedger;
use crate::payload::PayloadPipeline;
use crate::strategy::{StrategyRegistry, StrategyResolver};

/// Collaborators shared by the controller and every swarm machine.
pub struct SwarmServices {
    pub ledger: ResourceLedger,
    pub contexts: ContextStore,
    pub payloads: PayloadPipeline,
    pub resolver: StrategyResolver,
    pub strategies: StrategyRegistry,
    pub backend: Arc<dyn AgentBackend>,
    pub repository: Arc<dyn SwarmRepository>,
    pub event_bus: EventBus,
    pub lifecycle: LifecycleConfig,
}

impl SwarmServices {
    pub fn new(
        spec: &OrchestratorConfigSpec,
        event_bus: EventBus,
        backend: Arc<dyn AgentBackend>,
        repository: Arc<dyn SwarmRepository>,
    ) -> Self {
        Self {
            ledger: ResourceLedger::new(),
            contexts: ContextStore::new(),
            payloads: PayloadPipeline::new(),
            resolver: StrategyResolver::new(spec.strategy.clone(), event_bus.clone()),
            strategies: StrategyRegistry::new(),
            backend,
            repository,
            event_bus,
            lifecycle: spec.lifecycle.clone(),
        }
    }
}
