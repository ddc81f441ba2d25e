// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Strategy executors and their lazily populated registry.
//!
//! An executor shapes the [`ExecutionContext`] for its strategy and hands the
//! call to the [`AgentBackend`]. Executors hold no per-call state, so one
//! instance per [`StrategyType`] is shared by every swarm.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::debug;

use hive_core::domain::backend::{AgentBackend, BackendError, BackendOutput};
use hive_core::domain::execution::ExecutionContext;
use hive_core::domain::strategy::StrategyType;

#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn strategy_type(&self) -> StrategyType;

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        input: Map<String, Value>,
        backend: &dyn AgentBackend,
    ) -> Result<BackendOutput, BackendError>;
}

/// Free-form dialogue; the swarm's model settings pass through unchanged.
pub struct ConversationalExecutor;

/// Structured multi-iteration analysis bounded by the swarm's iteration limit.
pub struct ReasoningExecutor;

/// Replayable execution: temperature pinned to zero, a single iteration.
pub struct DeterministicExecutor;

const DEFAULT_REASONING_ITERATIONS: u32 = 5;

#[async_trait]
impl ExecutionStrategy for ConversationalExecutor {
    fn strategy_type(&self) -> StrategyType {
        StrategyType::Conversational
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        input: Map<String, Value>,
        backend: &dyn AgentBackend,
    ) -> Result<BackendOutput, BackendError> {
        backend.execute(StrategyType::Conversational, ctx, input).await
    }
}

#[async_trait]
impl ExecutionStrategy for ReasoningExecutor {
    fn strategy_type(&self) -> StrategyType {
        StrategyType::Reasoning
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        input: Map<String, Value>,
        backend: &dyn AgentBackend,
    ) -> Result<BackendOutput, BackendError> {
        let mut shaped = ctx.clone();
        shaped.max_iterations = Some(ctx.max_iterations.unwrap_or(DEFAULT_REASONING_ITERATIONS));
        backend.execute(StrategyType::Reasoning, &shaped, input).await
    }
}

#[async_trait]
impl ExecutionStrategy for DeterministicExecutor {
    fn strategy_type(&self) -> StrategyType {
        StrategyType::Deterministic
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        input: Map<String, Value>,
        backend: &dyn AgentBackend,
    ) -> Result<BackendOutput, BackendError> {
        let mut shaped = ctx.clone();
        shaped.temperature = Some(0.0);
        shaped.max_iterations = Some(1);
        backend.execute(StrategyType::Deterministic, &shaped, input).await
    }
}

/// Executors keyed by strategy, created on first use.
#[derive(Default)]
pub struct StrategyRegistry {
    executors: DashMap<StrategyType, Arc<dyn ExecutionStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, strategy: StrategyType) -> Arc<dyn ExecutionStrategy> {
        let entry = self.executors.entry(strategy).or_insert_with(|| {
            debug!(strategy = %strategy, "Creating strategy executor");
            create_executor(strategy)
        });
        Arc::clone(entry.value())
    }

    pub fn cached_count(&self) -> usize {
        self.executors.len()
    }
}

fn create_executor(strategy: StrategyType) -> Arc<dyn ExecutionStrategy> {
    match strategy {
        StrategyType::Conversational => Arc::new(ConversationalExecutor),
        StrategyType::Reasoning => Arc::new(ReasoningExecutor),
        StrategyType::Deterministic => Arc::new(DeterministicExecutor),
    }
}
