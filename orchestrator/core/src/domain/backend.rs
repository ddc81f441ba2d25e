// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::execution::ExecutionContext;
use crate::domain::resources::ResourceAmount;
use crate::domain::strategy::StrategyType;

/// Raw result of one backend call: outputs plus the resources it consumed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendOutput {
    pub outputs: serde_json::Value,
    pub usage: ResourceAmount,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Backend timed out after {0} ms")]
    Timeout(u64),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Execution cancelled")]
    Cancelled,
}

/// The agent/LLM runtime that actually carries out a step.
///
/// Implementations should observe `ctx.cancellation` and return
/// [`BackendError::Cancelled`] promptly once it fires.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn execute(
        &self,
        strategy: StrategyType,
        ctx: &ExecutionContext,
        input: serde_json::Map<String, serde_json::Value>,
    ) -> Result<BackendOutput, BackendError>;
}
