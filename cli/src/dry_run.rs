// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use hive_core::domain::backend::{AgentBackend, BackendError, BackendOutput};
use hive_core::domain::execution::ExecutionContext;
use hive_core::domain::resources::ResourceAmount;
use hive_core::domain::strategy::StrategyType;

/// Backend for exercising routines without a model runtime. Every step
/// returns its own input under `echo` and reports no usage.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunBackend;

#[async_trait]
impl AgentBackend for DryRunBackend {
    async fn execute(
        &self,
        strategy: StrategyType,
        ctx: &ExecutionContext,
        input: Map<String, Value>,
    ) -> Result<BackendOutput, BackendError> {
        if ctx.cancellation.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        debug!(step_id = %ctx.step_id, strategy = %strategy, "Dry-run step");
        Ok(BackendOutput {
            outputs: json!({
                "echo": Value::Object(input),
                "strategy": strategy.as_str(),
            }),
            usage: ResourceAmount::ZERO,
        })
    }
}
