// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Step Execution Types
//!
//! Value objects describing a run request and the per-step
//! [`ExecutionContext`] handed to strategies and the agent backend.
//!
//! `RunExecutionConfig` and `StepDefinition` are deserialisable so that routine
//! definitions can be loaded from YAML/JSON by callers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::domain::resources::ResourceAllocation;
use crate::domain::strategy::StrategyType;
use crate::domain::swarm::SwarmId;

/// Identifier of a routine run, assigned by the calling platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time and cost ceilings for a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTransform {
    Trim,
    Uppercase,
    Lowercase,
    Stringify,
    ParseNumber,
    ParseJson,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    pub name: String,
    /// Dotted path into the raw output; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<OutputTransform>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub fields: Vec<OutputField>,
}

/// Per-step declarations that influence strategy choice and payload handling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Declared strategy identifier; unparseable values are treated as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default)]
    pub sensitive_data: bool,
    #[serde(default)]
    pub domain_restrictions: Vec<String>,
    #[serde(default)]
    pub required_inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<OutputSchema>,
}

/// One step of a routine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub step_id: String,
    pub step_type: String,
    #[serde(default)]
    pub config: StepConfig,
    #[serde(default)]
    pub constraints: StepConstraints,
    /// Step-local inputs; run-level inputs are reachable as `run.variables.*`.
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
}

/// Execution options accompanying a run request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunExecutionConfig {
    pub steps: Vec<StepDefinition>,
    /// Overrides the orchestrator-wide halt policy for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_on_error: Option<bool>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

/// Historical usage evidence for a step, produced by external optimisation
/// observers. The core only reads it; thresholds live with the producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageHints {
    pub executions: u64,
    pub success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graduation_candidate: Option<StrategyType>,
}

/// Everything a strategy needs to run one step. Created fresh per invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub swarm_id: SwarmId,
    pub run_id: RunId,
    pub step_id: String,
    pub step_type: String,
    pub config: StepConfig,
    pub constraints: StepConstraints,
    /// Snapshot of the owning swarm's ledger at dispatch time.
    pub resources: ResourceAllocation,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_iterations: Option<u32>,
    /// Cooperative cancellation signal for the backend.
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        swarm_id: SwarmId,
        run_id: RunId,
        step: &StepDefinition,
        resources: ResourceAllocation,
    ) -> Self {
        Self {
            swarm_id,
            run_id,
            step_id: step.step_id.clone(),
            step_type: step.step_type.clone(),
            config: step.config.clone(),
            constraints: step.constraints,
            resources,
            model: None,
            temperature: None,
            max_iterations: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_definition_from_yaml() {
        let yaml = r#"
step_id: summarize
step_type: reasoning-analysis
config:
  strategy: reasoning
  required_inputs: [document]
  output_schema:
    fields:
      - name: summary
        source: result.text
        transform: trim
constraints:
  max_time_ms: 5000
inputs:
  document: "{{run.variables.doc}}"
"#;
        let step: StepDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.step_id, "summarize");
        assert_eq!(step.config.strategy.as_deref(), Some("reasoning"));
        assert!(!step.config.sensitive_data);
        assert_eq!(step.constraints.max_time_ms, Some(5000));
        let schema = step.config.output_schema.unwrap();
        assert_eq!(schema.fields[0].transform, Some(OutputTransform::Trim));
    }
}
