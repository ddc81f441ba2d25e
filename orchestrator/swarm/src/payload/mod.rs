// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Payload Pipeline
//!
//! Builds the input handed to a step and normalises what comes back.
//!
//! Input construction, in order:
//!
//! 1. copy the caller's inputs (they are never mutated)
//! 2. key-suffix coercions ([`coercion`])
//! 3. `{{path}}` placeholders against `{run, user, env}` ([`template`])
//! 4. the `_context` envelope
//! 5. `$ref:step.key` references to outputs stored earlier in the same run
//! 6. `required_inputs` validation
//!
//! Outputs are stored per run so concurrent steps of one run can write
//! without contending on other runs.

pub mod coercion;
pub mod output;
pub mod template;

use std::collections::HashMap;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use hive_core::domain::execution::{OutputSchema, RunId, StepConfig};

use crate::context::path::lookup;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("Missing required input(s) for step '{step_id}': {}", missing.join(", "))]
    MissingInput { step_id: String, missing: Vec<String> },
}

/// Run-scoped view used for templating, the `_context` envelope and output
/// storage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub routine_id: String,
    pub user_id: String,
    pub step_id: Option<String>,
    pub variables: Map<String, Value>,
    pub env: HashMap<String, String>,
}

impl RunContext {
    pub fn for_step(&self, step_id: impl Into<String>) -> Self {
        Self {
            step_id: Some(step_id.into()),
            ..self.clone()
        }
    }

    /// The `{run, user, env}` document placeholders are resolved against.
    pub fn template_view(&self) -> Value {
        json!({
            "run": {
                "id": self.run_id.as_str(),
                "routineId": self.routine_id,
                "stepId": self.step_id,
                "variables": self.variables,
            },
            "user": { "id": self.user_id },
            "env": self.env,
        })
    }

    fn envelope(&self) -> Value {
        json!({
            "runId": self.run_id.as_str(),
            "routineId": self.routine_id,
            "userId": self.user_id,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug, Default)]
pub struct PayloadPipeline {
    outputs: DashMap<RunId, HashMap<String, Map<String, Value>>>,
}

impl PayloadPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_input_payload(
        &self,
        inputs: &Map<String, Value>,
        config: &StepConfig,
        run: &RunContext,
    ) -> Result<Map<String, Value>, PayloadError> {
        let mut payload = inputs.clone();
        coercion::coerce_inputs(&mut payload);

        let view = run.template_view();
        let mut payload = match template::render_value(&Value::Object(payload), &view) {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        payload.insert("_context".to_string(), run.envelope());

        let resolve = |step: &str, key: &str| self.stored_output(&run.run_id, step, key);
        let mut report_dangling = |reference: &str| {
            warn!(run_id = %run.run_id, reference, "Unresolved output reference, using null");
        };
        let resolved = template::resolve_refs(&Value::Object(payload), &resolve, &mut report_dangling);
        let payload = match resolved {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let missing: Vec<String> = config
            .required_inputs
            .iter()
            .filter(|key| payload.get(key.as_str()).is_none_or(Value::is_null))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PayloadError::MissingInput {
                step_id: run.step_id.clone().unwrap_or_default(),
                missing,
            });
        }

        Ok(payload)
    }

    /// Normalise raw backend output, apply the optional schema, and store the
    /// result for `$ref` lookups when the run context names a step.
    pub fn process_outputs(
        &self,
        raw: Value,
        schema: Option<&OutputSchema>,
        run: Option<&RunContext>,
    ) -> Map<String, Value> {
        let normalized = output::normalize(raw);
        let processed = match schema {
            Some(schema) => output::apply_schema(&normalized, schema),
            None => normalized,
        };

        if let Some(run) = run {
            if let Some(step_id) = &run.step_id {
                self.outputs
                    .entry(run.run_id.clone())
                    .or_default()
                    .insert(step_id.clone(), processed.clone());
                debug!(run_id = %run.run_id, step_id = %step_id, "Stored step outputs");
            }
        }
        processed
    }

    pub fn stored_output(&self, run_id: &RunId, step_id: &str, key: &str) -> Option<Value> {
        let run = self.outputs.get(run_id)?;
        let outputs = run.get(step_id)?;
        let (head, rest) = key.split_once('.').unwrap_or((key, ""));
        let value = outputs.get(head)?;
        lookup(value, rest).cloned()
    }

    /// Forget every stored output of a run.
    pub fn clear_run(&self, run_id: &RunId) -> bool {
        self.outputs.remove(run_id).is_some()
    }
}
