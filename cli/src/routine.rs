// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Routine files and the in-process driver behind `hive run`.
//!
//! A routine file names one swarm and the runs to execute on it:
//!
//! ```yaml
//! swarm:
//!   name: support-triage
//!   goal: Triage incoming support tickets
//!   max_credits: 100
//!   max_tokens: 10000
//!   max_time_ms: 300000
//!   user_id: operator
//! runs:
//!   - routine_version_id: triage-v1
//!     steps:
//!       - step_id: classify
//!         step_type: ticket-analysis
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hive_core::domain::events::{RunEvent, StepOutcome, SwarmEvent};
use hive_core::domain::execution::{RunExecutionConfig, RunId};
use hive_core::domain::node_config::OrchestratorConfigManifest;
use hive_core::domain::swarm::SwarmId;
use hive_core::infrastructure::event_bus::{DomainEvent, EventBus, EventBusError};
use hive_core::infrastructure::repositories::InMemorySwarmRepository;
use hive_swarm::{
    SwarmLifecycleController, SwarmRegistry, SwarmServices, SwarmStartConfig, SwarmStatusReport,
};

use crate::dry_run::DryRunBackend;

pub const SAMPLE_ROUTINE: &str = include_str!("../templates/sample-routine.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub swarm: SwarmStartConfig,
    #[serde(default)]
    pub runs: Vec<RoutineRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineRun {
    /// Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub routine_version_id: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(flatten)]
    pub config: RunExecutionConfig,
}

impl Routine {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let routine: Routine = serde_yaml::from_str(yaml).context("Invalid routine document")?;
        if routine.runs.is_empty() {
            anyhow::bail!("Routine declares no runs");
        }
        Ok(routine)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read routine {:?}", path))?;
        Self::from_yaml_str(&content)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub success: bool,
    pub steps: Vec<StepOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineReport {
    pub swarm_id: SwarmId,
    pub runs: Vec<RunReport>,
    /// Status once every run settled, before shutdown.
    pub status: SwarmStatusReport,
}

impl RoutineReport {
    pub fn succeeded(&self) -> bool {
        self.runs.iter().all(|run| run.success)
    }
}

/// Start the routine's swarm on the dry-run backend, execute every run and
/// shut the controller down.
pub async fn execute_routine(
    manifest: &OrchestratorConfigManifest,
    mut routine: Routine,
    timeout: Duration,
) -> Result<RoutineReport> {
    let event_bus = EventBus::new(manifest.spec.event_bus.capacity);
    let services = SwarmServices::new(
        &manifest.spec,
        event_bus.clone(),
        Arc::new(DryRunBackend),
        Arc::new(InMemorySwarmRepository::new()),
    );
    let controller =
        SwarmLifecycleController::new(Arc::new(services), Arc::new(SwarmRegistry::new()));

    let swarm_id = *routine.swarm.swarm_id.get_or_insert_with(SwarmId::new);
    let mut events = event_bus.subscribe_swarm(swarm_id);
    controller
        .start_swarm(routine.swarm)
        .await
        .context("Failed to start swarm")?;

    let mut expected = HashSet::new();
    for (index, run) in routine.runs.into_iter().enumerate() {
        let run_id = RunId::new(
            run.run_id
                .unwrap_or_else(|| format!("{}-{}", run.routine_version_id, index + 1)),
        );
        controller
            .request_run_execution(swarm_id, run_id.clone(), run.routine_version_id, run.inputs, run.config)
            .await
            .with_context(|| format!("Failed to queue run {}", run_id))?;
        expected.insert(run_id);
    }

    let deadline = Instant::now() + timeout;
    let mut runs = Vec::with_capacity(expected.len());
    while !expected.is_empty() {
        let event = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(EventBusError::Lagged(n))) => {
                warn!(skipped = n, "Missed swarm events");
                continue;
            }
            Ok(Err(e)) => return Err(e).context("Event stream ended"),
            Err(_) => anyhow::bail!("Timed out waiting for {} run(s)", expected.len()),
        };
        debug!(topic = event.topic(), "Swarm event");

        match event {
            DomainEvent::Run(RunEvent::RunCompleted {
                run_id,
                success,
                steps,
                ..
            }) if expected.remove(&run_id) => {
                info!(run_id = %run_id, success, steps = steps.len(), "Run finished");
                runs.push(RunReport {
                    run_id,
                    success,
                    steps,
                });
            }
            DomainEvent::Swarm(SwarmEvent::SwarmStateChanged { to, .. }) if to.is_terminal() => {
                warn!(state = %to, pending = expected.len(), "Swarm terminated before every run finished");
                break;
            }
            _ => {}
        }
    }

    let status = controller.get_swarm_status(swarm_id).await;
    controller
        .shutdown()
        .await
        .into_result()
        .context("Shutdown did not complete cleanly")?;

    Ok(RoutineReport {
        swarm_id,
        runs,
        status,
    })
}
