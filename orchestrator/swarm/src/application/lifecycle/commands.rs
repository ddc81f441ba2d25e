// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Messages consumed by a swarm machine, one at a time, in arrival order.

use serde_json::{Map, Value};
use tokio::sync::oneshot;

use hive_core::domain::events::StepOutcome;
use hive_core::domain::execution::{RunExecutionConfig, RunId, UsageHints};
use hive_core::domain::resources::ResourceDimension;
use hive_core::domain::swarm::SwarmState;

use crate::error::Result;

pub type Responder = oneshot::Sender<Result<()>>;

#[derive(Debug)]
pub enum SwarmCommand {
    /// Starting -> Running. Sent once, right after the machine is spawned.
    Start { respond: Responder },
    AssignTask(TaskAssignment),
    StatusUpdate(StatusUpdate),
    Pause { respond: Responder },
    Resume { respond: Responder },
    /// Move to a terminal state and tear the swarm down.
    Stop {
        target: SwarmState,
        reason: String,
        respond: Option<Responder>,
    },
}

/// One routine run handed to a swarm.
#[derive(Debug, Clone)]
pub struct TaskAssignment {
    pub run_id: RunId,
    pub routine_version_id: String,
    /// Run-level inputs, visible to templates as `run.variables.*`.
    pub inputs: Map<String, Value>,
    pub config: RunExecutionConfig,
}

/// Bus events re-dispatched to the machine that owns the swarm.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    RunCompleted {
        run_id: RunId,
        success: bool,
        steps: Vec<StepOutcome>,
    },
    ResourcesLow {
        dimension: ResourceDimension,
        remaining: u64,
    },
    Insight {
        step_id: String,
        hints: UsageHints,
    },
}
