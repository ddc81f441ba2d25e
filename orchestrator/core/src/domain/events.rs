// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::execution::{RunId, UsageHints};
use crate::domain::resources::{ResourceAmount, ResourceDimension};
use crate::domain::strategy::StrategyType;
use crate::domain::swarm::{SwarmId, SwarmState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwarmEvent {
    SwarmStarted {
        swarm_id: SwarmId,
        name: String,
        user_id: String,
        started_at: DateTime<Utc>,
    },
    SwarmCancelled {
        swarm_id: SwarmId,
        user_id: String,
        reason: String,
        cancelled_at: DateTime<Utc>,
    },
    SwarmStateChanged {
        swarm_id: SwarmId,
        from: SwarmState,
        to: SwarmState,
        changed_at: DateTime<Utc>,
    },
}

/// Outcome of a single step inside a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyType>,
    pub success: bool,
    /// Backend or pipeline error text, surfaced verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub usage: ResourceAmount,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    RunCompleted {
        swarm_id: SwarmId,
        run_id: RunId,
        success: bool,
        steps: Vec<StepOutcome>,
        completed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResourceEvent {
    /// Raised by external monitors; the ledger never emits it.
    ResourcesLow {
        swarm_id: SwarmId,
        dimension: ResourceDimension,
        remaining: u64,
        detected_at: DateTime<Utc>,
    },
    ResourcesExhausted {
        swarm_id: SwarmId,
        dimension: ResourceDimension,
        requested: u64,
        available: u64,
        detected_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InsightEvent {
    MetacognitiveInsight {
        swarm_id: SwarmId,
        step_id: String,
        hints: UsageHints,
        observed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StrategyEvent {
    StrategyOverride {
        swarm_id: SwarmId,
        step_id: String,
        declared: StrategyType,
        resolved: StrategyType,
        reason: String,
        overridden_at: DateTime<Utc>,
    },
    /// Advisory only: the resolver never changes a strategy because of this.
    GraduationConsidered {
        swarm_id: SwarmId,
        step_id: String,
        current: StrategyType,
        candidate: StrategyType,
        hints: UsageHints,
        considered_at: DateTime<Utc>,
    },
}
