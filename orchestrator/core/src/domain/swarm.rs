// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Aggregate
//!
//! - [`Swarm`] — aggregate root for one orchestration session.
//! - [`SwarmId`] — unique identifier (UUID newtype).
//! - [`SwarmState`] — internal lifecycle state machine.
//! - [`SwarmStatus`] — external status vocabulary derived from the state.
//!
//! ## State Machine
//!
//! ```text
//! Uninitialized -> Starting -> Running <-> Idle
//! Running | Idle -> Paused -> Running
//! any non-terminal -> Stopped | Failed | Terminated
//! ```
//!
//! `Stopped`, `Failed` and `Terminated` are terminal: nothing leaves them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::resources::ResourceAllocation;

/// Unique identifier for a [`Swarm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmId(pub Uuid);

impl SwarmId {
    /// Generate a new random `SwarmId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SwarmId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwarmState {
    Uninitialized,
    Starting,
    Running,
    Idle,
    Paused,
    Stopped,
    Failed,
    Terminated,
}

impl SwarmState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::Terminated)
    }

    /// Whether the machine may accept new work for dispatch.
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Running | Self::Idle)
    }

    pub fn can_transition_to(&self, next: SwarmState) -> bool {
        use SwarmState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Stopped | Failed | Terminated) => true,
            (Uninitialized, Starting) => true,
            (Starting, Running) => true,
            (Running, Idle) | (Idle, Running) => true,
            (Running | Idle, Paused) => true,
            (Paused, Running) => true,
            _ => false,
        }
    }

    /// Map onto the external status vocabulary.
    pub fn external_status(&self) -> SwarmStatus {
        match self {
            Self::Uninitialized | Self::Starting => SwarmStatus::Pending,
            Self::Running | Self::Idle => SwarmStatus::Running,
            Self::Paused => SwarmStatus::Paused,
            Self::Stopped => SwarmStatus::Completed,
            Self::Failed => SwarmStatus::Failed,
            Self::Terminated => SwarmStatus::Cancelled,
        }
    }
}

impl fmt::Display for SwarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Idle => "IDLE",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
            Self::Terminated => "TERMINATED",
        };
        f.write_str(s)
    }
}

/// Status vocabulary exposed to callers outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwarmStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

/// Caller-facing swarm configuration (name, goal, model defaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmConfig {
    pub name: String,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Running mean over every recorded task, completed or failed.
    pub avg_duration_ms: f64,
}

impl SwarmMetrics {
    pub fn record(&mut self, succeeded: bool, duration_ms: u64) {
        let previous = self.tasks_completed + self.tasks_failed;
        if succeeded {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        let total = previous + 1;
        self.avg_duration_ms += (duration_ms as f64 - self.avg_duration_ms) / total as f64;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmMetadata {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

/// Aggregate root for one orchestration session.
///
/// # Invariants
///
/// - `state` only changes through [`Swarm::transition_to`].
/// - A terminal swarm is never revived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swarm {
    pub id: SwarmId,
    state: SwarmState,
    pub config: SwarmConfig,
    pub resources: ResourceAllocation,
    pub metrics: SwarmMetrics,
    pub metadata: SwarmMetadata,
    /// Most recent step failures, oldest first.
    #[serde(default)]
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Number of step errors retained on a [`Swarm`].
pub const MAX_RECENT_ERRORS: usize = 10;

impl Swarm {
    pub fn new(
        id: SwarmId,
        config: SwarmConfig,
        resources: ResourceAllocation,
        metadata: SwarmMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: SwarmState::Uninitialized,
            config,
            resources,
            metrics: SwarmMetrics::default(),
            metadata,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> SwarmState {
        self.state
    }

    /// Move to `next`, returning the previous state, or `Err(current)` when
    /// the transition is not allowed.
    pub fn transition_to(&mut self, next: SwarmState) -> Result<SwarmState, SwarmState> {
        if !self.state.can_transition_to(next) {
            return Err(self.state);
        }
        let previous = self.state;
        self.state = next;
        self.updated_at = Utc::now();
        Ok(previous)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        if self.errors.len() == MAX_RECENT_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(error.into());
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resources::ResourceAmount;

    fn swarm() -> Swarm {
        Swarm::new(
            SwarmId::new(),
            SwarmConfig {
                name: "triage".to_string(),
                goal: "sort the inbox".to_string(),
                model: None,
                temperature: None,
                max_iterations: None,
            },
            ResourceAllocation::new(ResourceAmount::new(100, 10_000, 300_000)),
            SwarmMetadata::default(),
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut swarm = swarm();
        assert_eq!(swarm.state(), SwarmState::Uninitialized);
        assert!(swarm.transition_to(SwarmState::Starting).is_ok());
        assert!(swarm.transition_to(SwarmState::Running).is_ok());
        assert!(swarm.transition_to(SwarmState::Idle).is_ok());
        assert!(swarm.transition_to(SwarmState::Paused).is_ok());
        assert!(swarm.transition_to(SwarmState::Running).is_ok());
        assert!(swarm.transition_to(SwarmState::Terminated).is_ok());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut swarm = swarm();
        swarm.transition_to(SwarmState::Failed).unwrap();
        assert_eq!(swarm.transition_to(SwarmState::Running), Err(SwarmState::Failed));
        assert_eq!(swarm.transition_to(SwarmState::Stopped), Err(SwarmState::Failed));
    }

    #[test]
    fn test_illegal_shortcuts_rejected() {
        assert!(!SwarmState::Uninitialized.can_transition_to(SwarmState::Running));
        assert!(!SwarmState::Paused.can_transition_to(SwarmState::Idle));
        assert!(!SwarmState::Starting.can_transition_to(SwarmState::Paused));
    }

    #[test]
    fn test_external_status_mapping() {
        assert_eq!(SwarmState::Starting.external_status(), SwarmStatus::Pending);
        assert_eq!(SwarmState::Idle.external_status(), SwarmStatus::Running);
        assert_eq!(SwarmState::Terminated.external_status(), SwarmStatus::Cancelled);
        assert_eq!(SwarmState::Stopped.external_status(), SwarmStatus::Completed);
    }

    #[test]
    fn test_recent_errors_are_capped() {
        let mut swarm = swarm();
        for i in 0..15 {
            swarm.record_error(format!("error {i}"));
        }
        assert_eq!(swarm.errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(swarm.errors[0], "error 5");
        assert_eq!(swarm.errors[9], "error 14");
    }

    #[test]
    fn test_metrics_running_average() {
        let mut metrics = SwarmMetrics::default();
        metrics.record(true, 100);
        metrics.record(false, 300);
        assert_eq!(metrics.tasks_completed, 1);
        assert_eq!(metrics.tasks_failed, 1);
        assert!((metrics.avg_duration_ms - 200.0).abs() < f64::EPSILON);
    }
}
