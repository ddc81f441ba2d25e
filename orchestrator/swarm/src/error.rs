// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

use hive_core::domain::backend::BackendError;
use hive_core::domain::repository::RepositoryError;
use hive_core::domain::swarm::{SwarmId, SwarmState};

use crate::context::ContextError;
use crate::ledger::LedgerError;
use crate::payload::PayloadError;

/// Errors surfaced by the swarm lifecycle controller.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Swarm already exists: {0}")]
    DuplicateSwarm(SwarmId),

    #[error("Invalid swarm configuration: {0}")]
    InvalidConfig(String),

    #[error("Swarm not found: {0}")]
    SwarmNotFound(SwarmId),

    #[error("Swarm {swarm_id} cannot move from {from} to {to}")]
    InvalidTransition {
        swarm_id: SwarmId,
        from: SwarmState,
        to: SwarmState,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Backend failures pass through untouched.
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Swarm machine for {0} is no longer running")]
    MachineUnavailable(SwarmId),

    #[error("Shutdown finished with {} failure(s)", .0.len())]
    ShutdownPartialFailure(Vec<(SwarmId, String)>),
}

impl SwarmError {
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, SwarmError::Ledger(e) if e.is_exhaustion())
    }
}

pub type Result<T, E = SwarmError> = std::result::Result<T, E>;
