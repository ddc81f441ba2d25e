// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for the [`Swarm`] aggregate. The interface lives in
//! the domain layer; implementations live in `crate::infrastructure`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `SwarmRepository` | `Swarm` | `InMemorySwarmRepository` |
//!
//! The controller persists a record on start and on every state change, so a
//! terminated swarm stays visible to status queries after it leaves the live
//! registry. Schema design for durable backends is left to the embedding
//! platform.

use async_trait::async_trait;

use crate::domain::swarm::{Swarm, SwarmId};

/// Repository interface for Swarm aggregates
#[async_trait]
pub trait SwarmRepository: Send + Sync {
    /// Save swarm (create or update)
    async fn save(&self, swarm: &Swarm) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: SwarmId) -> Result<Option<Swarm>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Swarm>, RepositoryError>;

    /// Delete swarm by ID. Deleting an absent record is not an error.
    async fn delete(&self, id: SwarmId) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
