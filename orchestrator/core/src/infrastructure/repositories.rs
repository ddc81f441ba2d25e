// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Lightweight, thread-safe `HashMap`-backed implementation of
//! [`SwarmRepository`] for development, tests and the dry-run CLI.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::repository::{RepositoryError, SwarmRepository};
use crate::domain::swarm::{Swarm, SwarmId};

#[derive(Clone, Default)]
pub struct InMemorySwarmRepository {
    swarms: Arc<RwLock<HashMap<SwarmId, Swarm>>>,
}

impl InMemorySwarmRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Storage("swarm repository lock poisoned".to_string())
}

#[async_trait]
impl SwarmRepository for InMemorySwarmRepository {
    async fn save(&self, swarm: &Swarm) -> Result<(), RepositoryError> {
        let mut swarms = self.swarms.write().map_err(poisoned)?;
        swarms.insert(swarm.id, swarm.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SwarmId) -> Result<Option<Swarm>, RepositoryError> {
        let swarms = self.swarms.read().map_err(poisoned)?;
        Ok(swarms.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Swarm>, RepositoryError> {
        let swarms = self.swarms.read().map_err(poisoned)?;
        Ok(swarms.values().cloned().collect())
    }

    async fn delete(&self, id: SwarmId) -> Result<(), RepositoryError> {
        let mut swarms = self.swarms.write().map_err(poisoned)?;
        swarms.remove(&id);
        Ok(())
    }
}
