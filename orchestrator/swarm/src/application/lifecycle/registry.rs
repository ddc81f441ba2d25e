// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Live swarm handles keyed by id.
//!
//! The registry only knows how to reach a machine. The machine owns the
//! swarm; the handle carries a read-only snapshot the machine refreshes after
//! every change.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hive_core::domain::swarm::{Swarm, SwarmId};

use super::commands::SwarmCommand;

#[derive(Clone)]
pub struct SwarmHandle {
    pub commands: mpsc::Sender<SwarmCommand>,
    pub snapshot: Arc<RwLock<Swarm>>,
    pub cancellation: CancellationToken,
}

impl SwarmHandle {
    pub fn swarm(&self) -> Swarm {
        self.snapshot.read().clone()
    }
}

#[derive(Default)]
pub struct SwarmRegistry {
    handles: DashMap<SwarmId, SwarmHandle>,
}

impl SwarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle. Returns `false` and leaves the registry unchanged
    /// when the id is already live.
    pub fn insert(&self, swarm_id: SwarmId, handle: SwarmHandle) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.handles.entry(swarm_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    pub fn get(&self, swarm_id: SwarmId) -> Option<SwarmHandle> {
        self.handles.get(&swarm_id).map(|h| h.value().clone())
    }

    pub fn remove(&self, swarm_id: SwarmId) -> Option<SwarmHandle> {
        self.handles.remove(&swarm_id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, swarm_id: SwarmId) -> bool {
        self.handles.contains_key(&swarm_id)
    }

    pub fn ids(&self) -> Vec<SwarmId> {
        self.handles.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
