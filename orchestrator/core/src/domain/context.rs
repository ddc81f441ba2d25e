// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Context Document
//!
//! The shared, path-addressable document describing a swarm's goal, policy,
//! resources and configuration. Fields serialise in camelCase so that each one
//! is reachable by a dotted path (`policy.maxTokensPerRequest`,
//! `configuration.temperature`, ...), which is what watch paths match against.
//!
//! The stored form is a JSON object: the typed [`SwarmContext`] is the schema
//! for the well-known fields, and extra paths (for example per-run step
//! outputs under `runs.*`) live alongside them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::resources::ResourceAllocation;
use crate::domain::swarm::{Swarm, SwarmId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPolicy {
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_request: Option<u64>,
    #[serde(default)]
    pub require_approval: bool,
    /// Domains the swarm is restricted to; non-empty forbids free-form
    /// conversational execution.
    #[serde(default)]
    pub domain_restrictions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmContext {
    pub swarm_id: SwarmId,
    pub goal: String,
    /// Session-level default strategy identifier (distinct from per-step choice).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default)]
    pub policy: ContextPolicy,
    pub resources: ResourceAllocation,
    #[serde(default)]
    pub configuration: ContextConfiguration,
    pub status: String,
    #[serde(default)]
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SwarmContext {
    /// Initial context for a freshly started swarm.
    pub fn for_swarm(swarm: &Swarm, policy: ContextPolicy) -> Self {
        let now = Utc::now();
        Self {
            swarm_id: swarm.id,
            goal: swarm.config.goal.clone(),
            strategy: None,
            policy,
            resources: swarm.resources,
            configuration: ContextConfiguration {
                model: swarm.config.model.clone(),
                temperature: swarm.config.temperature,
                max_iterations: swarm.config.max_iterations,
            },
            status: swarm.state().to_string(),
            participants: vec![swarm.metadata.user_id.clone()],
            created_at: now,
            updated_at: now,
        }
    }
}
