// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Strategy Resolver
//!
//! Chooses how a step runs. The declared strategy comes from an explicit,
//! parseable `config.strategy`, else from the step type, else from the
//! configured default. Two layers then apply, first match wins:
//!
//! 1. **Policy**: sensitive data forces Conversational to Deterministic;
//!    domain restrictions force Conversational to Reasoning; a severe time
//!    budget forces Deterministic and a severe cost ceiling forces Reasoning.
//!    A policy override never makes a step less deterministic than declared.
//! 2. **Adaptive** (opt-in): usage hints naming a more deterministic
//!    candidate produce a `strategy.graduation_considered` event. The
//!    strategy itself is left alone.
//!
//! Resolution is a pure function of its inputs; only the published events
//! are side effects.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hive_core::domain::events::StrategyEvent;
use hive_core::domain::execution::{ExecutionContext, UsageHints};
use hive_core::domain::node_config::StrategyConfig;
use hive_core::domain::strategy::StrategyType;
use hive_core::infrastructure::event_bus::EventBus;

/// Why the policy layer replaced the declared strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideReason {
    SensitiveData,
    DomainRestricted,
    SevereTimeConstraint,
    SevereCostConstraint,
}

impl fmt::Display for OverrideReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SensitiveData => "sensitive_data",
            Self::DomainRestricted => "domain_restricted",
            Self::SevereTimeConstraint => "severe_time_constraint",
            Self::SevereCostConstraint => "severe_cost_constraint",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDecision {
    pub declared: StrategyType,
    pub strategy: StrategyType,
    pub override_reason: Option<OverrideReason>,
    /// Set when the adaptive layer saw a more deterministic candidate.
    pub graduation_candidate: Option<StrategyType>,
}

pub struct StrategyResolver {
    config: StrategyConfig,
    event_bus: EventBus,
}

impl StrategyResolver {
    pub fn new(config: StrategyConfig, event_bus: EventBus) -> Self {
        Self { config, event_bus }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Declared strategy before any policy is applied.
    pub fn declared(&self, ctx: &ExecutionContext) -> StrategyType {
        ctx.config
            .strategy
            .as_deref()
            .and_then(|s| match s.parse::<StrategyType>() {
                Ok(strategy) => Some(strategy),
                Err(e) => {
                    warn!(step_id = %ctx.step_id, error = %e, "Ignoring unparseable declared strategy, falling back");
                    None
                }
            })
            .or_else(|| StrategyType::infer_from_step_type(&ctx.step_type))
            .unwrap_or(self.config.default_strategy)
    }

    /// Resolve without side effects.
    pub fn decide(&self, ctx: &ExecutionContext, hints: Option<&UsageHints>) -> StrategyDecision {
        let declared = self.declared(ctx);

        if let Some((target, reason)) = self.policy_override(ctx, declared) {
            let strategy = target.max(declared);
            return StrategyDecision {
                declared,
                strategy,
                override_reason: (strategy != declared).then_some(reason),
                graduation_candidate: None,
            };
        }

        let graduation_candidate = if self.config.adaptive_optimization {
            hints
                .and_then(|h| h.graduation_candidate)
                .filter(|candidate| *candidate > declared)
        } else {
            None
        };

        StrategyDecision {
            declared,
            strategy: declared,
            override_reason: None,
            graduation_candidate,
        }
    }

    /// Resolve and publish the observability events the decision implies.
    pub fn resolve(&self, ctx: &ExecutionContext, hints: Option<&UsageHints>) -> StrategyDecision {
        let decision = self.decide(ctx, hints);

        if let Some(reason) = decision.override_reason {
            if reason == OverrideReason::SensitiveData {
                warn!(
                    swarm_id = %ctx.swarm_id,
                    step_id = %ctx.step_id,
                    declared = %decision.declared,
                    resolved = %decision.strategy,
                    "Sensitive data forces deterministic execution"
                );
            } else {
                info!(
                    swarm_id = %ctx.swarm_id,
                    step_id = %ctx.step_id,
                    declared = %decision.declared,
                    resolved = %decision.strategy,
                    reason = %reason,
                    "Strategy overridden by policy"
                );
            }
            metrics::counter!("hive_strategy_overrides_total", "reason" => reason.to_string())
                .increment(1);
            self.event_bus.publish(StrategyEvent::StrategyOverride {
                swarm_id: ctx.swarm_id,
                step_id: ctx.step_id.clone(),
                declared: decision.declared,
                resolved: decision.strategy,
                reason: reason.to_string(),
                overridden_at: Utc::now(),
            });
        }

        if let (Some(candidate), Some(hints)) = (decision.graduation_candidate, hints) {
            info!(
                swarm_id = %ctx.swarm_id,
                step_id = %ctx.step_id,
                current = %decision.strategy,
                candidate = %candidate,
                executions = hints.executions,
                "Step is a graduation candidate"
            );
            self.event_bus.publish(StrategyEvent::GraduationConsidered {
                swarm_id: ctx.swarm_id,
                step_id: ctx.step_id.clone(),
                current: decision.strategy,
                candidate,
                hints: hints.clone(),
                considered_at: Utc::now(),
            });
        }

        debug!(step_id = %ctx.step_id, strategy = %decision.strategy, "Strategy resolved");
        decision
    }

    fn policy_override(
        &self,
        ctx: &ExecutionContext,
        declared: StrategyType,
    ) -> Option<(StrategyType, OverrideReason)> {
        if declared == StrategyType::Conversational {
            if ctx.config.sensitive_data {
                return Some((StrategyType::Deterministic, OverrideReason::SensitiveData));
            }
            if !ctx.config.domain_restrictions.is_empty() {
                return Some((StrategyType::Reasoning, OverrideReason::DomainRestricted));
            }
        }

        let available_ms = ctx.resources.available.duration_ms;
        let effective_time_ms = ctx
            .constraints
            .max_time_ms
            .map_or(available_ms, |limit| limit.min(available_ms));
        if effective_time_ms < self.config.severe_time_threshold_ms {
            return Some((StrategyType::Deterministic, OverrideReason::SevereTimeConstraint));
        }

        match ctx.constraints.max_cost {
            Some(cost) if cost < self.config.severe_cost_threshold => {
                Some((StrategyType::Reasoning, OverrideReason::SevereCostConstraint))
            }
            _ => None,
        }
    }
}
