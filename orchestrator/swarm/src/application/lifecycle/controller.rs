// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Lifecycle Controller
//!
//! External control surface for swarms: start, run, status, pause, resume,
//! cancel and shutdown. Each live swarm is a [`SwarmMachine`] reached through
//! its [`SwarmHandle`] in the [`SwarmRegistry`].
//!
//! The controller also runs the event router: `run.completed`,
//! `resources.low` and `metacognitive.insight` events on the bus are
//! forwarded to the owning machine as [`StatusUpdate`]s. Events for swarms
//! that are not live are dropped.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hive_core::domain::context::{ContextPolicy, SwarmContext};
use hive_core::domain::events::{InsightEvent, ResourceEvent, RunEvent, SwarmEvent};
use hive_core::domain::execution::{RunExecutionConfig, RunId};
use hive_core::domain::resources::{ResourceAllocation, ResourceAmount};
use hive_core::domain::strategy::StrategyType;
use hive_core::domain::swarm::{
    Swarm, SwarmConfig, SwarmId, SwarmMetadata, SwarmMetrics, SwarmState, SwarmStatus,
};
use hive_core::infrastructure::event_bus::{DomainEvent, EventBusError};

use super::commands::{StatusUpdate, SwarmCommand, TaskAssignment};
use super::machine::SwarmMachine;
use super::registry::{SwarmHandle, SwarmRegistry};
use super::services::SwarmServices;
use crate::error::{Result, SwarmError};
use crate::ledger::LedgerError;

/// Topics the router forwards to swarm machines.
pub const ROUTED_TOPICS: [&str; 3] = ["run.completed", "resources.low", "metacognitive.insight"];

/// Everything needed to start a swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmStartConfig {
    /// Caller-chosen id; a fresh one is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swarm_id: Option<SwarmId>,
    #[serde(flatten)]
    pub config: SwarmConfig,
    pub max_credits: u64,
    pub max_tokens: u64,
    pub max_time_ms: u64,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub policy: ContextPolicy,
    /// Session-level default recorded in the shared context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_strategy: Option<StrategyType>,
}

impl SwarmStartConfig {
    fn validate(&self) -> Result<()> {
        if self.config.name.trim().is_empty() {
            return Err(SwarmError::InvalidConfig("name must not be empty".to_string()));
        }
        let limits = ResourceAmount::new(self.max_credits, self.max_tokens, self.max_time_ms);
        if limits.any_zero() {
            return Err(SwarmError::InvalidConfig(
                "max_credits, max_tokens and max_time_ms must all be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwarmStatusReport {
    pub swarm_id: SwarmId,
    pub status: SwarmStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SwarmState>,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceAllocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SwarmMetrics>,
    pub errors: Vec<String>,
}

impl SwarmStatusReport {
    fn unknown(swarm_id: SwarmId) -> Self {
        Self {
            swarm_id,
            status: SwarmStatus::Unknown,
            state: None,
            progress: 0.0,
            resources: None,
            metrics: None,
            errors: vec!["Swarm not found".to_string()],
        }
    }

    fn from_swarm(swarm: &Swarm, resources: ResourceAllocation) -> Self {
        Self {
            swarm_id: swarm.id,
            status: swarm.state().external_status(),
            state: Some(swarm.state()),
            progress: resources.progress_percent(),
            resources: Some(resources),
            metrics: Some(swarm.metrics.clone()),
            errors: swarm.errors.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub stopped: Vec<SwarmId>,
    pub failures: Vec<(SwarmId, String)>,
}

impl ShutdownReport {
    pub fn into_result(self) -> Result<Vec<SwarmId>> {
        if self.failures.is_empty() {
            Ok(self.stopped)
        } else {
            Err(SwarmError::ShutdownPartialFailure(self.failures))
        }
    }
}

pub struct SwarmLifecycleController {
    services: Arc<SwarmServices>,
    registry: Arc<SwarmRegistry>,
    router_shutdown: CancellationToken,
    router: JoinHandle<()>,
}

impl SwarmLifecycleController {
    /// Create the controller and spawn its event router. Must be called from
    /// within a Tokio runtime.
    pub fn new(services: Arc<SwarmServices>, registry: Arc<SwarmRegistry>) -> Self {
        let router_shutdown = CancellationToken::new();
        let router = spawn_router(&services, Arc::clone(&registry), router_shutdown.clone());
        Self {
            services,
            registry,
            router_shutdown,
            router,
        }
    }

    pub fn services(&self) -> &Arc<SwarmServices> {
        &self.services
    }

    pub fn registry(&self) -> &Arc<SwarmRegistry> {
        &self.registry
    }

    pub async fn start_swarm(&self, start: SwarmStartConfig) -> Result<SwarmId> {
        start.validate()?;
        let swarm_id = start.swarm_id.unwrap_or_default();

        if self.registry.contains(swarm_id)
            || self.services.repository.find_by_id(swarm_id).await?.is_some()
        {
            return Err(SwarmError::DuplicateSwarm(swarm_id));
        }

        let allocated = ResourceAmount::new(start.max_credits, start.max_tokens, start.max_time_ms);
        let resources = match self.services.ledger.open_account(swarm_id, allocated) {
            Ok(resources) => resources,
            Err(LedgerError::AccountExists(_)) => return Err(SwarmError::DuplicateSwarm(swarm_id)),
            Err(e) => return Err(e.into()),
        };

        let mut swarm = Swarm::new(
            swarm_id,
            start.config,
            resources,
            SwarmMetadata {
                user_id: start.user_id.clone(),
                organization_id: start.organization_id,
            },
        );

        if let Err(e) = self.prepare(&mut swarm, start.policy, start.default_strategy).await {
            self.rollback(swarm_id);
            return Err(e);
        }

        let (commands, receiver) = mpsc::channel(self.services.lifecycle.command_queue_capacity);
        let handle = SwarmHandle {
            commands,
            snapshot: Arc::new(RwLock::new(swarm.clone())),
            cancellation: CancellationToken::new(),
        };
        if !self.registry.insert(swarm_id, handle.clone()) {
            self.rollback(swarm_id);
            return Err(SwarmError::DuplicateSwarm(swarm_id));
        }

        let name = swarm.config.name.clone();
        SwarmMachine::new(
            swarm,
            Arc::clone(&self.services),
            Arc::clone(&self.registry),
            Arc::clone(&handle.snapshot),
            handle.cancellation.clone(),
            receiver,
        )
        .spawn();

        let (respond, accepted) = oneshot::channel();
        if handle.commands.send(SwarmCommand::Start { respond }).await.is_err() {
            self.registry.remove(swarm_id);
            self.rollback(swarm_id);
            return Err(SwarmError::MachineUnavailable(swarm_id));
        }
        accepted
            .await
            .map_err(|_| SwarmError::MachineUnavailable(swarm_id))??;

        metrics::counter!("hive_swarms_started_total").increment(1);
        info!(swarm_id = %swarm_id, name = %name, user_id = %start.user_id, "Swarm started");
        self.services.event_bus.publish(SwarmEvent::SwarmStarted {
            swarm_id,
            name,
            user_id: start.user_id,
            started_at: Utc::now(),
        });

        Ok(swarm_id)
    }

    /// Persist the Uninitialized record, create the context, move to Starting.
    async fn prepare(
        &self,
        swarm: &mut Swarm,
        policy: ContextPolicy,
        default_strategy: Option<StrategyType>,
    ) -> Result<()> {
        self.services.repository.save(swarm).await?;

        let mut context = SwarmContext::for_swarm(swarm, policy);
        context.strategy = default_strategy.map(|s| s.as_str().to_string());
        self.services.contexts.create_context(swarm.id, &context)?;

        let from = swarm
            .transition_to(SwarmState::Starting)
            .map_err(|current| SwarmError::InvalidTransition {
                swarm_id: swarm.id,
                from: current,
                to: SwarmState::Starting,
            })?;
        self.services.event_bus.publish(SwarmEvent::SwarmStateChanged {
            swarm_id: swarm.id,
            from,
            to: SwarmState::Starting,
            changed_at: Utc::now(),
        });
        self.services.repository.save(swarm).await?;
        Ok(())
    }

    fn rollback(&self, swarm_id: SwarmId) {
        warn!(swarm_id = %swarm_id, "Rolling back swarm start");
        self.services.ledger.close_account(swarm_id);
        self.services.contexts.delete_context(swarm_id);
    }

    /// Queue a routine run on a live swarm.
    pub async fn request_run_execution(
        &self,
        swarm_id: SwarmId,
        run_id: RunId,
        routine_version_id: impl Into<String>,
        inputs: Map<String, Value>,
        config: RunExecutionConfig,
    ) -> Result<RunId> {
        let handle = self
            .registry
            .get(swarm_id)
            .ok_or(SwarmError::SwarmNotFound(swarm_id))?;

        let assignment = TaskAssignment {
            run_id: run_id.clone(),
            routine_version_id: routine_version_id.into(),
            inputs,
            config,
        };
        handle
            .commands
            .send(SwarmCommand::AssignTask(assignment))
            .await
            .map_err(|_| SwarmError::MachineUnavailable(swarm_id))?;

        debug!(swarm_id = %swarm_id, run_id = %run_id, "Run queued");
        Ok(run_id)
    }

    /// Never fails: unknown swarms report [`SwarmStatus::Unknown`].
    pub async fn get_swarm_status(&self, swarm_id: SwarmId) -> SwarmStatusReport {
        if let Some(handle) = self.registry.get(swarm_id) {
            let swarm = handle.swarm();
            let resources = self
                .services
                .ledger
                .snapshot(swarm_id)
                .unwrap_or(swarm.resources);
            return SwarmStatusReport::from_swarm(&swarm, resources);
        }

        match self.services.repository.find_by_id(swarm_id).await {
            Ok(Some(swarm)) => SwarmStatusReport::from_swarm(&swarm, swarm.resources),
            Ok(None) => SwarmStatusReport::unknown(swarm_id),
            Err(e) => {
                warn!(swarm_id = %swarm_id, error = %e, "Status lookup failed");
                let mut report = SwarmStatusReport::unknown(swarm_id);
                report.errors = vec![e.to_string()];
                report
            }
        }
    }

    /// Cancel a live swarm. No further steps are dispatched; a step already
    /// in flight settles before the swarm terminates.
    pub async fn cancel_swarm(
        &self,
        swarm_id: SwarmId,
        user_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<()> {
        let handle = self
            .registry
            .remove(swarm_id)
            .ok_or(SwarmError::SwarmNotFound(swarm_id))?;
        let user_id = user_id.into();
        let reason = reason.into();

        handle.cancellation.cancel();
        stop_machine(swarm_id, &handle, SwarmState::Terminated, reason.clone()).await?;

        info!(swarm_id = %swarm_id, user_id = %user_id, reason = %reason, "Swarm cancelled");
        self.services.event_bus.publish(SwarmEvent::SwarmCancelled {
            swarm_id,
            user_id,
            reason,
            cancelled_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn pause_swarm(&self, swarm_id: SwarmId) -> Result<()> {
        self.request(swarm_id, |respond| SwarmCommand::Pause { respond })
            .await
    }

    pub async fn resume_swarm(&self, swarm_id: SwarmId) -> Result<()> {
        self.request(swarm_id, |respond| SwarmCommand::Resume { respond })
            .await
    }

    async fn request<F>(&self, swarm_id: SwarmId, command: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<()>>) -> SwarmCommand,
    {
        let handle = self
            .registry
            .get(swarm_id)
            .ok_or(SwarmError::SwarmNotFound(swarm_id))?;
        let (respond, response) = oneshot::channel();
        handle
            .commands
            .send(command(respond))
            .await
            .map_err(|_| SwarmError::MachineUnavailable(swarm_id))?;
        response
            .await
            .map_err(|_| SwarmError::MachineUnavailable(swarm_id))?
    }

    /// Stop every live swarm. Failures are collected, never fatal to the
    /// remaining swarms.
    pub async fn shutdown(&self) -> ShutdownReport {
        let ids = self.registry.ids();
        info!(swarms = ids.len(), "Shutting down swarm controller");

        let handles: Vec<(SwarmId, SwarmHandle)> = ids
            .into_iter()
            .filter_map(|id| self.registry.remove(id).map(|handle| (id, handle)))
            .collect();
        for (_, handle) in &handles {
            handle.cancellation.cancel();
        }

        let mut report = ShutdownReport::default();
        for (swarm_id, handle) in handles {
            match stop_machine(swarm_id, &handle, SwarmState::Stopped, "shutdown".to_string()).await {
                Ok(()) => report.stopped.push(swarm_id),
                Err(e) => {
                    error!(swarm_id = %swarm_id, error = %e, "Failed to stop swarm during shutdown");
                    report.failures.push((swarm_id, e.to_string()));
                }
            }
        }

        self.router_shutdown.cancel();
        report
    }
}

impl Drop for SwarmLifecycleController {
    fn drop(&mut self) {
        self.router_shutdown.cancel();
        if !self.router.is_finished() {
            debug!("Event router stopping");
        }
    }
}

async fn stop_machine(
    swarm_id: SwarmId,
    handle: &SwarmHandle,
    target: SwarmState,
    reason: String,
) -> Result<()> {
    let (respond, stopped) = oneshot::channel();
    handle
        .commands
        .send(SwarmCommand::Stop {
            target,
            reason,
            respond: Some(respond),
        })
        .await
        .map_err(|_| SwarmError::MachineUnavailable(swarm_id))?;
    stopped
        .await
        .map_err(|_| SwarmError::MachineUnavailable(swarm_id))?
}

fn spawn_router(
    services: &SwarmServices,
    registry: Arc<SwarmRegistry>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut receiver = services.event_bus.subscribe_topics(ROUTED_TOPICS);
    tokio::spawn(async move {
        let mut routed = 0u64;
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = receiver.recv() => event,
            };
            match event {
                Ok(event) => {
                    if route(&registry, event) {
                        routed += 1;
                    }
                }
                Err(EventBusError::Lagged(n)) => {
                    warn!(skipped = n, "Event router lagged, some status updates were lost");
                }
                Err(EventBusError::Closed) => break,
                Err(e) => {
                    error!(error = %e, "Event router receive failed");
                }
            }
        }
        info!(routed, "Event router stopped");
    })
}

/// Forward one bus event to its swarm's machine. Returns whether it was delivered.
fn route(registry: &SwarmRegistry, event: DomainEvent) -> bool {
    let swarm_id = event.swarm_id();
    let update = match event {
        DomainEvent::Run(RunEvent::RunCompleted {
            run_id,
            success,
            steps,
            ..
        }) => StatusUpdate::RunCompleted {
            run_id,
            success,
            steps,
        },
        DomainEvent::Resource(ResourceEvent::ResourcesLow {
            dimension,
            remaining,
            ..
        }) => StatusUpdate::ResourcesLow {
            dimension,
            remaining,
        },
        DomainEvent::Insight(InsightEvent::MetacognitiveInsight { step_id, hints, .. }) => {
            StatusUpdate::Insight { step_id, hints }
        }
        _ => return false,
    };

    let Some(handle) = registry.get(swarm_id) else {
        debug!(swarm_id = %swarm_id, "Dropping status update for unknown swarm");
        return false;
    };
    match handle.commands.try_send(SwarmCommand::StatusUpdate(update)) {
        Ok(()) => true,
        Err(e) => {
            warn!(swarm_id = %swarm_id, error = %e, "Could not deliver status update");
            false
        }
    }
}
