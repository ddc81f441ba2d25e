// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Machine
//!
//! One Tokio task per live swarm. The task owns the [`Swarm`] and applies
//! [`SwarmCommand`]s strictly one at a time, so nothing else ever mutates
//! swarm state. Readers see a snapshot refreshed after every change.
//!
//! A run executes its steps in order. For each step the machine builds the
//! [`ExecutionContext`], resolves the strategy, builds the payload, calls the
//! backend through the strategy executor, debits the ledger and merges the
//! outputs into the shared context. The backend call is the only point where
//! the machine waits on anything outside itself.
//!
//! Commands that arrive while a step is in flight are applied before the next
//! step is dispatched. A pause parks the rest of the run at the front of the
//! queue; resuming picks it up at the next undispatched step.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hive_core::domain::events::{ResourceEvent, RunEvent, StepOutcome, SwarmEvent};
use hive_core::domain::execution::{ExecutionContext, RunId, StepDefinition, UsageHints};
use hive_core::domain::resources::ResourceAmount;
use hive_core::domain::strategy::StrategyType;
use hive_core::domain::swarm::{Swarm, SwarmState};

use super::commands::{Responder, StatusUpdate, SwarmCommand, TaskAssignment};
use super::registry::SwarmRegistry;
use super::services::SwarmServices;
use crate::error::{Result, SwarmError};
use crate::ledger::LedgerError;
use crate::context::path;
use crate::payload::RunContext;

/// Run ids remembered for de-duplication of assignments and routed completions.
const RECENT_RUN_CAPACITY: usize = 1024;

/// Bounded set of recently seen run ids; the oldest id is forgotten first.
struct RecentRuns {
    order: VecDeque<RunId>,
    seen: HashSet<RunId>,
    capacity: usize,
}

impl RecentRuns {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            capacity,
        }
    }

    /// Returns false when the id was already present.
    fn insert(&mut self, run_id: RunId) -> bool {
        if !self.seen.insert(run_id.clone()) {
            return false;
        }
        self.order.push_back(run_id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// A queued run and how far it got before it was parked.
struct PendingRun {
    assignment: TaskAssignment,
    next_step: usize,
    outcomes: Vec<StepOutcome>,
    success: bool,
}

impl PendingRun {
    fn new(assignment: TaskAssignment) -> Self {
        Self {
            assignment,
            next_step: 0,
            outcomes: Vec::new(),
            success: true,
        }
    }
}

struct StepReport {
    outcome: StepOutcome,
    /// The ledger refused the step's usage; the run cannot continue.
    exhausted: bool,
}

pub(crate) struct SwarmMachine {
    swarm: Swarm,
    services: Arc<SwarmServices>,
    registry: Arc<SwarmRegistry>,
    snapshot: Arc<RwLock<Swarm>>,
    cancellation: CancellationToken,
    commands: mpsc::Receiver<SwarmCommand>,
    recorded_runs: RecentRuns,
    pending: VecDeque<PendingRun>,
    hints: HashMap<String, UsageHints>,
    stop_responders: Vec<Responder>,
}

impl SwarmMachine {
    pub(crate) fn new(
        swarm: Swarm,
        services: Arc<SwarmServices>,
        registry: Arc<SwarmRegistry>,
        snapshot: Arc<RwLock<Swarm>>,
        cancellation: CancellationToken,
        commands: mpsc::Receiver<SwarmCommand>,
    ) -> Self {
        Self {
            swarm,
            services,
            registry,
            snapshot,
            cancellation,
            commands,
            recorded_runs: RecentRuns::new(RECENT_RUN_CAPACITY),
            pending: VecDeque::new(),
            hints: HashMap::new(),
            stop_responders: Vec::new(),
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let swarm_id = self.swarm.id;
        debug!(swarm_id = %swarm_id, "Swarm machine started");

        while let Some(command) = self.commands.recv().await {
            if self.handle(command).await {
                self.drain_pending().await;
            }
            if self.swarm.state().is_terminal() {
                break;
            }
        }

        if !self.swarm.state().is_terminal() {
            warn!(swarm_id = %swarm_id, "Command channel closed, stopping swarm");
            if let Err(e) = self.transition(SwarmState::Stopped).await {
                error!(swarm_id = %swarm_id, error = %e, "Failed to stop swarm");
            }
        }

        self.teardown().await;

        for respond in self.stop_responders.drain(..) {
            let _ = respond.send(Ok(()));
        }

        // Anything still queued arrived after the swarm became terminal.
        self.commands.close();
        let state = self.swarm.state();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                SwarmCommand::Stop { respond, .. } => {
                    if let Some(respond) = respond {
                        let _ = respond.send(Ok(()));
                    }
                }
                SwarmCommand::Start { respond }
                | SwarmCommand::Pause { respond }
                | SwarmCommand::Resume { respond } => {
                    let _ = respond.send(Err(SwarmError::MachineUnavailable(swarm_id)));
                }
                SwarmCommand::AssignTask(assignment) => {
                    warn!(swarm_id = %swarm_id, run_id = %assignment.run_id, state = %state, "Dropping run for terminated swarm");
                }
                SwarmCommand::StatusUpdate(_) => {}
            }
        }

        debug!(swarm_id = %swarm_id, state = %state, "Swarm machine exited");
    }

    /// Apply one command. Returns whether queued runs may be dispatched now.
    async fn handle(&mut self, command: SwarmCommand) -> bool {
        match command {
            SwarmCommand::Start { respond } => {
                let result = self.transition(SwarmState::Running).await;
                let _ = respond.send(result);
                false
            }
            SwarmCommand::AssignTask(assignment) => self.assign(assignment),
            SwarmCommand::StatusUpdate(update) => {
                self.apply_status_update(update).await;
                false
            }
            SwarmCommand::Pause { respond } => {
                let result = self.transition(SwarmState::Paused).await;
                if result.is_ok() {
                    info!(swarm_id = %self.swarm.id, queued = self.pending.len(), "Swarm paused");
                }
                let _ = respond.send(result);
                false
            }
            SwarmCommand::Resume { respond } => {
                let result = if self.swarm.state() == SwarmState::Paused {
                    self.transition(SwarmState::Running).await
                } else {
                    Err(SwarmError::InvalidTransition {
                        swarm_id: self.swarm.id,
                        from: self.swarm.state(),
                        to: SwarmState::Running,
                    })
                };
                let resumed = result.is_ok();
                let _ = respond.send(result);
                if resumed {
                    info!(swarm_id = %self.swarm.id, queued = self.pending.len(), "Swarm resumed");
                }
                resumed
            }
            SwarmCommand::Stop {
                target,
                reason,
                respond,
            } => {
                info!(swarm_id = %self.swarm.id, target = %target, reason = %reason, "Stopping swarm");
                match self.transition(target).await {
                    Ok(()) => self.stop_responders.extend(respond),
                    Err(e) => {
                        if let Some(respond) = respond {
                            let _ = respond.send(Err(e));
                        }
                    }
                }
                false
            }
        }
    }

    /// Queue a run. Returns whether it may be dispatched right away.
    fn assign(&mut self, assignment: TaskAssignment) -> bool {
        let swarm_id = self.swarm.id;
        let state = self.swarm.state();
        if state != SwarmState::Paused && !state.accepts_work() {
            warn!(swarm_id = %swarm_id, run_id = %assignment.run_id, state = %state, "Swarm cannot accept work, dropping run");
            return false;
        }
        if !self.recorded_runs.insert(assignment.run_id.clone()) {
            warn!(swarm_id = %swarm_id, run_id = %assignment.run_id, "Ignoring duplicate run assignment");
            return false;
        }

        if state == SwarmState::Paused {
            debug!(swarm_id = %swarm_id, run_id = %assignment.run_id, "Swarm paused, queueing run");
        }
        self.pending.push_back(PendingRun::new(assignment));
        state.accepts_work()
    }

    /// Apply commands that arrived while a step was in flight. Never starts a
    /// run; new assignments only join the queue.
    async fn poll_commands(&mut self) {
        while !self.swarm.state().is_terminal() {
            let Ok(command) = self.commands.try_recv() else {
                break;
            };
            self.handle(command).await;
        }
    }

    async fn drain_pending(&mut self) {
        while self.swarm.state().accepts_work() {
            if self.cancellation.is_cancelled() {
                debug!(swarm_id = %self.swarm.id, "Cancellation requested, not dispatching queued runs");
                return;
            }
            let Some(run) = self.pending.pop_front() else {
                break;
            };
            if self.swarm.state() == SwarmState::Idle {
                if let Err(e) = self.transition(SwarmState::Running).await {
                    warn!(swarm_id = %self.swarm.id, error = %e, "Could not resume dispatch");
                    self.pending.push_front(run);
                    return;
                }
            }
            self.execute_run(run).await;
        }

        if self.swarm.state() == SwarmState::Running && self.pending.is_empty() {
            if let Err(e) = self.transition(SwarmState::Idle).await {
                warn!(swarm_id = %self.swarm.id, error = %e, "Could not go idle");
            }
        }
    }

    async fn execute_run(&mut self, mut run: PendingRun) {
        let swarm_id = self.swarm.id;
        let run_id = run.assignment.run_id.clone();
        let config = &run.assignment.config;
        let halt_on_error = config
            .halt_on_error
            .unwrap_or(self.services.lifecycle.halt_on_error);

        let mut variables = config.variables.clone();
        variables.extend(run.assignment.inputs.clone());
        let context = RunContext {
            run_id: run_id.clone(),
            routine_id: run.assignment.routine_version_id.clone(),
            user_id: self.swarm.metadata.user_id.clone(),
            step_id: None,
            variables,
            env: config.env.clone(),
        };

        if run.next_step == 0 {
            info!(swarm_id = %swarm_id, run_id = %run_id, steps = config.steps.len(), "Run started");
        } else {
            info!(swarm_id = %swarm_id, run_id = %run_id, next_step = run.next_step, "Run resumed");
        }

        while run.next_step < run.assignment.config.steps.len() {
            if self.cancellation.is_cancelled() || self.swarm.state().is_terminal() {
                info!(swarm_id = %swarm_id, run_id = %run_id, "Swarm stopping, not dispatching further steps");
                run.success = false;
                break;
            }

            let step = &run.assignment.config.steps[run.next_step];
            let report = self.execute_step(&context.for_step(&step.step_id), step).await;
            run.next_step += 1;
            let failed = !report.outcome.success;
            run.outcomes.push(report.outcome);
            if failed {
                run.success = false;
                if report.exhausted || halt_on_error {
                    break;
                }
            }

            self.poll_commands().await;
            if self.swarm.state() == SwarmState::Paused
                && run.next_step < run.assignment.config.steps.len()
            {
                info!(swarm_id = %swarm_id, run_id = %run_id, next_step = run.next_step, "Run parked while paused");
                self.pending.push_front(run);
                return;
            }
        }

        let success = run.success;
        self.services.payloads.clear_run(&run_id);
        self.persist().await;

        info!(swarm_id = %swarm_id, run_id = %run_id, success, steps = run.outcomes.len(), "Run completed");
        self.services.event_bus.publish(RunEvent::RunCompleted {
            swarm_id,
            run_id,
            success,
            steps: run.outcomes,
            completed_at: Utc::now(),
        });

        if !success
            && halt_on_error
            && !self.cancellation.is_cancelled()
            && !self.swarm.state().is_terminal()
        {
            if let Err(e) = self.transition(SwarmState::Failed).await {
                error!(swarm_id = %swarm_id, error = %e, "Failed to halt swarm");
            }
        }
    }

    async fn execute_step(&mut self, run: &RunContext, step: &StepDefinition) -> StepReport {
        let swarm_id = self.swarm.id;
        let resources = self
            .services
            .ledger
            .snapshot(swarm_id)
            .unwrap_or(self.swarm.resources);

        let mut ctx = ExecutionContext::new(swarm_id, run.run_id.clone(), step, resources)
            .with_cancellation(self.cancellation.child_token());
        ctx.model = self.swarm.config.model.clone();
        ctx.temperature = self.swarm.config.temperature;
        ctx.max_iterations = self.swarm.config.max_iterations;
        self.merge_policy(&mut ctx);

        let decision = self
            .services
            .resolver
            .resolve(&ctx, self.hints.get(&step.step_id));
        let strategy = decision.strategy;

        let started = Instant::now();
        let input = match self
            .services
            .payloads
            .build_input_payload(&step.inputs, &ctx.config, run)
        {
            Ok(input) => input,
            Err(e) => {
                warn!(swarm_id = %swarm_id, step_id = %step.step_id, error = %e, "Step input rejected");
                return self.step_failed(step, strategy, e.to_string(), ResourceAmount::ZERO, 0);
            }
        };

        let executor = self.services.strategies.get(strategy);
        let result = executor
            .execute(&ctx, input, self.services.backend.as_ref())
            .await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                warn!(swarm_id = %swarm_id, step_id = %step.step_id, strategy = %strategy, error = %e, "Step failed");
                let charged = self.charge_failed_attempt(elapsed_ms);
                return self.step_failed(step, strategy, e.to_string(), charged, elapsed_ms);
            }
        };

        let mut usage = output.usage;
        if usage.duration_ms == 0 {
            usage.duration_ms = elapsed_ms;
        }
        match self.services.ledger.debit(swarm_id, usage) {
            Ok(allocation) => self.swarm.resources = allocation,
            Err(e) => {
                self.report_exhaustion(&e);
                let mut report =
                    self.step_failed(step, strategy, SwarmError::from(e).to_string(), ResourceAmount::ZERO, elapsed_ms);
                report.exhausted = true;
                return report;
            }
        }

        let outputs = self.services.payloads.process_outputs(
            output.outputs,
            step.config.output_schema.as_ref(),
            Some(run),
        );
        self.merge_step_outputs(&run.run_id, &step.step_id, outputs);

        self.swarm.metrics.record(true, elapsed_ms);
        metrics::counter!("hive_steps_executed_total", "strategy" => strategy.as_str(), "outcome" => "success")
            .increment(1);
        debug!(swarm_id = %swarm_id, step_id = %step.step_id, strategy = %strategy, ?usage, "Step succeeded");

        StepReport {
            outcome: StepOutcome {
                step_id: step.step_id.clone(),
                strategy: Some(strategy),
                success: true,
                error: None,
                usage,
                duration_ms: elapsed_ms,
            },
            exhausted: false,
        }
    }

    fn step_failed(
        &mut self,
        step: &StepDefinition,
        strategy: StrategyType,
        error: String,
        usage: ResourceAmount,
        duration_ms: u64,
    ) -> StepReport {
        self.swarm.metrics.record(false, duration_ms);
        self.swarm.record_error(format!("{}: {}", step.step_id, error));
        metrics::counter!("hive_steps_executed_total", "strategy" => strategy.as_str(), "outcome" => "failure")
            .increment(1);
        StepReport {
            outcome: StepOutcome {
                step_id: step.step_id.clone(),
                strategy: Some(strategy),
                success: false,
                error: Some(error),
                usage,
                duration_ms,
            },
            exhausted: false,
        }
    }

    /// A failed attempt still spent wall-clock time, capped at what is left.
    fn charge_failed_attempt(&mut self, elapsed_ms: u64) -> ResourceAmount {
        let swarm_id = self.swarm.id;
        let Some(current) = self.services.ledger.snapshot(swarm_id) else {
            return ResourceAmount::ZERO;
        };
        let charge = ResourceAmount::duration_ms(elapsed_ms.min(current.available.duration_ms));
        if charge.is_zero() {
            return charge;
        }
        match self.services.ledger.debit(swarm_id, charge) {
            Ok(allocation) => {
                self.swarm.resources = allocation;
                self.update_context(json!({ "resources": allocation }));
                charge
            }
            Err(e) => {
                warn!(swarm_id = %swarm_id, error = %e, "Could not charge failed attempt");
                ResourceAmount::ZERO
            }
        }
    }

    fn report_exhaustion(&self, error: &LedgerError) {
        let swarm_id = self.swarm.id;
        error!(swarm_id = %swarm_id, error = %error, "Step usage exceeds available resources");
        if let LedgerError::InsufficientResources {
            dimension,
            requested,
            available,
        } = *error
        {
            self.services.event_bus.publish(ResourceEvent::ResourcesExhausted {
                swarm_id,
                dimension,
                requested,
                available,
                detected_at: Utc::now(),
            });
        }
    }

    /// Union the swarm policy's domain restrictions into the step's own.
    /// Read from the raw document so extension fields cannot hide the policy.
    fn merge_policy(&self, ctx: &mut ExecutionContext) {
        let Some(document) = self.services.contexts.get_document(self.swarm.id) else {
            return;
        };
        let domains = match path::lookup(&document, "policy.domainRestrictions") {
            Some(Value::Array(domains)) => domains,
            Some(other) => {
                warn!(swarm_id = %self.swarm.id, value = %other, "Ignoring malformed domain restrictions");
                return;
            }
            None => return,
        };
        for domain in domains.iter().filter_map(Value::as_str) {
            if !ctx.config.domain_restrictions.iter().any(|d| d == domain) {
                ctx.config.domain_restrictions.push(domain.to_string());
            }
        }
    }

    /// Step outputs and the resource mirror land in a single context update.
    fn merge_step_outputs(&self, run_id: &RunId, step_id: &str, outputs: Map<String, Value>) {
        let mut steps = Map::new();
        steps.insert(step_id.to_string(), Value::Object(outputs));
        let mut runs = Map::new();
        runs.insert(run_id.to_string(), json!({ "steps": steps }));
        self.update_context(json!({
            "runs": runs,
            "resources": self.swarm.resources,
        }));
    }

    fn update_context(&self, partial: Value) {
        if let Err(e) = self.services.contexts.update_context(self.swarm.id, &partial) {
            warn!(swarm_id = %self.swarm.id, error = %e, "Context update failed");
        }
    }

    async fn apply_status_update(&mut self, update: StatusUpdate) {
        let swarm_id = self.swarm.id;
        match update {
            StatusUpdate::RunCompleted {
                run_id,
                success,
                steps,
            } => {
                if !self.recorded_runs.insert(run_id.clone()) {
                    debug!(swarm_id = %swarm_id, run_id = %run_id, "Run already recorded");
                    return;
                }
                if steps.is_empty() {
                    self.swarm.metrics.record(success, 0);
                }
                for step in &steps {
                    self.swarm.metrics.record(step.success, step.duration_ms);
                }
                info!(swarm_id = %swarm_id, run_id = %run_id, success, "Recorded externally completed run");
                self.swarm.touch();
                self.persist().await;
            }
            StatusUpdate::ResourcesLow {
                dimension,
                remaining,
            } => {
                if let Some(allocation) = self.services.ledger.snapshot(swarm_id) {
                    self.swarm.resources = allocation;
                }
                warn!(swarm_id = %swarm_id, dimension = %dimension, remaining, "Swarm resources running low");
                self.update_context(json!({ "resources": self.swarm.resources }));
                if self.services.lifecycle.pause_on_low_resources && self.swarm.state().accepts_work() {
                    if let Err(e) = self.transition(SwarmState::Paused).await {
                        warn!(swarm_id = %swarm_id, error = %e, "Could not pause swarm");
                    }
                } else {
                    self.persist().await;
                }
            }
            StatusUpdate::Insight { step_id, hints } => {
                debug!(swarm_id = %swarm_id, step_id = %step_id, executions = hints.executions, "Stored usage hints");
                self.hints.insert(step_id, hints);
            }
        }
    }

    async fn transition(&mut self, next: SwarmState) -> Result<()> {
        let swarm_id = self.swarm.id;
        let from = self
            .swarm
            .transition_to(next)
            .map_err(|current| SwarmError::InvalidTransition {
                swarm_id,
                from: current,
                to: next,
            })?;

        info!(swarm_id = %swarm_id, from = %from, to = %next, "Swarm state changed");
        self.services.event_bus.publish(SwarmEvent::SwarmStateChanged {
            swarm_id,
            from,
            to: next,
            changed_at: Utc::now(),
        });
        if !next.is_terminal() {
            self.update_context(json!({ "status": next.to_string() }));
        }
        self.persist().await;
        Ok(())
    }

    async fn persist(&self) {
        *self.snapshot.write() = self.swarm.clone();
        if let Err(e) = self.services.repository.save(&self.swarm).await {
            error!(swarm_id = %self.swarm.id, error = %e, "Failed to persist swarm");
        }
    }

    async fn teardown(&mut self) {
        let swarm_id = self.swarm.id;
        if let Some(allocation) = self.services.ledger.close_account(swarm_id) {
            self.swarm.resources = allocation;
        }
        self.services.contexts.delete_context(swarm_id);
        let subscriptions = self.services.contexts.broker().unsubscribe_swarm(swarm_id);
        if !self.pending.is_empty() {
            warn!(swarm_id = %swarm_id, discarded = self.pending.len(), "Discarding queued runs");
            self.pending.clear();
        }

        self.persist().await;
        self.registry.remove(swarm_id);
        info!(
            swarm_id = %swarm_id,
            state = %self.swarm.state(),
            subscriptions,
            recorded_runs = self.recorded_runs.len(),
            "Swarm torn down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_runs_forget_oldest_beyond_capacity() {
        let mut recent = RecentRuns::new(2);
        assert!(recent.insert(RunId::new("a")));
        assert!(!recent.insert(RunId::new("a")));
        assert!(recent.insert(RunId::new("b")));
        assert!(recent.insert(RunId::new("c")));
        assert_eq!(recent.len(), 2);

        // "a" was evicted, so it is new again; "c" is still remembered.
        assert!(recent.insert(RunId::new("a")));
        assert!(!recent.insert(RunId::new("c")));
    }
}
