// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Controller-level scenarios driven through a scripted backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use hive_core::domain::backend::{AgentBackend, BackendError, BackendOutput};
use hive_core::domain::events::{RunEvent, StepOutcome};
use hive_core::domain::execution::{ExecutionContext, RunExecutionConfig, RunId, StepDefinition};
use hive_core::domain::node_config::OrchestratorConfigSpec;
use hive_core::domain::resources::ResourceAmount;
use hive_core::domain::strategy::StrategyType;
use hive_core::domain::swarm::{SwarmConfig, SwarmId, SwarmState, SwarmStatus};
use hive_core::infrastructure::event_bus::{DomainEvent, EventBus, TopicReceiver};
use hive_core::infrastructure::repositories::InMemorySwarmRepository;
use hive_swarm::{
    SwarmError, SwarmLifecycleController, SwarmRegistry, SwarmServices, SwarmStartConfig,
};

struct Call {
    step_id: String,
    strategy: StrategyType,
    input: Map<String, Value>,
}

#[derive(Default)]
struct ScriptedBackend {
    usage: ResourceAmount,
    failing_steps: Vec<String>,
    /// Time each call spends "in flight".
    delay: Duration,
    calls: Mutex<Vec<Call>>,
    /// Whether the step's cancellation token was set when the call settled.
    cancelled_seen: Mutex<Vec<bool>>,
}

impl ScriptedBackend {
    fn charging(usage: ResourceAmount) -> Self {
        Self {
            usage,
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            usage: ResourceAmount::new(1, 1, 1),
            delay,
            ..Default::default()
        }
    }

    fn dispatched(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn execute(
        &self,
        strategy: StrategyType,
        ctx: &ExecutionContext,
        input: Map<String, Value>,
    ) -> Result<BackendOutput, BackendError> {
        self.calls.lock().push(Call {
            step_id: ctx.step_id.clone(),
            strategy,
            input: input.clone(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.cancelled_seen.lock().push(ctx.cancellation.is_cancelled());
        if self.failing_steps.contains(&ctx.step_id) {
            return Err(BackendError::ExecutionFailed(format!("{} exploded", ctx.step_id)));
        }
        Ok(BackendOutput {
            outputs: json!({ "items": [1, 2, 3], "echo": Value::Object(input) }),
            usage: self.usage,
        })
    }
}

fn controller_with(
    backend: Arc<ScriptedBackend>,
    spec: OrchestratorConfigSpec,
) -> (SwarmLifecycleController, EventBus) {
    let bus = EventBus::new(256);
    let services = SwarmServices::new(
        &spec,
        bus.clone(),
        backend,
        Arc::new(InMemorySwarmRepository::new()),
    );
    let controller = SwarmLifecycleController::new(Arc::new(services), Arc::new(SwarmRegistry::new()));
    (controller, bus)
}

fn controller(backend: Arc<ScriptedBackend>) -> (SwarmLifecycleController, EventBus) {
    controller_with(backend, OrchestratorConfigSpec::default())
}

fn start_config(name: &str) -> SwarmStartConfig {
    SwarmStartConfig {
        swarm_id: None,
        config: SwarmConfig {
            name: name.to_string(),
            goal: "answer the backlog".to_string(),
            model: None,
            temperature: Some(0.4),
            max_iterations: None,
        },
        max_credits: 100,
        max_tokens: 10_000,
        max_time_ms: 300_000,
        user_id: "user-1".to_string(),
        organization_id: None,
        policy: Default::default(),
        default_strategy: None,
    }
}

fn step(step_id: &str, step_type: &str, inputs: Value) -> StepDefinition {
    StepDefinition {
        step_id: step_id.to_string(),
        step_type: step_type.to_string(),
        config: Default::default(),
        constraints: Default::default(),
        inputs: inputs.as_object().cloned().unwrap_or_default(),
    }
}

fn run_config(steps: Vec<StepDefinition>) -> RunExecutionConfig {
    RunExecutionConfig {
        steps,
        ..Default::default()
    }
}

async fn next_run(rx: &mut TopicReceiver) -> (bool, Vec<StepOutcome>) {
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("run.completed within timeout")
        .unwrap();
    match event {
        DomainEvent::Run(RunEvent::RunCompleted { success, steps, .. }) => (success, steps),
        other => panic!("unexpected event {other:?}"),
    }
}

async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_end_to_end_reasoning_run_then_cancel() {
    let backend = Arc::new(ScriptedBackend::charging(ResourceAmount::new(30, 500, 1_000)));
    let (controller, bus) = controller(Arc::clone(&backend));

    let swarm_id = controller.start_swarm(start_config("e2e")).await.unwrap();
    let status = controller.get_swarm_status(swarm_id).await;
    assert!(matches!(status.status, SwarmStatus::Pending | SwarmStatus::Running));

    let mut runs = bus.subscribe_topic("run.completed");
    controller
        .request_run_execution(
            swarm_id,
            RunId::new("run-1"),
            "routine-v1",
            Map::new(),
            run_config(vec![step("analyse", "reasoning", json!({"question": "why"}))]),
        )
        .await
        .unwrap();

    let (success, steps) = next_run(&mut runs).await;
    assert!(success);
    assert_eq!(steps[0].strategy, Some(StrategyType::Reasoning));
    assert_eq!(backend.calls.lock()[0].strategy, StrategyType::Reasoning);

    let status = controller.get_swarm_status(swarm_id).await;
    let resources = status.resources.unwrap();
    assert_eq!(resources.available.credits, 70);
    assert!((status.progress - 30.0).abs() < 1e-6);
    assert_eq!(status.metrics.unwrap().tasks_completed, 1);

    controller.cancel_swarm(swarm_id, "user-1", "done").await.unwrap();
    let status = controller.get_swarm_status(swarm_id).await;
    assert_eq!(status.status, SwarmStatus::Cancelled);
    assert_eq!(status.state, Some(SwarmState::Terminated));

    let err = controller
        .request_run_execution(swarm_id, RunId::new("run-2"), "routine-v1", Map::new(), run_config(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::SwarmNotFound(id) if id == swarm_id));
    assert!(controller.services().ledger.snapshot(swarm_id).is_none());
    assert!(controller.services().contexts.get_document(swarm_id).is_none());
}

#[tokio::test]
async fn test_over_debit_fails_run_and_leaves_ledger_untouched() {
    let backend = Arc::new(ScriptedBackend::charging(ResourceAmount::new(150, 10, 10)));
    let (controller, bus) = controller(backend);
    let swarm_id = controller.start_swarm(start_config("greedy")).await.unwrap();

    let mut runs = bus.subscribe_topic("run.completed");
    let mut exhausted = bus.subscribe_topic("resources.exhausted");
    controller
        .request_run_execution(
            swarm_id,
            RunId::new("run-1"),
            "routine-v1",
            Map::new(),
            run_config(vec![step("spend", "chat", json!({})), step("never", "chat", json!({}))]),
        )
        .await
        .unwrap();

    let (success, steps) = next_run(&mut runs).await;
    assert!(!success);
    assert_eq!(steps.len(), 1);
    assert!(steps[0].error.as_deref().unwrap().contains("Insufficient credits"));
    assert!(exhausted.recv().await.is_ok());

    let resources = controller.services().ledger.snapshot(swarm_id).unwrap();
    assert_eq!(resources.available, resources.allocated);
}

#[tokio::test]
async fn test_step_outputs_feed_refs_and_context() {
    let backend = Arc::new(ScriptedBackend::charging(ResourceAmount::new(1, 1, 1)));
    let (controller, bus) = controller(Arc::clone(&backend));
    let swarm_id = controller.start_swarm(start_config("chain")).await.unwrap();

    let mut inputs = Map::new();
    inputs.insert("topic".to_string(), json!("refunds"));
    let mut runs = bus.subscribe_topic("run.completed");
    controller
        .request_run_execution(
            swarm_id,
            RunId::new("run-7"),
            "routine-v2",
            inputs,
            run_config(vec![
                step("fetch", "automated-fetch", json!({"query": "{{run.variables.topic}}"})),
                step("summarise", "chat", json!({"items": "$ref:fetch.items", "limit_number": "2"})),
            ]),
        )
        .await
        .unwrap();
    let (success, _) = next_run(&mut runs).await;
    assert!(success);

    let calls = backend.calls.lock();
    assert_eq!(calls[0].step_id, "fetch");
    assert_eq!(calls[0].strategy, StrategyType::Deterministic);
    assert_eq!(calls[0].input["query"], json!("refunds"));
    assert_eq!(calls[1].input["items"], json!([1, 2, 3]));
    assert_eq!(calls[1].input["limit_number"], json!(2.0));
    assert_eq!(calls[1].input["_context"]["routineId"], json!("routine-v2"));
    drop(calls);

    let document = controller.services().contexts.get_document(swarm_id).unwrap();
    assert_eq!(document["runs"]["run-7"]["steps"]["fetch"]["items"], json!([1, 2, 3]));
    assert_eq!(document["resources"]["available"]["credits"], json!(98));

    let services = Arc::clone(controller.services());
    eventually(|| {
        services
            .contexts
            .get_document(swarm_id)
            .is_some_and(|doc| doc["status"] == json!("IDLE"))
    })
    .await;
}

#[tokio::test]
async fn test_failed_step_surfaces_error_and_halts_when_configured() {
    let backend = Arc::new(ScriptedBackend {
        usage: ResourceAmount::new(1, 1, 1),
        failing_steps: vec!["flaky".to_string()],
        ..Default::default()
    });
    let (controller, bus) = controller(Arc::clone(&backend));
    let swarm_id = controller.start_swarm(start_config("halting")).await.unwrap();

    let mut runs = bus.subscribe_topic("run.completed");
    controller
        .request_run_execution(
            swarm_id,
            RunId::new("tolerant"),
            "routine",
            Map::new(),
            run_config(vec![step("flaky", "chat", json!({})), step("after", "chat", json!({}))]),
        )
        .await
        .unwrap();
    let (success, steps) = next_run(&mut runs).await;
    assert!(!success);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].error.as_deref(), Some("Backend execution failed: flaky exploded"));
    assert!(steps[1].success);

    let mut halting = run_config(vec![step("flaky", "chat", json!({})), step("after", "chat", json!({}))]);
    halting.halt_on_error = Some(true);
    controller
        .request_run_execution(swarm_id, RunId::new("strict"), "routine", Map::new(), halting)
        .await
        .unwrap();
    let (_, steps) = next_run(&mut runs).await;
    assert_eq!(steps.len(), 1);

    let registry = Arc::clone(controller.registry());
    eventually(|| !registry.contains(swarm_id)).await;
    let status = controller.get_swarm_status(swarm_id).await;
    assert_eq!(status.status, SwarmStatus::Failed);
    assert_eq!(status.errors.len(), 2);
    assert_eq!(status.metrics.unwrap().tasks_failed, 2);
}

#[tokio::test]
async fn test_paused_swarm_queues_runs_until_resumed() {
    let backend = Arc::new(ScriptedBackend::charging(ResourceAmount::new(1, 1, 1)));
    let (controller, bus) = controller(backend);
    let swarm_id = controller.start_swarm(start_config("pausable")).await.unwrap();

    controller.pause_swarm(swarm_id).await.unwrap();
    assert_eq!(controller.get_swarm_status(swarm_id).await.status, SwarmStatus::Paused);
    assert!(matches!(
        controller.pause_swarm(swarm_id).await,
        Err(SwarmError::InvalidTransition { .. })
    ));

    let mut runs = bus.subscribe_topic("run.completed");
    controller
        .request_run_execution(swarm_id, RunId::new("queued"), "routine", Map::new(), run_config(vec![step("s", "chat", json!({}))]))
        .await
        .unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(100), runs.recv()).await.is_err());

    controller.resume_swarm(swarm_id).await.unwrap();
    let (success, _) = next_run(&mut runs).await;
    assert!(success);
}

#[tokio::test]
async fn test_routed_run_completion_is_counted_once() {
    let backend = Arc::new(ScriptedBackend::default());
    let (controller, bus) = controller(backend);
    let swarm_id = controller.start_swarm(start_config("routed")).await.unwrap();

    let external = RunEvent::RunCompleted {
        swarm_id,
        run_id: RunId::new("elsewhere"),
        success: true,
        steps: vec![],
        completed_at: chrono::Utc::now(),
    };
    bus.publish(external.clone());
    bus.publish(external);
    bus.publish(RunEvent::RunCompleted {
        swarm_id: SwarmId::new(),
        run_id: RunId::new("stranger"),
        success: true,
        steps: vec![],
        completed_at: chrono::Utc::now(),
    });

    let registry = Arc::clone(controller.registry());
    eventually(|| {
        registry
            .get(swarm_id)
            .is_some_and(|handle| handle.swarm().metrics.tasks_completed == 1)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let metrics = controller.get_swarm_status(swarm_id).await.metrics.unwrap();
    assert_eq!(metrics.tasks_completed, 1);
}

#[tokio::test]
async fn test_start_validation_and_duplicates() {
    let (controller, _) = controller(Arc::new(ScriptedBackend::default()));

    let mut zero = start_config("zero");
    zero.max_credits = 0;
    assert!(matches!(controller.start_swarm(zero).await, Err(SwarmError::InvalidConfig(_))));

    let mut unnamed = start_config(" ");
    unnamed.max_tokens = 5;
    assert!(matches!(controller.start_swarm(unnamed).await, Err(SwarmError::InvalidConfig(_))));

    let id = SwarmId::new();
    let mut first = start_config("first");
    first.swarm_id = Some(id);
    controller.start_swarm(first.clone()).await.unwrap();
    assert!(matches!(
        controller.start_swarm(first.clone()).await,
        Err(SwarmError::DuplicateSwarm(dup)) if dup == id
    ));

    controller.cancel_swarm(id, "user-1", "test").await.unwrap();
    assert!(matches!(
        controller.start_swarm(first).await,
        Err(SwarmError::DuplicateSwarm(_))
    ));
}

#[tokio::test]
async fn test_unknown_swarm_status_and_cancel() {
    let (controller, _) = controller(Arc::new(ScriptedBackend::default()));
    let id = SwarmId::new();
    let status = controller.get_swarm_status(id).await;
    assert_eq!(status.status, SwarmStatus::Unknown);
    assert_eq!(status.errors, vec!["Swarm not found".to_string()]);
    assert!(matches!(
        controller.cancel_swarm(id, "u", "r").await,
        Err(SwarmError::SwarmNotFound(_))
    ));
}

#[tokio::test]
async fn test_shutdown_stops_every_swarm() {
    let (controller, _) = controller(Arc::new(ScriptedBackend::default()));
    let a = controller.start_swarm(start_config("a")).await.unwrap();
    let b = controller.start_swarm(start_config("b")).await.unwrap();

    let stopped = controller.shutdown().await.into_result().unwrap();
    assert_eq!(stopped.len(), 2);
    assert!(controller.registry().is_empty());
    for id in [a, b] {
        assert_eq!(controller.get_swarm_status(id).await.status, SwarmStatus::Completed);
    }
}

#[tokio::test]
async fn test_low_resources_pause_when_configured() {
    let mut spec = OrchestratorConfigSpec::default();
    spec.lifecycle.pause_on_low_resources = true;
    let (controller, bus) = controller_with(Arc::new(ScriptedBackend::default()), spec);
    let swarm_id = controller.start_swarm(start_config("frugal")).await.unwrap();

    bus.publish(hive_core::domain::events::ResourceEvent::ResourcesLow {
        swarm_id,
        dimension: hive_core::domain::resources::ResourceDimension::Credits,
        remaining: 3,
        detected_at: chrono::Utc::now(),
    });

    let registry = Arc::clone(controller.registry());
    eventually(|| {
        registry
            .get(swarm_id)
            .is_some_and(|handle| handle.swarm().state() == SwarmState::Paused)
    })
    .await;
}

fn numbered_steps(count: usize) -> Vec<StepDefinition> {
    (1..=count)
        .map(|i| step(&format!("s{i}"), "chat", json!({})))
        .collect()
}

#[tokio::test]
async fn test_pause_mid_run_stops_dispatch_until_resumed() {
    let backend = Arc::new(ScriptedBackend::slow(Duration::from_millis(100)));
    let (controller, bus) = controller(Arc::clone(&backend));
    let swarm_id = controller.start_swarm(start_config("interruptible")).await.unwrap();

    let mut runs = bus.subscribe_topic("run.completed");
    controller
        .request_run_execution(swarm_id, RunId::new("long"), "routine", Map::new(), run_config(numbered_steps(5)))
        .await
        .unwrap();

    eventually(|| backend.dispatched() == 1).await;
    controller.pause_swarm(swarm_id).await.unwrap();
    let dispatched = backend.dispatched();
    assert!(dispatched <= 2, "{dispatched} steps dispatched before the pause took effect");
    assert_eq!(controller.get_swarm_status(swarm_id).await.status, SwarmStatus::Paused);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.dispatched(), dispatched);
    assert!(tokio::time::timeout(Duration::from_millis(10), runs.recv()).await.is_err());

    controller.resume_swarm(swarm_id).await.unwrap();
    let (success, steps) = next_run(&mut runs).await;
    assert!(success);
    assert_eq!(steps.len(), 5);
    let order: Vec<String> = backend.calls.lock().iter().map(|c| c.step_id.clone()).collect();
    assert_eq!(order, ["s1", "s2", "s3", "s4", "s5"]);
}

#[tokio::test]
async fn test_low_resources_pause_interrupts_running_run() {
    let mut spec = OrchestratorConfigSpec::default();
    spec.lifecycle.pause_on_low_resources = true;
    let backend = Arc::new(ScriptedBackend::slow(Duration::from_millis(100)));
    let (controller, bus) = controller_with(Arc::clone(&backend), spec);
    let swarm_id = controller.start_swarm(start_config("thrifty")).await.unwrap();

    controller
        .request_run_execution(swarm_id, RunId::new("long"), "routine", Map::new(), run_config(numbered_steps(5)))
        .await
        .unwrap();
    eventually(|| backend.dispatched() == 1).await;
    bus.publish(hive_core::domain::events::ResourceEvent::ResourcesLow {
        swarm_id,
        dimension: hive_core::domain::resources::ResourceDimension::Credits,
        remaining: 2,
        detected_at: chrono::Utc::now(),
    });

    let registry = Arc::clone(controller.registry());
    eventually(|| {
        registry
            .get(swarm_id)
            .is_some_and(|handle| handle.swarm().state() == SwarmState::Paused)
    })
    .await;
    let dispatched = backend.dispatched();
    assert!(dispatched <= 2);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(backend.dispatched(), dispatched);
}

#[tokio::test]
async fn test_cancel_with_step_in_flight() {
    let backend = Arc::new(ScriptedBackend::slow(Duration::from_millis(100)));
    let (controller, bus) = controller(Arc::clone(&backend));
    let swarm_id = controller.start_swarm(start_config("abortable")).await.unwrap();

    let mut runs = bus.subscribe_topic("run.completed");
    controller
        .request_run_execution(swarm_id, RunId::new("doomed"), "routine", Map::new(), run_config(numbered_steps(3)))
        .await
        .unwrap();

    eventually(|| backend.dispatched() == 1).await;
    controller.cancel_swarm(swarm_id, "user-1", "abort").await.unwrap();

    let (success, steps) = next_run(&mut runs).await;
    assert!(!success);
    assert_eq!(steps.len(), 1);
    assert!(steps[0].success, "the in-flight step settles normally");
    assert_eq!(backend.dispatched(), 1);
    assert_eq!(*backend.cancelled_seen.lock(), vec![true]);

    let status = controller.get_swarm_status(swarm_id).await;
    assert_eq!(status.status, SwarmStatus::Cancelled);
}

#[tokio::test]
async fn test_domain_restrictions_apply_after_free_form_context_updates() {
    let backend = Arc::new(ScriptedBackend::charging(ResourceAmount::new(1, 1, 1)));
    let (controller, bus) = controller(Arc::clone(&backend));
    let mut start = start_config("restricted");
    start.policy.domain_restrictions = vec!["finance".to_string()];
    let swarm_id = controller.start_swarm(start).await.unwrap();

    let mut runs = bus.subscribe_topic("run.completed");
    controller
        .request_run_execution(swarm_id, RunId::new("before"), "routine", Map::new(), run_config(vec![step("reply", "chat", json!({}))]))
        .await
        .unwrap();
    next_run(&mut runs).await;

    // A shape the typed context cannot read back.
    let contexts = &controller.services().contexts;
    contexts
        .update_context(swarm_id, &json!({ "participants": "someone" }))
        .unwrap();
    assert!(contexts.get_context(swarm_id).is_none());

    controller
        .request_run_execution(swarm_id, RunId::new("after"), "routine", Map::new(), run_config(vec![step("reply", "chat", json!({}))]))
        .await
        .unwrap();
    next_run(&mut runs).await;

    let strategies: Vec<StrategyType> = backend.calls.lock().iter().map(|c| c.strategy).collect();
    assert_eq!(strategies, [StrategyType::Reasoning, StrategyType::Reasoning]);
}
