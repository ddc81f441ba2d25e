// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::time::Duration;

use serde_json::json;

use hive_core::domain::node_config::OrchestratorConfigManifest;
use hive_core::domain::strategy::StrategyType;
use hive_core::domain::swarm::SwarmStatus;
use hive_orchestrator::commands::config::{handle_command, ConfigCommand};
use hive_orchestrator::routine::{execute_routine, Routine, SAMPLE_ROUTINE};

#[tokio::test]
async fn test_sample_routine_runs_on_dry_run_backend() {
    let routine = Routine::from_yaml_str(SAMPLE_ROUTINE).unwrap();
    let report = execute_routine(
        &OrchestratorConfigManifest::default(),
        routine,
        Duration::from_secs(10),
    )
    .await
    .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.runs.len(), 1);
    let strategies: Vec<_> = report.runs[0]
        .steps
        .iter()
        .map(|step| step.strategy)
        .collect();
    assert_eq!(
        strategies,
        vec![
            Some(StrategyType::Reasoning),
            Some(StrategyType::Reasoning),
            Some(StrategyType::Deterministic),
        ]
    );
    assert!(matches!(report.status.status, SwarmStatus::Running));
    assert_eq!(report.status.resources.unwrap().available.credits, 100);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["runs"][0]["run_id"], json!("triage-1"));
}

#[test]
fn test_routine_without_runs_is_rejected() {
    let yaml = r#"
swarm:
  name: idle
  goal: nothing
  max_credits: 1
  max_tokens: 1
  max_time_ms: 1
  user_id: u
"#;
    let err = Routine::from_yaml_str(yaml).unwrap_err();
    assert!(err.to_string().contains("no runs"));
}

#[tokio::test]
async fn test_generated_config_validates() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("hive-config.yaml");
    handle_command(
        ConfigCommand::Generate {
            output: output.clone(),
            force: false,
        },
        None,
    )
    .await
    .unwrap();

    let manifest = OrchestratorConfigManifest::from_yaml_file(&output).unwrap();
    manifest.validate().unwrap();

    let again = handle_command(
        ConfigCommand::Generate {
            output,
            force: false,
        },
        None,
    )
    .await;
    assert!(again.is_err());
}
