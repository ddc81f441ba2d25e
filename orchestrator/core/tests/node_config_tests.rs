// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use hive_core::domain::node_config::OrchestratorConfigManifest;
use hive_core::domain::strategy::StrategyType;
use std::io::Write;

const MANIFEST: &str = r#"
apiVersion: hive.dev/v1
kind: OrchestratorConfig
metadata:
  name: integration-node
  labels:
    environment: test
spec:
  strategy:
    default_strategy: deterministic
    severe_time_threshold_ms: 2500
  lifecycle:
    command_queue_capacity: 32
    pause_on_low_resources: true
  event_bus:
    capacity: 64
  logging:
    format: json
"#;

#[test]
fn test_load_from_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MANIFEST.as_bytes()).unwrap();

    let config = OrchestratorConfigManifest::load_or_default(Some(file.path().to_path_buf()))
        .unwrap();

    assert_eq!(config.metadata.name, "integration-node");
    assert_eq!(config.spec.strategy.severe_time_threshold_ms, 2500);
    assert_eq!(config.spec.lifecycle.command_queue_capacity, 32);
    assert!(config.spec.lifecycle.pause_on_low_resources);
    assert_eq!(config.spec.event_bus.capacity, 64);
    assert_eq!(config.spec.logging.format, "json");
    assert!(config.validate().is_ok());
}

#[test]
fn test_explicit_path_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    assert!(OrchestratorConfigManifest::load_or_default(Some(missing)).is_err());
}

#[test]
fn test_yaml_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hive-config.yaml");

    let original = OrchestratorConfigManifest::from_yaml_str(MANIFEST).unwrap();
    original.to_yaml_file(&path).unwrap();

    let reloaded = OrchestratorConfigManifest::from_yaml_file(&path).unwrap();
    assert_eq!(reloaded.spec.strategy.default_strategy, StrategyType::Deterministic);
    assert_eq!(
        reloaded.metadata.labels.unwrap().get("environment").map(String::as_str),
        Some("test")
    );
}

#[test]
fn test_env_override_of_default_strategy() {
    let mut config = OrchestratorConfigManifest::default();
    std::env::set_var("HIVE_DEFAULT_STRATEGY", "reasoning");
    config.apply_env_overrides();
    std::env::remove_var("HIVE_DEFAULT_STRATEGY");
    assert_eq!(config.spec.strategy.default_strategy, StrategyType::Reasoning);
}
