// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration Types
//
// Defines the configuration schema for a Hive orchestrator node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Strategy resolution defaults and adaptive optimisation switch
// - Swarm lifecycle policy (queue sizing, halt/pause behaviour)
// - Event bus sizing and logging settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::strategy::StrategyType;

pub const API_VERSION: &str = "hive.dev/v1";
pub const KIND: &str = "OrchestratorConfig";

/// Top-level Kubernetes-style orchestrator configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfigManifest {
    /// API version (must be "hive.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "OrchestratorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: OrchestratorConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfigSpec {
    #[serde(default)]
    pub strategy: StrategyConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy used when a step neither declares one nor implies one by type
    #[serde(default = "default_strategy")]
    pub default_strategy: StrategyType,

    /// Enables the usage-driven adaptive layer of strategy resolution
    #[serde(default)]
    pub adaptive_optimization: bool,

    /// Effective time budgets below this force deterministic execution
    #[serde(default = "default_severe_time_threshold_ms")]
    pub severe_time_threshold_ms: u64,

    /// Cost ceilings below this force reasoning execution
    #[serde(default = "default_severe_cost_threshold")]
    pub severe_cost_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Bounded command queue size per swarm machine
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,

    /// Move the swarm to Failed when a step fails (runs may override)
    #[serde(default)]
    pub halt_on_error: bool,

    /// Pause the swarm when a resources.low event arrives for it
    #[serde(default)]
    pub pause_on_low_resources: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default = "default_event_bus_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_strategy() -> StrategyType {
    StrategyType::Conversational
}

fn default_severe_time_threshold_ms() -> u64 {
    1000
}

fn default_severe_cost_threshold() -> f64 {
    0.001
}

fn default_command_queue_capacity() -> usize {
    256
}

fn default_event_bus_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            adaptive_optimization: false,
            severe_time_threshold_ms: default_severe_time_threshold_ms(),
            severe_cost_threshold: default_severe_cost_threshold(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: default_command_queue_capacity(),
            halt_on_error: false,
            pause_on_low_resources: false,
        }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for OrchestratorConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "hive-orchestrator".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: OrchestratorConfigSpec::default(),
        }
    }
}

impl OrchestratorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. HIVE_CONFIG_PATH environment variable
    /// 2. ./hive-config.yaml (working directory)
    /// 3. ~/.hive/config.yaml (user home)
    /// 4. /etc/hive/config.yaml (system, Unix) or C:\ProgramData\Hive\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("HIVE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./hive-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".hive").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/hive/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Hive\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HIVE_ADAPTIVE_OPTIMIZATION") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: HIVE_ADAPTIVE_OPTIMIZATION=true");
                    self.spec.strategy.adaptive_optimization = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: HIVE_ADAPTIVE_OPTIMIZATION=false");
                    self.spec.strategy.adaptive_optimization = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for HIVE_ADAPTIVE_OPTIMIZATION: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("HIVE_DEFAULT_STRATEGY") {
            match val.parse::<StrategyType>() {
                Ok(strategy) => {
                    tracing::info!("Environment override: HIVE_DEFAULT_STRATEGY={}", strategy);
                    self.spec.strategy.default_strategy = strategy;
                }
                Err(e) => {
                    tracing::warn!("Invalid value for HIVE_DEFAULT_STRATEGY: {}. Ignoring.", e);
                }
            }
        }

        if let Ok(val) = std::env::var("HIVE_LOG_LEVEL") {
            if !val.trim().is_empty() {
                tracing::info!("Environment override: HIVE_LOG_LEVEL={}", val);
                self.spec.logging.level = val;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.lifecycle.command_queue_capacity == 0 {
            anyhow::bail!("spec.lifecycle.command_queue_capacity must be greater than zero");
        }

        if self.spec.event_bus.capacity == 0 {
            anyhow::bail!("spec.event_bus.capacity must be greater than zero");
        }

        let cost = self.spec.strategy.severe_cost_threshold;
        if !cost.is_finite() || cost < 0.0 {
            anyhow::bail!("spec.strategy.severe_cost_threshold must be a non-negative number");
        }

        match self.spec.logging.format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("Invalid logging format '{}'. Expected 'json' or 'text'", other),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = OrchestratorConfigManifest::default();
        assert_eq!(manifest.api_version, "hive.dev/v1");
        assert_eq!(manifest.kind, "OrchestratorConfig");
        assert_eq!(manifest.spec.lifecycle.command_queue_capacity, 256);
        assert_eq!(manifest.spec.event_bus.capacity, 1000);
        assert!(!manifest.spec.strategy.adaptive_optimization);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: hive.dev/v1
kind: OrchestratorConfig
metadata:
  name: edge-1
spec:
  strategy:
    default_strategy: reasoning
  lifecycle:
    halt_on_error: true
"#;
        let manifest = OrchestratorConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.strategy.default_strategy, StrategyType::Reasoning);
        assert_eq!(manifest.spec.strategy.severe_time_threshold_ms, 1000);
        assert!(manifest.spec.lifecycle.halt_on_error);
        assert!(!manifest.spec.lifecycle.pause_on_low_resources);
        assert_eq!(manifest.spec.logging.level, "info");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut manifest = OrchestratorConfigManifest::default();
        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = OrchestratorConfigManifest::default();
        manifest.spec.event_bus.capacity = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = OrchestratorConfigManifest::default();
        manifest.spec.logging.format = "xml".to_string();
        assert!(manifest.validate().is_err());
    }
}
