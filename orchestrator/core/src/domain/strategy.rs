// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Strategy Taxonomy
//!
//! Closed set of execution policies for a routine step, ordered along the
//! graduation axis from most flexible to most deterministic:
//!
//! | Strategy | Determinism | Relative cost |
//! |----------|-------------|---------------|
//! | `Conversational` | lowest | highest |
//! | `Reasoning` | structured | medium |
//! | `Deterministic` | replayable | lowest |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown strategy identifier: '{0}'")]
pub struct UnknownStrategy(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    Conversational,
    Reasoning,
    Deterministic,
}

impl StrategyType {
    pub const ALL: [StrategyType; 3] = [
        StrategyType::Conversational,
        StrategyType::Reasoning,
        StrategyType::Deterministic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::Reasoning => "reasoning",
            Self::Deterministic => "deterministic",
        }
    }

    /// Next step on the graduation axis, if any.
    pub fn graduated(&self) -> Option<StrategyType> {
        match self {
            Self::Conversational => Some(Self::Reasoning),
            Self::Reasoning => Some(Self::Deterministic),
            Self::Deterministic => None,
        }
    }

    /// Infer a strategy from a free-form step type name.
    pub fn infer_from_step_type(step_type: &str) -> Option<StrategyType> {
        let step_type = step_type.to_lowercase();
        if step_type.contains("deterministic") || step_type.contains("automated") {
            Some(Self::Deterministic)
        } else if step_type.contains("reasoning") || step_type.contains("analysis") {
            Some(Self::Reasoning)
        } else {
            None
        }
    }
}

impl FromStr for StrategyType {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conversational" | "conversation" => Ok(Self::Conversational),
            "reasoning" => Ok(Self::Reasoning),
            "deterministic" => Ok(Self::Deterministic),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graduation_order() {
        assert!(StrategyType::Conversational < StrategyType::Reasoning);
        assert!(StrategyType::Reasoning < StrategyType::Deterministic);
        assert_eq!(StrategyType::Reasoning.graduated(), Some(StrategyType::Deterministic));
        assert_eq!(StrategyType::Deterministic.graduated(), None);
    }

    #[test]
    fn test_infer_from_step_type() {
        assert_eq!(
            StrategyType::infer_from_step_type("automated-export"),
            Some(StrategyType::Deterministic)
        );
        assert_eq!(
            StrategyType::infer_from_step_type("DataAnalysis"),
            Some(StrategyType::Reasoning)
        );
        assert_eq!(StrategyType::infer_from_step_type("chat"), None);
    }

    #[test]
    fn test_unknown_identifier_is_rejected() {
        assert!("quantum".parse::<StrategyType>().is_err());
        assert_eq!(" Reasoning ".parse::<StrategyType>().unwrap(), StrategyType::Reasoning);
    }
}
