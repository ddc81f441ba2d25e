// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Strategy selection and execution.
//!
//! [`StrategyResolver`] decides which [`StrategyType`](hive_core::domain::strategy::StrategyType)
//! a step runs under; [`StrategyRegistry`] hands out the matching executor.

pub mod executor;
pub mod resolver;

pub use executor::{
    ConversationalExecutor, DeterministicExecutor, ExecutionStrategy, ReasoningExecutor,
    StrategyRegistry,
};
pub use resolver::{OverrideReason, StrategyDecision, StrategyResolver};
