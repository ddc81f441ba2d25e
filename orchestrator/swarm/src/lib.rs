// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `hive-swarm` — Swarm Orchestration Crate
//!
//! Runs swarms: supervised groups of agents executing multi-step routines
//! under resource and policy constraints.
//!
//! ## Crate Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`application`] | `SwarmLifecycleController`, per-swarm machines, `SwarmRegistry` |
//! | [`strategy`] | `StrategyResolver`, executors and their registry |
//! | [`context`] | `ContextStore`, watch paths and the subscription broker |
//! | [`payload`] | `PayloadPipeline`: input construction, output normalisation |
//! | [`ledger`] | `ResourceLedger`: allocated / available / reserved accounting |
//! | [`error`] | `SwarmError`, the controller-level error |
//!
//! ## Concurrency
//!
//! One actor task per swarm; swarms run in parallel. The ledger and the
//! context store are the only shared state and both lock per swarm.
//! Cancellation is cooperative through `tokio_util` cancellation tokens.

pub mod application;
pub mod context;
pub mod error;
pub mod ledger;
pub mod payload;
pub mod strategy;

pub use error::{Result, SwarmError};
pub use application::lifecycle::{
    ShutdownReport, SwarmLifecycleController, SwarmRegistry, SwarmServices, SwarmStartConfig,
    SwarmStatusReport,
};
