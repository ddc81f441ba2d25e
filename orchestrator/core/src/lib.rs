// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Hive Core
//!
//! Domain model, ports and shared infrastructure for the Hive swarm
//! orchestrator.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Types and adapters consumed by `hive_swarm` and the `hive` CLI

pub mod domain;
pub mod infrastructure;

pub use domain::*;
