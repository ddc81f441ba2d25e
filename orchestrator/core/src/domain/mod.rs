// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Aggregates, value objects, events and ports shared by every Hive crate.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Technology-agnostic model of swarms, resources, strategies and steps

pub mod backend;
pub mod context;
pub mod events;
pub mod execution;
pub mod node_config;
pub mod repository;
pub mod resources;
pub mod strategy;
pub mod swarm;
