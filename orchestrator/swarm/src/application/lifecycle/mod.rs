// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm lifecycle: the controller surface, per-swarm machines and the
//! registry connecting them.

pub mod commands;
pub mod controller;
mod machine;
pub mod registry;
pub mod services;

pub use commands::{StatusUpdate, SwarmCommand, TaskAssignment};
pub use controller::{
    ShutdownReport, SwarmLifecycleController, SwarmStartConfig, SwarmStatusReport, ROUTED_TOPICS,
};
pub use registry::{SwarmHandle, SwarmRegistry};
pub use services::SwarmServices;
