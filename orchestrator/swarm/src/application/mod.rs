// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Application Layer
//!
//! Use cases composed from the ledger, context store, payload pipeline and
//! strategy resolver.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`lifecycle`] | `SwarmLifecycleController`, `SwarmRegistry`, `SwarmServices` |

pub mod lifecycle;

pub use lifecycle::*;
