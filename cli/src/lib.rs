// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Hive CLI library - exposes testable components
//!
//! - [`commands`]: `config` and `run` subcommands
//! - [`routine`]: routine file model and the dry-run execution driver
//! - [`dry_run`]: an agent backend that echoes its input at zero cost

pub mod commands;
pub mod dry_run;
pub mod routine;
