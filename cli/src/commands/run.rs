// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `hive run`: execute a routine file against the dry-run backend

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use hive_core::domain::node_config::OrchestratorConfigManifest;

use crate::routine::{execute_routine, Routine, SAMPLE_ROUTINE};

#[derive(Args)]
pub struct RunArgs {
    /// Routine file (YAML)
    #[arg(value_name = "ROUTINE", required_unless_present = "example")]
    pub routine: Option<PathBuf>,

    /// Print a sample routine and exit
    #[arg(long)]
    pub example: bool,

    /// Seconds to wait for every run to finish
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

pub async fn handle_command(args: RunArgs, config_override: Option<PathBuf>) -> Result<()> {
    if args.example {
        print!("{}", SAMPLE_ROUTINE);
        return Ok(());
    }

    let path = args.routine.context("A routine file is required")?;
    let manifest = OrchestratorConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    manifest
        .validate()
        .context("Configuration validation failed")?;

    let routine = Routine::from_yaml_file(&path)?;
    let report = execute_routine(&manifest, routine, Duration::from_secs(args.timeout)).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.succeeded() {
        eprintln!("{}", "✓ All runs succeeded".green());
        Ok(())
    } else {
        anyhow::bail!("One or more runs failed")
    }
}
