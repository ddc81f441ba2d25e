// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Hive Orchestrator CLI
//!
//! The `hive` binary drives the swarm orchestration core in-process.
//!
//! ## Commands
//!
//! - `hive config show|validate|generate` - Configuration management
//! - `hive run <routine.yaml>` - Execute a routine on the dry-run backend and
//!   print the resulting swarm status as JSON

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use hive_core::domain::node_config::OrchestratorConfigManifest;
use hive_orchestrator::commands::{self, ConfigCommand, RunArgs};

/// Hive Orchestrator - swarm lifecycle, strategy and context management
#[derive(Parser)]
#[command(name = "hive")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "HIVE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to spec.logging.level
    #[arg(long, global = true, env = "HIVE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format; defaults to spec.logging.format
    #[arg(
        long,
        global = true,
        env = "HIVE_LOG_FORMAT",
        value_parser = ["text", "json"]
    )]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Execute a routine file on the dry-run backend
    #[command(name = "run")]
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logging settings fall back to the configuration file; a broken file is
    // reported again by the command that needs it.
    let logging = OrchestratorConfigManifest::load_or_default(cli.config.clone())
        .map(|manifest| manifest.spec.logging)
        .unwrap_or_default();
    init_logging(
        cli.log_level.as_deref().unwrap_or(&logging.level),
        cli.log_format.as_deref().unwrap_or(&logging.format),
    )?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Run(args)) => commands::run::handle_command(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging. Logs go to stderr so command
/// output on stdout stays machine-readable.
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
