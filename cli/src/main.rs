// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # FestPass CLI
//!
//! The `festpass` binary runs the registration service and gives operators
//! a terminal surface for the pipeline.
//!
//! ## Commands
//!
//! - `festpass serve` - Run the API and worker pool in the foreground
//! - `festpass status <id>` - Poll a registration's pipeline status
//! - `festpass reprocess <id>` - Re-enqueue a failed/partial registration

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// FestPass - festival registration and credential pipeline
#[derive(Parser)]
#[command(name = "festpass")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "FESTPASS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Base URL of a running service (status/reprocess commands)
    #[arg(
        long,
        global = true,
        env = "FESTPASS_URL",
        default_value = "http://localhost:8080"
    )]
    url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "FESTPASS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server and worker pool in the foreground
    Serve,

    /// Show a registration's pipeline status
    Status {
        /// Registration id returned on submit
        id: String,

        /// Poll until a terminal status (bounded, ~60s)
        #[arg(long)]
        watch: bool,
    },

    /// Re-enqueue a failed or partial registration (operator action)
    Reprocess {
        /// Registration id
        id: String,

        /// Operator bearer token
        #[arg(long, env = "FESTPASS_OPERATOR_TOKEN")]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    match cli.command {
        Commands::Serve => commands::serve::run(cli.config).await,
        Commands::Status { id, watch } => commands::status::run(&cli.url, &id, watch).await,
        Commands::Reprocess { id, token } => {
            commands::reprocess::run(&cli.url, &id, &token).await
        }
    }
}
