// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Benefits Intake Service CLI
//!
//! The `intake` binary hosts the applicant intake HTTP service.
//!
//! ## Commands
//!
//! - `intake serve [--migrate]` - Run the HTTP API and the submission worker
//! - `intake migrate [--dry-run]` - Apply the embedded database migrations
//! - `intake config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use benefits_intake::commands::{self, ConfigCommand, MigrateArgs, ServeArgs};
use benefits_intake::logging::{init_logging, LogFormat};

/// Benefits Intake - applicant submission service
#[derive(Parser)]
#[command(name = "intake")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "INTAKE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, env = "INTAKE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, env = "INTAKE_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    #[command(name = "serve")]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },

    /// Apply database migrations
    #[command(name = "migrate")]
    Migrate {
        #[command(flatten)]
        args: MigrateArgs,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { args }) => {
            commands::serve::execute(args, cli.config, cli.log_level, cli.log_format).await
        }
        Some(Commands::Migrate { args }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), cli.log_format.unwrap_or_default())?;
            commands::migrate::execute(args, cli.config).await
        }
        Some(Commands::Config { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), cli.log_format.unwrap_or_default())?;
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
