// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use benefits_intake_core::domain::config::IntakeConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration (secrets are masked)
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./intake-config.yaml")]
        output: PathBuf,

        /// Include every section with comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate {
            output,
            examples,
            force,
        } => generate(&output, examples, force).await,
    }
}

fn masked(value: &Option<String>) -> colored::ColoredString {
    match value {
        Some(_) => "(set)".green(),
        None => "(not set)".dimmed(),
    }
}

fn or_unset(value: Option<&str>) -> colored::ColoredString {
    match value {
        Some(v) => v.normal(),
        None => "(not set)".dimmed(),
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = IntakeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. INTAKE_CONFIG_PATH: {}",
            std::env::var("INTAKE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./intake-config.yaml");
        println!("  4. ~/.intake/config.yaml");
        println!("  5. /etc/intake/config.yaml");
        println!();
    }

    let spec = &config.spec;

    println!("{} {}", "Configuration:".bold(), config.metadata.name);
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    if spec.server.cors_allowed_origins.is_empty() {
        println!("  CORS origins: {}", "any".yellow());
    } else {
        println!("  CORS origins: {}", spec.server.cors_allowed_origins.join(", "));
    }
    println!();

    println!("{}", "Persistence:".bold());
    println!("  Database: {:?}", spec.database.backend);
    println!("  Database URL: {}", masked(&spec.database.url));
    println!("  Object store: {:?} (bucket {})", spec.storage.backend, spec.storage.bucket);
    if let Some(url) = &spec.storage.supabase_url {
        println!("  Supabase URL: {}", url);
    }
    println!("  Service role key: {}", masked(&spec.storage.service_role_key));
    println!();

    println!("{}", "Evaluation queue:".bold());
    println!("  SQS queue: {}", or_unset(spec.queue.sqs_queue_url.as_deref()));
    println!("  Region: {}", spec.queue.region);
    println!("  Worker capacity: {}", spec.queue.worker_capacity);
    println!("  Concurrent jobs: {}", spec.queue.max_concurrent_jobs);
    println!();

    println!("{}", "Intake limits:".bold());
    println!("  Max file size: {} bytes", spec.intake.max_file_bytes);
    println!("  Max total size: {} bytes", spec.intake.max_total_bytes);
    println!("  Max files: {}", spec.intake.max_files);
    println!("  Allowed types: {}", spec.intake.allowed_content_types.join(", "));
    println!();

    println!("{}", "Auth:".bold());
    println!("  JWT secret: {}", masked(&spec.auth.jwt_secret));
    println!("  Audience: {}", spec.auth.audience);
    println!("  Required role: {}", or_unset(spec.auth.required_role.as_deref()));
    println!("  Demo applicant: {}", or_unset(spec.demo.applicant_user_id.as_deref()));
    println!("  Demo caseworker: {}", or_unset(spec.demo.caseworker_user_id.as_deref()));
    println!();

    println!("{}", "Identifier hashing:".bold());
    println!("  Backend: {:?}", spec.hashing.backend);
    println!("  HMAC key: {}", masked(&spec.hashing.hmac_key));
    println!();

    let limits = &spec.rate_limits;
    println!("{}", "Rate limits (requests / window):".bold());
    for (name, rule) in [
        ("public_api", limits.public_api),
        ("private_api", limits.private_api),
        ("submissions", limits.submissions),
        ("demo_session_submissions", limits.demo_session_submissions),
        ("demo_ip_submissions", limits.demo_ip_submissions),
        ("demo_api", limits.demo_api),
    ] {
        println!("  {}: {} / {}s", name, rule.max_requests, rule.window_seconds);
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = IntakeConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    std::fs::write(output, sample(with_examples))
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

fn sample(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/intake-config-full.yaml")
    } else {
        include_str!("../../templates/intake-config-minimal.yaml")
    }
}
