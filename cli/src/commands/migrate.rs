// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `intake migrate`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use benefits_intake_core::domain::config::{DatabaseBackend, IntakeConfigManifest};
use benefits_intake_core::domain::repository::PostgresConfig;
use benefits_intake_core::infrastructure::db::{Database, MIGRATOR};

#[derive(Debug, Clone, Args)]
pub struct MigrateArgs {
    /// List embedded migrations and how many are applied without running them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: MigrateArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = IntakeConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    let database = &config.spec.database;

    if database.backend != DatabaseBackend::Postgres {
        anyhow::bail!("Migrations require the postgres database backend (set INTAKE_DATABASE_URL)");
    }
    let url = database
        .url
        .clone()
        .context("spec.database.url is required for the postgres backend")?;

    let db = Database::connect(&PostgresConfig {
        connection_string: url,
        max_connections: database.max_connections,
    })
    .await?;

    let applied = db.applied_migrations().await;

    if args.dry_run {
        println!("{}", "Embedded migrations:".bold());
        for migration in MIGRATOR.iter() {
            println!("  {} {}", migration.version, migration.description);
        }
        println!();
        println!("Applied: {} of {}", applied, MIGRATOR.iter().count());
        return Ok(());
    }

    info!("Applying migrations ({} already recorded)", applied);
    db.migrate().await?;
    let now_applied = db.applied_migrations().await;

    println!(
        "{}",
        format!("✓ Database up to date ({} migrations applied)", now_applied).green()
    );

    Ok(())
}
