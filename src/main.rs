//! # Connector Registry Main Entry Point
//!
//! `connector-registry serve` (the default) runs the HTTP API;
//! `connector-registry migrate [--down]` applies or reverts the schema.

use anyhow::Context;
use clap::{Parser, Subcommand};
use connector_registry::{
    config::ConfigLoader,
    db::{self, MigrationDirection},
    server::run_server,
    telemetry,
};

#[derive(Debug, Parser)]
#[command(name = "connector-registry", version, about = "Connector registry API service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve,
    /// Apply database migrations
    Migrate {
        /// Revert every migration instead of applying them
        #[arg(long)]
        down: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;

    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(configuration = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if config.auto_migrate {
                db::run_migrations(&db, MigrationDirection::Up).await?;
            }
            run_server(config, db).await
        }
        Command::Migrate { down } => {
            let direction = if down {
                MigrationDirection::Down
            } else {
                MigrationDirection::Up
            };
            db::run_migrations(&db, direction).await
        }
    }
}
