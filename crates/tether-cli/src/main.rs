//! Tether CLI - queue offline changes and sync them from the terminal.

mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::conflicts::run_conflicts;
use crate::commands::queue::run_queue;
use crate::commands::records::run_records;
use crate::commands::status::run_status;
use crate::commands::sync::{run_sync, run_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "tether=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Queue {
            operation,
            table,
            id,
            data,
            offline,
        } => {
            run_queue(
                operation,
                &table,
                &id,
                data.as_deref(),
                offline,
                &db_path,
                profile,
            )
            .await?;
        }
        Commands::Sync { all, json } => run_sync(all, json, &db_path, profile).await?,
        Commands::Watch { interval } => run_watch(interval, &db_path, profile).await?,
        Commands::Status { json } => run_status(json, &db_path, profile).await?,
        Commands::Records {
            table,
            limit,
            offset,
            json,
        } => run_records(table.as_deref(), limit, offset, json, &db_path).await?,
        Commands::Conflicts { command } => run_conflicts(command, &db_path, profile).await?,
        Commands::Config { command } => run_config(command, profile)?,
    }

    Ok(())
}
