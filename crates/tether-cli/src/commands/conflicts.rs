use std::path::Path;

use crate::cli::{ConflictCommands, StrategyArg};
use crate::commands::common::{
    conflict_to_item, format_conflict_lines, format_outcome, open_engine, open_store,
    parse_json_argument, ConflictItem,
};
use crate::error::CliError;

pub async fn run_conflicts(
    command: ConflictCommands,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        ConflictCommands::List { limit, all, json } => {
            run_conflicts_list(limit, all, json, db_path).await
        }
        ConflictCommands::Resolve {
            id,
            strategy,
            value,
        } => run_conflicts_resolve(&id, strategy, value.as_deref(), db_path, profile).await,
    }
}

async fn run_conflicts_list(
    limit: usize,
    include_resolved: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let conflicts = store.list_conflicts(limit, !include_resolved).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

async fn run_conflicts_resolve(
    id: &str,
    strategy: StrategyArg,
    value: Option<&str>,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let value = value.map(parse_json_argument).transpose()?;
    let engine = open_engine(db_path, profile).await?;

    let outcome = engine.resolve_conflict(id, strategy.into(), value).await?;
    println!("Conflict {} resolved", id.trim());
    println!("{}", format_outcome(&outcome));
    Ok(())
}
