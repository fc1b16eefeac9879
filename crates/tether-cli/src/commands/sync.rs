use std::path::Path;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{format_outcome, open_engine, outcome_to_item};
use crate::error::CliError;

/// Upper bound on follow-up cycles for `sync --all`
const MAX_CATCH_UP_CYCLES: usize = 1_000;

pub async fn run_sync(
    all: bool,
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let engine = open_engine(db_path, profile).await?;

    let mut outcome = engine.sync().await;
    let mut cycles = 1;
    while all && outcome.success && outcome.has_more && cycles < MAX_CATCH_UP_CYCLES {
        if !as_json {
            println!("{}", format_outcome(&outcome));
        }
        outcome = engine.sync().await;
        cycles += 1;
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome_to_item(&outcome))?);
    } else {
        println!("{}", format_outcome(&outcome));
        for conflict in &outcome.conflicts {
            println!(
                "  conflict {} on {}/{}",
                conflict.conflict_id, conflict.entity_table, conflict.entity_id
            );
        }
    }

    if outcome.success {
        Ok(())
    } else {
        Err(CliError::SyncFailed)
    }
}

pub async fn run_watch(
    interval: Option<u64>,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let engine = open_engine(db_path, profile).await?;
    let interval = interval.map_or(engine.config().auto_sync_interval, Duration::from_secs);
    if interval.is_zero() {
        return Err(CliError::Config("interval must be positive".to_string()));
    }

    let mut events = engine.subscribe();
    println!("Watching for changes every {}s (Ctrl+C to stop)", interval.as_secs());
    engine.start_auto_sync(interval).await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let data = event
                        .data
                        .map(|data| data.to_string())
                        .unwrap_or_default();
                    println!("{:<6}  {}/{}  {data}", event.operation.as_str(), event.table, event.id);
                }
                Err(RecvError::Lagged(skipped)) => {
                    println!("... {skipped} changes not shown");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.stop_auto_sync();
    println!("Stopped");
    Ok(())
}
