use std::path::Path;

use serde::Serialize;

use crate::commands::common::{format_queue_counts, load_profile, open_store};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusItem {
    profile: String,
    device_id: String,
    api_base_url: Option<String>,
    tenant_id: Option<String>,
    checkpoint: Option<i64>,
    pending: u64,
    failed: u64,
    dead: u64,
    processed: u64,
    open_conflicts: usize,
    tables: Vec<(String, usize)>,
}

/// Upper bound when counting open conflicts
const CONFLICT_SCAN_LIMIT: usize = 10_000;

pub async fn run_status(
    as_json: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let (profile_name, profile) = load_profile(profile)?;
    let store = open_store(db_path).await?;

    let checkpoint = match profile.tenant_id.as_deref() {
        Some(tenant_id) => Some(store.checkpoint_generation(tenant_id).await?),
        None => None,
    };
    let counts = store.queue_counts().await?;
    let open_conflicts = store.list_conflicts(CONFLICT_SCAN_LIMIT, true).await?.len();
    let status = StatusItem {
        profile: profile_name,
        device_id: store.device_id().await?,
        api_base_url: profile.api_base_url.clone(),
        tenant_id: profile.tenant_id.clone(),
        checkpoint,
        pending: counts.pending,
        failed: counts.failed,
        dead: counts.dead,
        processed: counts.processed,
        open_conflicts,
        tables: store.record_tables().await?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Profile:    {}", status.profile);
    println!("Device:     {}", status.device_id);
    println!(
        "API:        {}",
        status.api_base_url.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "Tenant:     {}",
        status.tenant_id.as_deref().unwrap_or("(not configured)")
    );
    if let Some(checkpoint) = status.checkpoint {
        println!("Checkpoint: {checkpoint}");
    }
    println!("Queue:      {}", format_queue_counts(&counts));
    println!("Conflicts:  {} open", status.open_conflicts);
    for (table, count) in &status.tables {
        println!("  {table:<24} {count} records");
    }
    Ok(())
}
