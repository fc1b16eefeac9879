use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tether_core::db::QueueCounts;
use tether_core::models::{MaterializedRecord, StoredConflict};
use tether_core::{HttpTransport, LocalStore, SyncEngine, SyncOutcome};

use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Effective profile: stored values with `TETHER_*` overrides applied
pub fn load_profile(explicit: Option<&str>) -> Result<(String, CliProfile), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(explicit);
    let profile = config
        .profile(&name)
        .cloned()
        .unwrap_or_default()
        .with_env_overrides(|key| env::var(key).ok())
        .map_err(CliError::Config)?;
    profile.validate().map_err(CliError::Config)?;
    Ok((name, profile))
}

pub async fn open_store(db_path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(db_path).await?)
}

/// Build an engine for the configured API and tenant
pub async fn open_engine(
    db_path: &Path,
    profile_name: Option<&str>,
) -> Result<Arc<SyncEngine>, CliError> {
    let (name, profile) = load_profile(profile_name)?;
    let Some((api_base_url, tenant_id)) = profile.sync_target() else {
        return Err(CliError::SyncNotConfigured);
    };

    let store = open_store(db_path).await?;
    let device_id = store.device_id().await?;
    let mut transport = HttpTransport::new(api_base_url)?;
    if let Some(token) = profile.access_token.clone() {
        transport = transport.with_access_token(token);
    }

    let config = profile.engine_config(&device_id, &tenant_id);
    let engine = SyncEngine::new(config, Arc::new(transport), store)?;
    tracing::debug!("Using profile '{name}' for tenant '{tenant_id}'");
    Ok(Arc::new(engine))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TETHER_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
        .join("tether.db")
}

pub fn parse_json_argument(raw: &str) -> Result<serde_json::Value, CliError> {
    serde_json::from_str(raw.trim()).map_err(|error| CliError::InvalidPayload(error.to_string()))
}

#[derive(Debug, Serialize)]
pub struct OutcomeItem {
    pub success: bool,
    pub skipped: bool,
    pub uploaded: usize,
    pub upload_failed: usize,
    pub applied: usize,
    pub checkpoint: i64,
    pub has_more: bool,
    pub auto_resolved: usize,
    pub conflicts: Vec<String>,
}

pub fn outcome_to_item(outcome: &SyncOutcome) -> OutcomeItem {
    OutcomeItem {
        success: outcome.success,
        skipped: outcome.skipped,
        uploaded: outcome.uploaded,
        upload_failed: outcome.upload_failed,
        applied: outcome.applied,
        checkpoint: outcome.checkpoint,
        has_more: outcome.has_more,
        auto_resolved: outcome.auto_resolved,
        conflicts: outcome
            .conflicts
            .iter()
            .map(|conflict| conflict.conflict_id.clone())
            .collect(),
    }
}

pub fn format_outcome(outcome: &SyncOutcome) -> String {
    if outcome.skipped {
        return "Sync already in progress".to_string();
    }
    if !outcome.success {
        return "Sync failed".to_string();
    }

    let mut line = format!(
        "Sync completed: {} uploaded, {} applied, checkpoint {}",
        outcome.uploaded, outcome.applied, outcome.checkpoint
    );
    if outcome.upload_failed > 0 {
        line.push_str(&format!(", {} rejected", outcome.upload_failed));
    }
    if outcome.auto_resolved > 0 {
        line.push_str(&format!(", {} conflicts auto-resolved", outcome.auto_resolved));
    }
    if !outcome.conflicts.is_empty() {
        line.push_str(&format!(
            ", {} conflicts need resolution",
            outcome.conflicts.len()
        ));
    }
    if outcome.has_more {
        line.push_str(" (more changes pending)");
    }
    line
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: String,
    pub table: String,
    pub entity_id: String,
    pub strategy: String,
    pub local_value: serde_json::Value,
    pub remote_value: serde_json::Value,
    pub detected_at: i64,
    pub detected_at_iso: String,
    pub resolved_with: Option<String>,
}

pub fn conflict_to_item(stored: &StoredConflict) -> ConflictItem {
    let conflict = &stored.conflict;
    ConflictItem {
        id: conflict.conflict_id.clone(),
        table: conflict.entity_table.clone(),
        entity_id: conflict.entity_id.clone(),
        strategy: conflict.resolution_strategy.to_string(),
        local_value: conflict.local_value.clone(),
        remote_value: conflict.remote_value.clone(),
        detected_at: stored.detected_at,
        detected_at_iso: format_sync_timestamp(stored.detected_at),
        resolved_with: stored.resolved_with.map(|strategy| strategy.to_string()),
    }
}

pub fn format_conflict_lines(conflicts: &[StoredConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|stored| {
            let conflict = &stored.conflict;
            let status = stored
                .resolved_with
                .map_or_else(|| "open".to_string(), |strategy| strategy.to_string());
            format!(
                "{}  {:<11}  {}/{}  id={}  local={} remote={}",
                format_sync_timestamp(stored.detected_at),
                status,
                conflict.entity_table,
                conflict.entity_id,
                conflict.conflict_id,
                conflict.local_value,
                conflict.remote_value
            )
        })
        .collect()
}

pub fn format_record_lines(records: &[MaterializedRecord], now_ms: i64) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            format!(
                "{:<24}  gen={:<6}  {:<10}  {}",
                record.record_id,
                record.sync_generation,
                format_relative_time(record.updated_at, now_ms),
                record_preview(&record.data, 60)
            )
        })
        .collect()
}

pub fn record_preview(data: &serde_json::Value, max_chars: usize) -> String {
    let collapsed = data.to_string();
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_queue_counts(counts: &QueueCounts) -> String {
    format!(
        "{} pending, {} failed, {} dead, {} processed",
        counts.pending, counts.failed, counts.dead, counts.processed
    )
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
