use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::json;
use tether_core::models::{StoredConflict, SyncConflict};
use tether_core::{ResolutionStrategy, SyncOutcome};

use crate::cli::{Cli, Commands, ConflictCommands, OperationKind, StrategyArg};
use crate::commands::common::{
    conflict_to_item, format_conflict_lines, format_outcome, format_relative_time,
    format_sync_timestamp, outcome_to_item, parse_json_argument, record_preview,
};
use crate::commands::config::{missing_profile_fields, ProfileUpdate};
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn stored_conflict(resolved_with: Option<ResolutionStrategy>) -> StoredConflict {
    StoredConflict {
        conflict: SyncConflict {
            conflict_id: "c1".to_string(),
            entity_table: "tasks".to_string(),
            entity_id: "A".to_string(),
            local_value: json!({ "name": "Mine" }),
            remote_value: json!({ "name": "Theirs" }),
            resolution_strategy: ResolutionStrategy::Manual,
        },
        detected_at: 0,
        resolved_at: resolved_with.map(|_| 1_000),
        resolved_with,
    }
}

#[test]
fn parse_queue_command() {
    let cli = Cli::try_parse_from([
        "tether",
        "queue",
        "create",
        "tasks",
        "A",
        r#"{"name":"Draft"}"#,
        "--offline",
    ])
    .unwrap();

    match cli.command {
        Commands::Queue {
            operation,
            table,
            id,
            data,
            offline,
        } => {
            assert_eq!(operation, OperationKind::Create);
            assert_eq!(table, "tasks");
            assert_eq!(id, "A");
            assert_eq!(data.as_deref(), Some(r#"{"name":"Draft"}"#));
            assert!(offline);
        }
        _ => panic!("expected queue command"),
    }
}

#[test]
fn parse_conflict_resolve_with_global_profile() {
    let cli = Cli::try_parse_from([
        "tether",
        "conflicts",
        "resolve",
        "c1",
        "client-wins",
        "--profile",
        "work",
    ])
    .unwrap();

    assert_eq!(cli.profile.as_deref(), Some("work"));
    match cli.command {
        Commands::Conflicts {
            command: ConflictCommands::Resolve {
                id,
                strategy,
                value,
            },
        } => {
            assert_eq!(id, "c1");
            assert_eq!(strategy, StrategyArg::ClientWins);
            assert_eq!(
                ResolutionStrategy::from(strategy),
                ResolutionStrategy::ClientWins
            );
            assert!(value.is_none());
        }
        _ => panic!("expected conflicts resolve command"),
    }
}

#[test]
fn parse_rejects_unknown_operation() {
    assert!(Cli::try_parse_from(["tether", "queue", "upsert", "tasks", "A"]).is_err());
}

#[test]
fn parse_json_argument_reports_invalid_payload() {
    assert_eq!(
        parse_json_argument(r#" {"v": 1} "#).unwrap(),
        json!({ "v": 1 })
    );
    assert!(matches!(
        parse_json_argument("{not json"),
        Err(CliError::InvalidPayload(_))
    ));
}

#[test]
fn format_outcome_summarizes_cycle() {
    let outcome = SyncOutcome {
        success: true,
        uploaded: 2,
        applied: 3,
        checkpoint: 9,
        has_more: true,
        ..SyncOutcome::default()
    };
    assert_eq!(
        format_outcome(&outcome),
        "Sync completed: 2 uploaded, 3 applied, checkpoint 9 (more changes pending)"
    );

    let skipped = SyncOutcome {
        skipped: true,
        ..SyncOutcome::default()
    };
    assert_eq!(format_outcome(&skipped), "Sync already in progress");
    assert_eq!(format_outcome(&SyncOutcome::default()), "Sync failed");
}

#[test]
fn outcome_item_lists_conflict_ids() {
    let outcome = SyncOutcome {
        success: true,
        conflicts: vec![stored_conflict(None).conflict],
        ..SyncOutcome::default()
    };
    let item = outcome_to_item(&outcome);
    assert_eq!(item.conflicts, vec!["c1".to_string()]);
}

#[test]
fn conflict_lines_show_status() {
    let lines = format_conflict_lines(&[
        stored_conflict(None),
        stored_conflict(Some(ResolutionStrategy::ServerWins)),
    ]);
    assert!(lines[0].contains("open"));
    assert!(lines[0].contains("tasks/A"));
    assert!(lines[1].contains("server_wins"));

    let item = conflict_to_item(&stored_conflict(None));
    assert_eq!(item.detected_at_iso, "1970-01-01 00:00:00 UTC");
    assert_eq!(item.resolved_with, None);
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(
        format_relative_time(now - 14 * 24 * 60 * 60_000, now),
        "2w ago"
    );
}

#[test]
fn format_sync_timestamp_falls_back_to_raw_value() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
    assert_eq!(format_sync_timestamp(i64::MAX), i64::MAX.to_string());
}

#[test]
fn record_preview_truncates_long_payloads() {
    let data = json!({ "text": "x".repeat(100) });
    let preview = record_preview(&data, 20);
    assert_eq!(preview.chars().count(), 20);
    assert!(preview.ends_with("..."));
    assert_eq!(record_preview(&json!({ "a": 1 }), 20), r#"{"a":1}"#);
}

#[test]
fn profile_update_keeps_unset_values() {
    let mut profile = CliProfile {
        api_base_url: Some("https://old.example.com".to_string()),
        tenant_id: Some("acme".to_string()),
        ..CliProfile::default()
    };
    ProfileUpdate {
        api_base_url: Some(" https://new.example.com/api/ ".to_string()),
        conflict_resolution: Some(StrategyArg::ServerWins),
        ..ProfileUpdate::default()
    }
    .apply_to(&mut profile);

    assert_eq!(
        profile.api_base_url.as_deref(),
        Some("https://new.example.com/api")
    );
    assert_eq!(profile.tenant_id.as_deref(), Some("acme"));
    assert_eq!(
        profile.conflict_resolution,
        Some(ResolutionStrategy::ServerWins)
    );
    assert!(missing_profile_fields(&profile).is_empty());
    assert_eq!(
        missing_profile_fields(&CliProfile::default()),
        vec!["api_base_url", "tenant_id"]
    );
}
