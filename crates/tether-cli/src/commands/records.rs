use std::path::Path;

use chrono::Utc;
use tether_core::models::validate_table_name;

use crate::commands::common::{format_record_lines, open_store};
use crate::error::CliError;

pub async fn run_records(
    table: Option<&str>,
    limit: usize,
    offset: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;

    let Some(table) = table.map(str::trim) else {
        let tables = store.record_tables().await?;
        if as_json {
            println!("{}", serde_json::to_string_pretty(&tables)?);
        } else if tables.is_empty() {
            println!("No records synced yet.");
        } else {
            for (table, count) in tables {
                println!("{table:<24} {count}");
            }
        }
        return Ok(());
    };

    validate_table_name(table)?;
    let records = store.list_records(table, limit, offset).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records in '{table}'.");
        return Ok(());
    }
    for line in format_record_lines(&records, Utc::now().timestamp_millis()) {
        println!("{line}");
    }
    Ok(())
}
