use std::path::Path;

use tether_core::NewOperation;

use crate::cli::OperationKind;
use crate::commands::common::{open_engine, parse_json_argument};
use crate::error::CliError;

pub async fn run_queue(
    kind: OperationKind,
    table: &str,
    id: &str,
    data: Option<&str>,
    offline: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let payload = match data {
        Some(raw) => parse_json_argument(raw)?,
        None => serde_json::Value::Null,
    };
    let op = NewOperation::new(kind.into(), table.trim(), id.trim(), payload);

    let engine = open_engine(db_path, profile).await?;
    engine.set_online(!offline);
    let queued = engine.queue_operation(op).await?;
    println!(
        "Queued {} {}/{} as {}",
        queued.operation_type, queued.entity_table, queued.entity_id, queued.id
    );

    if !offline {
        let counts = engine.store().queue_counts().await?;
        println!("{} operations still outstanding", counts.outstanding());
    }
    Ok(())
}
