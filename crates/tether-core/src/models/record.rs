//! Locally materialized record model

use serde::{Deserialize, Serialize};

/// A row as materialized in the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedRecord {
    pub table_name: String,
    pub record_id: String,
    pub data: serde_json::Value,
    /// Generation of the change that last wrote this row
    pub sync_generation: i64,
    /// Local write timestamp (Unix ms)
    pub updated_at: i64,
}
