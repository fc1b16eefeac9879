//! Server change-log entries and the local change events derived from them

use serde::{Deserialize, Serialize};

use super::{EntityKey, OperationType};

/// A server-acknowledged mutation received during download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub table_name: String,
    pub record_id: String,
    pub operation: OperationType,
    /// Row payload; `None` for deletes
    #[serde(default)]
    pub new_data: Option<serde_json::Value>,
    /// Strictly increasing per tenant
    pub sync_generation: i64,
}

impl ChangeRecord {
    #[must_use]
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(&self.table_name, &self.record_id)
    }
}

/// Broadcast after a change has been materialized locally
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub table: String,
    pub id: String,
    pub operation: OperationType,
    pub data: Option<serde_json::Value>,
}

impl From<&ChangeRecord> for ChangeEvent {
    fn from(change: &ChangeRecord) -> Self {
        Self {
            table: change.table_name.clone(),
            id: change.record_id.clone(),
            operation: change.operation,
            data: change.new_data.clone(),
        }
    }
}
