//! Boundary contract between the engine and the sync API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{ChangeRecord, QueuedOperation, ResolutionStrategy, SyncCheckpoint, SyncConflict};

/// Remote side of the sync protocol.
///
/// [`super::HttpTransport`] talks to the REST endpoints; hosts may provide
/// their own implementation (e.g. an in-process server in tests).
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// `POST /sync/state`: zero state when the server has none yet
    async fn fetch_state(&self, device_id: &str, tenant_id: &str) -> Result<SyncCheckpoint>;

    /// `PUT /sync/state`
    async fn store_state(&self, checkpoint: &SyncCheckpoint) -> Result<()>;

    /// `POST /sync/upload`
    async fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadResponse>;

    /// `POST /sync/download`
    async fn download(&self, request: &DownloadRequest) -> Result<DownloadResponse>;

    /// `POST /sync/resolve-conflict`
    async fn resolve_conflict(&self, request: &ResolveConflictRequest) -> Result<()>;
}

#[derive(Debug, Serialize)]
pub struct StateRequest<'a> {
    pub device_id: &'a str,
    pub tenant_id: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct StateResponse {
    #[serde(default, alias = "syncState")]
    pub sync_state: Option<RemoteSyncState>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoteSyncState {
    #[serde(default)]
    pub last_sync_generation: Option<i64>,
    #[serde(default)]
    pub pending_changes_count: Option<i64>,
}

impl StateResponse {
    /// Fold the (possibly absent) server state into a checkpoint
    pub fn into_checkpoint(self, device_id: &str, tenant_id: &str) -> SyncCheckpoint {
        let state = self.sync_state.unwrap_or_default();
        SyncCheckpoint {
            device_id: device_id.to_string(),
            tenant_id: tenant_id.to_string(),
            last_sync_generation: state.last_sync_generation.unwrap_or(0).max(0),
            pending_changes_count: state.pending_changes_count.unwrap_or(0).max(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StoreStateRequest<'a> {
    pub device_id: &'a str,
    pub tenant_id: &'a str,
    pub last_sync_generation: i64,
}

#[derive(Debug, Serialize)]
pub struct UploadRequest<'a> {
    pub device_id: &'a str,
    pub tenant_id: &'a str,
    pub changes: &'a [QueuedOperation],
}

/// Per-item upload result, keyed by operation id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub processed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    /// Optional rejection reasons for failed items
    #[serde(default)]
    pub errors: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub device_id: String,
    pub tenant_id: String,
    pub last_generation: i64,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadResponse {
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
    #[serde(default)]
    pub conflicts: Vec<RemoteConflict>,
}

/// Conflict as sent by the server; the strategy may be left to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConflict {
    #[serde(alias = "id")]
    pub conflict_id: String,
    pub entity_table: String,
    pub entity_id: String,
    #[serde(default)]
    pub local_value: serde_json::Value,
    #[serde(default)]
    pub remote_value: serde_json::Value,
    #[serde(default)]
    pub resolution_strategy: Option<ResolutionStrategy>,
}

impl RemoteConflict {
    pub fn into_conflict(self, default_strategy: ResolutionStrategy) -> SyncConflict {
        SyncConflict {
            conflict_id: self.conflict_id,
            entity_table: self.entity_table,
            entity_id: self.entity_id,
            local_value: self.local_value,
            remote_value: self.remote_value,
            resolution_strategy: self.resolution_strategy.unwrap_or(default_strategy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveConflictRequest {
    pub conflict_id: String,
    pub strategy: ResolutionStrategy,
    pub resolved_value: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOperation;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_state_request_bodies() {
        let body = serde_json::to_value(StateRequest {
            device_id: "device",
            tenant_id: "tenant",
        })
        .unwrap();
        assert_eq!(body, json!({ "device_id": "device", "tenant_id": "tenant" }));

        let body = serde_json::to_value(StoreStateRequest {
            device_id: "device",
            tenant_id: "tenant",
            last_sync_generation: 6,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({ "device_id": "device", "tenant_id": "tenant", "last_sync_generation": 6 })
        );
    }

    #[test]
    fn test_upload_request_body() {
        let op = QueuedOperation::from_new(
            NewOperation::create("tasks", "A", json!({ "name": "Draft" })),
            "device",
            "tenant",
            1_000,
            250,
        );
        let body = serde_json::to_value(UploadRequest {
            device_id: "device",
            tenant_id: "tenant",
            changes: std::slice::from_ref(&op),
        })
        .unwrap();

        assert_eq!(
            body,
            json!({
                "device_id": "device",
                "tenant_id": "tenant",
                "changes": [{
                    "id": op.id.as_str(),
                    "operation_type": "create",
                    "entity_table": "tasks",
                    "entity_id": "A",
                    "payload": { "name": "Draft" },
                    "device_id": "device",
                    "tenant_id": "tenant",
                    "created_at": 1_000,
                    "scheduled_at": 1_250
                }]
            })
        );
    }

    #[test]
    fn test_download_request_body() {
        let body = serde_json::to_value(DownloadRequest {
            device_id: "device".into(),
            tenant_id: "tenant".into(),
            last_generation: 5,
            limit: 100,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "device_id": "device",
                "tenant_id": "tenant",
                "last_generation": 5,
                "limit": 100
            })
        );
    }

    #[test]
    fn test_resolve_conflict_request_body() {
        let body = serde_json::to_value(ResolveConflictRequest {
            conflict_id: "c1".into(),
            strategy: ResolutionStrategy::ClientWins,
            resolved_value: Some(json!({ "name": "Mine" })),
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "conflict_id": "c1",
                "strategy": "client_wins",
                "resolved_value": { "name": "Mine" }
            })
        );

        // Server-wins resolutions still send the key
        let body = serde_json::to_value(ResolveConflictRequest {
            conflict_id: "c2".into(),
            strategy: ResolutionStrategy::ServerWins,
            resolved_value: None,
        })
        .unwrap();
        assert_eq!(body["strategy"], json!("server_wins"));
        assert_eq!(body["resolved_value"], serde_json::Value::Null);
        assert!(body.as_object().unwrap().contains_key("resolved_value"));
    }

    #[test]
    fn test_download_response_parses_changes_and_conflicts() {
        let response: DownloadResponse = serde_json::from_value(json!({
            "changes": [{
                "table_name": "tasks",
                "record_id": "A",
                "operation": "update",
                "new_data": { "name": "Final" },
                "sync_generation": 5
            }],
            "conflicts": [{
                "conflict_id": "c1",
                "entity_table": "tasks",
                "entity_id": "A",
                "resolution_strategy": "manual"
            }]
        }))
        .unwrap();

        assert_eq!(response.changes[0].operation, crate::models::OperationType::Update);
        assert_eq!(response.changes[0].sync_generation, 5);
        assert_eq!(
            response.conflicts[0].resolution_strategy,
            Some(ResolutionStrategy::Manual)
        );
    }

    #[test]
    fn test_missing_state_is_zero() {
        let response: StateResponse = serde_json::from_value(json!({ "sync_state": null })).unwrap();
        let checkpoint = response.into_checkpoint("device", "tenant");
        assert_eq!(checkpoint, SyncCheckpoint::initial("device", "tenant"));
    }

    #[test]
    fn test_state_accepts_camel_case_envelope() {
        let response: StateResponse = serde_json::from_value(json!({
            "syncState": { "last_sync_generation": 42, "pending_changes_count": 3 }
        }))
        .unwrap();
        let checkpoint = response.into_checkpoint("device", "tenant");
        assert_eq!(checkpoint.last_sync_generation, 42);
        assert_eq!(checkpoint.pending_changes_count, 3);
    }

    #[test]
    fn test_remote_conflict_takes_default_strategy() {
        let remote: RemoteConflict = serde_json::from_value(json!({
            "id": "c1",
            "entity_table": "tasks",
            "entity_id": "A",
            "local_value": { "name": "Mine" },
            "remote_value": { "name": "Theirs" }
        }))
        .unwrap();
        let conflict = remote.into_conflict(ResolutionStrategy::ServerWins);
        assert_eq!(conflict.conflict_id, "c1");
        assert_eq!(conflict.resolution_strategy, ResolutionStrategy::ServerWins);
    }

    #[test]
    fn test_upload_response_defaults() {
        let response: UploadResponse = serde_json::from_value(json!({ "processed": ["x"] })).unwrap();
        assert_eq!(response.processed, vec!["x".to_string()]);
        assert!(response.failed.is_empty());
    }
}
