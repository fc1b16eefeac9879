//! In-process sync server used by the engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::transport::{
    DownloadRequest, DownloadResponse, RemoteConflict, ResolveConflictRequest, SyncTransport,
    UploadRequest, UploadResponse,
};
use crate::error::{Error, Result};
use crate::models::{ChangeRecord, EntityKey, OperationType, QueuedOperation, SyncCheckpoint};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchState,
    StoreState(i64),
    Upload(Vec<EntityKey>),
    Download(i64),
    ResolveConflict(String),
}

#[derive(Default)]
struct ServerState {
    calls: Vec<Call>,
    checkpoint: i64,
    log: Vec<ChangeRecord>,
    uploaded: Vec<QueuedOperation>,
    pending_conflicts: Vec<RemoteConflict>,
    conflict_entities: HashMap<String, EntityKey>,
    rejected: HashSet<EntityKey>,
    ignored: HashSet<EntityKey>,
    fail_downloads: bool,
    fail_uploads: bool,
}

/// Records every call and serves a scripted change log
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<ServerState>,
    hold_fetch: AtomicBool,
    /// Signalled when a held `fetch_state` has started
    pub entered: Notify,
    /// Releases one held `fetch_state`
    pub release: Notify,
}

impl MockTransport {
    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a change to the server log and return its generation
    pub fn push_change(
        &self,
        table: &str,
        id: &str,
        operation: OperationType,
        data: Option<serde_json::Value>,
    ) -> i64 {
        let mut state = self.lock();
        let generation = state.log.last().map_or(0, |c| c.sync_generation) + 1;
        state.log.push(ChangeRecord {
            table_name: table.to_string(),
            record_id: id.to_string(),
            operation,
            new_data: data,
            sync_generation: generation,
        });
        generation
    }

    /// Jump the server generation counter (e.g. to simulate gaps)
    pub fn push_change_at(&self, change: ChangeRecord) {
        self.lock().log.push(change);
    }

    /// Report a conflict on the next download
    pub fn push_conflict(&self, conflict: RemoteConflict) {
        let mut state = self.lock();
        state.conflict_entities.insert(
            conflict.conflict_id.clone(),
            EntityKey::new(&conflict.entity_table, &conflict.entity_id),
        );
        state.pending_conflicts.push(conflict);
    }

    /// Reject every upload touching this entity
    pub fn reject(&self, table: &str, id: &str) {
        self.lock().rejected.insert(EntityKey::new(table, id));
    }

    /// Leave uploads for this entity out of both result lists
    pub fn ignore(&self, table: &str, id: &str) {
        self.lock().ignored.insert(EntityKey::new(table, id));
    }

    pub fn set_checkpoint(&self, generation: i64) {
        self.lock().checkpoint = generation;
    }

    pub fn checkpoint(&self) -> i64 {
        self.lock().checkpoint
    }

    pub fn set_fail_downloads(&self, fail: bool) {
        self.lock().fail_downloads = fail;
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.lock().fail_uploads = fail;
    }

    /// Make `fetch_state` wait for [`Self::release`]
    pub fn hold_fetch(&self, hold: bool) {
        self.hold_fetch.store(hold, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn fetch_count(&self) -> usize {
        self.count(|call| matches!(call, Call::FetchState))
    }

    /// Operations the server accepted, in arrival order
    pub fn uploaded(&self) -> Vec<QueuedOperation> {
        self.lock().uploaded.clone()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn fetch_state(&self, device_id: &str, tenant_id: &str) -> Result<SyncCheckpoint> {
        let generation = {
            let mut state = self.lock();
            state.calls.push(Call::FetchState);
            state.checkpoint
        };

        if self.hold_fetch.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        let mut checkpoint = SyncCheckpoint::initial(device_id, tenant_id);
        checkpoint.last_sync_generation = generation;
        Ok(checkpoint)
    }

    async fn store_state(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::StoreState(checkpoint.last_sync_generation));
        state.checkpoint = checkpoint.last_sync_generation;
        Ok(())
    }

    async fn upload(&self, request: &UploadRequest<'_>) -> Result<UploadResponse> {
        let mut state = self.lock();
        state.calls.push(Call::Upload(
            request.changes.iter().map(QueuedOperation::entity_key).collect(),
        ));
        if state.fail_uploads {
            return Err(Error::Api("/sync/upload: unavailable (503)".into()));
        }

        let mut response = UploadResponse::default();
        for op in request.changes {
            let key = op.entity_key();
            if state.ignored.contains(&key) {
                continue;
            }
            if state.rejected.contains(&key) {
                response.failed.push(op.id.as_str());
                response
                    .errors
                    .insert(op.id.as_str(), format!("{key} is read-only"));
            } else {
                response.processed.push(op.id.as_str());
                state.uploaded.push(op.clone());
            }
        }
        Ok(response)
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadResponse> {
        let mut state = self.lock();
        state.calls.push(Call::Download(request.last_generation));
        if state.fail_downloads {
            return Err(Error::Api("/sync/download: unavailable (503)".into()));
        }

        let changes = state
            .log
            .iter()
            .filter(|change| change.sync_generation > request.last_generation)
            .take(request.limit)
            .cloned()
            .collect();
        Ok(DownloadResponse {
            changes,
            conflicts: std::mem::take(&mut state.pending_conflicts),
        })
    }

    async fn resolve_conflict(&self, request: &ResolveConflictRequest) -> Result<()> {
        let entity = {
            let mut state = self.lock();
            state
                .calls
                .push(Call::ResolveConflict(request.conflict_id.clone()));
            state.conflict_entities.get(&request.conflict_id).cloned()
        };
        let Some(entity) = entity else {
            return Err(Error::Api(format!(
                "/sync/resolve-conflict: unknown conflict {} (404)",
                request.conflict_id
            )));
        };
        if let Some(value) = &request.resolved_value {
            self.push_change(
                &entity.table,
                &entity.id,
                OperationType::Update,
                Some(value.clone()),
            );
        }
        Ok(())
    }
}
