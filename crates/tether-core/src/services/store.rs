//! Shared local store wrapper used by the sync engine and clients.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::RetryPolicy;
use crate::db::{
    ConflictRepository, Database, FailureReport, LibSqlConflictRepository, LibSqlQueueRepository,
    LibSqlRecordRepository, LibSqlSettingsRepository, QueueCounts, QueueRepository,
    RecordRepository, SettingsRepository,
};
use crate::models::{
    MaterializedRecord, OperationId, QueuedOperation, ResolutionStrategy, StoredConflict,
    SyncConflict,
};
use crate::Result;

/// Thread-safe handle over the local libSQL store.
///
/// Clones share the same connection; every call takes the lock for the
/// duration of one repository operation.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        self.db_path.as_deref()
    }

    /// Stable identifier of this installation.
    pub async fn device_id(&self) -> Result<String> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection())
            .device_id()
            .await
    }

    /// Locally mirrored checkpoint generation for a tenant.
    pub async fn checkpoint_generation(&self, tenant_id: &str) -> Result<i64> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection())
            .checkpoint_generation(tenant_id)
            .await
    }

    /// Mirror a checkpoint generation; returns the stored (monotonic) value.
    pub async fn save_checkpoint_generation(&self, tenant_id: &str, generation: i64) -> Result<i64> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection())
            .save_checkpoint_generation(tenant_id, generation)
            .await
    }

    /// Append an operation to the outgoing queue.
    pub async fn enqueue(&self, op: &QueuedOperation) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).enqueue(op).await
    }

    /// Fetch a queued operation.
    pub async fn get_operation(&self, id: &OperationId) -> Result<Option<QueuedOperation>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).get(id).await
    }

    /// Operations ready for upload at `now_ms`.
    pub async fn eligible_operations(&self, now_ms: i64) -> Result<Vec<QueuedOperation>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .eligible(now_ms)
            .await
    }

    /// All pending and failed operations.
    pub async fn outstanding_operations(&self) -> Result<Vec<QueuedOperation>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .outstanding()
            .await
    }

    pub async fn mark_processed(&self, ids: &[OperationId], now_ms: i64) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .mark_processed(ids, now_ms)
            .await
    }

    pub async fn mark_failed(
        &self,
        ids: &[OperationId],
        error: Option<&str>,
        retry: &RetryPolicy,
        now_ms: i64,
    ) -> Result<FailureReport> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .mark_failed(ids, error, retry, now_ms)
            .await
    }

    pub async fn queue_counts(&self) -> Result<QueueCounts> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).counts().await
    }

    /// Retention for acknowledged operations.
    pub async fn prune_processed(&self, older_than_ms: i64) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .prune_processed(older_than_ms)
            .await
    }

    pub async fn upsert_record(
        &self,
        table: &str,
        id: &str,
        data: &serde_json::Value,
        generation: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .upsert(table, id, data, generation)
            .await
    }

    pub async fn delete_record(&self, table: &str, id: &str, generation: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .delete(table, id, generation)
            .await
    }

    pub async fn get_record(&self, table: &str, id: &str) -> Result<Option<MaterializedRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .get(table, id)
            .await
    }

    pub async fn list_records(
        &self,
        table: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MaterializedRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list(table, limit, offset)
            .await
    }

    pub async fn record_tables(&self) -> Result<Vec<(String, usize)>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection()).tables().await
    }

    pub async fn record_conflict(&self, conflict: &SyncConflict, now_ms: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .record(conflict, now_ms)
            .await
    }

    pub async fn get_conflict(&self, conflict_id: &str) -> Result<Option<StoredConflict>> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .get(conflict_id)
            .await
    }

    pub async fn list_conflicts(&self, limit: usize, open_only: bool) -> Result<Vec<StoredConflict>> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .list(limit, open_only)
            .await
    }

    pub async fn mark_conflict_resolved(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        now_ms: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlConflictRepository::new(db.connection())
            .mark_resolved(conflict_id, strategy, now_ms)
            .await
    }
}
