//! Outgoing half of a sync cycle.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::transport::{SyncTransport, UploadRequest, UploadResponse};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{EntityKey, OperationId, QueuedOperation};
use crate::services::LocalStore;
use crate::util::unix_millis_now;

/// Totals for one upload pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub batches: usize,
    pub processed: usize,
    pub retried: usize,
    pub dead: usize,
    /// Operations left pending: unacknowledged, or queued behind a failure
    pub deferred: usize,
}

impl UploadReport {
    pub const fn failed(&self) -> usize {
        self.retried + self.dead
    }
}

/// Sends eligible queued operations to the server in bounded batches.
pub struct UploadPipeline {
    transport: Arc<dyn SyncTransport>,
    store: LocalStore,
    config: Arc<EngineConfig>,
}

impl UploadPipeline {
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        store: LocalStore,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            transport,
            store,
            config,
        }
    }

    /// Upload everything currently eligible.
    ///
    /// Batches go out one at a time. Once an operation for an entity fails
    /// (or is not acknowledged), later operations for that entity wait for
    /// the next cycle. A transport error aborts the pass; batches already
    /// acknowledged stay acknowledged.
    pub async fn run(&self) -> Result<UploadReport> {
        let eligible = self.store.eligible_operations(unix_millis_now()).await?;
        let mut report = UploadReport::default();
        if eligible.is_empty() {
            debug!("No local changes to upload");
            return Ok(report);
        }

        info!("Uploading {} local changes", eligible.len());
        let mut remaining: VecDeque<QueuedOperation> = eligible.into();
        let mut held = HashSet::new();

        loop {
            let batch = next_batch(
                &mut remaining,
                &held,
                self.config.upload_batch_size,
                &mut report.deferred,
            );
            if batch.is_empty() {
                break;
            }
            report.batches += 1;
            self.upload_batch(&batch, &mut held, &mut report).await?;
        }

        info!(
            "Upload finished: {} processed, {} failed, {} deferred",
            report.processed,
            report.failed(),
            report.deferred
        );
        Ok(report)
    }

    async fn upload_batch(
        &self,
        batch: &[QueuedOperation],
        held: &mut HashSet<EntityKey>,
        report: &mut UploadReport,
    ) -> Result<()> {
        debug!("Uploading batch of {} operations", batch.len());
        let response = self
            .transport
            .upload(&UploadRequest {
                device_id: &self.config.device_id,
                tenant_id: &self.config.tenant_id,
                changes: batch,
            })
            .await?;

        let outcome = BatchOutcome::from_response(batch, response);
        let now = unix_millis_now();

        report.processed += self.store.mark_processed(&outcome.processed, now).await?;
        for (id, reason) in &outcome.failed {
            warn!("Server rejected operation {id}: {}", reason.as_deref().unwrap_or("no reason given"));
            let failure = self
                .store
                .mark_failed(&[*id], reason.as_deref(), &self.config.retry, now)
                .await?;
            report.retried += failure.retried;
            report.dead += failure.dead;
        }
        if !outcome.unacknowledged.is_empty() {
            warn!(
                "{} operations were not acknowledged and stay pending",
                outcome.unacknowledged.len()
            );
            report.deferred += outcome.unacknowledged.len();
        }

        for op in batch {
            if outcome.failed.iter().any(|(id, _)| *id == op.id)
                || outcome.unacknowledged.contains(&op.id)
            {
                held.insert(op.entity_key());
            }
        }
        Ok(())
    }
}

/// Take up to `size` operations, skipping (and counting) those whose entity
/// is held back.
fn next_batch(
    remaining: &mut VecDeque<QueuedOperation>,
    held: &HashSet<EntityKey>,
    size: usize,
    deferred: &mut usize,
) -> Vec<QueuedOperation> {
    let mut batch = Vec::with_capacity(size.min(remaining.len()));
    while batch.len() < size {
        let Some(op) = remaining.pop_front() else {
            break;
        };
        if held.contains(&op.entity_key()) {
            *deferred += 1;
            continue;
        }
        batch.push(op);
    }
    batch
}

#[derive(Debug, Default)]
struct BatchOutcome {
    processed: Vec<OperationId>,
    failed: Vec<(OperationId, Option<String>)>,
    unacknowledged: Vec<OperationId>,
}

impl BatchOutcome {
    /// Match the server's id lists against the batch that was sent
    fn from_response(batch: &[QueuedOperation], mut response: UploadResponse) -> Self {
        let processed: HashSet<&str> = response.processed.iter().map(String::as_str).collect();
        let failed: HashSet<&str> = response.failed.iter().map(String::as_str).collect();

        let mut outcome = Self::default();
        for op in batch {
            let id = op.id.as_str();
            if failed.contains(id.as_str()) {
                let reason = response.errors.remove(&id);
                outcome.failed.push((op.id, reason));
            } else if processed.contains(id.as_str()) {
                outcome.processed.push(op.id);
            } else {
                outcome.unacknowledged.push(op.id);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::models::{NewOperation, OperationStatus};
    use crate::sync::testing::{Call, MockTransport};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    async fn setup(batch_size: usize) -> (Arc<MockTransport>, LocalStore, UploadPipeline) {
        let transport = Arc::new(MockTransport::default());
        let store = LocalStore::open_in_memory().await.unwrap();
        let config = Arc::new(
            EngineConfig::new("device-1", "tenant-1")
                .with_upload_batch_size(batch_size)
                .with_retry_policy(RetryPolicy {
                    base_delay: Duration::from_secs(60),
                    max_delay: Duration::from_secs(60),
                    max_attempts: 2,
                }),
        );
        let pipeline = UploadPipeline::new(transport.clone(), store.clone(), config);
        (transport, store, pipeline)
    }

    async fn enqueue(store: &LocalStore, table: &str, id: &str, name: &str) -> QueuedOperation {
        let op = QueuedOperation::from_new(
            NewOperation::update(table, id, json!({ "name": name })),
            "device-1",
            "tenant-1",
            unix_millis_now(),
            0,
        );
        store.enqueue(&op).await.unwrap();
        op
    }

    fn key(id: &str) -> EntityKey {
        EntityKey::new("tasks", id)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_batches_preserve_enqueue_order() {
        let (transport, store, pipeline) = setup(2).await;
        for (id, name) in [("A", "a1"), ("B", "b1"), ("A", "a2"), ("C", "c1"), ("A", "a3")] {
            enqueue(&store, "tasks", id, name).await;
        }

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(report.processed, 5);

        assert_eq!(
            transport.calls(),
            vec![
                Call::Upload(vec![key("A"), key("B")]),
                Call::Upload(vec![key("A"), key("C")]),
                Call::Upload(vec![key("A")]),
            ]
        );
        let names: Vec<_> = transport
            .uploaded()
            .iter()
            .filter(|op| op.entity_id == "A")
            .map(|op| op.payload["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("a1"), json!("a2"), json!("a3")]);
        assert_eq!(store.queue_counts().await.unwrap().outstanding(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_holds_back_later_ops_for_entity() {
        let (transport, store, pipeline) = setup(1).await;
        transport.reject("tasks", "A");
        let first = enqueue(&store, "tasks", "A", "a1").await;
        enqueue(&store, "tasks", "B", "b1").await;
        let second = enqueue(&store, "tasks", "A", "a2").await;

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.retried, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(transport.count(|c| matches!(c, Call::Upload(_))), 2);

        let failed = store.get_operation(&first.id).await.unwrap().unwrap();
        assert_eq!(failed.status, OperationStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.last_error.as_deref(), Some("tasks/A is read-only"));

        let waiting = store.get_operation(&second.id).await.unwrap().unwrap();
        assert_eq!(waiting.status, OperationStatus::Pending);

        // Backoff keeps the whole entity out of the next pass
        let report = pipeline.run().await.unwrap();
        assert_eq!(report, UploadReport::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unacknowledged_ops_stay_pending() {
        let (transport, store, pipeline) = setup(10).await;
        transport.ignore("tasks", "A");
        let op = enqueue(&store, "tasks", "A", "a1").await;
        enqueue(&store, "tasks", "B", "b1").await;

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.deferred, 1);

        let stored = store.get_operation(&op.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Pending);
        assert_eq!(stored.attempts, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transport_error_aborts_pass() {
        let (transport, store, pipeline) = setup(10).await;
        transport.set_fail_uploads(true);
        let op = enqueue(&store, "tasks", "A", "a1").await;

        assert!(pipeline.run().await.is_err());
        let stored = store.get_operation(&op.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Pending);
        assert_eq!(stored.attempts, 0);
    }

    #[test]
    fn test_next_batch_skips_held_entities() {
        let ops: VecDeque<_> = ["A", "B", "A", "C"]
            .iter()
            .map(|id| {
                QueuedOperation::from_new(NewOperation::delete("tasks", *id), "d", "t", 0, 0)
            })
            .collect();
        let mut remaining = ops;
        let held = HashSet::from([key("A")]);
        let mut deferred = 0;

        let batch = next_batch(&mut remaining, &held, 5, &mut deferred);
        let ids: Vec<_> = batch.iter().map(|op| op.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert_eq!(deferred, 2);
        assert!(remaining.is_empty());
    }
}
