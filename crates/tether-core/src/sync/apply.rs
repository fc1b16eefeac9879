//! Materializes downloaded changes into the local store.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{ChangeEvent, ChangeRecord, OperationType};
use crate::services::LocalStore;

/// Default capacity of the change event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Changes written (or deleted) locally
    pub applied: usize,
    /// Changes older than the stored row or its delete tombstone
    pub stale: usize,
    /// Changes that could not be applied
    pub failed: usize,
    /// Highest generation in the page, applied or not
    pub max_generation: Option<i64>,
}

pub struct ApplyLayer {
    store: LocalStore,
    events: broadcast::Sender<ChangeEvent>,
}

impl ApplyLayer {
    pub fn new(store: LocalStore, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { store, events }
    }

    /// Receive a [`ChangeEvent`] for every change applied from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Apply `changes` in order. A failing change is logged and skipped.
    pub async fn apply(&self, changes: &[ChangeRecord]) -> ApplyReport {
        let mut report = ApplyReport::default();

        for change in changes {
            report.max_generation = report.max_generation.max(Some(change.sync_generation));

            match self.apply_one(change).await {
                Ok(true) => {
                    report.applied += 1;
                    // No subscribers is fine
                    let _ = self.events.send(ChangeEvent::from(change));
                }
                Ok(false) => {
                    debug!(
                        "Skipped stale change for {} at generation {}",
                        change.entity_key(),
                        change.sync_generation
                    );
                    report.stale += 1;
                }
                Err(error) => {
                    warn!(
                        "Failed to apply {} on {} at generation {}: {error}",
                        change.operation,
                        change.entity_key(),
                        change.sync_generation
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn apply_one(&self, change: &ChangeRecord) -> Result<bool> {
        match change.operation {
            OperationType::Create | OperationType::Update => {
                let data = change.new_data.as_ref().ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "{} on {} carries no data",
                        change.operation,
                        change.entity_key()
                    ))
                })?;
                self.store
                    .upsert_record(
                        &change.table_name,
                        &change.record_id,
                        data,
                        change.sync_generation,
                    )
                    .await
            }
            OperationType::Delete => {
                self.store
                    .delete_record(
                        &change.table_name,
                        &change.record_id,
                        change.sync_generation,
                    )
                    .await
            }
        }
    }
}
