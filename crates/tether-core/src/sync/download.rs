//! Incoming half of a sync cycle: fetch server changes and conflicts.

use std::sync::Arc;

use tracing::{debug, info};

use super::transport::{DownloadRequest, SyncTransport};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{ChangeRecord, SyncConflict};

/// One page of server changes, sorted by generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadResult {
    pub changes: Vec<ChangeRecord>,
    pub conflicts: Vec<SyncConflict>,
    /// The page was full; more changes are probably waiting
    pub has_more: bool,
}

impl DownloadResult {
    /// Highest generation in this page
    pub fn max_generation(&self) -> Option<i64> {
        self.changes.iter().map(|c| c.sync_generation).max()
    }
}

pub struct DownloadStage {
    transport: Arc<dyn SyncTransport>,
    config: Arc<EngineConfig>,
}

impl DownloadStage {
    pub fn new(transport: Arc<dyn SyncTransport>, config: Arc<EngineConfig>) -> Self {
        Self { transport, config }
    }

    /// Request changes after `last_generation`
    pub async fn fetch(&self, last_generation: i64) -> Result<DownloadResult> {
        let limit = self.config.download_limit;
        let response = self
            .transport
            .download(&DownloadRequest {
                device_id: self.config.device_id.clone(),
                tenant_id: self.config.tenant_id.clone(),
                last_generation,
                limit,
            })
            .await?;

        let mut changes = response.changes;
        changes.sort_by_key(|change| change.sync_generation);
        let conflicts: Vec<SyncConflict> = response
            .conflicts
            .into_iter()
            .map(|conflict| conflict.into_conflict(self.config.conflict_resolution))
            .collect();
        let has_more = changes.len() >= limit;

        if changes.is_empty() && conflicts.is_empty() {
            debug!("No remote changes after generation {last_generation}");
        } else {
            info!(
                "Downloaded {} changes and {} conflicts after generation {last_generation}",
                changes.len(),
                conflicts.len()
            );
        }

        Ok(DownloadResult {
            changes,
            conflicts,
            has_more,
        })
    }
}
