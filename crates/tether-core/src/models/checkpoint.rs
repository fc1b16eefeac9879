//! Sync checkpoint model

use serde::{Deserialize, Serialize};

/// Per-device, per-tenant cursor into the server's change stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub device_id: String,
    pub tenant_id: String,
    /// Highest generation applied on this device
    pub last_sync_generation: i64,
    /// Advisory count of local operations still outstanding
    pub pending_changes_count: i64,
}

impl SyncCheckpoint {
    /// Zero state used before the first successful sync
    pub fn initial(device_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            tenant_id: tenant_id.into(),
            last_sync_generation: 0,
            pending_changes_count: 0,
        }
    }

    /// Move the watermark forward; lower generations are ignored.
    ///
    /// Returns `true` when the watermark changed.
    pub fn advance_to(&mut self, generation: i64) -> bool {
        if generation > self.last_sync_generation {
            self.last_sync_generation = generation;
            true
        } else {
            false
        }
    }
}
