//! Data models for Tether

mod change;
mod checkpoint;
mod operation;
mod record;
mod sync_conflict;

pub use change::{ChangeEvent, ChangeRecord};
pub use checkpoint::SyncCheckpoint;
pub use operation::{
    validate_table_name, EntityKey, NewOperation, OperationId, OperationStatus, OperationType,
    QueuedOperation,
};
pub use record::MaterializedRecord;
pub use sync_conflict::{ResolutionStrategy, StoredConflict, SyncConflict};
