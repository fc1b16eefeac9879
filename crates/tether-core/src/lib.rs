//! tether-core - Offline-first sync engine
//!
//! Local mutations are queued in a libSQL store and uploaded in batches;
//! server changes are downloaded by generation, materialized locally and
//! announced to subscribers. Conflicts detected by the server are recorded
//! and resolved either automatically or by the application.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{EngineConfig, RetryPolicy};
pub use error::{Error, Result};
pub use models::{
    ChangeEvent, ChangeRecord, NewOperation, OperationId, OperationType, QueuedOperation,
    ResolutionStrategy, SyncCheckpoint, SyncConflict,
};
pub use services::LocalStore;
pub use state::SyncState;
pub use sync::{HttpTransport, SyncEngine, SyncOutcome, SyncTransport};
