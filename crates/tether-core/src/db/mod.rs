//! Database layer for Tether

mod conflict_repository;
mod connection;
mod migrations;
mod queue_repository;
mod record_repository;
mod settings_repository;

pub use conflict_repository::{ConflictRepository, LibSqlConflictRepository};
pub use connection::Database;
pub use queue_repository::{FailureReport, LibSqlQueueRepository, QueueCounts, QueueRepository};
pub use record_repository::{LibSqlRecordRepository, RecordRepository};
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};
