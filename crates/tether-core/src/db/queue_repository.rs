//! Outgoing operation queue (the local write-ahead log)

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::collections::HashSet;

use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::models::{OperationId, OperationStatus, QueuedOperation};
use crate::util::duration_millis;
use libsql::{params, Connection};

/// Per-status queue sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub failed: u64,
    pub processed: u64,
    pub dead: u64,
}

impl QueueCounts {
    /// Operations that still have to reach the server
    pub const fn outstanding(&self) -> u64 {
        self.pending + self.failed
    }
}

/// Outcome of recording upload failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureReport {
    /// Rescheduled with backoff
    pub retried: usize,
    /// Moved to the dead-letter state
    pub dead: usize,
}

/// Trait for queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Append an operation to the queue
    async fn enqueue(&self, op: &QueuedOperation) -> Result<()>;

    /// Get an operation by ID
    async fn get(&self, id: &OperationId) -> Result<Option<QueuedOperation>>;

    /// Pending and failed operations in enqueue order
    async fn outstanding(&self) -> Result<Vec<QueuedOperation>>;

    /// Operations ready to upload at `now_ms`, in enqueue order
    ///
    /// An entity whose earliest outstanding operation is not yet due blocks
    /// all of its later operations, so per-entity order survives debounce
    /// and retry backoff.
    async fn eligible(&self, now_ms: i64) -> Result<Vec<QueuedOperation>>;

    /// Mark operations as acknowledged by the server
    async fn mark_processed(&self, ids: &[OperationId], now_ms: i64) -> Result<usize>;

    /// Record a server rejection and schedule a retry (or dead-letter)
    async fn mark_failed(
        &self,
        ids: &[OperationId],
        error: Option<&str>,
        retry: &RetryPolicy,
        now_ms: i64,
    ) -> Result<FailureReport>;

    /// Queue sizes per status
    async fn counts(&self) -> Result<QueueCounts>;

    /// Delete processed operations last touched before `older_than_ms`
    async fn prune_processed(&self, older_than_ms: i64) -> Result<u64>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

const OPERATION_COLUMNS: &str = "id, operation_type, entity_table, entity_id, payload, device_id, \
     tenant_id, created_at, scheduled_at, status, attempts, last_error";

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an operation from a database row
    fn parse_operation(row: &libsql::Row) -> Result<QueuedOperation> {
        let id: String = row.get(0)?;
        let operation_type: String = row.get(1)?;
        let payload: String = row.get(4)?;
        let status: String = row.get(9)?;
        let attempts: i64 = row.get(10)?;

        Ok(QueuedOperation {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid operation id '{id}'")))?,
            operation_type: operation_type.parse()?,
            entity_table: row.get(2)?,
            entity_id: row.get(3)?,
            payload: serde_json::from_str(&payload)?,
            device_id: row.get(5)?,
            tenant_id: row.get(6)?,
            created_at: row.get(7)?,
            scheduled_at: row.get(8)?,
            status: status.parse()?,
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            last_error: row.get::<Option<String>>(11)?,
        })
    }

    async fn count_status(&self, status: OperationStatus) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM outbox WHERE status = ?",
                [status.as_str()],
            )
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn enqueue(&self, op: &QueuedOperation) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO outbox (id, operation_type, entity_table, entity_id, payload, device_id,
                    tenant_id, created_at, scheduled_at, status, attempts, last_error, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    op.id.as_str(),
                    op.operation_type.as_str(),
                    op.entity_table.as_str(),
                    op.entity_id.as_str(),
                    serde_json::to_string(&op.payload)?,
                    op.device_id.as_str(),
                    op.tenant_id.as_str(),
                    op.created_at,
                    op.scheduled_at,
                    op.status.as_str(),
                    i64::from(op.attempts),
                    op.last_error.clone(),
                    op.created_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &OperationId) -> Result<Option<QueuedOperation>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {OPERATION_COLUMNS} FROM outbox WHERE id = ?"),
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_operation(&row)?)),
            None => Ok(None),
        }
    }

    async fn outstanding(&self) -> Result<Vec<QueuedOperation>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {OPERATION_COLUMNS} FROM outbox
                     WHERE status IN ('pending', 'failed')
                     ORDER BY seq ASC"
                ),
                (),
            )
            .await?;

        let mut ops = Vec::new();
        while let Some(row) = rows.next().await? {
            ops.push(Self::parse_operation(&row)?);
        }
        Ok(ops)
    }

    async fn eligible(&self, now_ms: i64) -> Result<Vec<QueuedOperation>> {
        let mut blocked = HashSet::new();
        let mut eligible = Vec::new();

        for op in self.outstanding().await? {
            let key = op.entity_key();
            if blocked.contains(&key) {
                continue;
            }
            if op.is_eligible_at(now_ms) {
                eligible.push(op);
            } else {
                blocked.insert(key);
            }
        }

        Ok(eligible)
    }

    async fn mark_processed(&self, ids: &[OperationId], now_ms: i64) -> Result<usize> {
        let mut updated = 0;
        for id in ids {
            let rows = self
                .conn
                .execute(
                    "UPDATE outbox SET status = 'processed', last_error = NULL, updated_at = ?
                     WHERE id = ? AND status IN ('pending', 'failed')",
                    params![now_ms, id.as_str()],
                )
                .await?;
            if rows > 0 {
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn mark_failed(
        &self,
        ids: &[OperationId],
        error: Option<&str>,
        retry: &RetryPolicy,
        now_ms: i64,
    ) -> Result<FailureReport> {
        let mut report = FailureReport::default();

        for id in ids {
            let Some(op) = self.get(id).await? else {
                tracing::warn!("Server reported unknown operation {id} as failed");
                continue;
            };
            if !op.status.is_outstanding() {
                continue;
            }

            let attempts = op.attempts.saturating_add(1);
            let (status, scheduled_at) = if retry.is_exhausted(attempts) {
                report.dead += 1;
                (OperationStatus::Dead, op.scheduled_at)
            } else {
                report.retried += 1;
                let delay = duration_millis(retry.delay_for(attempts));
                (OperationStatus::Failed, now_ms.saturating_add(delay))
            };

            self.conn
                .execute(
                    "UPDATE outbox
                     SET status = ?, attempts = ?, scheduled_at = ?, last_error = ?, updated_at = ?
                     WHERE id = ?",
                    params![
                        status.as_str(),
                        i64::from(attempts),
                        scheduled_at,
                        error.map(str::to_string),
                        now_ms,
                        id.as_str()
                    ],
                )
                .await?;

            if status == OperationStatus::Dead {
                tracing::warn!(
                    "Operation {id} on {} dead-lettered after {attempts} failed attempts",
                    op.entity_key()
                );
            }
        }

        Ok(report)
    }

    async fn counts(&self) -> Result<QueueCounts> {
        Ok(QueueCounts {
            pending: self.count_status(OperationStatus::Pending).await?,
            failed: self.count_status(OperationStatus::Failed).await?,
            processed: self.count_status(OperationStatus::Processed).await?,
            dead: self.count_status(OperationStatus::Dead).await?,
        })
    }

    async fn prune_processed(&self, older_than_ms: i64) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM outbox WHERE status = 'processed' AND updated_at < ?",
                [older_than_ms],
            )
            .await?;
        Ok(removed)
    }
}
