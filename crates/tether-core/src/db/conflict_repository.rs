//! Conflict log repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::{ResolutionStrategy, StoredConflict, SyncConflict};
use libsql::{params, Connection};

/// Trait for conflict log operations (async)
#[allow(async_fn_in_trait)]
pub trait ConflictRepository {
    /// Record a detected conflict; redelivery refreshes the values but keeps
    /// any recorded resolution.
    async fn record(&self, conflict: &SyncConflict, now_ms: i64) -> Result<()>;

    /// Get a conflict by ID
    async fn get(&self, conflict_id: &str) -> Result<Option<StoredConflict>>;

    /// List conflicts newest first
    async fn list(&self, limit: usize, open_only: bool) -> Result<Vec<StoredConflict>>;

    /// Mark a conflict resolved. Returns whether it was open.
    async fn mark_resolved(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        now_ms: i64,
    ) -> Result<bool>;
}

/// libSQL implementation of `ConflictRepository`
pub struct LibSqlConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &libsql::Row) -> Result<StoredConflict> {
        let local_value: String = row.get(3)?;
        let remote_value: String = row.get(4)?;
        let strategy: String = row.get(5)?;
        let resolved_with = row
            .get::<Option<String>>(8)?
            .map(|value| value.parse::<ResolutionStrategy>())
            .transpose()?;

        Ok(StoredConflict {
            conflict: SyncConflict {
                conflict_id: row.get(0)?,
                entity_table: row.get(1)?,
                entity_id: row.get(2)?,
                local_value: serde_json::from_str(&local_value)?,
                remote_value: serde_json::from_str(&remote_value)?,
                resolution_strategy: strategy.parse()?,
            },
            detected_at: row.get(6)?,
            resolved_at: row.get::<Option<i64>>(7)?,
            resolved_with,
        })
    }
}

const CONFLICT_COLUMNS: &str = "conflict_id, entity_table, entity_id, local_value, remote_value, \
     strategy, detected_at, resolved_at, resolved_with";

impl ConflictRepository for LibSqlConflictRepository<'_> {
    async fn record(&self, conflict: &SyncConflict, now_ms: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts (conflict_id, entity_table, entity_id, local_value,
                    remote_value, strategy, detected_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(conflict_id) DO UPDATE SET
                    local_value = excluded.local_value,
                    remote_value = excluded.remote_value,
                    strategy = excluded.strategy",
                params![
                    conflict.conflict_id.as_str(),
                    conflict.entity_table.as_str(),
                    conflict.entity_id.as_str(),
                    serde_json::to_string(&conflict.local_value)?,
                    serde_json::to_string(&conflict.remote_value)?,
                    conflict.resolution_strategy.as_str(),
                    now_ms
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, conflict_id: &str) -> Result<Option<StoredConflict>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {CONFLICT_COLUMNS} FROM sync_conflicts WHERE conflict_id = ?"),
                [conflict_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_conflict(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, limit: usize, open_only: bool) -> Result<Vec<StoredConflict>> {
        let filter = if open_only {
            "WHERE resolved_at IS NULL"
        } else {
            ""
        };
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts {filter}
                     ORDER BY detected_at DESC, conflict_id ASC
                     LIMIT ?"
                ),
                [limit as i64],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(Self::parse_conflict(&row)?);
        }
        Ok(conflicts)
    }

    async fn mark_resolved(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        now_ms: i64,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_conflicts SET resolved_at = ?, resolved_with = ?
                 WHERE conflict_id = ? AND resolved_at IS NULL",
                params![now_ms, strategy.as_str(), conflict_id],
            )
            .await?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn conflict(id: &str) -> SyncConflict {
        SyncConflict {
            conflict_id: id.to_string(),
            entity_table: "tasks".into(),
            entity_id: "A".into(),
            local_value: json!({"name": "Mine"}),
            remote_value: json!({"name": "Theirs"}),
            resolution_strategy: ResolutionStrategy::Manual,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_and_get() {
        let db = setup().await;
        let repo = LibSqlConflictRepository::new(db.connection());

        repo.record(&conflict("c1"), 100).await.unwrap();
        let stored = repo.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.conflict, conflict("c1"));
        assert_eq!(stored.detected_at, 100);
        assert!(stored.is_open());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_resolved_once() {
        let db = setup().await;
        let repo = LibSqlConflictRepository::new(db.connection());

        repo.record(&conflict("c1"), 100).await.unwrap();
        assert!(repo
            .mark_resolved("c1", ResolutionStrategy::ClientWins, 200)
            .await
            .unwrap());
        assert!(!repo
            .mark_resolved("c1", ResolutionStrategy::ServerWins, 300)
            .await
            .unwrap());

        let stored = repo.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.resolved_at, Some(200));
        assert_eq!(stored.resolved_with, Some(ResolutionStrategy::ClientWins));

        // Redelivery does not reopen
        repo.record(&conflict("c1"), 400).await.unwrap();
        assert!(!repo.get("c1").await.unwrap().unwrap().is_open());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_open_only() {
        let db = setup().await;
        let repo = LibSqlConflictRepository::new(db.connection());

        repo.record(&conflict("c1"), 100).await.unwrap();
        repo.record(&conflict("c2"), 200).await.unwrap();
        repo.mark_resolved("c1", ResolutionStrategy::ServerWins, 300)
            .await
            .unwrap();

        let all = repo.list(10, false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].conflict.conflict_id, "c2");

        let open = repo.list(10, true).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].conflict.conflict_id, "c2");
    }
}
