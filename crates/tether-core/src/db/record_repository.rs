//! Materialized record repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::Result;
use crate::models::MaterializedRecord;
use libsql::{params, Connection};

/// Trait for the local key-value materialized store (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Insert or replace a record. A row already stored at a newer
    /// generation, or deleted at the same or a newer one, is left untouched.
    /// Returns whether the row was written.
    async fn upsert(
        &self,
        table: &str,
        id: &str,
        data: &serde_json::Value,
        generation: i64,
    ) -> Result<bool>;

    /// Delete a record as of `generation` and keep a tombstone for it.
    /// Returns `false` when the stored row or tombstone is newer.
    async fn delete(&self, table: &str, id: &str, generation: i64) -> Result<bool>;

    /// Get a record by key
    async fn get(&self, table: &str, id: &str) -> Result<Option<MaterializedRecord>>;

    /// List records of one table, ordered by id
    async fn list(&self, table: &str, limit: usize, offset: usize)
        -> Result<Vec<MaterializedRecord>>;

    /// Distinct tables with their record counts
    async fn tables(&self) -> Result<Vec<(String, usize)>>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &libsql::Row) -> Result<MaterializedRecord> {
        let data: String = row.get(2)?;
        Ok(MaterializedRecord {
            table_name: row.get(0)?,
            record_id: row.get(1)?,
            data: serde_json::from_str(&data)?,
            sync_generation: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn upsert(
        &self,
        table: &str,
        id: &str,
        data: &serde_json::Value,
        generation: i64,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let rows = self
            .conn
            .execute(
                "INSERT INTO records (table_name, record_id, data, sync_generation, updated_at)
                 SELECT ?1, ?2, ?3, ?4, ?5
                 WHERE NOT EXISTS (
                    SELECT 1 FROM record_tombstones
                    WHERE table_name = ?1 AND record_id = ?2 AND sync_generation >= ?4
                 )
                 ON CONFLICT(table_name, record_id) DO UPDATE SET
                    data = excluded.data,
                    sync_generation = excluded.sync_generation,
                    updated_at = excluded.updated_at
                 WHERE excluded.sync_generation >= records.sync_generation",
                params![table, id, serde_json::to_string(data)?, generation, now],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn delete(&self, table: &str, id: &str, generation: i64) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM records
                    WHERE table_name = ?1 AND record_id = ?2 AND sync_generation > ?3
                 ) OR EXISTS(
                    SELECT 1 FROM record_tombstones
                    WHERE table_name = ?1 AND record_id = ?2 AND sync_generation > ?3
                 )",
                params![table, id, generation],
            )
            .await?;
        let newer = match rows.next().await? {
            Some(row) => row.get::<i64>(0)? != 0,
            None => false,
        };
        drop(rows);
        if newer {
            return Ok(false);
        }

        self.conn.execute("BEGIN", ()).await?;
        let statements = [
            "DELETE FROM records
             WHERE table_name = ?1 AND record_id = ?2 AND sync_generation <= ?3",
            "INSERT INTO record_tombstones (table_name, record_id, sync_generation)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(table_name, record_id) DO UPDATE SET
                sync_generation = MAX(record_tombstones.sync_generation, excluded.sync_generation)",
        ];
        for sql in statements {
            if let Err(e) = self.conn.execute(sql, params![table, id, generation]).await {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        }
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(true)
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<MaterializedRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT table_name, record_id, data, sync_generation, updated_at
                 FROM records WHERE table_name = ? AND record_id = ?",
                params![table, id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        table: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MaterializedRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT table_name, record_id, data, sync_generation, updated_at
                 FROM records
                 WHERE table_name = ?
                 ORDER BY record_id ASC
                 LIMIT ? OFFSET ?",
                params![table, limit as i64, offset as i64],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    async fn tables(&self) -> Result<Vec<(String, usize)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT table_name, COUNT(*) FROM records GROUP BY table_name ORDER BY table_name",
                (),
            )
            .await?;

        let mut tables = Vec::new();
        while let Some(row) = rows.next().await? {
            let count: i64 = row.get(1)?;
            tables.push((row.get::<String>(0)?, usize::try_from(count).unwrap_or_default()));
        }
        Ok(tables)
    }
}
