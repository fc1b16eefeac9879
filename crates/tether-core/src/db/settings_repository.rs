//! Local settings: device identity and checkpoint mirror

use crate::error::{Error, Result};
use libsql::Connection;
use uuid::Uuid;

const DEVICE_ID_KEY: &str = "device_id";

/// Trait for local settings operations (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Stable device identifier, generated on first use
    async fn device_id(&self) -> Result<String>;

    /// Last checkpoint generation mirrored for `tenant_id` (0 when unknown)
    async fn checkpoint_generation(&self, tenant_id: &str) -> Result<i64>;

    /// Mirror a checkpoint generation; lower values never overwrite higher ones
    async fn save_checkpoint_generation(&self, tenant_id: &str, generation: i64) -> Result<i64>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

fn checkpoint_key(tenant_id: &str) -> String {
    format!("checkpoint:{tenant_id}")
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn device_id(&self) -> Result<String> {
        if let Some(existing) = self.get_setting(DEVICE_ID_KEY).await? {
            return Ok(existing);
        }

        let device_id = Uuid::now_v7().to_string();
        self.set_setting(DEVICE_ID_KEY, &device_id).await?;
        tracing::info!("Generated device id {device_id}");
        Ok(device_id)
    }

    async fn checkpoint_generation(&self, tenant_id: &str) -> Result<i64> {
        match self.get_setting(&checkpoint_key(tenant_id)).await? {
            Some(value) => value.parse().map_err(|_| {
                Error::Database(format!("invalid checkpoint value '{value}' for {tenant_id}"))
            }),
            None => Ok(0),
        }
    }

    async fn save_checkpoint_generation(&self, tenant_id: &str, generation: i64) -> Result<i64> {
        let current = self.checkpoint_generation(tenant_id).await?;
        let next = current.max(generation);
        if next != current {
            self.set_setting(&checkpoint_key(tenant_id), &next.to_string())
                .await?;
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_device_id_is_stable() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        let first = repo.device_id().await.unwrap();
        let second = repo.device_id().await.unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_checkpoint_mirror_never_decreases() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        assert_eq!(repo.checkpoint_generation("tenant-1").await.unwrap(), 0);
        assert_eq!(
            repo.save_checkpoint_generation("tenant-1", 6).await.unwrap(),
            6
        );
        assert_eq!(
            repo.save_checkpoint_generation("tenant-1", 2).await.unwrap(),
            6
        );
        assert_eq!(repo.checkpoint_generation("tenant-1").await.unwrap(), 6);
        assert_eq!(repo.checkpoint_generation("tenant-2").await.unwrap(), 0);
    }
}
