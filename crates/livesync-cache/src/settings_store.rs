//! SQLite implementation of ISettingsStore
//!
//! Each record is one row of `settings(name, value, updated_at)`; writes
//! upsert on `name`. `updated_at` is RFC 3339 text.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use livesync_core::ports::ISettingsStore;

use crate::CacheError;

/// SQLite-backed settings store
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Creates a store over the given pool
    ///
    /// The pool must come from [`crate::DatabasePool`] so the table exists.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// When the record was last written, as stored
    ///
    /// # Errors
    ///
    /// Returns `CacheError::QueryFailed` if the query fails
    pub async fn updated_at(&self, name: &str) -> Result<Option<String>, CacheError> {
        let row = sqlx::query("SELECT updated_at FROM settings WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("updated_at")))
    }

    async fn read_record(&self, name: &str) -> Result<Option<String>, CacheError> {
        let row = sqlx::query("SELECT value FROM settings WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn write_record(&self, name: &str, value: &str) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT INTO settings (name, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, \
             updated_at = excluded.updated_at",
        )
        .bind(name)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::trace!(name, "Saved settings record");
        Ok(())
    }
}

#[async_trait]
impl ISettingsStore for SqliteSettingsStore {
    async fn read(&self, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self.read_record(name).await?)
    }

    async fn write(&self, name: &str, value: &str) -> anyhow::Result<()> {
        Ok(self.write_record(name, value).await?)
    }
}
