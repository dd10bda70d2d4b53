//! SQLite pool for the settings database
//!
//! Opening a pool creates the parent directory when missing, switches the
//! file to WAL mode and applies the settings schema.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Pool of SQLite connections for the settings database
///
/// File-based pools use up to 2 connections and a 5-second busy timeout;
/// in-memory pools use exactly one, since each SQLite in-memory connection
/// is its own database.
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database at `db_path`
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the directory or connection
    /// cannot be created, or `CacheError::MigrationFailed` if the schema
    /// migration fails.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir).map_err(|err| {
                CacheError::ConnectionFailed(format!("cannot create {}: {err}", dir.display()))
            })?;
        }

        let connect = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(connect)
            .await
            .map_err(|err| {
                CacheError::ConnectionFailed(format!("cannot open {}: {err}", db_path.display()))
            })?;

        Self::apply_schema(&pool).await?;

        tracing::info!(path = %db_path.display(), "Settings database opened");

        Ok(Self { pool })
    }

    /// Opens a private in-memory database
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` or `CacheError::MigrationFailed`
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|err| CacheError::ConnectionFailed(format!("in-memory database: {err}")))?;

        Self::apply_schema(&pool).await?;

        tracing::debug!("In-memory settings database initialized");

        Ok(Self { pool })
    }

    /// The SQLx pool, for building stores on top of it
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn apply_schema(pool: &SqlitePool) -> Result<(), CacheError> {
        sqlx::raw_sql(include_str!("migrations/20261018_settings.sql"))
            .execute(pool)
            .await
            .map_err(|err| CacheError::MigrationFailed(format!("settings table: {err}")))?;

        tracing::debug!("Settings migrations completed");
        Ok(())
    }
}
