//! livesync Cache - Settings persistence
//!
//! Driven (secondary) adapters for the `ISettingsStore` port of
//! `livesync-core`:
//!
//! - [`SqliteSettingsStore`] - named text records in a SQLite table
//! - [`MemorySettingsStore`] - in-process map with failure injection, for
//!   tests and ephemeral embeddings
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use livesync_cache::{DatabasePool, SqliteSettingsStore};
//!
//! # async fn open() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/livesync/settings.db")).await?;
//! let store = SqliteSettingsStore::new(pool.pool().clone());
//! // Use store as ISettingsStore...
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod pool;
pub mod settings_store;

pub use memory::MemorySettingsStore;
pub use pool::DatabasePool;
pub use settings_store::SqliteSettingsStore;

/// Failures of the settings storage adapters
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The database could not be opened
    #[error("Cannot open settings database: {0}")]
    ConnectionFailed(String),

    /// A read or write statement failed
    #[error("Settings query failed: {0}")]
    QueryFailed(String),

    /// The settings schema could not be applied
    #[error("Settings schema failed: {0}")]
    MigrationFailed(String),

    /// Failure injected by [`MemorySettingsStore`]
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        Self::QueryFailed(err.to_string())
    }
}
