//! Settings storage port (driven/secondary port)
//!
//! A key/value store of named text records. The sync layer keeps exactly
//! one record in it: the serialized refresh settings.

/// Port trait for persisted user preferences
///
/// ## Implementation Notes
///
/// - `read` returns `Ok(None)` for an absent record; `Err` is reserved for
///   storage failures.
/// - `write` replaces the whole record.
#[async_trait::async_trait]
pub trait ISettingsStore: Send + Sync {
    /// Reads the record called `name`
    async fn read(&self, name: &str) -> anyhow::Result<Option<String>>;

    /// Writes (creates or replaces) the record called `name`
    async fn write(&self, name: &str, value: &str) -> anyhow::Result<()>;
}
