//! Pull transport port (driven/secondary port)
//!
//! One-shot request/response fetch of a single data source.
//!
//! ## Design Notes
//!
//! - Returns the typed [`PullError`] instead of `anyhow::Result`: the
//!   coordinator hands the failure to per-source callbacks and needs the
//!   HTTP status.
//! - A call never touches cycle bookkeeping; it only produces a value.

use serde_json::Value;

use crate::domain::errors::PullError;
use crate::domain::source::FetchDescriptor;

/// Port trait for request/response data fetches
#[async_trait::async_trait]
pub trait IPullTransport: Send + Sync {
    /// Fetches the JSON document described by `descriptor`
    ///
    /// # Errors
    /// - `PullError::Status` for a non-2xx response
    /// - `PullError::Transport` when no response was received
    /// - `PullError::Decode` when the body is not JSON
    async fn fetch(&self, descriptor: &FetchDescriptor) -> Result<Value, PullError>;
}
