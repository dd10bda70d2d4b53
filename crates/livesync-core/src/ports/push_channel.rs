//! Push channel port (driven/secondary port)
//!
//! A persistent, bidirectional connection over which the server sends
//! unsolicited data and the client sends refresh requests and terminal
//! input.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because connection failures are adapter-specific.
//! - The `IPushObserver` trait uses synchronous callbacks: adapters call it
//!   from their reader task and the observer must not block.
//! - One `connect` call corresponds to one connection attempt. Reconnecting
//!   is the caller's job.

use std::sync::Arc;

use crate::domain::messages::OutboundMessage;

// ============================================================================
// IPushObserver trait
// ============================================================================

/// Observer for push-channel lifecycle events and frames
///
/// ## Threading
///
/// Callbacks may be invoked from any tokio worker thread.
pub trait IPushObserver: Send + Sync {
    /// The channel opened
    fn on_open(&self);

    /// The channel closed, by either side
    fn on_close(&self, reason: Option<String>);

    /// A transport-level error occurred; a close may or may not follow
    fn on_error(&self, message: String);

    /// A text frame arrived
    fn on_frame(&self, text: String);
}

// ============================================================================
// IPushChannel trait
// ============================================================================

/// Port trait for the push channel
///
/// ## Implementation Notes
///
/// - `connect` resolves once the attempt has either opened the channel (and
///   `on_open` was called) or failed. A failed attempt returns `Err` and
///   need not call `on_close`.
/// - After a successful open, exactly one `on_close` is delivered when the
///   connection ends, unless `disconnect` was called first.
/// - `send` fails if the channel is not open.
#[async_trait::async_trait]
pub trait IPushChannel: Send + Sync {
    /// Opens the channel and starts delivering events to `observer`
    async fn connect(&self, observer: Arc<dyn IPushObserver>) -> anyhow::Result<()>;

    /// Sends one message as a text frame
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()>;

    /// Closes the channel without notifying the observer
    async fn disconnect(&self) -> anyhow::Result<()>;
}
