//! livesync Transport - Pull and push adapters
//!
//! Driven (secondary) adapters for the transport ports of `livesync-core`:
//! - [`HttpPullTransport`] - `IPullTransport` over HTTP GET with JSON bodies
//! - [`WebSocketPushChannel`] - `IPushChannel` over a WebSocket carrying
//!   JSON text frames
//!
//! ## Modules
//!
//! - [`http`] - reqwest-based pull transport
//! - [`websocket`] - tokio-tungstenite-based push channel

pub mod http;
pub mod websocket;

pub use http::HttpPullTransport;
pub use websocket::WebSocketPushChannel;

use thiserror::Error;

/// Errors raised while building or driving a transport adapter
#[derive(Debug, Error)]
pub enum TransportError {
    /// A configured URL could not be parsed or has the wrong scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),

    /// The WebSocket handshake failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The WebSocket handshake did not finish in time
    #[error("Connection timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// No connection is open
    #[error("Not connected")]
    NotConnected,

    /// A frame could not be handed to the writer
    #[error("Send failed: {0}")]
    Send(String),
}

impl From<url::ParseError> for TransportError {
    fn from(e: url::ParseError) -> Self {
        TransportError::InvalidUrl(e.to_string())
    }
}
