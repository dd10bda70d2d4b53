//! Domain error types
//!
//! This module defines the error types shared by every livesync crate:
//! validation failures for domain newtypes, per-source pull failures,
//! and malformed push-channel frames.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid data source key
    #[error("Invalid source key: {0}")]
    InvalidSourceKey(String),

    /// Invalid push session identifier
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Two sources were registered under the same key
    #[error("Duplicate source key: {0}")]
    DuplicateSource(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Failure of a single pull request for one data source
///
/// Pull failures are per-source: they are reported to that source's error
/// callback and collected in the cycle report, but they never fail the
/// refresh cycle as a whole.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PullError {
    /// The server answered with a non-2xx status code
    #[error("HTTP error {status}")]
    Status {
        /// The HTTP status code returned by the server
        status: u16,
    },

    /// The request never produced a response (DNS, connect, timeout, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body was not valid JSON
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// No source is registered under the requested key
    #[error("No endpoint configured for key: {0}")]
    UnknownSource(String),
}

impl PullError {
    /// Returns the HTTP status code, if this failure carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            PullError::Status { status } => Some(*status),
            _ => None,
        }
    }

    /// Returns true when retrying on the next tick may succeed
    ///
    /// Network failures, throttling (429) and server errors (5xx) are
    /// considered transient; client errors and decode failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            PullError::Transport(_) => true,
            PullError::Status { status } => *status == 429 || *status >= 500,
            PullError::Decode(_) | PullError::UnknownSource(_) => false,
        }
    }
}

/// A push-channel frame that could not be decoded
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame was not valid JSON
    #[error("Malformed frame: {0}")]
    MalformedJson(String),

    /// The frame was JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// Neither a `type` nor an `event` tag was present
    #[error("Frame has no type or event tag")]
    MissingTag,

    /// A known control message had an unexpected payload shape
    #[error("Invalid payload for '{event}': {reason}")]
    InvalidPayload {
        /// The event tag of the offending frame
        event: String,
        /// Why the payload was rejected
        reason: String,
    },
}
