//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the identifiers used
//! by the synchronization layer. Each newtype ensures data validity at
//! construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Name of the sentinel timer used when no per-source timers exist
pub const GENERAL_TIMER: &str = "general";

// ============================================================================
// SourceKey
// ============================================================================

/// Unique key of one independently refreshable data source
///
/// A SourceKey is:
/// - Non-empty
/// - Free of leading/trailing whitespace
/// - Never the reserved word `general` (used by the general timer)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceKey(String);

impl SourceKey {
    /// Create a new SourceKey
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSourceKey` if the key is empty, padded
    /// with whitespace, or equal to the reserved `general` key
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.is_empty() {
            return Err(DomainError::InvalidSourceKey(
                "Source key cannot be empty".to_string(),
            ));
        }
        if key.trim() != key {
            return Err(DomainError::InvalidSourceKey(format!(
                "Source key has surrounding whitespace: {key:?}"
            )));
        }
        if key == GENERAL_TIMER {
            return Err(DomainError::InvalidSourceKey(format!(
                "'{GENERAL_TIMER}' is reserved for the general timer"
            )));
        }
        Ok(Self(key))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SourceKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SourceKey> for String {
    fn from(key: SourceKey) -> Self {
        key.0
    }
}

// ============================================================================
// TimerKey
// ============================================================================

/// Identity of one entry in the timer table
///
/// Either a per-source timer or the single general timer that drives the
/// global refresh callback when no sources are registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    /// Timer refreshing exactly one data source
    Source(SourceKey),
    /// Timer driving the global refresh callback
    General,
}

impl TimerKey {
    /// Returns the source key for per-source timers
    pub fn source(&self) -> Option<&SourceKey> {
        match self {
            TimerKey::Source(key) => Some(key),
            TimerKey::General => None,
        }
    }

    /// Returns true for the general timer
    pub fn is_general(&self) -> bool {
        matches!(self, TimerKey::General)
    }
}

impl Display for TimerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TimerKey::Source(key) => write!(f, "{key}"),
            TimerKey::General => write!(f, "{GENERAL_TIMER}"),
        }
    }
}

impl From<SourceKey> for TimerKey {
    fn from(key: SourceKey) -> Self {
        TimerKey::Source(key)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Opaque identifier of a server-side terminal/push session
///
/// The value is forwarded verbatim in `authenticate`, `terminal_input`
/// and `disconnect_session` messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a new SessionId
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSessionId` if the id is blank
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidSessionId(
                "Session id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}
