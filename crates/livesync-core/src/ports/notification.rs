//! User interface port (driven/secondary port)
//!
//! This module defines the narrow surface through which the sync layer
//! talks to whatever renders the data: toasts, loading affordances, the
//! real-time indicator and the freshness text.
//!
//! ## Design Notes
//!
//! - Calls are synchronous and fire-and-forget. Rendering never blocks a
//!   refresh cycle and cannot fail it.
//! - Selectors are opaque strings chosen by the embedding application.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Notification struct and NotificationLevel enum
// ============================================================================

/// Severity of a toast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Neutral information
    #[default]
    Info,
    /// A requested operation succeeded
    Success,
    /// Something failed
    Error,
}

impl std::fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "success",
            NotificationLevel::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A transient message shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Text of the toast
    pub message: String,
    /// Severity affecting how the toast is styled
    pub level: NotificationLevel,
    /// How long the toast stays visible, in milliseconds
    pub duration_ms: u64,
}

impl Notification {
    /// Creates an `Info` notification with the given duration
    pub fn new(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Info,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Sets the level
    pub fn with_level(mut self, level: NotificationLevel) -> Self {
        self.level = level;
        self
    }

    pub fn info(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(message, duration)
    }

    pub fn success(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(message, duration).with_level(NotificationLevel::Success)
    }

    pub fn error(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(message, duration).with_level(NotificationLevel::Error)
    }
}

// ============================================================================
// IUserInterface trait
// ============================================================================

/// Port trait for the rendering side of the application
///
/// ## Implementation Notes
///
/// - `set_loading` is called in balanced on/off pairs per selector, but the
///   "off" half may arrive after a short delay.
/// - Implementations must tolerate calls from any tokio worker thread.
pub trait IUserInterface: Send + Sync {
    /// Shows a toast
    fn notify(&self, notification: &Notification);

    /// Turns the loading affordance of a UI region on or off
    fn set_loading(&self, selector: &str, loading: bool);

    /// Reflects whether the push channel is connected
    fn set_connected_indicator(&self, connected: bool);

    /// Replaces the "last refreshed" text
    fn set_last_refreshed_text(&self, text: &str);
}
