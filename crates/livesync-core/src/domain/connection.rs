//! Push-channel connection state
//!
//! The connection supervisor is the only writer of [`ConnectionState`];
//! other components receive copies through its accessor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Lifecycle status of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No channel open; a reconnect may be pending
    #[default]
    Disconnected,
    /// A connect attempt is running
    Connecting,
    /// The channel is open and delivering events
    Connected,
}

impl ConnectionStatus {
    /// Returns true if the channel is open
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of the push-channel connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    /// Current lifecycle status
    pub status: ConnectionStatus,
    /// When the next reconnect attempt is due, if one is scheduled
    pub reconnect_deadline: Option<DateTime<Utc>>,
    /// Consecutive reconnect attempts since the last successful open
    pub attempts: u32,
}

impl ConnectionState {
    /// Returns true if the channel is open
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// `Disconnected -> Connecting`
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` unless the channel is disconnected
    pub fn begin_connect(&mut self) -> Result<(), DomainError> {
        if self.status != ConnectionStatus::Disconnected {
            return Err(DomainError::ValidationFailed(format!(
                "cannot connect while {}",
                self.status
            )));
        }
        self.status = ConnectionStatus::Connecting;
        self.reconnect_deadline = None;
        Ok(())
    }

    /// `Connecting -> Connected`; clears any reconnect bookkeeping
    pub fn opened(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.reconnect_deadline = None;
        self.attempts = 0;
    }

    /// `Connecting | Connected -> Disconnected`
    ///
    /// Records the deadline of the next reconnect attempt, if any.
    pub fn closed(&mut self, reconnect_at: Option<DateTime<Utc>>) {
        self.status = ConnectionStatus::Disconnected;
        self.reconnect_deadline = reconnect_at;
    }
}

// ============================================================================
// Reconnect policy
// ============================================================================

/// Delay curve between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectStrategy {
    /// Same delay before every attempt
    Fixed { delay: Duration },
    /// `initial * multiplier^(attempt-1)`, capped at `max`
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

/// When, and how often, the supervisor reconnects after a close
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub strategy: ReconnectStrategy,
    /// Give up after this many consecutive failed attempts (`None` = never)
    pub max_attempts: Option<u32>,
}

/// Fixed reconnect delay used unless configured otherwise
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: ReconnectStrategy::Fixed { delay },
            max_attempts: None,
        }
    }

    pub fn exponential(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            strategy: ReconnectStrategy::Exponential {
                initial,
                max,
                multiplier,
            },
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before the given 1-based attempt, or `None` once attempts are exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }
        let delay = match self.strategy {
            ReconnectStrategy::Fixed { delay } => delay,
            ReconnectStrategy::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(64) as i32;
                let millis = initial.as_millis() as f64 * multiplier.powi(exponent);
                let capped = millis.min(max.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        };
        Some(delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}
