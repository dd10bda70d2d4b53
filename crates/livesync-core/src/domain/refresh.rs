//! Refresh state and freshness formatting
//!
//! [`RefreshState`] is the single record of "how fresh is the displayed
//! data". It is owned by the refresh coordinator; every other component
//! reads it through an accessor that returns a copy.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// User-controllable refresh settings
///
/// This is the pair persisted by the settings store. The serialized form
/// uses the record layout `{"autoRefreshEnabled": bool, "refreshInterval": u32}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// Whether timer-driven refresh is active
    #[serde(rename = "autoRefreshEnabled")]
    pub enabled: bool,
    /// Interval between timer ticks, in milliseconds
    #[serde(rename = "refreshInterval")]
    pub interval_ms: u32,
}

impl RefreshSettings {
    /// Settings used when nothing (or nothing valid) was persisted
    pub fn defaults(default_interval_ms: u32) -> Self {
        Self {
            enabled: true,
            interval_ms: default_interval_ms,
        }
    }
}

/// Mutable refresh bookkeeping
///
/// `in_flight` is the mutual-exclusion invariant: no second refresh cycle
/// may start while it is true. `last_refreshed_at` never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshState {
    /// Whether timer-driven refresh is active
    pub enabled: bool,
    /// Interval between timer ticks, in milliseconds
    pub interval_ms: u32,
    /// When the displayed data was last known to be current
    pub last_refreshed_at: DateTime<Utc>,
    /// Whether a refresh cycle is currently running
    pub in_flight: bool,
    /// Identifier of the most recently started cycle (0 before the first)
    pub cycle_id: u64,
}

impl RefreshState {
    /// Creates the initial state from persisted settings
    pub fn new(settings: RefreshSettings, now: DateTime<Utc>) -> Self {
        Self {
            enabled: settings.enabled,
            interval_ms: settings.interval_ms,
            last_refreshed_at: now,
            in_flight: false,
            cycle_id: 0,
        }
    }

    /// Returns the persisted projection of this state
    pub fn settings(&self) -> RefreshSettings {
        RefreshSettings {
            enabled: self.enabled,
            interval_ms: self.interval_ms,
        }
    }

    /// Marks a new cycle as started
    ///
    /// Returns the new cycle id, or `None` if a cycle is already in flight.
    pub fn try_begin_cycle(&mut self) -> Option<u64> {
        if self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(self.next_cycle_id())
    }

    /// Allocates an id for a cycle that does not take the `in_flight` flag
    pub fn next_cycle_id(&mut self) -> u64 {
        self.cycle_id += 1;
        self.cycle_id
    }

    /// Marks the running cycle as finished and records freshness
    pub fn finish_cycle(&mut self, now: DateTime<Utc>) {
        self.in_flight = false;
        self.touch(now);
    }

    /// Advances the freshness timestamp, never moving it backwards
    ///
    /// Returns true if the timestamp changed.
    pub fn touch(&mut self, now: DateTime<Utc>) -> bool {
        if now > self.last_refreshed_at {
            self.last_refreshed_at = now;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Freshness formatting
// ============================================================================

/// Formats how long ago `last` happened, relative to `now`
///
/// - under 10 seconds: `just now`
/// - under a minute: `<n> seconds ago`
/// - under an hour: `<n> minute(s) ago`
/// - otherwise: the local clock time of `last` (`HH:MM`)
pub fn format_freshness(last: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - last).num_seconds();

    if seconds < 10 {
        "just now".to_string()
    } else if seconds < 60 {
        format!("{seconds} seconds ago")
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        if minutes == 1 {
            "1 minute ago".to_string()
        } else {
            format!("{minutes} minutes ago")
        }
    } else {
        format_clock_time(last)
    }
}

/// Local clock time used for freshness older than an hour
pub fn format_clock_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

/// Freshness text as displayed next to the refresh controls
///
/// Live mode (auto-refresh enabled) appends a `• live` marker.
pub fn freshness_label(last: DateTime<Utc>, now: DateTime<Utc>, live: bool) -> String {
    let text = format_freshness(last, now);
    if live {
        format!("{text} • live")
    } else {
        text
    }
}
