//! Refresh cycle results
//!
//! Every completed cycle produces exactly one [`CycleReport`], broadcast as
//! the "refresh completed" signal.

use chrono::{DateTime, Utc};

use super::errors::PullError;
use super::newtypes::{SourceKey, TimerKey};

/// What started a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleTrigger {
    /// The user asked for a refresh
    Manual,
    /// A timer fired for the given key
    Timer(TimerKey),
}

impl CycleTrigger {
    pub fn is_manual(&self) -> bool {
        matches!(self, CycleTrigger::Manual)
    }
}

/// Which route a cycle took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// `request_refresh` over the push channel
    Push,
    /// One pull request per source
    Pull,
    /// The application-wide refresh callback
    Global,
    /// Nothing configured; completed immediately
    Noop,
}

impl std::fmt::Display for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RouteKind::Push => "push",
            RouteKind::Pull => "pull",
            RouteKind::Global => "global",
            RouteKind::Noop => "noop",
        };
        write!(f, "{}", s)
    }
}

/// How a push-routed cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushCompletion {
    /// The server acknowledged before the fallback timeout
    Acknowledged,
    /// The fallback timeout forced completion
    TimedOut,
}

/// A single source that failed during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub key: SourceKey,
    pub error: PullError,
}

/// Summary of one completed refresh cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub trigger: CycleTrigger,
    pub route: RouteKind,
    /// Set only for push-routed cycles
    pub push_completion: Option<PushCompletion>,
    pub succeeded: Vec<SourceKey>,
    pub failed: Vec<SourceFailure>,
    pub completed_at: DateTime<Utc>,
}

impl CycleReport {
    /// Returns true if no source failed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns the failure recorded for `key`, if any
    pub fn failure_for(&self, key: &SourceKey) -> Option<&PullError> {
        self.failed
            .iter()
            .find(|f| &f.key == key)
            .map(|f| &f.error)
    }
}

/// Why a refresh request did not start a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another cycle was already running
    InFlight,
    /// The source is delivered by the connected push channel
    PushDelivered,
}

/// Result of asking the coordinator for a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(CycleReport),
    Skipped(SkipReason),
}

impl RefreshOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            RefreshOutcome::Completed(report) => Some(report),
            RefreshOutcome::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RefreshOutcome::Skipped(_))
    }
}
