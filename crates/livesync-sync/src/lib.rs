//! livesync Sync - Refresh coordination over push and pull transports
//!
//! Provides:
//! - Non-overlapping refresh cycles with push/pull/global route selection
//! - Per-source recurring timers with atomic restart
//! - Push-channel supervision with automatic reconnection
//! - Best-effort persistence of refresh settings
//!
//! ## Modules
//!
//! - [`coordinator`] - Refresh cycles and the freshness model
//! - [`timers`] - Recurring per-source timers
//! - [`supervisor`] - Push-channel connection state machine and dispatch
//! - [`settings`] - Loading and saving refresh settings
//! - [`notifier`] - Toast messages
//! - [`terminal`] - Remote terminal sessions over the push channel
//! - [`manager`] - Composition root wiring everything together
//! - [`ui`] - Headless user interface adapter
//! - [`logging`] - Tracing subscriber initialisation

pub mod coordinator;
pub mod logging;
pub mod manager;
pub mod notifier;
pub mod settings;
pub mod supervisor;
pub mod terminal;
pub mod timers;
pub mod ui;

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

pub use coordinator::RefreshCoordinator;
pub use manager::{SyncDeps, SyncManager};
pub use supervisor::{ConnectionSupervisor, SupervisorEvent};
pub use terminal::{RemoteTerminal, TerminalError};
pub use timers::TimerOrchestrator;

/// Errors that can occur in synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The push channel is not connected
    #[error("Push channel is not connected")]
    NotConnected,

    /// No push channel was configured
    #[error("Push channel is not configured")]
    PushUnavailable,

    /// The push channel adapter failed
    #[error("Push channel error: {0}")]
    Channel(String),

    /// A domain-level error propagated from livesync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] livesync_core::domain::errors::DomainError),
}

/// Locks a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
