//! Toast messages
//!
//! Every user-visible message of the sync layer goes through [`Notifier`],
//! which turns a [`SyncNotice`] into a [`Notification`] and forwards it to
//! the UI port when toasts are enabled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use livesync_core::domain::SourceKey;
use livesync_core::ports::{IUserInterface, Notification};
use tracing::debug;

/// Something the user should be told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    /// A manual refresh cycle completed
    RefreshSucceeded,
    /// A manually refreshed source succeeded; carries its custom message
    SourceRefreshed { message: Option<String> },
    /// A source failed; carries its custom error message
    SourceFailed {
        key: String,
        message: Option<String>,
    },
    AutoRefreshChanged { enabled: bool },
    IntervalChanged { interval_ms: u32 },
    PushConnected,
    /// The server applied an interval change
    ServerIntervalUpdated { message: String },
    /// The server rejected an interval change
    ServerIntervalError { message: String },
}

impl SyncNotice {
    /// Failure notice for a source, using its custom message if any
    pub fn source_failed(key: &SourceKey, message: Option<&str>) -> Self {
        SyncNotice::SourceFailed {
            key: key.to_string(),
            message: message.map(str::to_string),
        }
    }

    /// Builds the notification shown for this notice
    pub fn to_notification(&self, duration: Duration) -> Notification {
        match self {
            SyncNotice::RefreshSucceeded => {
                Notification::success("Data refreshed successfully", duration)
            }
            SyncNotice::SourceRefreshed { message } => Notification::success(
                message
                    .clone()
                    .unwrap_or_else(|| "Data refreshed successfully".to_string()),
                duration,
            ),
            SyncNotice::SourceFailed { key, message } => Notification::error(
                message
                    .clone()
                    .unwrap_or_else(|| format!("Failed to refresh {key}")),
                duration,
            ),
            SyncNotice::AutoRefreshChanged { enabled: true } => {
                Notification::success("Auto-refresh enabled", duration)
            }
            SyncNotice::AutoRefreshChanged { enabled: false } => {
                Notification::info("Auto-refresh disabled", duration)
            }
            SyncNotice::IntervalChanged { interval_ms } => Notification::info(
                format!("Refresh interval set to {}", human_interval(*interval_ms)),
                duration,
            ),
            SyncNotice::PushConnected => {
                Notification::success("Real-time updates connected", duration)
            }
            SyncNotice::ServerIntervalUpdated { message } => {
                Notification::info(message.clone(), duration)
            }
            SyncNotice::ServerIntervalError { message } => {
                Notification::error(message.clone(), duration)
            }
        }
    }
}

/// Human-readable interval: `30 seconds`, `1 minute`, `5 minutes`, `1 hour`
pub fn human_interval(interval_ms: u32) -> String {
    let seconds = interval_ms / 1000;
    let plural = |n: u32, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };

    if seconds >= 3600 && seconds % 3600 == 0 {
        plural(seconds / 3600, "hour")
    } else if seconds >= 60 && seconds % 60 == 0 {
        plural(seconds / 60, "minute")
    } else {
        plural(seconds, "second")
    }
}

/// Forwards notices to the UI port
pub struct Notifier {
    ui: Arc<dyn IUserInterface>,
    enabled: AtomicBool,
    duration_ms: AtomicU64,
}

impl Notifier {
    pub fn new(ui: Arc<dyn IUserInterface>, enabled: bool, duration: Duration) -> Self {
        Self {
            ui,
            enabled: AtomicBool::new(enabled),
            duration_ms: AtomicU64::new(duration_to_ms(duration)),
        }
    }

    /// Shows the notice, unless toasts are disabled
    pub fn notify(&self, notice: SyncNotice) {
        if !self.enabled.load(Ordering::Acquire) {
            debug!(notice = ?notice, "Toasts disabled, notice dropped");
            return;
        }
        let duration = Duration::from_millis(self.duration_ms.load(Ordering::Acquire));
        self.ui.notify(&notice.to_notification(duration));
    }

    /// Applies new toast settings (after a reconfigure)
    pub fn configure(&self, enabled: bool, duration: Duration) {
        self.enabled.store(enabled, Ordering::Release);
        self.duration_ms
            .store(duration_to_ms(duration), Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// The UI port, for non-toast affordances
    pub fn ui(&self) -> &Arc<dyn IUserInterface> {
        &self.ui
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
