//! Headless user interface adapter
//!
//! [`TracingInterface`] implements the UI port by logging every call. It is
//! meant for daemons and tests that embed the sync layer without a screen.

use livesync_core::ports::{IUserInterface, Notification, NotificationLevel};
use tracing::{debug, info, warn};

/// Logs UI calls through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInterface;

impl TracingInterface {
    pub fn new() -> Self {
        Self
    }
}

impl IUserInterface for TracingInterface {
    fn notify(&self, notification: &Notification) {
        match notification.level {
            NotificationLevel::Error => {
                warn!(message = %notification.message, "Notification");
            }
            NotificationLevel::Info | NotificationLevel::Success => {
                info!(level = %notification.level, message = %notification.message, "Notification");
            }
        }
    }

    fn set_loading(&self, selector: &str, loading: bool) {
        debug!(selector, loading, "Loading state changed");
    }

    fn set_connected_indicator(&self, connected: bool) {
        info!(connected, "Real-time indicator changed");
    }

    fn set_last_refreshed_text(&self, text: &str) {
        debug!(text, "Last refreshed");
    }
}
