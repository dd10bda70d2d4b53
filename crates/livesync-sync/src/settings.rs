//! Refresh settings persistence
//!
//! [`SettingsStore`] keeps the `{enabled, interval}` pair in one named text
//! record of an [`ISettingsStore`]. Loading never fails: anything missing or
//! unreadable falls back to defaults. Saving is best-effort.

use std::sync::Arc;

use livesync_core::domain::RefreshSettings;
use livesync_core::ports::ISettingsStore;
use serde_json::Value;
use tracing::{debug, warn};

/// Record name used unless configured otherwise
pub const DEFAULT_STORAGE_NAME: &str = "refreshSettings";

/// Loads and saves [`RefreshSettings`]
pub struct SettingsStore {
    store: Arc<dyn ISettingsStore>,
    name: String,
    default_interval_ms: u32,
}

impl SettingsStore {
    pub fn new(
        store: Arc<dyn ISettingsStore>,
        name: impl Into<String>,
        default_interval_ms: u32,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            default_interval_ms,
        }
    }

    /// Loads the persisted settings, or defaults
    ///
    /// Absent, corrupt and unreadable records all yield
    /// `{enabled: true, interval_ms: default}`. Missing fields default
    /// individually; an interval of 0 falls back to the default.
    pub async fn load(&self) -> RefreshSettings {
        let defaults = RefreshSettings::defaults(self.default_interval_ms);

        let raw = match self.store.read(&self.name).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(name = %self.name, "No saved refresh settings, using defaults");
                return defaults;
            }
            Err(e) => {
                warn!(name = %self.name, error = %e, "Error loading refresh settings");
                return defaults;
            }
        };

        match parse_settings(&raw, self.default_interval_ms) {
            Some(settings) => {
                debug!(
                    enabled = settings.enabled,
                    interval_ms = settings.interval_ms,
                    "Loaded refresh settings"
                );
                settings
            }
            None => {
                warn!(name = %self.name, "Saved refresh settings are corrupt, using defaults");
                defaults
            }
        }
    }

    /// Persists the settings; failures are logged and otherwise ignored
    pub async fn save(&self, settings: &RefreshSettings) {
        let json = match serde_json::to_string(settings) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Error serializing refresh settings");
                return;
            }
        };
        if let Err(e) = self.store.write(&self.name, &json).await {
            warn!(name = %self.name, error = %e, "Error saving refresh settings");
        }
    }
}

fn parse_settings(raw: &str, default_interval_ms: u32) -> Option<RefreshSettings> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;

    let enabled = object
        .get("autoRefreshEnabled")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let interval_ms = object
        .get("refreshInterval")
        .and_then(Value::as_u64)
        .and_then(|ms| u32::try_from(ms).ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(default_interval_ms);

    Some(RefreshSettings {
        enabled,
        interval_ms,
    })
}
