//! YAML configuration for livesync
//!
//! The file has one section per concern (refresh timings, push endpoint,
//! pull sources, logging). Every section has defaults, so an empty file is
//! a valid configuration. [`Config::validate`] collects all problems at once
//! and [`ConfigBuilder`] assembles a configuration in code.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::connection::ReconnectPolicy;
use crate::domain::errors::DomainError;
use crate::domain::newtypes::{SessionId, SourceKey, GENERAL_TIMER};
use crate::domain::source::{
    FetchDescriptor, SourceSpec, SyncConfig, Timings, TransportPreference,
    DEFAULT_INTERVAL_MS, DEFAULT_LOADING_SELECTOR,
};

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Top-level configuration for livesync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub refresh: RefreshConfig,
    pub push: PushConfig,
    pub pull: PullConfig,
    pub settings: SettingsConfig,
    pub logging: LoggingConfig,
}

/// Refresh cadence and cycle timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Interval (ms) used until the user picks one.
    pub default_interval_ms: u32,
    /// Whether toasts are shown.
    pub toast_enabled: bool,
    /// `push`, `pull`, or `auto`.
    pub transport: TransportPreference,
    /// How long a push refresh waits for `refresh_acknowledged` (ms).
    pub push_fallback_ms: u64,
    /// Minimum time the loading affordance stays visible (ms).
    pub min_loading_ms: u64,
    /// Toast display duration (ms).
    pub toast_duration_ms: u64,
    /// UI element marked as loading during a cycle.
    pub loading_selector: String,
}

/// Push channel settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// WebSocket URL. `None` disables the push channel.
    pub url: Option<String>,
    /// Session forwarded in `authenticate` on every open.
    pub session_id: Option<String>,
    pub reconnect: ReconnectConfig,
}

/// Reconnect curve kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectPolicyKind {
    #[default]
    Fixed,
    Exponential,
}

/// Reconnect settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub policy: ReconnectPolicyKind,
    /// Fixed delay, or the initial delay of the exponential curve (ms).
    pub delay_ms: u64,
    /// Cap of the exponential curve (ms).
    pub max_delay_ms: u64,
    /// Growth factor of the exponential curve.
    pub multiplier: f64,
    /// Stop reconnecting after this many consecutive failures.
    pub max_attempts: Option<u32>,
}

/// Pull transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    /// Base URL that relative source URLs are joined onto.
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Bearer token sent with every request.
    pub bearer_token: Option<String>,
    pub sources: Vec<SourceConfig>,
}

/// One data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub key: String,
    pub url: String,
    #[serde(default)]
    pub target_selector: Option<String>,
    #[serde(default)]
    pub pushed_event: Option<String>,
    #[serde(default)]
    pub success_message: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Settings persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// SQLite database holding the settings record.
    pub database: PathBuf,
    /// Name of the settings record.
    pub storage_name: String,
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level, overridden by `RUST_LOG` when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Reads and parses the YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Like [`Config::load`], but a missing or unparsable file yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Where the configuration file lives when no path is given.
    ///
    /// Typically `$XDG_CONFIG_HOME/livesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("livesync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: DEFAULT_INTERVAL_MS,
            toast_enabled: true,
            transport: TransportPreference::Auto,
            push_fallback_ms: 2000,
            min_loading_ms: 300,
            toast_duration_ms: 3000,
            loading_selector: DEFAULT_LOADING_SELECTOR.to_string(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicyKind::Fixed,
            delay_ms: 5000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 10,
            bearer_token: None,
            sources: Vec::new(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("livesync");
        Self {
            database: data_dir.join("settings.db"),
            storage_name: "refreshSettings".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ReconnectConfig {
    /// Runtime reconnect policy described by this section.
    pub fn policy(&self) -> ReconnectPolicy {
        let policy = match self.policy {
            ReconnectPolicyKind::Fixed => {
                ReconnectPolicy::fixed(Duration::from_millis(self.delay_ms))
            }
            ReconnectPolicyKind::Exponential => ReconnectPolicy::exponential(
                Duration::from_millis(self.delay_ms),
                Duration::from_millis(self.max_delay_ms),
                self.multiplier,
            ),
        };
        match self.max_attempts {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// One problem reported by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"refresh.default_interval_ms"`.
    pub field: String,
    /// What is wrong with the value.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Accepted `logging.level` values.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn must_be_positive(field: &str) -> ValidationError {
    ValidationError {
        field: field.into(),
        message: "must be greater than 0".into(),
    }
}

impl Config {
    /// Checks every section and returns each problem found.
    ///
    /// The configuration is usable when the result is empty.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- refresh ---
        if self.refresh.default_interval_ms == 0 {
            errors.push(must_be_positive("refresh.default_interval_ms"));
        }
        if self.refresh.push_fallback_ms == 0 {
            errors.push(must_be_positive("refresh.push_fallback_ms"));
        }
        if self.refresh.toast_duration_ms == 0 {
            errors.push(must_be_positive("refresh.toast_duration_ms"));
        }
        if u64::from(self.refresh.default_interval_ms) > 0
            && self.refresh.push_fallback_ms >= u64::from(self.refresh.default_interval_ms)
        {
            errors.push(ValidationError {
                field: "refresh.push_fallback_ms".into(),
                message: format!(
                    "push_fallback_ms ({}) must be shorter than default_interval_ms ({})",
                    self.refresh.push_fallback_ms, self.refresh.default_interval_ms
                ),
            });
        }
        if self.refresh.min_loading_ms > self.refresh.push_fallback_ms {
            errors.push(ValidationError {
                field: "refresh.min_loading_ms".into(),
                message: format!(
                    "min_loading_ms ({}) must not exceed push_fallback_ms ({})",
                    self.refresh.min_loading_ms, self.refresh.push_fallback_ms
                ),
            });
        }

        // --- push ---
        if let Some(url) = &self.push.url {
            match url::Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "ws" | "wss") => {}
                _ => errors.push(ValidationError {
                    field: "push.url".into(),
                    message: format!("not a ws:// or wss:// URL: {url}"),
                }),
            }
        }
        if let Some(session) = &self.push.session_id {
            if let Err(e) = SessionId::new(session.clone()) {
                errors.push(ValidationError {
                    field: "push.session_id".into(),
                    message: e.to_string(),
                });
            }
        }
        if self.push.reconnect.delay_ms == 0 {
            errors.push(must_be_positive("push.reconnect.delay_ms"));
        }
        if self.push.reconnect.policy == ReconnectPolicyKind::Exponential {
            if self.push.reconnect.multiplier < 1.0 {
                errors.push(ValidationError {
                    field: "push.reconnect.multiplier".into(),
                    message: "must be at least 1.0".into(),
                });
            }
            if self.push.reconnect.max_delay_ms < self.push.reconnect.delay_ms {
                errors.push(ValidationError {
                    field: "push.reconnect.max_delay_ms".into(),
                    message: "must not be less than delay_ms".into(),
                });
            }
        }
        if self.push.reconnect.max_attempts == Some(0) {
            errors.push(must_be_positive("push.reconnect.max_attempts"));
        }

        // --- pull ---
        if self.pull.timeout_secs == 0 {
            errors.push(must_be_positive("pull.timeout_secs"));
        }
        if let Some(base) = &self.pull.base_url {
            if url::Url::parse(base).is_err() {
                errors.push(ValidationError {
                    field: "pull.base_url".into(),
                    message: format!("invalid URL: {base}"),
                });
            }
        }
        let mut seen = HashSet::new();
        for (i, source) in self.pull.sources.iter().enumerate() {
            let field = format!("pull.sources[{i}].key");
            if source.key == GENERAL_TIMER {
                errors.push(ValidationError {
                    field,
                    message: format!("'{GENERAL_TIMER}' is reserved"),
                });
            } else if let Err(e) = SourceKey::new(source.key.clone()) {
                errors.push(ValidationError {
                    field,
                    message: e.to_string(),
                });
            } else if !seen.insert(source.key.as_str()) {
                errors.push(ValidationError {
                    field,
                    message: format!("duplicate key '{}'", source.key),
                });
            }
            if source.url.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("pull.sources[{i}].url"),
                    message: "must not be empty".into(),
                });
            }
        }

        // --- settings ---
        if self.settings.storage_name.trim().is_empty() {
            errors.push(ValidationError {
                field: "settings.storage_name".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Builds the runtime configuration from a loaded [`Config`].
    ///
    /// Callbacks cannot come from YAML; attach them afterwards with
    /// [`SyncConfig::update_source`] or by setting `global_refresh`.
    pub fn from_config(config: &Config) -> Result<SyncConfig, DomainError> {
        let mut builder = SyncConfig::builder()
            .default_interval_ms(config.refresh.default_interval_ms)
            .toast_enabled(config.refresh.toast_enabled)
            .transport_preference(config.refresh.transport)
            .loading_selector(config.refresh.loading_selector.clone())
            .timings(Timings {
                push_fallback: Duration::from_millis(config.refresh.push_fallback_ms),
                min_loading: Duration::from_millis(config.refresh.min_loading_ms),
                toast_duration: Duration::from_millis(config.refresh.toast_duration_ms),
            });

        if let Some(session) = &config.push.session_id {
            builder = builder.session_id(SessionId::new(session.clone())?);
        }

        for source in &config.pull.sources {
            let key = SourceKey::new(source.key.clone())?;
            let descriptor = FetchDescriptor {
                url: source.url.clone(),
                target_selector: source.target_selector.clone(),
                success_message: source.success_message.clone(),
                error_message: source.error_message.clone(),
            };
            let mut spec = SourceSpec::from_descriptor(key, descriptor);
            if let Some(event) = &source.pushed_event {
                spec = spec.with_pushed_event(event.clone());
            }
            builder = builder.source(spec);
        }

        builder.build()
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Assembles a [`Config`] in code, starting from the defaults.
///
/// # Example
///
/// ```rust,no_run
/// use livesync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .refresh_default_interval_ms(60_000)
///     .push_url("wss://example.com/ws")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Starts from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- refresh ---

    pub fn refresh_default_interval_ms(mut self, ms: u32) -> Self {
        self.config.refresh.default_interval_ms = ms;
        self
    }

    pub fn refresh_toast_enabled(mut self, enabled: bool) -> Self {
        self.config.refresh.toast_enabled = enabled;
        self
    }

    pub fn refresh_transport(mut self, transport: TransportPreference) -> Self {
        self.config.refresh.transport = transport;
        self
    }

    pub fn refresh_push_fallback_ms(mut self, ms: u64) -> Self {
        self.config.refresh.push_fallback_ms = ms;
        self
    }

    pub fn refresh_min_loading_ms(mut self, ms: u64) -> Self {
        self.config.refresh.min_loading_ms = ms;
        self
    }

    pub fn refresh_toast_duration_ms(mut self, ms: u64) -> Self {
        self.config.refresh.toast_duration_ms = ms;
        self
    }

    // --- push ---

    pub fn push_url(mut self, url: impl Into<String>) -> Self {
        self.config.push.url = Some(url.into());
        self
    }

    pub fn push_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.config.push.session_id = Some(session_id.into());
        self
    }

    pub fn push_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.push.reconnect = reconnect;
        self
    }

    // --- pull ---

    pub fn pull_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.pull.base_url = Some(url.into());
        self
    }

    pub fn pull_timeout_secs(mut self, secs: u64) -> Self {
        self.config.pull.timeout_secs = secs;
        self
    }

    pub fn pull_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.config.pull.bearer_token = Some(token.into());
        self
    }

    pub fn pull_source(mut self, source: SourceConfig) -> Self {
        self.config.pull.sources.push(source);
        self
    }

    // --- settings ---

    pub fn settings_database(mut self, path: PathBuf) -> Self {
        self.config.settings.database = path;
        self
    }

    pub fn settings_storage_name(mut self, name: impl Into<String>) -> Self {
        self.config.settings.storage_name = name.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Returns the assembled configuration without checking it.
    pub fn build(self) -> Config {
        self.config
    }

    /// Like [`ConfigBuilder::build`], but runs [`Config::validate`] first.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.config;
        match config.validate() {
            problems if problems.is_empty() => Ok(config),
            problems => Err(problems),
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
