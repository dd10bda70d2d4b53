//! Data sources and the runtime synchronization configuration
//!
//! A [`SyncConfig`] is built once by the embedding application and never
//! mutated afterwards. Replacing endpoints means building a new value and
//! handing it to the manager as a whole.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{DomainError, PullError};
use super::newtypes::{SessionId, SourceKey};

/// Callback invoked with the decoded body of a successful pull
pub type SuccessCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback invoked with the failure of a pull
pub type ErrorCallback = Arc<dyn Fn(&PullError) + Send + Sync>;

/// Application-wide refresh used when no per-source endpoints exist
pub type GlobalRefresh = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Selector marked as loading while a cycle runs, unless configured otherwise
pub const DEFAULT_LOADING_SELECTOR: &str = "#refresh-now-btn";

/// Default interval between timer ticks (30 seconds)
pub const DEFAULT_INTERVAL_MS: u32 = 30_000;

// ============================================================================
// FetchDescriptor / SourceSpec
// ============================================================================

/// Everything the pull transport and the UI need to refresh one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchDescriptor {
    /// Absolute URL, or a path relative to the pull adapter's base URL
    pub url: String,
    /// UI region tagged as loading while the request runs
    pub target_selector: Option<String>,
    /// Toast shown after a successful manual refresh of this source
    pub success_message: Option<String>,
    /// Toast shown when this source fails to refresh
    pub error_message: Option<String>,
}

impl FetchDescriptor {
    /// Creates a descriptor with only a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target_selector: None,
            success_message: None,
            error_message: None,
        }
    }
}

/// One independently refreshable data source
#[derive(Clone)]
pub struct SourceSpec {
    key: SourceKey,
    descriptor: FetchDescriptor,
    pushed_event: Option<String>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl SourceSpec {
    /// Creates a source fetched from `url`
    pub fn new(key: SourceKey, url: impl Into<String>) -> Self {
        Self {
            key,
            descriptor: FetchDescriptor::new(url),
            pushed_event: None,
            on_success: None,
            on_error: None,
        }
    }

    /// Creates a source from an existing descriptor
    pub fn from_descriptor(key: SourceKey, descriptor: FetchDescriptor) -> Self {
        Self {
            key,
            descriptor,
            pushed_event: None,
            on_success: None,
            on_error: None,
        }
    }

    pub fn with_target_selector(mut self, selector: impl Into<String>) -> Self {
        self.descriptor.target_selector = Some(selector.into());
        self
    }

    pub fn with_success_message(mut self, message: impl Into<String>) -> Self {
        self.descriptor.success_message = Some(message.into());
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.descriptor.error_message = Some(message.into());
        self
    }

    /// Names the push event through which the server delivers this source
    ///
    /// While the push channel is connected, timer polling of the source is
    /// suppressed.
    pub fn with_pushed_event(mut self, event: impl Into<String>) -> Self {
        self.pushed_event = Some(event.into());
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PullError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn descriptor(&self) -> &FetchDescriptor {
        &self.descriptor
    }

    pub fn pushed_event(&self) -> Option<&str> {
        self.pushed_event.as_deref()
    }

    /// Runs the success callback, if any
    pub fn notify_success(&self, body: &Value) {
        if let Some(cb) = &self.on_success {
            cb(body);
        }
    }

    /// Runs the error callback, if any
    pub fn notify_error(&self, error: &PullError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSpec")
            .field("key", &self.key)
            .field("descriptor", &self.descriptor)
            .field("pushed_event", &self.pushed_event)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ============================================================================
// TransportPreference / Timings
// ============================================================================

/// Which transport a refresh cycle may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    /// Use push whenever connected
    Push,
    /// Never use push for refresh, and never open the channel
    Pull,
    /// Push when connected, pull otherwise
    #[default]
    Auto,
}

impl TransportPreference {
    /// Returns true if the push channel may carry refresh requests
    pub fn allows_push(&self) -> bool {
        !matches!(self, TransportPreference::Pull)
    }
}

/// Timing constants of a refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How long a push refresh waits for an acknowledgement
    pub push_fallback: Duration,
    /// Minimum time the loading affordance stays visible after completion
    pub min_loading: Duration,
    /// Display duration of toasts
    pub toast_duration: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            push_fallback: Duration::from_millis(2000),
            min_loading: Duration::from_millis(300),
            toast_duration: Duration::from_millis(3000),
        }
    }
}

// ============================================================================
// SyncConfig
// ============================================================================

/// Runtime configuration of the synchronization manager
#[derive(Clone)]
pub struct SyncConfig {
    /// Interval used when no valid setting was persisted
    pub default_interval_ms: u32,
    /// Registered sources, ordered by key
    pub sources: BTreeMap<SourceKey, SourceSpec>,
    /// Whether toasts are shown at all
    pub toast_enabled: bool,
    /// Transport preference for refresh cycles
    pub transport_preference: TransportPreference,
    /// Refresh used when no sources are registered
    pub global_refresh: Option<GlobalRefresh>,
    /// Cycle timing constants
    pub timings: Timings,
    /// UI element marked as loading during a cycle
    pub loading_selector: String,
    /// Session forwarded in `authenticate` when the push channel opens
    pub session_id: Option<SessionId>,
}

impl SyncConfig {
    /// Starts a builder with default values
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// Returns true if at least one source is registered
    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Returns true if a global refresh callback is configured
    pub fn has_global_refresh(&self) -> bool {
        self.global_refresh.is_some()
    }

    pub fn source(&self, key: &SourceKey) -> Option<&SourceSpec> {
        self.sources.get(key)
    }

    /// Rebuilds the source registered under `key`, e.g. to attach callbacks
    ///
    /// Returns false if no such source exists.
    pub fn update_source<F>(&mut self, key: &SourceKey, f: F) -> bool
    where
        F: FnOnce(SourceSpec) -> SourceSpec,
    {
        match self.sources.remove(key) {
            Some(spec) => {
                self.sources.insert(key.clone(), f(spec));
                true
            }
            None => false,
        }
    }

    /// Finds the source delivered through the given push event
    pub fn source_for_event(&self, event: &str) -> Option<&SourceSpec> {
        self.sources
            .values()
            .find(|spec| spec.pushed_event() == Some(event))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: DEFAULT_INTERVAL_MS,
            sources: BTreeMap::new(),
            toast_enabled: true,
            transport_preference: TransportPreference::default(),
            global_refresh: None,
            timings: Timings::default(),
            loading_selector: DEFAULT_LOADING_SELECTOR.to_string(),
            session_id: None,
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("default_interval_ms", &self.default_interval_ms)
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("toast_enabled", &self.toast_enabled)
            .field("transport_preference", &self.transport_preference)
            .field("global_refresh", &self.global_refresh.is_some())
            .field("timings", &self.timings)
            .field("loading_selector", &self.loading_selector)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Builder for [`SyncConfig`]
///
/// Duplicate source keys are reported by [`SyncConfigBuilder::build`].
pub struct SyncConfigBuilder {
    config: SyncConfig,
    duplicates: Vec<SourceKey>,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
            duplicates: Vec::new(),
        }
    }

    pub fn default_interval_ms(mut self, ms: u32) -> Self {
        self.config.default_interval_ms = ms;
        self
    }

    pub fn source(mut self, spec: SourceSpec) -> Self {
        let key = spec.key().clone();
        if self.config.sources.insert(key.clone(), spec).is_some() {
            self.duplicates.push(key);
        }
        self
    }

    pub fn toast_enabled(mut self, enabled: bool) -> Self {
        self.config.toast_enabled = enabled;
        self
    }

    pub fn transport_preference(mut self, preference: TransportPreference) -> Self {
        self.config.transport_preference = preference;
        self
    }

    pub fn global_refresh<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.config.global_refresh = Some(Arc::new(callback));
        self
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.config.timings = timings;
        self
    }

    pub fn loading_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.loading_selector = selector.into();
        self
    }

    pub fn session_id(mut self, session_id: SessionId) -> Self {
        self.config.session_id = Some(session_id);
        self
    }

    /// Finishes the configuration
    ///
    /// # Errors
    /// Returns `DomainError::DuplicateSource` if a key was registered twice,
    /// or `DomainError::ValidationFailed` for a zero default interval
    pub fn build(self) -> Result<SyncConfig, DomainError> {
        if let Some(key) = self.duplicates.first() {
            return Err(DomainError::DuplicateSource(key.to_string()));
        }
        if self.config.default_interval_ms == 0 {
            return Err(DomainError::ValidationFailed(
                "default interval must be greater than 0".to_string(),
            ));
        }
        Ok(self.config)
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
