//! Synchronization manager
//!
//! [`SyncManager`] is the composition root of the sync layer. It is built
//! explicitly by the embedding application and owns every component:
//!
//! ```text
//!                 ┌──────────────────── SyncManager ────────────────────┐
//!  timers ──tick──→ RefreshCoordinator ──pull──→ IPullTransport          │
//!                 │        ▲    │                                        │
//!                 │  events│    └──request_refresh──┐                    │
//!                 │        │                        ▼                    │
//!                 │   event pump ◄── SupervisorEvent ─ ConnectionSupervisor ──→ IPushChannel
//!                 └─────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use livesync_core::domain::{
    ConnectionState, CycleReport, DomainError, OutboundMessage, PullError, ReconnectPolicy,
    RefreshOutcome, RefreshState, SessionId, SourceKey, SyncConfig, TimerKey,
};
use livesync_core::ports::{IPullTransport, IPushChannel, ISettingsStore, IUserInterface};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::RefreshCoordinator;
use crate::lock;
use crate::notifier::{Notifier, SyncNotice};
use crate::settings::{SettingsStore, DEFAULT_STORAGE_NAME};
use crate::supervisor::{ConnectionSupervisor, SupervisorEvent};
use crate::terminal::RemoteTerminal;
use crate::timers::{TickHandler, TimerOrchestrator};
use crate::SyncError;

/// Adapters and policies the manager is built from
pub struct SyncDeps {
    pub pull: Arc<dyn IPullTransport>,
    pub push: Option<Arc<dyn IPushChannel>>,
    pub settings: Arc<dyn ISettingsStore>,
    pub ui: Arc<dyn IUserInterface>,
    pub reconnect: ReconnectPolicy,
    pub storage_name: String,
}

impl SyncDeps {
    /// Pull-only dependencies with the default reconnect policy
    pub fn new(
        pull: Arc<dyn IPullTransport>,
        settings: Arc<dyn ISettingsStore>,
        ui: Arc<dyn IUserInterface>,
    ) -> Self {
        Self {
            pull,
            push: None,
            settings,
            ui,
            reconnect: ReconnectPolicy::default(),
            storage_name: DEFAULT_STORAGE_NAME.to_string(),
        }
    }

    pub fn with_push(mut self, channel: Arc<dyn IPushChannel>) -> Self {
        self.push = Some(channel);
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_storage_name(mut self, name: impl Into<String>) -> Self {
        self.storage_name = name.into();
        self
    }
}

/// Owns the refresh coordinator, timers and push supervision of one view
pub struct SyncManager {
    coordinator: Arc<RefreshCoordinator>,
    supervisor: Option<Arc<ConnectionSupervisor>>,
    timers: TimerOrchestrator,
    settings: SettingsStore,
    notifier: Arc<Notifier>,
    shutdown: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    /// Builds and starts the sync layer
    ///
    /// 1. Loads persisted refresh settings (defaults on any failure)
    /// 2. Connects the push channel, unless absent or the preference is pull
    /// 3. Starts the timers when auto-refresh is enabled
    pub async fn start(config: SyncConfig, deps: SyncDeps) -> Self {
        let settings = SettingsStore::new(
            deps.settings,
            deps.storage_name,
            config.default_interval_ms,
        );
        let loaded = settings.load().await;

        let notifier = Arc::new(Notifier::new(
            deps.ui,
            config.toast_enabled,
            config.timings.toast_duration,
        ));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = deps.push.map(|channel| {
            ConnectionSupervisor::new(
                channel,
                deps.reconnect,
                config.session_id.clone(),
                Arc::clone(&notifier),
                events_tx,
            )
        });

        let allows_push = config.transport_preference.allows_push();
        let coordinator = Arc::new(RefreshCoordinator::new(
            config,
            loaded,
            deps.pull,
            supervisor.clone(),
            Arc::clone(&notifier),
        ));

        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(pump_events(
            Arc::clone(&coordinator),
            events_rx,
            shutdown.clone(),
        ));

        let manager = Self {
            coordinator,
            supervisor,
            timers: TimerOrchestrator::new(),
            settings,
            notifier,
            shutdown,
            pump: Mutex::new(Some(pump)),
        };

        info!(
            enabled = loaded.enabled,
            interval_ms = loaded.interval_ms,
            push = manager.supervisor.is_some(),
            "Starting sync manager"
        );

        match &manager.supervisor {
            Some(supervisor) if allows_push => supervisor.connect().await,
            Some(_) => debug!("Pull transport preferred, push channel left idle"),
            None => debug!("No push channel configured"),
        }

        if loaded.enabled {
            manager.start_timers(loaded.interval_ms);
        }
        manager.coordinator.refresh_freshness_text();
        manager
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    pub async fn manual_refresh(&self) -> RefreshOutcome {
        self.coordinator.manual_refresh().await
    }

    /// Refreshes one source as if the user asked for it
    pub async fn refresh_source(&self, key: &SourceKey) -> RefreshOutcome {
        self.coordinator
            .timer_refresh(&TimerKey::Source(key.clone()), true)
            .await
    }

    /// Fetches one source outside of any cycle
    ///
    /// # Errors
    /// The source's `PullError`
    pub async fn pull_one(&self, key: &SourceKey) -> Result<Value, PullError> {
        self.coordinator.pull_one(key, true).await
    }

    /// Turns timer-driven refresh on or off and persists the choice
    pub async fn set_auto_refresh(&self, enabled: bool) {
        let settings = self.coordinator.set_enabled(enabled);
        self.settings.save(&settings).await;

        if enabled {
            self.start_timers(settings.interval_ms);
        } else {
            self.timers.stop();
        }
        info!(enabled, "Auto-refresh changed");
        self.notifier.notify(SyncNotice::AutoRefreshChanged { enabled });
        self.coordinator.refresh_freshness_text();
    }

    /// Changes the refresh interval and persists it
    ///
    /// Running timers restart on the new interval; a connected push channel
    /// is told about it so the server can adjust its own schedule.
    ///
    /// # Errors
    /// `SyncError::DomainError` for a zero interval
    pub async fn set_interval(&self, interval_ms: u32) -> Result<(), SyncError> {
        if interval_ms == 0 {
            return Err(DomainError::ValidationFailed(
                "refresh interval must be greater than zero".to_string(),
            )
            .into());
        }

        let settings = self.coordinator.set_interval_ms(interval_ms);
        self.settings.save(&settings).await;

        if settings.enabled {
            let config = self.coordinator.config();
            self.timers.restart(
                config.sources.keys().cloned(),
                config.has_global_refresh(),
                Duration::from_millis(u64::from(interval_ms)),
                self.tick_handler(),
            );
        }

        if let Some(supervisor) = self.connected_supervisor() {
            let message = OutboundMessage::set_refresh_interval_all(interval_ms);
            if let Err(e) = supervisor.send(&message).await {
                warn!(error = %e, "Failed to propagate refresh interval");
            }
        }

        info!(interval_ms, "Refresh interval changed");
        self.notifier.notify(SyncNotice::IntervalChanged { interval_ms });
        Ok(())
    }

    /// Replaces the whole configuration
    ///
    /// Sources, callbacks and timings take effect for the next cycle; timers
    /// restart for the new source set when auto-refresh is enabled.
    pub fn reconfigure(&self, config: SyncConfig) {
        info!(sources = config.sources.len(), "Reconfiguring sync manager");
        self.coordinator.replace_config(config);
        let state = self.coordinator.state();
        if state.enabled {
            self.start_timers(state.interval_ms);
        }
    }

    // ========================================================================
    // Push channel
    // ========================================================================

    /// Handles a push event by name, replacing any previous handler
    ///
    /// # Errors
    /// `SyncError::PushUnavailable` without a push channel
    pub fn on_event<F>(&self, event: impl Into<String>, handler: F) -> Result<(), SyncError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.require_supervisor()?.on_event(event, handler);
        Ok(())
    }

    /// Handles every push event without a specific handler
    ///
    /// # Errors
    /// `SyncError::PushUnavailable` without a push channel
    pub fn on_any<F>(&self, handler: F) -> Result<(), SyncError>
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.require_supervisor()?.on_any(handler);
        Ok(())
    }

    /// Opens a remote terminal session over the push channel
    ///
    /// # Errors
    /// `SyncError::PushUnavailable` without a push channel
    pub fn terminal(&self, session_id: SessionId) -> Result<RemoteTerminal, SyncError> {
        let supervisor = self.require_supervisor()?;
        Ok(RemoteTerminal::open(session_id, Arc::clone(supervisor)))
    }

    /// Connects the push channel now, e.g. after a user retry
    ///
    /// # Errors
    /// `SyncError::PushUnavailable` without a push channel
    pub async fn connect_push(&self) -> Result<(), SyncError> {
        self.require_supervisor()?.connect().await;
        Ok(())
    }

    /// Closes the push channel without scheduling a reconnect
    pub async fn disconnect_push(&self) {
        if let Some(supervisor) = &self.supervisor {
            supervisor.disconnect().await;
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Receives one report per completed refresh cycle
    pub fn subscribe(&self) -> broadcast::Receiver<CycleReport> {
        self.coordinator.subscribe()
    }

    pub fn state(&self) -> RefreshState {
        self.coordinator.state()
    }

    /// Copy of the push connection state; disconnected without a channel
    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor
            .as_ref()
            .map(|supervisor| supervisor.state())
            .unwrap_or_default()
    }

    pub fn freshness_text(&self) -> String {
        self.coordinator.freshness_text()
    }

    /// Keys with a running timer
    pub fn active_timers(&self) -> Vec<TimerKey> {
        self.timers.active_keys()
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stops timers, closes the push channel and ends the event pump
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Shutting down sync manager");
        self.shutdown.cancel();
        self.timers.stop();

        if let Some(supervisor) = &self.supervisor {
            supervisor.disconnect().await;
        }

        let pump = lock(&self.pump).take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                warn!(error = %e, "Event pump ended abnormally");
            }
        }
        info!("Sync manager stopped");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn start_timers(&self, interval_ms: u32) {
        let config = self.coordinator.config();
        self.timers.start(
            config.sources.keys().cloned(),
            config.has_global_refresh(),
            Duration::from_millis(u64::from(interval_ms)),
            self.tick_handler(),
        );
    }

    fn tick_handler(&self) -> TickHandler {
        let coordinator = Arc::clone(&self.coordinator);
        Arc::new(move |key: TimerKey| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                let outcome = coordinator.timer_refresh(&key, false).await;
                if outcome.is_skipped() {
                    debug!(key = %key, outcome = ?outcome, "Timer refresh skipped");
                }
            });
        })
    }

    fn require_supervisor(&self) -> Result<&Arc<ConnectionSupervisor>, SyncError> {
        self.supervisor.as_ref().ok_or(SyncError::PushUnavailable)
    }

    fn connected_supervisor(&self) -> Option<&Arc<ConnectionSupervisor>> {
        self.supervisor
            .as_ref()
            .filter(|supervisor| supervisor.is_connected())
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.timers.stop();
        if let Some(supervisor) = &self.supervisor {
            supervisor.cancel_reconnect();
        }
    }
}

/// Routes supervisor events to the coordinator until shutdown
async fn pump_events(
    coordinator: Arc<RefreshCoordinator>,
    mut events: mpsc::UnboundedReceiver<SupervisorEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Event pump stopping");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Supervisor gone, event pump stopping");
                    break;
                };
                match event {
                    SupervisorEvent::Connected => debug!("Push channel up"),
                    SupervisorEvent::Disconnected => debug!("Push channel down"),
                    SupervisorEvent::DataReceived { event, payload, dispatched } => {
                        coordinator.record_push_data(&event, &payload, dispatched);
                    }
                    SupervisorEvent::RefreshAcknowledged(ack) => {
                        if !ack.success {
                            warn!(
                                message = ack.message.as_deref().unwrap_or(""),
                                "Server reported refresh failure"
                            );
                        }
                        coordinator.acknowledge_push_refresh();
                    }
                }
            }
        }
    }
}
