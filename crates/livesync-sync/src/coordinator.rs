//! Refresh cycles
//!
//! The [`RefreshCoordinator`] runs refresh cycles and is the only writer of
//! [`RefreshState`]. A cycle picks one route:
//!
//! ```text
//!                ┌─ push allowed & connected ─→ request_refresh ─→ ack | fallback timeout
//! begin cycle ───┼─ sources registered ───────→ pull every source concurrently
//!                ├─ global callback ──────────→ await callback
//!                └─ otherwise ────────────────→ warn, complete at once
//! ```
//!
//! Every route ends in the same completion: `in_flight` cleared, freshness
//! advanced, one [`CycleReport`] broadcast.
//!
//! Per-source timer ticks are not exclusive cycles. They share the
//! completion (without touching `in_flight`) so that sources whose timers
//! fire together are all refreshed; a tick is dropped while a full cycle
//! runs or while the same source is still being fetched. A full cycle that
//! starts while a tick is fetching leaves that source to the tick.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use futures_util::future::join_all;
use livesync_core::domain::{
    freshness_label, CycleReport, CycleTrigger, OutboundMessage, PullError, PushCompletion,
    RefreshOutcome, RefreshSettings, RefreshState, RouteKind, SkipReason, SourceFailure,
    SourceKey, SourceSpec, SyncConfig, TimerKey,
};
use livesync_core::ports::IPullTransport;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::lock;
use crate::notifier::{Notifier, SyncNotice};
use crate::supervisor::ConnectionSupervisor;
use crate::SyncError;

const REPORT_CHANNEL_CAPACITY: usize = 32;

struct PendingAck {
    cycle_id: u64,
    tx: oneshot::Sender<()>,
}

/// Outcome of a route before completion bookkeeping
struct RouteResult {
    route: RouteKind,
    push_completion: Option<PushCompletion>,
    succeeded: Vec<SourceKey>,
    failed: Vec<SourceFailure>,
}

impl RouteResult {
    fn bare(route: RouteKind) -> Self {
        Self {
            route,
            push_completion: None,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Clears `in_flight` if a cycle future is dropped before completing
struct InFlightGuard<'a> {
    state: &'a Mutex<RefreshState>,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn new(state: &'a Mutex<RefreshState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.state).in_flight = false;
        }
    }
}

/// Removes a source from the running set when its refresh ends
struct SourceGuard<'a> {
    running: &'a Mutex<BTreeSet<SourceKey>>,
    key: SourceKey,
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        lock(self.running).remove(&self.key);
    }
}

/// Runs refresh cycles over the pull transport, the push channel or the
/// global callback
pub struct RefreshCoordinator {
    config: RwLock<Arc<SyncConfig>>,
    pull: Arc<dyn IPullTransport>,
    push: Option<Arc<ConnectionSupervisor>>,
    notifier: Arc<Notifier>,
    state: Mutex<RefreshState>,
    refreshing_sources: Mutex<BTreeSet<SourceKey>>,
    pending_ack: Mutex<Option<PendingAck>>,
    reports: broadcast::Sender<CycleReport>,
}

impl RefreshCoordinator {
    pub fn new(
        config: SyncConfig,
        settings: RefreshSettings,
        pull: Arc<dyn IPullTransport>,
        push: Option<Arc<ConnectionSupervisor>>,
        notifier: Arc<Notifier>,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            config: RwLock::new(Arc::new(config)),
            pull,
            push,
            notifier,
            state: Mutex::new(RefreshState::new(settings, Utc::now())),
            refreshing_sources: Mutex::new(BTreeSet::new()),
            pending_ack: Mutex::new(None),
            reports,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Copy of the refresh state
    pub fn state(&self) -> RefreshState {
        lock(&self.state).clone()
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.state).in_flight
    }

    /// Snapshot of the active configuration
    pub fn config(&self) -> Arc<SyncConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(|p| p.into_inner()))
    }

    /// Swaps the configuration; a running cycle keeps its snapshot
    pub fn replace_config(&self, config: SyncConfig) {
        self.notifier
            .configure(config.toast_enabled, config.timings.toast_duration);
        *self.config.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(config);
    }

    /// Receives one report per completed cycle
    pub fn subscribe(&self) -> broadcast::Receiver<CycleReport> {
        self.reports.subscribe()
    }

    pub fn set_enabled(&self, enabled: bool) -> RefreshSettings {
        let mut state = lock(&self.state);
        state.enabled = enabled;
        state.settings()
    }

    pub fn set_interval_ms(&self, interval_ms: u32) -> RefreshSettings {
        let mut state = lock(&self.state);
        state.interval_ms = interval_ms;
        state.settings()
    }

    /// Freshness text as it should currently be displayed
    pub fn freshness_text(&self) -> String {
        let state = lock(&self.state);
        freshness_label(state.last_refreshed_at, Utc::now(), state.enabled)
    }

    /// Pushes the current freshness text to the UI
    pub fn refresh_freshness_text(&self) {
        let text = self.freshness_text();
        self.notifier.ui().set_last_refreshed_text(&text);
    }

    // ========================================================================
    // Cycles
    // ========================================================================

    /// User-triggered refresh of everything
    ///
    /// Returns `Skipped(InFlight)` without side effects while a cycle runs.
    pub async fn manual_refresh(&self) -> RefreshOutcome {
        self.run_cycle(CycleTrigger::Manual, true).await
    }

    /// Refresh driven by a timer tick
    ///
    /// `General` selects a route like a manual refresh. `Source(k)` pulls
    /// only `k`: it is dropped while a full cycle runs or while `k` is
    /// already being refreshed, and a source delivered over a connected
    /// push channel is skipped altogether. Silent unless `is_manual`.
    pub async fn timer_refresh(&self, key: &TimerKey, is_manual: bool) -> RefreshOutcome {
        let trigger = CycleTrigger::Timer(key.clone());
        match key {
            TimerKey::General => self.run_cycle(trigger, is_manual).await,
            TimerKey::Source(source) => self.refresh_source(trigger, source, is_manual).await,
        }
    }

    async fn run_cycle(&self, trigger: CycleTrigger, visible: bool) -> RefreshOutcome {
        let Some(cycle_id) = lock(&self.state).try_begin_cycle() else {
            debug!(trigger = ?trigger, "Refresh already in flight, trigger dropped");
            return RefreshOutcome::Skipped(SkipReason::InFlight);
        };
        let mut guard = InFlightGuard::new(&self.state);
        let config = self.config();

        debug!(cycle_id, trigger = ?trigger, "Refresh cycle started");
        if visible {
            self.notifier.ui().set_loading(&config.loading_selector, true);
        }

        let result = self.select_route(&config, cycle_id, visible).await;

        guard.disarm();
        let report = self.complete(cycle_id, trigger, result, true);

        if visible {
            self.notifier.notify(SyncNotice::RefreshSucceeded);
            let ui = Arc::clone(self.notifier.ui());
            let selector = config.loading_selector.clone();
            let min_loading = config.timings.min_loading;
            tokio::spawn(async move {
                tokio::time::sleep(min_loading).await;
                ui.set_loading(&selector, false);
            });
        }

        RefreshOutcome::Completed(report)
    }

    async fn refresh_source(
        &self,
        trigger: CycleTrigger,
        key: &SourceKey,
        visible: bool,
    ) -> RefreshOutcome {
        if self.is_in_flight() {
            debug!(key = %key, "Refresh cycle in flight, source tick dropped");
            return RefreshOutcome::Skipped(SkipReason::InFlight);
        }

        let config = self.config();
        let pushed = config
            .source(key)
            .is_some_and(|spec| spec.pushed_event().is_some());
        if pushed && config.transport_preference.allows_push() && self.connected_push().is_some() {
            debug!(key = %key, "Source delivered over push, tick skipped");
            return RefreshOutcome::Skipped(SkipReason::PushDelivered);
        }

        let Some(_running) = self.claim_source(key) else {
            debug!(key = %key, "Source refresh already running, tick dropped");
            return RefreshOutcome::Skipped(SkipReason::InFlight);
        };

        let cycle_id = lock(&self.state).next_cycle_id();
        debug!(cycle_id, key = %key, "Source refresh started");
        let result = self.pull_all(&config, vec![key.clone()], visible).await;
        RefreshOutcome::Completed(self.complete(cycle_id, trigger, result, false))
    }

    async fn select_route(&self, config: &SyncConfig, cycle_id: u64, visible: bool) -> RouteResult {
        if config.transport_preference.allows_push() {
            if let Some(push) = self.connected_push() {
                match self.push_round_trip(push, config, cycle_id).await {
                    Ok(completion) => {
                        let mut result = RouteResult::bare(RouteKind::Push);
                        result.push_completion = Some(completion);
                        return result;
                    }
                    Err(e) => {
                        warn!(cycle_id, error = %e, "Push refresh request failed, falling back");
                    }
                }
            }
        }

        if config.has_sources() {
            let claimed: Vec<SourceGuard<'_>> = config
                .sources
                .keys()
                .filter_map(|key| {
                    let guard = self.claim_source(key);
                    if guard.is_none() {
                        debug!(cycle_id, key = %key, "Source already being fetched, left to its tick");
                    }
                    guard
                })
                .collect();
            let keys = claimed.iter().map(|guard| guard.key.clone()).collect();
            return self.pull_all(config, keys, visible).await;
        }

        if let Some(global) = config.global_refresh.clone() {
            if let Err(e) = global().await {
                warn!(cycle_id, error = %e, "Global refresh failed");
            }
            return RouteResult::bare(RouteKind::Global);
        }

        warn!(cycle_id, "No refresh endpoints or callback configured");
        RouteResult::bare(RouteKind::Noop)
    }

    /// Marks `key` as being fetched; `None` if it already is
    fn claim_source(&self, key: &SourceKey) -> Option<SourceGuard<'_>> {
        lock(&self.refreshing_sources)
            .insert(key.clone())
            .then(|| SourceGuard {
                running: &self.refreshing_sources,
                key: key.clone(),
            })
    }

    async fn push_round_trip(
        &self,
        push: &ConnectionSupervisor,
        config: &SyncConfig,
        cycle_id: u64,
    ) -> Result<PushCompletion, SyncError> {
        let (tx, rx) = oneshot::channel();
        // Registered before sending so an immediate ack cannot be missed
        *lock(&self.pending_ack) = Some(PendingAck { cycle_id, tx });

        if let Err(e) = push.send(&OutboundMessage::request_refresh_all()).await {
            lock(&self.pending_ack).take();
            return Err(e);
        }
        debug!(cycle_id, "Refresh requested over push channel");

        match tokio::time::timeout(config.timings.push_fallback, rx).await {
            Ok(Ok(())) => Ok(PushCompletion::Acknowledged),
            _ => {
                let mut pending = lock(&self.pending_ack);
                if pending.as_ref().is_some_and(|p| p.cycle_id == cycle_id) {
                    pending.take();
                }
                warn!(
                    cycle_id,
                    fallback_ms = config.timings.push_fallback.as_millis() as u64,
                    "Push refresh not acknowledged, completing cycle"
                );
                Ok(PushCompletion::TimedOut)
            }
        }
    }

    async fn pull_all(&self, config: &SyncConfig, keys: Vec<SourceKey>, manual: bool) -> RouteResult {
        let pulls = keys.into_iter().map(|key| async move {
            let result = match config.source(&key) {
                Some(spec) => self.pull_spec(spec, manual).await,
                None => self.unknown_source(&key),
            };
            (key, result)
        });

        let mut result = RouteResult::bare(RouteKind::Pull);
        for (key, outcome) in join_all(pulls).await {
            match outcome {
                Ok(_) => result.succeeded.push(key),
                Err(error) => result.failed.push(SourceFailure { key, error }),
            }
        }
        result
    }

    /// Completion shared by every route; `finish` clears `in_flight`
    fn complete(
        &self,
        cycle_id: u64,
        trigger: CycleTrigger,
        result: RouteResult,
        finish: bool,
    ) -> CycleReport {
        let now = Utc::now();
        let (enabled, last) = {
            let mut state = lock(&self.state);
            if finish {
                state.finish_cycle(now);
            } else {
                state.touch(now);
            }
            (state.enabled, state.last_refreshed_at)
        };
        self.notifier
            .ui()
            .set_last_refreshed_text(&freshness_label(last, now, enabled));

        let report = CycleReport {
            cycle_id,
            trigger,
            route: result.route,
            push_completion: result.push_completion,
            succeeded: result.succeeded,
            failed: result.failed,
            completed_at: now,
        };
        info!(
            cycle_id,
            route = %report.route,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Refresh cycle completed"
        );
        if self.reports.send(report.clone()).is_err() {
            debug!(cycle_id, "No cycle report subscribers");
        }
        report
    }

    // ========================================================================
    // Single sources
    // ========================================================================

    /// Fetches one source outside of any cycle
    ///
    /// Runs the source's callbacks and toasts; a success toast is shown only
    /// when `manual`. Never touches cycle bookkeeping.
    ///
    /// # Errors
    /// The source's `PullError`, or `PullError::UnknownSource`
    pub async fn pull_one(&self, key: &SourceKey, manual: bool) -> Result<Value, PullError> {
        let config = self.config();
        match config.source(key) {
            Some(spec) => self.pull_spec(spec, manual).await,
            None => self.unknown_source(key),
        }
    }

    async fn pull_spec(&self, spec: &SourceSpec, manual: bool) -> Result<Value, PullError> {
        let descriptor = spec.descriptor();
        let ui = self.notifier.ui();
        let selector = descriptor.target_selector.as_deref();

        if let Some(selector) = selector {
            ui.set_loading(selector, true);
        }
        let result = self.pull.fetch(descriptor).await;
        if let Some(selector) = selector {
            ui.set_loading(selector, false);
        }

        match &result {
            Ok(body) => {
                debug!(key = %spec.key(), "Source refreshed");
                spec.notify_success(body);
                if manual {
                    self.notifier.notify(SyncNotice::SourceRefreshed {
                        message: descriptor.success_message.clone(),
                    });
                }
            }
            Err(e) => {
                warn!(key = %spec.key(), url = %descriptor.url, error = %e, "Source refresh failed");
                spec.notify_error(e);
                self.notifier.notify(SyncNotice::source_failed(
                    spec.key(),
                    descriptor.error_message.as_deref(),
                ));
            }
        }
        result
    }

    fn unknown_source(&self, key: &SourceKey) -> Result<Value, PullError> {
        warn!(key = %key, "Refresh requested for unknown source");
        self.notifier.notify(SyncNotice::source_failed(key, None));
        Err(PullError::UnknownSource(key.to_string()))
    }

    // ========================================================================
    // Push channel input
    // ========================================================================

    /// Completes a pending push cycle early
    ///
    /// Returns false for an acknowledgement with nothing pending.
    pub fn acknowledge_push_refresh(&self) -> bool {
        match lock(&self.pending_ack).take() {
            Some(pending) => {
                debug!(cycle_id = pending.cycle_id, "Push refresh acknowledged");
                // The cycle may have timed out between take and send
                let _ = pending.tx.send(());
                true
            }
            None => {
                debug!("Late refresh acknowledgement ignored");
                false
            }
        }
    }

    /// Records data that arrived over the push channel
    ///
    /// A source bound to `event` gets its success callback. Freshness is
    /// advanced (monotonically) when the event was dispatched or matched a
    /// source. Returns whether the freshness timestamp moved.
    pub fn record_push_data(&self, event: &str, payload: &Value, dispatched: bool) -> bool {
        let config = self.config();
        let matched = config.source_for_event(event);
        if let Some(spec) = matched {
            debug!(key = %spec.key(), event, "Source delivered over push");
            spec.notify_success(payload);
        }
        if !dispatched && matched.is_none() {
            debug!(event, "Unhandled push event, freshness unchanged");
            return false;
        }

        let now = Utc::now();
        let (changed, enabled, last) = {
            let mut state = lock(&self.state);
            let changed = state.touch(now);
            (changed, state.enabled, state.last_refreshed_at)
        };
        self.notifier
            .ui()
            .set_last_refreshed_text(&freshness_label(last, now, enabled));
        changed
    }

    fn connected_push(&self) -> Option<&ConnectionSupervisor> {
        self.push
            .as_deref()
            .filter(|supervisor| supervisor.is_connected())
    }
}
