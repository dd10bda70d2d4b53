//! Recurring refresh timers
//!
//! The [`TimerOrchestrator`] owns one tokio task per [`TimerKey`]. Either
//! every registered source gets its own timer, or (with no sources and a
//! global refresh callback) a single `general` timer runs. Never both.
//!
//! ## Generations
//!
//! ```text
//! start ──→ generation N tasks ──tick──→ lock table ──→ generation == N ? on_tick : exit
//!   ▲                                         │
//!   └──── stop/restart: abort tasks, N += 1 ──┘
//! ```
//!
//! A tick re-checks its generation under the table lock before calling
//! `on_tick`, and `restart` swaps generations under that same lock, so once
//! `restart` returns no tick of the old generation can fire.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use livesync_core::domain::{SourceKey, TimerKey};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::lock;

/// Callback run on every tick
///
/// Invoked while the timer table is locked: it must not block and must not
/// call back into the orchestrator. Spawning a task is the intended use.
pub type TickHandler = Arc<dyn Fn(TimerKey) + Send + Sync>;

#[derive(Default)]
struct TimerTable {
    generation: u64,
    handles: BTreeMap<TimerKey, JoinHandle<()>>,
}

impl TimerTable {
    fn clear(&mut self) -> usize {
        self.generation += 1;
        let count = self.handles.len();
        for (_, handle) in std::mem::take(&mut self.handles) {
            handle.abort();
        }
        count
    }
}

/// Owns the recurring refresh timers
#[derive(Default)]
pub struct TimerOrchestrator {
    table: Arc<Mutex<TimerTable>>,
}

impl TimerOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts one timer per source, or the general timer
    ///
    /// Any timers already running are stopped first. The first tick fires one
    /// full `interval` after the call. Returns the keys that got a timer.
    pub fn start(
        &self,
        sources: impl IntoIterator<Item = SourceKey>,
        has_global: bool,
        interval: Duration,
        on_tick: TickHandler,
    ) -> Vec<TimerKey> {
        let mut table = lock(&self.table);
        let stopped = table.clear();
        if stopped > 0 {
            debug!(count = stopped, "Stopped previous timers before start");
        }
        self.spawn_locked(&mut table, sources, has_global, interval, on_tick)
    }

    /// Stops every timer; idempotent
    pub fn stop(&self) {
        let stopped = lock(&self.table).clear();
        if stopped > 0 {
            info!(count = stopped, "Auto-refresh timers stopped");
        }
    }

    /// Stops and starts under one lock acquisition
    pub fn restart(
        &self,
        sources: impl IntoIterator<Item = SourceKey>,
        has_global: bool,
        interval: Duration,
        on_tick: TickHandler,
    ) -> Vec<TimerKey> {
        let mut table = lock(&self.table);
        table.clear();
        debug!(interval_ms = interval.as_millis() as u64, "Restarting timers");
        self.spawn_locked(&mut table, sources, has_global, interval, on_tick)
    }

    /// Keys with a live timer, in key order
    pub fn active_keys(&self) -> Vec<TimerKey> {
        lock(&self.table).handles.keys().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        !lock(&self.table).handles.is_empty()
    }

    /// Current generation; bumped by every stop
    pub fn generation(&self) -> u64 {
        lock(&self.table).generation
    }

    fn spawn_locked(
        &self,
        table: &mut TimerTable,
        sources: impl IntoIterator<Item = SourceKey>,
        has_global: bool,
        interval: Duration,
        on_tick: TickHandler,
    ) -> Vec<TimerKey> {
        let mut keys: Vec<TimerKey> = sources.into_iter().map(TimerKey::Source).collect();
        if keys.is_empty() && has_global {
            keys.push(TimerKey::General);
        }
        if keys.is_empty() {
            info!("No refresh endpoints or callback configured, no timers started");
            return keys;
        }

        // tokio intervals panic on a zero period
        let interval = interval.max(Duration::from_millis(1));
        let generation = table.generation;

        for key in &keys {
            let handle = tokio::spawn(tick_loop(
                Arc::clone(&self.table),
                generation,
                key.clone(),
                interval,
                Arc::clone(&on_tick),
            ));
            table.handles.insert(key.clone(), handle);
        }

        info!(
            count = keys.len(),
            interval_ms = interval.as_millis() as u64,
            generation,
            "Auto-refresh timers started"
        );
        keys
    }
}

impl Drop for TimerOrchestrator {
    fn drop(&mut self) {
        lock(&self.table).clear();
    }
}

async fn tick_loop(
    table: Arc<Mutex<TimerTable>>,
    generation: u64,
    key: TimerKey,
    interval: Duration,
    on_tick: TickHandler,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let guard = lock(&table);
        if guard.generation != generation {
            debug!(key = %key, generation, "Stale timer tick dropped");
            return;
        }
        debug!(key = %key, "Timer tick");
        on_tick(key.clone());
    }
}
