//! Push-channel supervision
//!
//! The [`ConnectionSupervisor`] is the only writer of [`ConnectionState`].
//! It drives an [`IPushChannel`] through
//!
//! ```text
//! Disconnected ──connect()──→ Connecting ──on_open──→ Connected
//!      ▲                          │                       │
//!      └──── reconnect timer ◄────┴─── connect error ─────┴── on_close
//! ```
//!
//! and decodes inbound frames. Results flow to the rest of the system as
//! [`SupervisorEvent`]s on an unbounded channel.
//!
//! ## Epochs
//!
//! Every connect attempt gets a fresh epoch and its own observer. Callbacks
//! carrying an older epoch (a late close from a replaced connection, frames
//! after a user disconnect) are ignored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use chrono::Utc;
use livesync_core::domain::{
    ConnectionState, ConnectionStatus, InboundMessage, OutboundMessage, ReconnectPolicy,
    RefreshAck, SessionId,
};
use livesync_core::ports::{IPushChannel, IPushObserver};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::lock;
use crate::notifier::{Notifier, SyncNotice};
use crate::SyncError;

/// Handler for push events: `(event name, payload)`
pub type EventHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// What the supervisor reports to the rest of the system
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// The channel opened
    Connected,
    /// The channel closed or a connect attempt failed
    Disconnected,
    /// A data event arrived
    DataReceived {
        event: String,
        payload: Value,
        /// Whether a registered handler consumed the event
        dispatched: bool,
    },
    /// The server acknowledged a `request_refresh`
    RefreshAcknowledged(RefreshAck),
}

struct Reconnect {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SupervisorInner {
    state: ConnectionState,
    epoch: u64,
    reconnect: Option<Reconnect>,
    next_reconnect_id: u64,
}

impl SupervisorInner {
    fn cancel_reconnect(&mut self) {
        if let Some(reconnect) = self.reconnect.take() {
            reconnect.handle.abort();
        }
    }
}

#[derive(Default)]
struct HandlerTable {
    by_event: HashMap<String, EventHandler>,
    catch_all: Option<EventHandler>,
}

/// Supervises one push channel
pub struct ConnectionSupervisor {
    me: Weak<ConnectionSupervisor>,
    channel: Arc<dyn IPushChannel>,
    policy: ReconnectPolicy,
    session_id: Option<SessionId>,
    notifier: Arc<Notifier>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    inner: Mutex<SupervisorInner>,
    handlers: RwLock<HandlerTable>,
    terminals: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl ConnectionSupervisor {
    pub fn new(
        channel: Arc<dyn IPushChannel>,
        policy: ReconnectPolicy,
        session_id: Option<SessionId>,
        notifier: Arc<Notifier>,
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            channel,
            policy,
            session_id,
            notifier,
            events,
            inner: Mutex::new(SupervisorInner::default()),
            handlers: RwLock::new(HandlerTable::default()),
            terminals: Mutex::new(HashMap::new()),
        })
    }

    /// Copy of the current connection state
    pub fn state(&self) -> ConnectionState {
        lock(&self.inner).state.clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).state.is_connected()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Makes one connection attempt
    ///
    /// Ignored unless the channel is disconnected. A failed attempt is
    /// handled like a close: a reconnect is scheduled per the policy.
    pub async fn connect(&self) {
        let epoch = {
            let mut inner = lock(&self.inner);
            if let Err(e) = inner.state.begin_connect() {
                debug!(error = %e, "Connect ignored");
                return;
            }
            inner.epoch += 1;
            inner.epoch
        };

        info!(epoch, "Connecting push channel");
        let observer: Arc<dyn IPushObserver> = Arc::new(EpochObserver {
            supervisor: self.me.clone(),
            epoch,
        });

        match self.channel.connect(observer).await {
            Ok(()) => self.authenticate(epoch).await,
            Err(e) => {
                warn!(epoch, error = %e, "Push channel connect failed");
                self.handle_close(epoch, Some(e.to_string()));
            }
        }
    }

    /// User-initiated close: cancels reconnects and does not reschedule
    pub async fn disconnect(&self) {
        let was_active = {
            let mut inner = lock(&self.inner);
            inner.epoch += 1;
            inner.cancel_reconnect();
            inner.state.attempts = 0;
            let was_active = inner.state.status != ConnectionStatus::Disconnected;
            inner.state.closed(None);
            was_active
        };

        if let Err(e) = self.channel.disconnect().await {
            warn!(error = %e, "Error closing push channel");
        }
        if was_active {
            info!("Push channel disconnected by user");
            self.notifier.ui().set_connected_indicator(false);
            self.emit(SupervisorEvent::Disconnected);
        }
    }

    /// Aborts a pending reconnect without touching the channel
    pub fn cancel_reconnect(&self) {
        let mut inner = lock(&self.inner);
        inner.cancel_reconnect();
        inner.state.reconnect_deadline = None;
    }

    /// Sends one message if connected
    ///
    /// # Errors
    /// `SyncError::NotConnected` when the channel is not open,
    /// `SyncError::Channel` when the adapter fails
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), SyncError> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        debug!(event = message.event_name(), "Sending push message");
        self.channel
            .send(message)
            .await
            .map_err(|e| SyncError::Channel(e.to_string()))
    }

    async fn authenticate(&self, epoch: u64) {
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        if !self.is_current(epoch) || !self.is_connected() {
            return;
        }
        let message = OutboundMessage::Authenticate { session_id };
        if let Err(e) = self.send(&message).await {
            warn!(error = %e, "Failed to authenticate push session");
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        lock(&self.inner).epoch == epoch
    }

    fn emit(&self, event: SupervisorEvent) {
        if self.events.send(event).is_err() {
            debug!("Supervisor event dropped, receiver closed");
        }
    }

    // ========================================================================
    // Observer callbacks
    // ========================================================================

    fn handle_open(&self, epoch: u64) {
        {
            let mut inner = lock(&self.inner);
            if inner.epoch != epoch {
                debug!(epoch, "Stale open ignored");
                return;
            }
            inner.cancel_reconnect();
            inner.state.opened();
        }

        info!(epoch, "Push channel connected");
        self.notifier.ui().set_connected_indicator(true);
        self.notifier.notify(SyncNotice::PushConnected);
        self.emit(SupervisorEvent::Connected);
    }

    fn handle_close(&self, epoch: u64, reason: Option<String>) {
        {
            let mut inner = lock(&self.inner);
            if inner.epoch != epoch {
                debug!(epoch, "Stale close ignored");
                return;
            }
            if inner.state.status == ConnectionStatus::Disconnected {
                debug!(epoch, "Duplicate close ignored");
                return;
            }
            inner.cancel_reconnect();
            inner.state.attempts += 1;
            let attempt = inner.state.attempts;

            match self.policy.delay_for(attempt) {
                Some(delay) => {
                    let deadline = chrono::Duration::from_std(delay)
                        .ok()
                        .map(|d| Utc::now() + d);
                    inner.state.closed(deadline);
                    inner.next_reconnect_id += 1;
                    let id = inner.next_reconnect_id;
                    let supervisor = self.me.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Some(supervisor) = supervisor.upgrade() {
                            supervisor.reconnect_due(id).await;
                        }
                    });
                    inner.reconnect = Some(Reconnect { id, handle });
                    info!(
                        reason = reason.as_deref().unwrap_or("unknown"),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Push channel disconnected, reconnect scheduled"
                    );
                }
                None => {
                    inner.state.closed(None);
                    error!(
                        attempts = attempt - 1,
                        "Push channel disconnected, reconnect attempts exhausted"
                    );
                }
            }
        }

        self.notifier.ui().set_connected_indicator(false);
        self.emit(SupervisorEvent::Disconnected);
    }

    async fn reconnect_due(&self, id: u64) {
        {
            let mut inner = lock(&self.inner);
            match &inner.reconnect {
                // Detach rather than abort: this code runs inside that task
                Some(reconnect) if reconnect.id == id => inner.reconnect = None,
                _ => return,
            }
        }
        debug!("Reconnect timer fired");
        self.connect().await;
    }

    fn handle_error(&self, epoch: u64, message: String) {
        error!(epoch, error = %message, "Push channel error");
    }

    fn handle_frame(&self, epoch: u64, text: String) {
        if !self.is_current(epoch) {
            debug!(epoch, "Frame from stale connection ignored");
            return;
        }

        let message = match InboundMessage::decode(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed push frame");
                return;
            }
        };

        match message {
            InboundMessage::RefreshAcknowledged(ack) => {
                debug!(message = ack.message.as_deref().unwrap_or(""), "Refresh acknowledged");
                self.emit(SupervisorEvent::RefreshAcknowledged(ack));
            }
            InboundMessage::RefreshIntervalUpdated(update) => {
                let message = update
                    .message
                    .unwrap_or_else(|| "Refresh interval updated".to_string());
                info!(interval = ?update.interval, "Server refresh interval updated");
                self.notifier
                    .notify(SyncNotice::ServerIntervalUpdated { message });
            }
            InboundMessage::RefreshIntervalError { message } => {
                warn!(error = %message, "Server rejected refresh interval");
                self.notifier
                    .notify(SyncNotice::ServerIntervalError { message });
            }
            InboundMessage::TerminalOutput { session_id, output } => {
                self.route_terminal_output(&session_id, output);
            }
            InboundMessage::Data { event, payload } => {
                let dispatched = self.dispatch(&event, &payload);
                self.emit(SupervisorEvent::DataReceived {
                    event,
                    payload,
                    dispatched,
                });
            }
        }
    }

    // ========================================================================
    // Dispatch table
    // ========================================================================

    /// Registers the handler for one event name, replacing any previous one
    pub fn on_event<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(move |_, payload| handler(payload));
        let mut table = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        table.by_event.insert(event.into(), handler);
    }

    /// Registers the handler for events without a specific handler
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let mut table = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        table.catch_all = Some(Arc::new(handler));
    }

    /// Runs the handler for `event`; returns false if none matched
    fn dispatch(&self, event: &str, payload: &Value) -> bool {
        let handler = {
            let table = self.handlers.read().unwrap_or_else(|p| p.into_inner());
            table
                .by_event
                .get(event)
                .or(table.catch_all.as_ref())
                .cloned()
        };
        match handler {
            Some(handler) => {
                handler(event, payload);
                true
            }
            None => {
                debug!(event, "No handler for push event");
                false
            }
        }
    }

    // ========================================================================
    // Terminal routing
    // ========================================================================

    /// Routes `terminal_output` frames for `session_id` to the returned receiver
    pub fn register_terminal(&self, session_id: &SessionId) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.terminals).insert(session_id.as_str().to_string(), tx);
        rx
    }

    pub fn unregister_terminal(&self, session_id: &SessionId) {
        lock(&self.terminals).remove(session_id.as_str());
    }

    fn route_terminal_output(&self, session_id: &str, output: String) {
        let terminals = lock(&self.terminals);
        match terminals.get(session_id) {
            Some(tx) => {
                if tx.send(output).is_err() {
                    debug!(session_id, "Terminal receiver dropped");
                }
            }
            None => debug!(session_id, "Output for unknown terminal session ignored"),
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        lock(&self.inner).cancel_reconnect();
    }
}

/// Observer bound to a single connect attempt
struct EpochObserver {
    supervisor: Weak<ConnectionSupervisor>,
    epoch: u64,
}

impl IPushObserver for EpochObserver {
    fn on_open(&self) {
        if let Some(supervisor) = self.supervisor.upgrade() {
            supervisor.handle_open(self.epoch);
        }
    }

    fn on_close(&self, reason: Option<String>) {
        if let Some(supervisor) = self.supervisor.upgrade() {
            supervisor.handle_close(self.epoch, reason);
        }
    }

    fn on_error(&self, message: String) {
        if let Some(supervisor) = self.supervisor.upgrade() {
            supervisor.handle_error(self.epoch, message);
        }
    }

    fn on_frame(&self, text: String) {
        if let Some(supervisor) = self.supervisor.upgrade() {
            supervisor.handle_frame(self.epoch, text);
        }
    }
}
