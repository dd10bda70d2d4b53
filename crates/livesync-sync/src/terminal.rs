//! Remote terminal sessions over the push channel
//!
//! A [`RemoteTerminal`] sends `terminal_input` frames for one session and
//! receives that session's `terminal_output` frames. Output for other
//! sessions never reaches it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use livesync_core::domain::{OutboundMessage, SessionId};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::lock;
use crate::supervisor::ConnectionSupervisor;
use crate::SyncError;

/// Number of commands kept in the history
pub const HISTORY_LIMIT: usize = 50;

/// Command handled locally instead of being forwarded
const LOCAL_CLEAR: &str = "clear";

/// Errors of a terminal session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TerminalError {
    /// The push channel is not connected
    #[error("Not connected")]
    NotConnected,

    /// The push channel rejected the frame
    #[error("Failed to send: {0}")]
    Send(String),

    /// The session was closed
    #[error("Terminal session closed")]
    Closed,
}

impl From<SyncError> for TerminalError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotConnected => TerminalError::NotConnected,
            other => TerminalError::Send(other.to_string()),
        }
    }
}

/// What happened to a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Forwarded to the server
    Sent,
    /// `clear`: the embedder should clear its output view
    ClearedLocally,
    /// Blank line, nothing sent
    Ignored,
}

/// One remote terminal session
pub struct RemoteTerminal {
    session_id: SessionId,
    supervisor: Arc<ConnectionSupervisor>,
    output: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    bytes: AtomicU64,
    history: Mutex<VecDeque<String>>,
    closed: AtomicBool,
}

impl RemoteTerminal {
    /// Opens a session and starts routing its output
    pub fn open(session_id: SessionId, supervisor: Arc<ConnectionSupervisor>) -> Self {
        let output = supervisor.register_terminal(&session_id);
        info!(session_id = %session_id, "Terminal session opened");
        Self {
            session_id,
            supervisor,
            output: tokio::sync::Mutex::new(output),
            bytes: AtomicU64::new(0),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Submits one command line
    ///
    /// Blank lines are ignored. `clear` is recorded but not forwarded.
    ///
    /// # Errors
    /// `TerminalError::NotConnected` when the push channel is down,
    /// `TerminalError::Closed` after [`RemoteTerminal::close`]
    pub async fn send_command(&self, command: &str) -> Result<CommandOutcome, TerminalError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TerminalError::Closed);
        }
        let command = command.trim();
        if command.is_empty() {
            return Ok(CommandOutcome::Ignored);
        }

        self.remember(command);
        if command == LOCAL_CLEAR {
            debug!(session_id = %self.session_id, "Terminal cleared locally");
            return Ok(CommandOutcome::ClearedLocally);
        }

        let message = OutboundMessage::TerminalInput {
            command: command.to_string(),
            session_id: self.session_id.clone(),
        };
        self.supervisor.send(&message).await?;
        self.bytes
            .fetch_add(command.len() as u64, Ordering::Relaxed);
        debug!(session_id = %self.session_id, bytes = command.len(), "Terminal command sent");
        Ok(CommandOutcome::Sent)
    }

    /// Waits for the next output chunk of this session
    ///
    /// Returns `None` once the session is closed.
    pub async fn recv_output(&self) -> Option<String> {
        let chunk = self.output.lock().await.recv().await?;
        self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        Some(chunk)
    }

    /// Ends the session on the server and stops routing output
    ///
    /// The disconnect frame is best-effort; a closed channel has no session
    /// to end.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let message = OutboundMessage::DisconnectSession {
            session_id: self.session_id.clone(),
        };
        if let Err(e) = self.supervisor.send(&message).await {
            debug!(session_id = %self.session_id, error = %e, "Disconnect frame not sent");
        }
        self.supervisor.unregister_terminal(&self.session_id);
        self.output.lock().await.close();
        info!(
            session_id = %self.session_id,
            transferred = %format_bytes(self.bytes_transferred()),
            "Terminal session closed"
        );
    }

    /// Command and output bytes seen so far
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Submitted commands, oldest first
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).iter().cloned().collect()
    }

    fn remember(&self, command: &str) {
        let mut history = lock(&self.history);
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(command.to_string());
    }
}

/// `512 B`, `1.50 KB`, `2.00 MB`
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let value = bytes as f64;
    if value < KB {
        format!("{bytes} B")
    } else if value < MB {
        format!("{:.2} KB", value / KB)
    } else {
        format!("{:.2} MB", value / MB)
    }
}
