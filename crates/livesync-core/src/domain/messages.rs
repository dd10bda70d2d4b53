//! Push-channel message types
//!
//! Outbound frames are serialized as `{"event": <name>, "data": {...}}`.
//! Inbound frames carry their tag in either a `type` or an `event` field;
//! their payload is the `data` field when present, otherwise the whole
//! object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::ProtocolError;
use super::newtypes::SessionId;

/// Scope used by refresh requests that cover every source
pub const REFRESH_SCOPE_ALL: &str = "all";

// ============================================================================
// Outbound
// ============================================================================

/// A message sent to the server over the push channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Ask the server to push fresh data
    RequestRefresh {
        #[serde(rename = "type")]
        scope: String,
    },
    /// Propagate the client's refresh interval to the server scheduler
    SetRefreshInterval {
        #[serde(rename = "type")]
        scope: String,
        /// Interval in milliseconds
        interval: u32,
    },
    /// Bind this connection to a server-side session
    Authenticate { session_id: SessionId },
    /// A command line typed into a remote terminal
    TerminalInput {
        command: String,
        session_id: SessionId,
    },
    /// Close a remote terminal session
    DisconnectSession { session_id: SessionId },
}

impl OutboundMessage {
    /// `request_refresh {type: "all"}`
    pub fn request_refresh_all() -> Self {
        OutboundMessage::RequestRefresh {
            scope: REFRESH_SCOPE_ALL.to_string(),
        }
    }

    /// `set_refresh_interval {type: "all", interval}`
    pub fn set_refresh_interval_all(interval_ms: u32) -> Self {
        OutboundMessage::SetRefreshInterval {
            scope: REFRESH_SCOPE_ALL.to_string(),
            interval: interval_ms,
        }
    }

    /// Wire name of this message
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundMessage::RequestRefresh { .. } => "request_refresh",
            OutboundMessage::SetRefreshInterval { .. } => "set_refresh_interval",
            OutboundMessage::Authenticate { .. } => "authenticate",
            OutboundMessage::TerminalInput { .. } => "terminal_input",
            OutboundMessage::DisconnectSession { .. } => "disconnect_session",
        }
    }

    /// Serializes the message into a text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Payload of `refresh_acknowledged`
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct RefreshAck {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub refresh_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of `refresh_interval_updated`
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct IntervalUpdate {
    #[serde(default)]
    pub refresh_type: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct IntervalErrorPayload {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct TerminalOutputPayload {
    session_id: String,
    output: String,
}

fn default_true() -> bool {
    true
}

/// A decoded message received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The server accepted a `request_refresh`
    RefreshAcknowledged(RefreshAck),
    /// The server applied a `set_refresh_interval`
    RefreshIntervalUpdated(IntervalUpdate),
    /// The server rejected a `set_refresh_interval`
    RefreshIntervalError { message: String },
    /// A chunk of remote terminal output
    TerminalOutput { session_id: String, output: String },
    /// Any other event, dispatched through the handler table
    Data { event: String, payload: Value },
}

impl InboundMessage {
    /// Decodes one text frame
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] when the frame is not a JSON object with
    /// an `event`/`type` tag, or when a control message has the wrong shape.
    /// `event` wins when both are present, since `{event, data}` is the
    /// envelope this client sends.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let event = tag_of(&object).ok_or(ProtocolError::MissingTag)?;
        let payload = match object.remove("data") {
            Some(data) => data,
            None => Value::Object(object),
        };

        let invalid = |e: serde_json::Error| ProtocolError::InvalidPayload {
            event: event.clone(),
            reason: e.to_string(),
        };

        let message = match event.as_str() {
            "refresh_acknowledged" => {
                InboundMessage::RefreshAcknowledged(serde_json::from_value(payload).map_err(invalid)?)
            }
            "refresh_interval_updated" => InboundMessage::RefreshIntervalUpdated(
                serde_json::from_value(payload).map_err(invalid)?,
            ),
            "refresh_interval_error" => {
                let p: IntervalErrorPayload = serde_json::from_value(payload).map_err(invalid)?;
                InboundMessage::RefreshIntervalError {
                    message: p.message.unwrap_or_else(|| "Unknown error".to_string()),
                }
            }
            "terminal_output" => {
                let p: TerminalOutputPayload = serde_json::from_value(payload).map_err(invalid)?;
                InboundMessage::TerminalOutput {
                    session_id: p.session_id,
                    output: p.output,
                }
            }
            _ => InboundMessage::Data { event, payload },
        };
        Ok(message)
    }

    /// Wire name of this message
    pub fn event_name(&self) -> &str {
        match self {
            InboundMessage::RefreshAcknowledged(_) => "refresh_acknowledged",
            InboundMessage::RefreshIntervalUpdated(_) => "refresh_interval_updated",
            InboundMessage::RefreshIntervalError { .. } => "refresh_interval_error",
            InboundMessage::TerminalOutput { .. } => "terminal_output",
            InboundMessage::Data { event, .. } => event,
        }
    }
}

fn tag_of(object: &Map<String, Value>) -> Option<String> {
    ["event", "type"]
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}
