//! Domain entities and business logic
//!
//! This module contains the core domain types for livesync:
//! - Newtypes for source keys, timer keys and session ids
//! - Refresh and connection state records
//! - Source descriptors and the runtime `SyncConfig`
//! - Push-channel message types
//! - Cycle reports
//! - Domain-specific error types

pub mod connection;
pub mod cycle;
pub mod errors;
pub mod messages;
pub mod newtypes;
pub mod refresh;
pub mod source;

// Re-export commonly used types
pub use connection::{
    ConnectionState, ConnectionStatus, ReconnectPolicy, ReconnectStrategy, DEFAULT_RECONNECT_DELAY,
};
pub use cycle::{
    CycleReport, CycleTrigger, PushCompletion, RefreshOutcome, RouteKind, SkipReason,
    SourceFailure,
};
pub use errors::{DomainError, ProtocolError, PullError};
pub use messages::{InboundMessage, IntervalUpdate, OutboundMessage, RefreshAck};
pub use newtypes::*;
pub use refresh::{format_freshness, freshness_label, RefreshSettings, RefreshState};
pub use source::{
    ErrorCallback, FetchDescriptor, GlobalRefresh, SourceSpec, SuccessCallback, SyncConfig,
    SyncConfigBuilder, Timings, TransportPreference,
};
