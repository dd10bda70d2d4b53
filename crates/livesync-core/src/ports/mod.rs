//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync layer
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IPullTransport`] - One-shot fetch of a data source
//! - [`IPushChannel`] / [`IPushObserver`] - Persistent push connection
//! - [`ISettingsStore`] - Persistent storage of user preferences
//! - [`IUserInterface`] - Toasts, loading affordances and indicators

pub mod notification;
pub mod pull_transport;
pub mod push_channel;
pub mod settings_store;

pub use notification::{IUserInterface, Notification, NotificationLevel};
pub use pull_transport::IPullTransport;
pub use push_channel::{IPushChannel, IPushObserver};
pub use settings_store::ISettingsStore;
