//! livesync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `SourceKey`, `TimerKey`, `RefreshState`, `ConnectionState`, `SyncConfig`, `CycleReport`
//! - **Messages** - `OutboundMessage` / `InboundMessage` for the push channel
//! - **Port definitions** - Traits for adapters: `IPullTransport`, `IPushChannel`, `ISettingsStore`, `IUserInterface`
//! - **Configuration** - YAML-backed `Config` with validation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure data and rules with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! The `livesync-sync` crate orchestrates domain types through the ports.

pub mod config;
pub mod domain;
pub mod ports;
