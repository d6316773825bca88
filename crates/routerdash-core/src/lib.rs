//! Device connection and command-execution client for RouterOS routers.
//!
//! This crate sits between `routerdash-api` (the wire protocol) and the
//! collaborators that need router data (CLI, dashboards, detection rules):
//!
//! - **[`DeviceClient`]**: Facade and the only type callers need. Every
//!   operation ensures a live session, then serves from the
//!   [`ResponseCache`] or issues work through the [`CommandQueue`].
//!   Interface reads feed the [`RateCalculator`] and are never cached.
//!
//! - **[`ConnectionManager`]**: Owns the single device session.
//!   Single-flight [`connect()`](ConnectionManager::connect), keepalive
//!   probes, loss detection via the session's close signal, and automatic
//!   reconnect with a capped backoff schedule until
//!   [`ConnectionState::ReconnectExhausted`].
//!
//! - **[`CommandQueue`]**: FIFO dispatcher. One drain task runs commands
//!   one at a time against the currently published session, each bounded
//!   by `command_timeout`.
//!
//! - **[`ResponseCache`]**: TTL memoization with hit/miss accounting,
//!   emptied whenever the session is lost.
//!
//! - **[`RateCalculator`]**: Byte counters to EMA-smoothed rates, per key
//!   and per direction.
//!
//! - **Domain model** ([`model`]): `DeviceStatus`, `Interface`, `Route`,
//!   `ArpEntry`, `FirewallRule`, `DhcpLease`, `LogEntry`, `Health`.

pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
mod convert;
pub mod error;
pub mod model;
pub mod queue;
pub mod rate;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{CacheStats, ResponseCache};
pub use client::DeviceClient;
pub use config::DeviceConfig;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use error::CoreError;
pub use queue::CommandQueue;
pub use rate::{RateCalculator, Rates};
pub use session::{Connector, DeviceSession, RouterOsConnector};

pub use routerdash_api::{Params, Row};

pub use model::{
    ArpEntry, DeviceStatus, DhcpLease, FirewallRule, FirewallTable, Health, Interface, LogEntry,
    Route,
};
