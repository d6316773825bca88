// ── Connection health ──

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStats;

/// What callers see about the connection without touching the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub connected: bool,
    /// `connected`, `reconnect_scheduled`, `reconnect_exhausted`, ...
    pub state: String,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub identity: Option<String>,
    pub reconnect_attempts: u32,
    /// Set once automatic reconnects have given up.
    pub needs_intervention: bool,
    pub cache: CacheStats,
}
