// ── Device log ──

use serde::{Deserialize, Serialize};

/// One line of the device log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub time: Option<String>,
    pub topics: Vec<String>,
    pub message: String,
}
