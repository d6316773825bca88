// ── Device status ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of `/system/resource` plus the device identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub identity: String,
    pub board_name: Option<String>,
    pub version: Option<String>,
    pub architecture: Option<String>,
    /// As reported by the device, e.g. `"3d04h12m5s"`.
    pub uptime: Option<String>,
    pub cpu_load_pct: Option<u8>,
    pub cpu_count: Option<u32>,
    pub free_memory: Option<u64>,
    pub total_memory: Option<u64>,
    pub free_disk: Option<u64>,
    pub total_disk: Option<u64>,
    pub fetched_at: DateTime<Utc>,
}

impl DeviceStatus {
    /// Used memory as a percentage of total, when both figures are known.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn memory_used_pct(&self) -> Option<f64> {
        match (self.free_memory, self.total_memory) {
            (Some(free), Some(total)) if total > 0 => {
                Some(total.saturating_sub(free) as f64 * 100.0 / total as f64)
            }
            _ => None,
        }
    }
}
