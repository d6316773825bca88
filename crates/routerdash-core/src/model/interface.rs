// ── Interfaces ──

use serde::{Deserialize, Serialize};

/// One entry of `/interface`, with smoothed throughput.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub id: String,
    pub name: String,
    pub interface_type: Option<String>,
    pub mtu: Option<u32>,
    pub mac_address: Option<String>,
    pub running: bool,
    pub disabled: bool,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    /// Bytes per second, EMA-smoothed across polls.
    pub rx_rate: f64,
    pub tx_rate: f64,
    pub comment: Option<String>,
}
