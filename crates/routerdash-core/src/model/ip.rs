// ── IP-layer tables: routes, ARP, DHCP leases ──

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub dst_address: String,
    pub gateway: Option<String>,
    pub distance: Option<u32>,
    pub active: bool,
    pub dynamic: bool,
    pub disabled: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpEntry {
    pub id: String,
    pub address: String,
    pub mac_address: Option<String>,
    pub interface: Option<String>,
    pub dynamic: bool,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpLease {
    pub id: String,
    pub address: String,
    pub mac_address: Option<String>,
    pub host_name: Option<String>,
    pub server: Option<String>,
    /// `bound`, `waiting`, `offered`, ...
    pub status: Option<String>,
    pub expires_after: Option<String>,
    pub dynamic: bool,
}
