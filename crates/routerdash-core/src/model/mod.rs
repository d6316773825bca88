// ── Domain model ──
//
// Named-field views over the attribute rows the device returns. Values the
// device reports as free text (uptime, lease expiry) are kept verbatim.

pub mod firewall;
pub mod health;
pub mod interface;
pub mod ip;
pub mod log;
pub mod status;

pub use firewall::{FirewallRule, FirewallTable};
pub use health::Health;
pub use interface::Interface;
pub use ip::{ArpEntry, DhcpLease, Route};
pub use log::LogEntry;
pub use status::DeviceStatus;
