// ── Firewall rules ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Which `/ip/firewall` table a rule lives in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FirewallTable {
    Filter,
    Nat,
    Mangle,
}

impl FirewallTable {
    /// The print command for this table.
    pub fn print_command(self) -> &'static str {
        match self {
            Self::Filter => "/ip/firewall/filter/print",
            Self::Nat => "/ip/firewall/nat/print",
            Self::Mangle => "/ip/firewall/mangle/print",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub id: String,
    pub table: FirewallTable,
    pub chain: String,
    pub action: Option<String>,
    pub protocol: Option<String>,
    pub src_address: Option<String>,
    pub dst_address: Option<String>,
    pub dst_port: Option<String>,
    pub in_interface: Option<String>,
    pub out_interface: Option<String>,
    pub disabled: bool,
    pub bytes: Option<u64>,
    pub packets: Option<u64>,
    pub comment: Option<String>,
}
