// ── Row-to-domain conversions ──
//
// Maps the attribute rows returned by `routerdash_api` onto the named
// structs in `crate::model`. Purely a renaming exercise: numbers and
// booleans are parsed, text is passed through, missing attributes become
// `None` or `false`.

use chrono::Utc;
use routerdash_api::Row;

use crate::model::{
    ArpEntry, DeviceStatus, DhcpLease, FirewallRule, FirewallTable, Interface, LogEntry, Route,
};
use crate::rate::Rates;

// ── Helpers ────────────────────────────────────────────────────────

fn text(row: &Row, key: &str) -> Option<String> {
    row.get(key).filter(|v| !v.is_empty()).cloned()
}

fn text_or_default(row: &Row, key: &str) -> String {
    row.get(key).cloned().unwrap_or_default()
}

/// RouterOS booleans are `"true"` / `"false"`; some older builds use
/// `"yes"` / `"no"`.
fn flag(row: &Row, key: &str) -> bool {
    matches!(row.get(key).map(String::as_str), Some("true" | "yes"))
}

fn number<T: std::str::FromStr>(row: &Row, key: &str) -> Option<T> {
    row.get(key).and_then(|v| v.trim().parse().ok())
}

fn id(row: &Row) -> String {
    text_or_default(row, ".id")
}

// ── Status ─────────────────────────────────────────────────────────

/// Build a status snapshot from one `/system/resource/print` row.
pub(crate) fn device_status(resource: &Row, identity: String) -> DeviceStatus {
    DeviceStatus {
        identity,
        board_name: text(resource, "board-name"),
        version: text(resource, "version"),
        architecture: text(resource, "architecture-name"),
        uptime: text(resource, "uptime"),
        cpu_load_pct: number(resource, "cpu-load"),
        cpu_count: number(resource, "cpu-count"),
        free_memory: number(resource, "free-memory"),
        total_memory: number(resource, "total-memory"),
        free_disk: number(resource, "free-hdd-space"),
        total_disk: number(resource, "total-hdd-space"),
        fetched_at: Utc::now(),
    }
}

/// Identity name from `/system/identity/print`.
pub(crate) fn identity(rows: &[Row]) -> Option<String> {
    rows.first().and_then(|row| text(row, "name"))
}

// ── Interfaces ─────────────────────────────────────────────────────

/// Raw counters for rate tracking: `(name, rx_bytes, tx_bytes)`.
pub(crate) fn interface_counters(row: &Row) -> (String, u64, u64) {
    (
        text_or_default(row, "name"),
        number(row, "rx-byte").unwrap_or(0),
        number(row, "tx-byte").unwrap_or(0),
    )
}

pub(crate) fn interface(row: &Row, rates: Rates) -> Interface {
    let (name, rx_bytes, tx_bytes) = interface_counters(row);
    Interface {
        id: id(row),
        name,
        interface_type: text(row, "type"),
        mtu: number(row, "actual-mtu").or_else(|| number(row, "mtu")),
        mac_address: text(row, "mac-address"),
        running: flag(row, "running"),
        disabled: flag(row, "disabled"),
        rx_bytes,
        tx_bytes,
        rx_rate: rates.rx,
        tx_rate: rates.tx,
        comment: text(row, "comment"),
    }
}

// ── IP tables ──────────────────────────────────────────────────────

impl From<&Row> for Route {
    fn from(row: &Row) -> Self {
        Self {
            id: id(row),
            dst_address: text_or_default(row, "dst-address"),
            gateway: text(row, "gateway"),
            distance: number(row, "distance"),
            active: flag(row, "active"),
            dynamic: flag(row, "dynamic"),
            disabled: flag(row, "disabled"),
            comment: text(row, "comment"),
        }
    }
}

impl From<&Row> for ArpEntry {
    fn from(row: &Row) -> Self {
        Self {
            id: id(row),
            address: text_or_default(row, "address"),
            mac_address: text(row, "mac-address"),
            interface: text(row, "interface"),
            dynamic: flag(row, "dynamic"),
            complete: flag(row, "complete"),
        }
    }
}

impl From<&Row> for DhcpLease {
    fn from(row: &Row) -> Self {
        Self {
            id: id(row),
            address: text_or_default(row, "address"),
            mac_address: text(row, "mac-address"),
            host_name: text(row, "host-name"),
            server: text(row, "server"),
            status: text(row, "status"),
            expires_after: text(row, "expires-after"),
            dynamic: flag(row, "dynamic"),
        }
    }
}

impl From<&Row> for LogEntry {
    fn from(row: &Row) -> Self {
        Self {
            id: id(row),
            time: text(row, "time"),
            topics: row
                .get("topics")
                .map(|t| {
                    t.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            message: text_or_default(row, "message"),
        }
    }
}

// ── Firewall ───────────────────────────────────────────────────────

pub(crate) fn firewall_rule(table: FirewallTable, row: &Row) -> FirewallRule {
    FirewallRule {
        id: id(row),
        table,
        chain: text_or_default(row, "chain"),
        action: text(row, "action"),
        protocol: text(row, "protocol"),
        src_address: text(row, "src-address"),
        dst_address: text(row, "dst-address"),
        dst_port: text(row, "dst-port"),
        in_interface: text(row, "in-interface"),
        out_interface: text(row, "out-interface"),
        disabled: flag(row, "disabled"),
        bytes: number(row, "bytes"),
        packets: number(row, "packets"),
        comment: text(row, "comment"),
    }
}
