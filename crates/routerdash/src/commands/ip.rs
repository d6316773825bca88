//! `routes`, `arp`, `dhcp`: IP-layer tables.

use tabled::Tabled;

use routerdash_core::{ArpEntry, DeviceClient, DhcpLease, Route};

use crate::error::CliError;
use crate::output::{self, Render, or_dash};

fn flags(pairs: &[(bool, char)]) -> String {
    pairs
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, c)| *c)
        .collect()
}

// ── Routes ──────────────────────────────────────────────────────────

#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "Flags")]
    flags: String,
    #[tabled(rename = "Destination")]
    dst: String,
    #[tabled(rename = "Gateway")]
    gateway: String,
    #[tabled(rename = "Distance")]
    distance: String,
    #[tabled(rename = "Comment")]
    comment: String,
}

impl RouteRow {
    fn new(r: &Route) -> Self {
        Self {
            flags: flags(&[(r.active, 'A'), (r.dynamic, 'D'), (r.disabled, 'X')]),
            dst: r.dst_address.clone(),
            gateway: or_dash(r.gateway.as_deref()),
            distance: or_dash(r.distance),
            comment: r.comment.clone().unwrap_or_default(),
        }
    }
}

pub async fn routes(client: &DeviceClient, render: &Render) -> Result<(), CliError> {
    let routes = client.get_routes().await?;
    let out = output::render_list(render.format, &routes, RouteRow::new, |r| {
        r.dst_address.clone()
    })?;
    output::print_output(&out, render.quiet);
    Ok(())
}

// ── ARP ─────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct ArpRow {
    #[tabled(rename = "Flags")]
    flags: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Interface")]
    interface: String,
}

impl ArpRow {
    fn new(a: &ArpEntry) -> Self {
        Self {
            flags: flags(&[(a.dynamic, 'D'), (a.complete, 'C')]),
            address: a.address.clone(),
            mac: or_dash(a.mac_address.as_deref()),
            interface: or_dash(a.interface.as_deref()),
        }
    }
}

pub async fn arp(client: &DeviceClient, render: &Render) -> Result<(), CliError> {
    let entries = client.get_arp_table().await?;
    let out = output::render_list(render.format, &entries, ArpRow::new, |a| a.address.clone())?;
    output::print_output(&out, render.quiet);
    Ok(())
}

// ── DHCP ────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct LeaseRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Expires")]
    expires: String,
    #[tabled(rename = "Server")]
    server: String,
}

impl LeaseRow {
    fn new(l: &DhcpLease) -> Self {
        Self {
            address: l.address.clone(),
            mac: or_dash(l.mac_address.as_deref()),
            host: or_dash(l.host_name.as_deref()),
            status: or_dash(l.status.as_deref()),
            expires: or_dash(l.expires_after.as_deref()),
            server: or_dash(l.server.as_deref()),
        }
    }
}

pub async fn dhcp(client: &DeviceClient, render: &Render) -> Result<(), CliError> {
    let leases = client.get_dhcp_leases().await?;
    let out = output::render_list(render.format, &leases, LeaseRow::new, |l| l.address.clone())?;
    output::print_output(&out, render.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_flags_follow_routeros_letters() {
        let route = Route {
            id: "*1".into(),
            dst_address: "0.0.0.0/0".into(),
            gateway: Some("192.168.1.1".into()),
            distance: Some(1),
            active: true,
            dynamic: true,
            disabled: false,
            comment: None,
        };
        let row = RouteRow::new(&route);
        assert_eq!(row.flags, "AD");
        assert_eq!(row.distance, "1");
        assert_eq!(row.comment, "");
    }
}
