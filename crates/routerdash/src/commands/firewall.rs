//! `firewall`: rules across filter, nat and mangle.

use tabled::Tabled;

use routerdash_core::{DeviceClient, FirewallRule};

use crate::cli::FirewallArgs;
use crate::error::CliError;
use crate::output::{self, Render, or_dash};

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Chain")]
    chain: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Proto")]
    protocol: String,
    #[tabled(rename = "Src")]
    src: String,
    #[tabled(rename = "Dst")]
    dst: String,
    #[tabled(rename = "In/Out")]
    ifaces: String,
    #[tabled(rename = "Bytes")]
    bytes: String,
    #[tabled(rename = "Comment")]
    comment: String,
}

impl RuleRow {
    fn new(r: &FirewallRule, color: bool) -> Self {
        let chain = if r.disabled {
            output::status_word(&format!("{} (off)", r.chain), false, color)
        } else {
            r.chain.clone()
        };
        let dst = match (&r.dst_address, &r.dst_port) {
            (Some(addr), Some(port)) => format!("{addr}:{port}"),
            (None, Some(port)) => format!(":{port}"),
            (addr, None) => or_dash(addr.as_deref()),
        };
        Self {
            table: r.table.to_string(),
            chain,
            action: or_dash(r.action.as_deref()),
            protocol: or_dash(r.protocol.as_deref()),
            src: or_dash(r.src_address.as_deref()),
            dst,
            ifaces: format!(
                "{}/{}",
                or_dash(r.in_interface.as_deref()),
                or_dash(r.out_interface.as_deref())
            ),
            bytes: r.bytes.map(output::fmt_bytes).unwrap_or_default(),
            comment: r.comment.clone().unwrap_or_default(),
        }
    }
}

pub async fn handle(
    client: &DeviceClient,
    args: FirewallArgs,
    render: &Render,
) -> Result<(), CliError> {
    let mut rules = client.get_firewall_rules().await?;
    if let Some(table) = args.table {
        rules.retain(|r| r.table == table);
    }
    let out = output::render_list(
        render.format,
        &rules,
        |r| RuleRow::new(r, render.color),
        |r| format!("{} {} {}", r.table, r.chain, r.id),
    )?;
    output::print_output(&out, render.quiet);
    Ok(())
}
