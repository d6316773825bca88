//! `interfaces` and `watch`: counters and EMA-smoothed throughput.

use std::time::Duration;

use tabled::Tabled;
use tokio::time::MissedTickBehavior;

use routerdash_core::{ConnectionState, DeviceClient, Interface};

use crate::cli::{OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output::{self, Render};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "RX")]
    rx_total: String,
    #[tabled(rename = "TX")]
    tx_total: String,
    #[tabled(rename = "RX rate")]
    rx_rate: String,
    #[tabled(rename = "TX rate")]
    tx_rate: String,
}

impl InterfaceRow {
    fn new(i: &Interface, color: bool) -> Self {
        let state = if i.disabled {
            output::status_word("disabled", false, color)
        } else if i.running {
            output::status_word("up", true, color)
        } else {
            output::status_word("down", false, color)
        };
        Self {
            name: i.name.clone(),
            kind: output::or_dash(i.interface_type.as_deref()),
            state,
            rx_total: output::fmt_bytes(i.rx_bytes),
            tx_total: output::fmt_bytes(i.tx_bytes),
            rx_rate: output::fmt_rate(i.rx_rate),
            tx_rate: output::fmt_rate(i.tx_rate),
        }
    }
}

fn render_interfaces(interfaces: &[Interface], render: &Render) -> Result<String, CliError> {
    output::render_list(
        render.format,
        interfaces,
        |i| InterfaceRow::new(i, render.color),
        |i| i.name.clone(),
    )
}

pub async fn handle(client: &DeviceClient, render: &Render) -> Result<(), CliError> {
    let interfaces = client.get_interfaces().await?;
    output::print_output(&render_interfaces(&interfaces, render)?, render.quiet);
    Ok(())
}

/// Poll every `interval` seconds until Ctrl-C or `count` polls.
///
/// Rates start at zero: the first poll only seeds the counters.
pub async fn watch(client: &DeviceClient, args: WatchArgs, render: &Render) -> Result<(), CliError> {
    if args.interval == 0 {
        return Err(CliError::Validation {
            field: "interval".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        match client.get_interfaces().await {
            Ok(interfaces) => {
                let out = render_interfaces(&interfaces, render)?;
                if render.format == OutputFormat::Table && !render.quiet {
                    println!("{}", chrono::Local::now().format("%H:%M:%S"));
                }
                output::print_output(&out, render.quiet);
            }
            Err(e) => {
                if client.connection().state() == ConnectionState::ReconnectExhausted {
                    return Err(e.into());
                }
                tracing::warn!(error = %e, "poll failed, will retry");
            }
        }

        polls += 1;
        if args.count.is_some_and(|max| polls >= max) {
            break;
        }
    }
    Ok(())
}
