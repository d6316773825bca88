//! `health`: one connection attempt, then the client's health snapshot.

use routerdash_core::{DeviceClient, Health};

use crate::error::CliError;
use crate::output::{self, Render, or_dash};

fn detail(h: &Health, color: bool) -> String {
    let state = output::status_word(&h.state, h.connected, color);
    let mut lines = vec![
        format!("State:      {state}"),
        format!("Identity:   {}", or_dash(h.identity.as_deref())),
        format!(
            "Since:      {}",
            or_dash(h.connected_since.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC")))
        ),
        format!("Reconnects: {}", h.reconnect_attempts),
        format!(
            "Cache:      {} entries, {} hits, {} misses",
            h.cache.entries, h.cache.hits, h.cache.misses
        ),
    ];
    if let Some(err) = &h.last_error {
        lines.push(format!("Last error: {err}"));
    }
    if h.needs_intervention {
        lines.push("Automatic reconnects exhausted; manual intervention needed".into());
    }
    lines.join("\n")
}

pub async fn handle(client: &DeviceClient, render: &Render) -> Result<(), CliError> {
    // A failed attempt is reported through last_error, not as a failure.
    if let Err(e) = client.connect().await {
        tracing::debug!(error = %e, "connect failed");
    }
    let health = client.get_health().await;
    let out = output::render_single(
        render.format,
        &health,
        |h| detail(h, render.color),
        |h| h.state.clone(),
    )?;
    output::print_output(&out, render.quiet);
    Ok(())
}
