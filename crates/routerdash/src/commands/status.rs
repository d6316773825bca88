//! `status`: system resources and identity.

use routerdash_core::{DeviceClient, DeviceStatus};

use crate::error::CliError;
use crate::output::{self, Render, or_dash};

fn detail(s: &DeviceStatus) -> String {
    let mut lines = vec![
        format!("Identity: {}", s.identity),
        format!("Board:    {}", or_dash(s.board_name.as_deref())),
        format!("Version:  {}", or_dash(s.version.as_deref())),
        format!("Arch:     {}", or_dash(s.architecture.as_deref())),
        format!("Uptime:   {}", or_dash(s.uptime.as_deref())),
    ];
    if let Some(cpu) = s.cpu_load_pct {
        let cores = s.cpu_count.map(|n| format!(" ({n} cores)")).unwrap_or_default();
        lines.push(format!("CPU:      {cpu}%{cores}"));
    }
    if let (Some(free), Some(total)) = (s.free_memory, s.total_memory) {
        let pct = s.memory_used_pct().unwrap_or_default();
        lines.push(format!(
            "Memory:   {} / {} used ({pct:.0}%)",
            output::fmt_bytes(total.saturating_sub(free)),
            output::fmt_bytes(total),
        ));
    }
    if let (Some(free), Some(total)) = (s.free_disk, s.total_disk) {
        lines.push(format!(
            "Disk:     {} free of {}",
            output::fmt_bytes(free),
            output::fmt_bytes(total),
        ));
    }
    lines.join("\n")
}

pub async fn handle(client: &DeviceClient, render: &Render) -> Result<(), CliError> {
    let status = client.get_status().await?;
    let out = output::render_single(render.format, &status, detail, |s| s.identity.clone())?;
    output::print_output(&out, render.quiet);
    Ok(())
}
