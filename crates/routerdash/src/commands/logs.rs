//! `logs`: recent device log lines.

use tabled::Tabled;

use routerdash_core::{DeviceClient, LogEntry};

use crate::cli::LogsArgs;
use crate::error::CliError;
use crate::output::{self, Render, or_dash};

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Topics")]
    topics: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl LogRow {
    fn new(l: &LogEntry) -> Self {
        Self {
            time: or_dash(l.time.as_deref()),
            topics: l.topics.join(","),
            message: l.message.clone(),
        }
    }
}

pub async fn handle(client: &DeviceClient, args: LogsArgs, render: &Render) -> Result<(), CliError> {
    let mut entries = client.get_logs(args.limit).await?;
    if let Some(topic) = &args.topic {
        entries.retain(|e| e.topics.iter().any(|t| t == topic));
    }
    let out = output::render_list(render.format, &entries, LogRow::new, |l| l.message.clone())?;
    output::print_output(&out, render.quiet);
    Ok(())
}
