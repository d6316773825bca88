//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, builder::Builder, settings::Style};

use routerdash_core::Row;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Everything a handler needs to print its result.
#[derive(Debug, Clone, Copy)]
pub struct Render {
    pub format: OutputFormat,
    pub quiet: bool,
    pub color: bool,
}

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Green for good, red for bad, uncolored when color is off.
pub fn status_word(word: &str, good: bool, color: bool) -> String {
    match (color, good) {
        (false, _) => word.to_owned(),
        (true, true) => word.green().to_string(),
        (true, false) => word.red().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
        structured => render_structured(structured, data),
    }
}

/// Render a single item; table mode uses `detail_fn`'s key/value layout.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Plain => Ok(id_fn(data)),
        structured => render_structured(structured, data),
    }
}

/// Raw API rows: the table gets one column per attribute seen in any row.
pub fn render_rows(format: OutputFormat, rows: &[Row]) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let mut columns: Vec<&str> = Vec::new();
            for key in rows.iter().flat_map(|r| r.keys()) {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
            let mut builder = Builder::default();
            builder.push_record(columns.iter().copied());
            for row in rows {
                builder.push_record(
                    columns
                        .iter()
                        .map(|c| row.get(*c).map_or("", String::as_str)),
                );
            }
            Ok(builder.build().with(Style::rounded()).to_string())
        }
        OutputFormat::Plain => Ok(rows
            .iter()
            .map(|r| {
                r.iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")),
        structured => render_structured(structured, rows),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_structured<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    let rendered = match format {
        OutputFormat::JsonCompact => serde_json::to_string(data).map_err(render_err)?,
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(render_err)?,
        _ => serde_json::to_string_pretty(data).map_err(render_err)?,
    };
    Ok(rendered)
}

fn render_err(e: impl std::fmt::Display) -> CliError {
    CliError::Render(e.to_string())
}

// ── Value formatting ─────────────────────────────────────────────────

/// Byte totals, e.g. `"1.2 GB"`.
pub fn fmt_bytes(bytes: u64) -> String {
    bytesize::ByteSize::b(bytes).to_string()
}

/// A rate in bytes/sec as bits, e.g. `"245.0 Mbps"`.
pub fn fmt_rate(bytes_per_sec: f64) -> String {
    let bits = bytes_per_sec.max(0.0) * 8.0;
    if bits >= 1_000_000_000.0 {
        format!("{:.1} Gbps", bits / 1_000_000_000.0)
    } else if bits >= 1_000_000.0 {
        format!("{:.1} Mbps", bits / 1_000_000.0)
    } else if bits >= 1_000.0 {
        format!("{:.1} Kbps", bits / 1_000.0)
    } else {
        format!("{bits:.0} bps")
    }
}

/// `Some(x)` as text, `None` as `-`.
pub fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn rate_units_scale_with_magnitude() {
        assert_eq!(fmt_rate(0.0), "0 bps");
        assert_eq!(fmt_rate(125.0), "1.0 Kbps");
        assert_eq!(fmt_rate(2_500_000.0), "20.0 Mbps");
        assert_eq!(fmt_rate(-5.0), "0 bps");
    }

    #[test]
    fn raw_rows_table_unions_columns() {
        let rows = [
            row(&[("name", "ether1"), ("mtu", "1500")]),
            row(&[("name", "bridge"), ("comment", "lan")]),
        ];
        let table = render_rows(OutputFormat::Table, &rows).unwrap();
        let header = table.lines().nth(1).unwrap();
        assert!(header.contains("name"));
        assert!(header.contains("mtu"));
        assert!(header.contains("comment"));

        let plain = render_rows(OutputFormat::Plain, &rows).unwrap();
        assert_eq!(plain, "name=ether1 mtu=1500\nname=bridge comment=lan");
    }

    #[test]
    fn compact_json_is_one_line() {
        let rows = [row(&[("name", "ether1")])];
        let json = render_rows(OutputFormat::JsonCompact, &rows).unwrap();
        assert_eq!(json, r#"[{"name":"ether1"}]"#);
    }

    #[test]
    fn status_word_plain_without_color() {
        assert_eq!(status_word("up", true, false), "up");
        assert!(status_word("down", false, true).contains("down"));
    }
}
