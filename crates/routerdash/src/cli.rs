//! Clap derive structures for the `routerdash` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use routerdash_core::FirewallTable;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// routerdash -- query RouterOS devices from the command line
#[derive(Debug, Parser)]
#[command(
    name = "routerdash",
    version,
    about = "Query RouterOS devices from the command line",
    long_about = "Talks to a router over the RouterOS API (port 8728): system status,\n\
        interface throughput, routing, ARP, firewall, DHCP and logs.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "ROUTERDASH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Device profile to use
    #[arg(long, short = 'p', env = "ROUTERDASH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Router host or IP (overrides profile)
    #[arg(long, short = 'H', env = "ROUTERDASH_HOST", global = true)]
    pub host: Option<String>,

    /// API port (overrides profile)
    #[arg(long, env = "ROUTERDASH_PORT", global = true)]
    pub port: Option<u16>,

    /// Login user (overrides profile)
    #[arg(long, short = 'u', env = "ROUTERDASH_USERNAME", global = true)]
    pub username: Option<String>,

    /// Output format (defaults to the config file's `defaults.output`)
    #[arg(long, short = 'o', env = "ROUTERDASH_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Connect and command timeout in seconds (overrides profile)
    #[arg(long, env = "ROUTERDASH_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// System resources and identity
    #[command(alias = "st")]
    Status,

    /// Interfaces with byte counters and smoothed rates
    #[command(alias = "if")]
    Interfaces,

    /// Routing table
    Routes,

    /// ARP table
    Arp,

    /// Firewall rules (filter, nat, mangle)
    #[command(alias = "fw")]
    Firewall(FirewallArgs),

    /// DHCP server leases
    Dhcp,

    /// Recent log lines
    Logs(LogsArgs),

    /// Run a raw API command, e.g. `exec /ip/address/print`
    Exec(ExecArgs),

    /// Poll interfaces and show smoothed throughput
    Watch(WatchArgs),

    /// Connection health
    Health,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Per-command arguments ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct FirewallArgs {
    /// Only show one table
    #[arg(long, short = 't')]
    pub table: Option<FirewallTable>,
}

#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Number of most recent lines
    #[arg(long, short = 'n', default_value = "50")]
    pub limit: usize,

    /// Only lines carrying this topic
    #[arg(long)]
    pub topic: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// API command path, e.g. /interface/print
    pub command: String,

    /// Attributes as key=value
    pub params: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between polls
    #[arg(long, short = 'i', default_value = "2")]
    pub interval: u64,

    /// Stop after this many polls
    #[arg(long, short = 'c')]
    pub count: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a starter config with one profile built from the global flags
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display the resolved configuration (passwords redacted)
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a password read from stdin in the system keyring
    SetPassword,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
