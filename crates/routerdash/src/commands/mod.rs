//! Command dispatch: bridges CLI args -> `DeviceClient` operations -> output formatting.

pub mod config_cmd;
pub mod exec;
pub mod firewall;
pub mod health;
pub mod interfaces;
pub mod ip;
pub mod logs;
pub mod status;

use routerdash_core::DeviceClient;

use crate::cli::Command;
use crate::error::CliError;
use crate::output::Render;

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, client: &DeviceClient, render: &Render) -> Result<(), CliError> {
    match cmd {
        Command::Status => status::handle(client, render).await,
        Command::Interfaces => interfaces::handle(client, render).await,
        Command::Watch(args) => interfaces::watch(client, args, render).await,
        Command::Routes => ip::routes(client, render).await,
        Command::Arp => ip::arp(client, render).await,
        Command::Dhcp => ip::dhcp(client, render).await,
        Command::Firewall(args) => firewall::handle(client, args, render).await,
        Command::Logs(args) => logs::handle(client, args, render).await,
        Command::Exec(args) => exec::handle(client, args, render).await,
        Command::Health => health::handle(client, render).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not need a device connection".into(),
        )),
    }
}
