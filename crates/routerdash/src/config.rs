//! CLI-side configuration: global flags layered over `routerdash-config`
//! profiles, producing the `DeviceConfig` and render settings for a run.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use routerdash_config::{Config, Profile};
use routerdash_core::DeviceConfig;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output::{self, Render};

/// The config file this run reads and writes.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(routerdash_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(routerdash_config::load_config_from(&config_path(global))?)
}

/// `--output`, else `defaults.output` from the file, else table.
pub fn render_settings(global: &GlobalOpts, cfg: &Config) -> Render {
    let format = global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&cfg.defaults.output, true).unwrap_or_else(|_| {
            tracing::warn!(value = %cfg.defaults.output, "unknown defaults.output, using table");
            OutputFormat::Table
        })
    });
    Render {
        format,
        quiet: global.quiet,
        color: output::should_color(global.color),
    }
}

/// Translate the active profile plus global flags into a `DeviceConfig`.
///
/// Flags win over the profile. Without a profile, `--host` alone is enough
/// as long as a password can be found (env or keyring).
pub fn device_config(global: &GlobalOpts, cfg: &Config) -> Result<DeviceConfig, CliError> {
    let profile_name = cfg.active_profile_name(global.profile.as_deref());

    let mut profile = match (cfg.profiles.get(&profile_name), global.profile.is_some()) {
        (Some(profile), _) => profile.clone(),
        // An explicitly requested profile must exist.
        (None, true) => cfg.profile(&profile_name)?.clone(),
        (None, false) => Profile {
            host: global.host.clone().ok_or_else(|| CliError::NoConfig {
                path: config_path(global).display().to_string(),
            })?,
            username: "admin".into(),
            ..Profile::default()
        },
    };
    apply_overrides(&mut profile, global);

    let password = routerdash_config::resolve_password(&profile, &profile_name)?;
    let mut device = routerdash_config::build_device_config(&profile, &cfg.defaults, password)?;
    if let Some(secs) = global.timeout {
        let timeout = Duration::from_secs(secs);
        device.connect_timeout = timeout;
        device.command_timeout = timeout;
        device.validate()?;
    }

    tracing::debug!(profile = %profile_name, addr = %device.addr(), "resolved device config");
    Ok(device)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(host) = &global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = Some(port);
    }
    if let Some(username) = &global.username {
        profile.username.clone_from(username);
    }
}
