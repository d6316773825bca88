//! Config subcommand handlers. None of these touch the device.

use std::io::{BufRead, IsTerminal};

use tabled::Tabled;

use routerdash_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const DEFAULT_HOST: &str = "192.168.88.1";
const REDACTED: &str = "********";

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    active: String,
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Address")]
    addr: String,
    #[tabled(rename = "User")]
    username: String,
}

/// Copy of `cfg` safe to print.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(REDACTED.into());
        }
    }
    cfg
}

fn show(cfg: &Config, format: OutputFormat) -> Result<String, CliError> {
    let cfg = redacted(cfg);
    match format {
        OutputFormat::Table | OutputFormat::Plain => {
            toml::to_string_pretty(&cfg).map_err(|e| CliError::Render(e.to_string()))
        }
        structured => output::render_single(structured, &cfg, |_| String::new(), |_| String::new()),
    }
}

fn init(global: &GlobalOpts, force: bool) -> Result<(), CliError> {
    let path = config::config_path(global);
    if path.exists() && !force {
        return Err(CliError::Validation {
            field: "config".into(),
            reason: format!("{} already exists (use --force to overwrite)", path.display()),
        });
    }

    let name = global.profile.clone().unwrap_or_else(|| "default".into());
    let profile = Profile {
        host: global.host.clone().unwrap_or_else(|| DEFAULT_HOST.into()),
        port: global.port,
        username: global.username.clone().unwrap_or_else(|| "admin".into()),
        ..Profile::default()
    };
    let mut cfg = Config {
        default_profile: Some(name.clone()),
        ..Config::default()
    };
    cfg.profiles.insert(name.clone(), profile);

    routerdash_config::save_config_to(&cfg, &path)?;
    tracing::info!(path = %path.display(), profile = %name, "wrote config");
    if !global.quiet {
        eprintln!("Wrote {} with profile '{name}'", path.display());
        eprintln!("Store its password with: routerdash config set-password --profile {name}");
    }
    Ok(())
}

/// Prompt without echo on a terminal; read one line when stdin is piped.
fn read_password() -> Result<String, CliError> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(rpassword::prompt_password("Password: ")?);
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn set_password(global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let name = cfg.active_profile_name(global.profile.as_deref());
    let password = read_password()?;
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    routerdash_config::store_password(&name, &password)?;
    if !global.quiet {
        eprintln!("Password for profile '{name}' stored in the system keyring");
    }
    Ok(())
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Init { force } => init(global, force),

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let render = config::render_settings(global, &cfg);
            output::print_output(&show(&cfg, render.format)?, render.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            let render = config::render_settings(global, &cfg);
            let active = cfg.active_profile_name(global.profile.as_deref());
            let entries: Vec<(&String, &Profile)> = cfg.profiles.iter().collect();
            let out = output::render_list(
                render.format,
                &entries,
                |(name, p)| ProfileRow {
                    active: if **name == active { "*".into() } else { String::new() },
                    name: (*name).clone(),
                    addr: format!(
                        "{}:{}",
                        p.host,
                        p.port.unwrap_or(routerdash_core::config::DEFAULT_PORT)
                    ),
                    username: p.username.clone(),
                },
                |(name, _)| (*name).clone(),
            )?;
            output::print_output(&out, render.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let path = config::config_path(global);
            let mut cfg = config::load(global)?;
            cfg.profile(&name)?;
            cfg.default_profile = Some(name);
            routerdash_config::save_config_to(&cfg, &path)?;
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = config::load(global)?;
            set_password(global, &cfg)
        }
    }
}
