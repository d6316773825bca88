//! Shared configuration for routerdash tools.
//!
//! TOML profiles, `ROUTERDASH_*` environment overrides, credential
//! resolution (env + keyring + plaintext), and translation to
//! `routerdash_core::DeviceConfig`. The CLI layers flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use routerdash_core::DeviceConfig;

/// Keyring service name; entries are keyed `<profile>/password`.
pub const KEYRING_SERVICE: &str = "routerdash";

/// Prefix for environment overrides. Nested keys are separated by `__`,
/// e.g. `ROUTERDASH_PROFILES__HOME__HOST`.
pub const ENV_PREFIX: &str = "ROUTERDASH_";

/// Fallback password variable consulted for every profile.
pub const PASSWORD_ENV: &str = "ROUTERDASH_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Values every profile inherits unless it overrides them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Humantime durations, e.g. `"10s"`, `"1m 30s"`.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,

    #[serde(default = "default_keepalive")]
    pub keepalive_interval: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            keepalive_interval: default_keepalive(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_connect_timeout() -> String {
    "10s".into()
}
fn default_command_timeout() -> String {
    "15s".into()
}
fn default_keepalive() -> String {
    "30s".into()
}
fn default_username() -> String {
    "admin".into()
}

/// A named device.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Hostname or IP of the router.
    pub host: String,

    /// API port; 8728 when unset.
    pub port: Option<u16>,

    #[serde(default = "default_username")]
    pub username: String,

    /// Plaintext password. Prefer the keyring or `password_env`.
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    pub password_env: Option<String>,

    pub connect_timeout: Option<String>,
    pub command_timeout: Option<String>,
    pub keepalive_interval: Option<String>,

    /// TTL for routes, ARP, firewall and DHCP reads.
    pub cache_ttl: Option<String>,
    pub status_ttl: Option<String>,
    pub identity_ttl: Option<String>,

    /// Reconnect delays, e.g. `["1s", "2s", "5s"]`. The last entry repeats.
    pub backoff: Option<Vec<String>>,
    pub max_reconnect_attempts: Option<u32>,
    pub ema_alpha: Option<f64>,
}

impl Config {
    /// `requested`, else `default_profile`, else `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.profile_names(),
            })
    }

    fn profile_names(&self) -> String {
        if self.profiles.is_empty() {
            return "none".into();
        }
        self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "routerdash", "routerdash").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("routerdash");
    p
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (if it exists), then `ROUTERDASH_*` variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    tracing::debug!(path = %path.display(), profiles = config.profiles.len(), "loaded config");
    Ok(config)
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Password chain: `password_env`, `ROUTERDASH_PASSWORD`, keyring,
/// plaintext in the profile.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_password_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        keyring_password,
    )
}

fn keyring_password(profile_name: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .and_then(|entry| entry.get_password())
        .ok()
}

pub(crate) fn resolve_password_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    if let Some(value) = profile.password_env.as_deref().and_then(&env) {
        tracing::debug!(profile = profile_name, "password from profile env var");
        return Ok(SecretString::from(value));
    }
    if let Some(value) = env(PASSWORD_ENV) {
        tracing::debug!(profile = profile_name, "password from {PASSWORD_ENV}");
        return Ok(SecretString::from(value));
    }
    if let Some(value) = keyring(profile_name) {
        tracing::debug!(profile = profile_name, "password from keyring");
        return Ok(SecretString::from(value));
    }
    if let Some(value) = &profile.password {
        return Ok(SecretString::from(value.clone()));
    }
    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation to DeviceConfig ─────────────────────────────────────

/// Parse a humantime duration, naming `field` on failure.
pub fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{value}': {e}"),
    })
}

/// Build a `DeviceConfig` from a profile, resolving its password.
pub fn profile_to_device_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<DeviceConfig, ConfigError> {
    let password = resolve_password(profile, profile_name)?;
    build_device_config(profile, defaults, password)
}

/// Build a `DeviceConfig` from a profile and an already-resolved password.
pub fn build_device_config(
    profile: &Profile,
    defaults: &Defaults,
    password: SecretString,
) -> Result<DeviceConfig, ConfigError> {
    let mut config = DeviceConfig::new(profile.host.clone(), profile.username.clone(), password);

    if let Some(port) = profile.port {
        config.port = port;
    }

    config.connect_timeout = parse_duration(
        "connect_timeout",
        profile
            .connect_timeout
            .as_deref()
            .unwrap_or(&defaults.connect_timeout),
    )?;
    config.command_timeout = parse_duration(
        "command_timeout",
        profile
            .command_timeout
            .as_deref()
            .unwrap_or(&defaults.command_timeout),
    )?;
    config.keepalive_interval = parse_duration(
        "keepalive_interval",
        profile
            .keepalive_interval
            .as_deref()
            .unwrap_or(&defaults.keepalive_interval),
    )?;

    if let Some(ttl) = &profile.cache_ttl {
        config.default_ttl = parse_duration("cache_ttl", ttl)?;
    }
    if let Some(ttl) = &profile.status_ttl {
        config.status_ttl = parse_duration("status_ttl", ttl)?;
    }
    if let Some(ttl) = &profile.identity_ttl {
        config.identity_ttl = parse_duration("identity_ttl", ttl)?;
    }
    if let Some(schedule) = &profile.backoff {
        config.backoff = schedule
            .iter()
            .map(|d| parse_duration("backoff", d))
            .collect::<Result<_, _>>()?;
    }
    if let Some(max) = profile.max_reconnect_attempts {
        config.max_reconnect_attempts = max;
    }
    if let Some(alpha) = profile.ema_alpha {
        config.ema_alpha = alpha;
    }

    config.validate().map_err(|e| ConfigError::Validation {
        field: "profile".into(),
        reason: e.to_string(),
    })?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
command_timeout = "20s"

[profiles.home]
host = "192.168.88.1"
password = "plain"
backoff = ["500ms", "2s"]
max_reconnect_attempts = 3

[profiles.office]
host = "10.1.0.1"
port = 8729
username = "ops"
identity_ttl = "1h"
"#;

    fn sample() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        load_config_from(&path).unwrap()
    }

    fn none(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.defaults, Defaults::default());
        assert!(cfg.profiles.is_empty());
        assert_eq!(cfg.active_profile_name(None), "default");
    }

    #[test]
    fn profiles_merge_over_defaults() {
        let cfg = sample();
        assert_eq!(cfg.active_profile_name(None), "home");
        assert_eq!(cfg.active_profile_name(Some("office")), "office");
        // Unset defaults keep their built-in values.
        assert_eq!(cfg.defaults.connect_timeout, "10s");
        assert_eq!(cfg.defaults.command_timeout, "20s");

        let office = cfg.profile("office").unwrap();
        let device =
            build_device_config(office, &cfg.defaults, SecretString::from("x".to_owned())).unwrap();
        assert_eq!(device.addr(), "10.1.0.1:8729");
        assert_eq!(device.username, "ops");
        assert_eq!(device.command_timeout, Duration::from_secs(20));
        assert_eq!(device.identity_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn backoff_and_attempts_come_from_profile() {
        let cfg = sample();
        let home = cfg.profile("home").unwrap();
        let device =
            build_device_config(home, &cfg.defaults, SecretString::from("x".to_owned())).unwrap();
        assert_eq!(device.port, routerdash_core::config::DEFAULT_PORT);
        assert_eq!(device.username, "admin");
        assert_eq!(
            device.backoff,
            [Duration::from_millis(500), Duration::from_secs(2)]
        );
        assert_eq!(device.max_reconnect_attempts, 3);
    }

    #[test]
    fn unknown_profile_lists_available() {
        let err = sample().profile("lab").unwrap_err();
        assert_eq!(
            err.to_string(),
            "profile 'lab' not found (available: home, office)"
        );
    }

    #[test]
    fn bad_duration_names_the_field() {
        let profile = Profile {
            host: "r1".into(),
            status_ttl: Some("soon".into()),
            ..Profile::default()
        };
        let err = build_device_config(
            &profile,
            &Defaults::default(),
            SecretString::from(String::new()),
        )
        .unwrap_err();
        assert!(
            matches!(&err, ConfigError::Validation { field, .. } if field == "status_ttl"),
            "got {err:?}"
        );
    }

    #[test]
    fn invalid_values_are_rejected_by_core_validation() {
        let profile = Profile {
            host: "r1".into(),
            ema_alpha: Some(1.5),
            ..Profile::default()
        };
        let result = build_device_config(
            &profile,
            &Defaults::default(),
            SecretString::from(String::new()),
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn password_chain_order() {
        let profile = Profile {
            host: "r1".into(),
            password: Some("plain".into()),
            password_env: Some("HOME_ROUTER_PW".into()),
            ..Profile::default()
        };
        let env = |name: &str| match name {
            "HOME_ROUTER_PW" => Some("from-profile-env".to_owned()),
            PASSWORD_ENV => Some("from-global-env".to_owned()),
            _ => None,
        };
        let global_only = |name: &str| (name == PASSWORD_ENV).then(|| "from-global-env".to_owned());
        let keyring = |_: &str| Some("from-keyring".to_owned());

        let pw = |env: &dyn Fn(&str) -> Option<String>, kr: &dyn Fn(&str) -> Option<String>| {
            resolve_password_with(&profile, "home", env, kr)
                .unwrap()
                .expose_secret()
                .to_owned()
        };
        assert_eq!(pw(&env, &keyring), "from-profile-env");
        assert_eq!(pw(&global_only, &keyring), "from-global-env");
        assert_eq!(pw(&none, &keyring), "from-keyring");
        assert_eq!(pw(&none, &none), "plain");
    }

    #[test]
    fn no_password_anywhere_is_an_error() {
        let profile = Profile {
            host: "r1".into(),
            ..Profile::default()
        };
        let err = resolve_password_with(&profile, "lab", none, none).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { profile } if profile == "lab"));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                host: "192.168.88.1".into(),
                username: "admin".into(),
                ..Profile::default()
            },
        );

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }
}
