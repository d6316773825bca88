// ── Device connection configuration ──
//
// Plain value handed to `DeviceClient` at construction time. How it gets
// built (TOML profile, env, CLI flags) is the caller's business.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::CoreError;

pub const DEFAULT_PORT: u16 = 8728;
pub const DEFAULT_EMA_ALPHA: f64 = 0.4;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default reconnect delays in seconds. The last entry is the cap.
pub const DEFAULT_BACKOFF_SECS: [u64; 6] = [1, 2, 4, 8, 16, 30];

/// Everything the core needs to reach and talk to one device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Upper bound on TCP connect plus login.
    pub connect_timeout: Duration,
    /// Upper bound on a single command once it reaches the head of the queue.
    pub command_timeout: Duration,
    pub keepalive_interval: Duration,
    pub default_ttl: Duration,
    pub status_ttl: Duration,
    pub identity_ttl: Duration,
    /// Delay before each reconnect attempt. Attempts past the end reuse the
    /// last entry.
    pub backoff: Vec<Duration>,
    pub max_reconnect_attempts: u32,
    pub ema_alpha: f64,
}

impl DeviceConfig {
    /// Build a config with default timeouts, TTLs and backoff.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
            default_ttl: Duration::from_secs(5),
            status_ttl: Duration::from_secs(5),
            identity_ttl: Duration::from_secs(600),
            backoff: DEFAULT_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ema_alpha: DEFAULT_EMA_ALPHA,
        }
    }

    /// `host:port`, as used in logs and error messages.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Delay before reconnect attempt number `attempt` (zero-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let Some(last) = self.backoff.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let idx = usize::try_from(attempt).unwrap_or(usize::MAX).min(last);
        self.backoff[idx]
    }

    /// Reject values the core cannot operate with.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |message: &str| {
            Err(CoreError::Config {
                message: message.to_owned(),
            })
        };

        if self.host.trim().is_empty() {
            return fail("host must not be empty");
        }
        if self.port == 0 {
            return fail("port must be non-zero");
        }
        if self.backoff.is_empty() {
            return fail("backoff schedule must have at least one entry");
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return fail("ema_alpha must be in (0, 1]");
        }
        if self.command_timeout.is_zero() || self.connect_timeout.is_zero() {
            return fail("timeouts must be non-zero");
        }
        if self.keepalive_interval.is_zero() {
            return fail("keepalive_interval must be non-zero");
        }
        Ok(())
    }
}
