//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a per-class exit code.

use miette::Diagnostic;
use thiserror::Error;

use routerdash_config::ConfigError;
use routerdash_core::CoreError;

/// Process exit codes, one per error class.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const COMMAND: i32 = 4;
    pub const CONFIG: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to {addr}: {reason}")]
    #[diagnostic(
        code(routerdash::connection_failed),
        help(
            "Check that the router is reachable and the API service is enabled\n\
             (/ip/service enable api). Default port is 8728."
        )
    )]
    ConnectionFailed { addr: String, reason: String },

    #[error("Connection lost: {reason}")]
    #[diagnostic(code(routerdash::session_closed))]
    SessionClosed { reason: String },

    #[error("Gave up reconnecting after {attempts} attempts")]
    #[diagnostic(
        code(routerdash::reconnect_exhausted),
        help("The device stayed unreachable. Fix connectivity and run the command again.")
    )]
    ReconnectExhausted { attempts: u32 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(routerdash::auth_failed),
        help(
            "Verify the username and password.\n\
             Run: routerdash config set-password --profile <name>"
        )
    )]
    AuthFailed { message: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(routerdash::no_credentials),
        help(
            "Store one with: routerdash config set-password\n\
             Or set the ROUTERDASH_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Device ───────────────────────────────────────────────────────

    #[error("{command} failed: {message}")]
    #[diagnostic(code(routerdash::command_failed))]
    CommandFailed { command: String, message: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("{operation} timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(routerdash::timeout),
        help("Increase the limit with --timeout or check the router's load.")
    )]
    Timeout { operation: String, timeout_ms: u64 },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(routerdash::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(routerdash::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: routerdash --host <addr> config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No device configured")]
    #[diagnostic(
        code(routerdash::no_config),
        help(
            "Pass --host, or create a profile with: routerdash --host <addr> config init\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(routerdash::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(routerdash::render))]
    Render(String),

    #[error("{0}")]
    #[diagnostic(code(routerdash::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. }
            | Self::SessionClosed { .. }
            | Self::ReconnectExhausted { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::CommandFailed { .. } => exit_code::COMMAND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            Self::ProfileNotFound { .. } | Self::NoConfig { .. } | Self::Config(_) => {
                exit_code::CONFIG
            }
            Self::Io(_) | Self::Render(_) | Self::Internal(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { addr, reason } => Self::ConnectionFailed { addr, reason },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Timeout {
                operation,
                timeout_ms,
            } => Self::Timeout {
                operation,
                timeout_ms,
            },
            CoreError::CommandTimeout {
                command,
                timeout_ms,
            } => Self::Timeout {
                operation: command,
                timeout_ms,
            },
            CoreError::SessionClosed { reason } => Self::SessionClosed { reason },
            CoreError::NotConnected => Self::SessionClosed {
                reason: "not connected".into(),
            },
            CoreError::ReconnectExhausted { attempts } => Self::ReconnectExhausted { attempts },
            CoreError::CommandFailed {
                command, message, ..
            } => Self::CommandFailed { command, message },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::QueueClosed => Self::Internal("command queue closed".into()),
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::ProfileNotFound { name, available } => {
                Self::ProfileNotFound { name, available }
            }
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_exit_class() {
        let cases = [
            (
                CoreError::ConnectionFailed {
                    addr: "r1:8728".into(),
                    reason: "refused".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::AuthenticationFailed {
                    message: "bad".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::CommandTimeout {
                    command: "/log/print".into(),
                    timeout_ms: 15_000,
                },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::CommandFailed {
                    command: "/x".into(),
                    category: None,
                    message: "no such command".into(),
                },
                exit_code::COMMAND,
            ),
            (
                CoreError::ReconnectExhausted { attempts: 10 },
                exit_code::CONNECTION,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn missing_password_is_an_auth_error() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "home".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
        assert_eq!(err.to_string(), "No password configured for profile 'home'");
    }
}
