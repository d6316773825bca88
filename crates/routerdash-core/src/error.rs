// ── Core error types ──
//
// User-facing errors from routerdash-core. Consumers never see raw wire
// framing problems; the `From<routerdash_api::Error>` impl translates
// session-level failures into connection or command errors.
//
// `CoreError` is `Clone` so a single connection attempt can hand the same
// outcome to every caller that joined it.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to device at {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Device session closed: {reason}")]
    SessionClosed { reason: String },

    #[error("Not connected to device")]
    NotConnected,

    #[error("Reconnect gave up after {attempts} attempts; call connect() to retry")]
    ReconnectExhausted { attempts: u32 },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Command {command} failed: {message}")]
    CommandFailed {
        command: String,
        category: Option<String>,
        message: String,
    },

    #[error("Command {command} timed out after {timeout_ms}ms")]
    CommandTimeout { command: String, timeout_ms: u64 },

    #[error("Command queue is shut down")]
    QueueClosed,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for errors in the connection class, which drive the
    /// reconnect state machine rather than being reported per command.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::AuthenticationFailed { .. }
                | Self::Timeout { .. }
                | Self::SessionClosed { .. }
                | Self::NotConnected
                | Self::ReconnectExhausted { .. }
        )
    }

    /// Attach the command name to a device-side rejection.
    pub(crate) fn for_command(self, command: &str) -> Self {
        match self {
            Self::CommandFailed {
                category, message, ..
            } => Self::CommandFailed {
                command: command.to_owned(),
                category,
                message,
            },
            other => other,
        }
    }
}

pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Conversion from wire-level errors ────────────────────────────────

impl From<routerdash_api::Error> for CoreError {
    fn from(err: routerdash_api::Error) -> Self {
        match err {
            routerdash_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            // Connect-time I/O is mapped with the address by the connector;
            // anything reaching here happened on an established session.
            routerdash_api::Error::Io(e) => CoreError::SessionClosed {
                reason: e.to_string(),
            },
            routerdash_api::Error::ConnectTimeout { addr, timeout_ms } => CoreError::Timeout {
                operation: format!("connect to {addr}"),
                timeout_ms,
            },
            routerdash_api::Error::SessionClosed { reason } => CoreError::SessionClosed { reason },
            routerdash_api::Error::Fatal(reason) => CoreError::SessionClosed { reason },
            routerdash_api::Error::Protocol(message) => {
                CoreError::Internal(format!("protocol error: {message}"))
            }
            routerdash_api::Error::WordTooLong { len } => {
                CoreError::Internal(format!("word too long to encode ({len} bytes)"))
            }
            routerdash_api::Error::Trap { category, message } => CoreError::CommandFailed {
                command: String::new(),
                category,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_maps_to_command_failure_with_name() {
        let err = CoreError::from(routerdash_api::Error::Trap {
            category: Some("0".into()),
            message: "no such item".into(),
        })
        .for_command("/ip/route/print");

        assert_eq!(
            err,
            CoreError::CommandFailed {
                command: "/ip/route/print".into(),
                category: Some("0".into()),
                message: "no such item".into(),
            }
        );
        assert!(!err.is_connection_error());
    }

    #[test]
    fn fatal_maps_to_session_closed() {
        let err = CoreError::from(routerdash_api::Error::Fatal("bye".into()));
        assert!(matches!(err, CoreError::SessionClosed { .. }));
        assert!(err.is_connection_error());
    }

    #[test]
    fn mid_session_io_error_is_a_closed_session() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err = CoreError::from(routerdash_api::Error::Io(io));
        assert_eq!(
            err,
            CoreError::SessionClosed {
                reason: "broken pipe".into()
            }
        );
        assert_eq!(err.to_string(), "Device session closed: broken pipe");
    }
}
