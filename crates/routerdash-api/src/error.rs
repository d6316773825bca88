use thiserror::Error;

/// Top-level error type for the `routerdash-api` crate.
///
/// Covers every failure mode of a RouterOS API session: socket I/O,
/// framing, login, device-side `!trap` rejections and `!fatal` closes.
/// `routerdash-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected by the device (wrong credentials, disabled user, ...).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Socket-level failure (connection refused, reset, DNS failure, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TCP connect did not complete in time.
    #[error("Connection to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    /// The session is gone; no further requests can be sent on it.
    #[error("Session closed: {reason}")]
    SessionClosed { reason: String },

    // ── Protocol ────────────────────────────────────────────────────
    /// Malformed framing or an unexpected reply word.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A single word exceeded the encodable size.
    #[error("Word too long to encode ({len} bytes)")]
    WordTooLong { len: usize },

    // ── Device replies ──────────────────────────────────────────────
    /// The device rejected a request with `!trap`.
    #[error("Device rejected command: {message}")]
    Trap {
        category: Option<String>,
        message: String,
    },

    /// The device sent `!fatal` and is closing the session.
    #[error("Device closed the session: {0}")]
    Fatal(String),
}

impl Error {
    /// Returns `true` if this error means the session can no longer be used.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::SessionClosed { .. } | Self::Fatal(_) | Self::Protocol(_)
        )
    }

    /// Returns `true` if the device itself rejected the request.
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trap { .. })
    }
}
