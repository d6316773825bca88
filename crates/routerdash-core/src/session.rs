// ── Session seam ──
//
// The connection manager only needs a handful of things from a live
// session: run a command, close it, and learn when it died. Keeping that
// behind a trait lets tests drive the whole lifecycle with a scripted
// device.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use routerdash_api::{ApiSession, Params, Row};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DeviceConfig;
use crate::error::CoreError;

/// One authenticated connection to the device.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Run one command and return its rows.
    async fn call(&self, command: &str, params: &Params) -> Result<Vec<Row>, CoreError>;

    /// Close the session. Must be idempotent.
    async fn close(&self);

    /// Cancelled when the session ends, whoever ended it.
    fn close_signal(&self) -> CancellationToken;

    fn close_reason(&self) -> Option<String>;
}

/// Opens and authenticates sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &DeviceConfig) -> Result<Arc<dyn DeviceSession>, CoreError>;
}

/// The session currently published by the connection manager.
///
/// `generation` increases with every successful connect, so a close
/// notification for an older session can be told apart from the current
/// one.
pub(crate) struct LiveSession {
    pub(crate) handle: Arc<dyn DeviceSession>,
    pub(crate) generation: u64,
}

pub(crate) type SessionSlot = Arc<ArcSwapOption<LiveSession>>;

// ── RouterOS API implementation ──────────────────────────────────────

/// Connects over TCP and logs in with the RouterOS API.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterOsConnector;

#[async_trait]
impl Connector for RouterOsConnector {
    async fn connect(&self, config: &DeviceConfig) -> Result<Arc<dyn DeviceSession>, CoreError> {
        let session = ApiSession::connect(&config.host, config.port, config.connect_timeout)
            .await
            .map_err(|e| match e {
                routerdash_api::Error::Io(io) => CoreError::ConnectionFailed {
                    addr: config.addr(),
                    reason: io.to_string(),
                },
                other => CoreError::from(other),
            })?;

        if let Err(e) = session.login(&config.username, &config.password).await {
            session.close().await;
            return Err(e.into());
        }

        debug!(addr = %config.addr(), username = %config.username, "device session ready");
        Ok(Arc::new(session))
    }
}

#[async_trait]
impl DeviceSession for ApiSession {
    async fn call(&self, command: &str, params: &Params) -> Result<Vec<Row>, CoreError> {
        ApiSession::call(self, command, params)
            .await
            .map_err(|e| CoreError::from(e).for_command(command))
    }

    async fn close(&self) {
        ApiSession::close(self).await;
    }

    fn close_signal(&self) -> CancellationToken {
        self.closed()
    }

    fn close_reason(&self) -> Option<String> {
        ApiSession::close_reason(self)
    }
}
