// API session
//
// One TCP stream to the device. Requests are written under a mutex; a
// background reader decodes replies and routes them by `.tag` to the
// request waiting for them. Replies for requests that gave up (timed out
// or were dropped) find no receiver and are discarded, so a slow reply can
// never be mistaken for the answer to a later request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::ApiCodec;
use crate::error::Error;
use crate::reply::{Params, Reply, ReplyKind, Row, request_sentence};

/// How long `close()` waits for the `/quit` request to be flushed.
const QUIT_GRACE: Duration = Duration::from_millis(500);

type Writer = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, ApiCodec>;
type Pending = Arc<DashMap<String, mpsc::UnboundedSender<Reply>>>;

/// An open, possibly authenticated, API session.
///
/// Dropping the session stops its reader task and closes the socket.
pub struct ApiSession {
    writer: Mutex<Writer>,
    pending: Pending,
    next_tag: AtomicU64,
    closed: CancellationToken,
    close_reason: Arc<OnceLock<String>>,
    peer: String,
}

impl ApiSession {
    /// Open a TCP connection to `host:port`.
    ///
    /// The caller still has to [`login`](Self::login) before issuing
    /// commands.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, Error> {
        let addr = format!("{host}:{port}");
        debug!(%addr, "opening API connection");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::ConnectTimeout {
                addr: addr.clone(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })??;
        stream.set_nodelay(true)?;

        Ok(Self::from_io(stream, addr))
    }

    /// Build a session over an already-connected byte stream.
    pub fn from_io<T>(io: T, peer: impl Into<String>) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(write_half);

        let pending: Pending = Arc::new(DashMap::new());
        let closed = CancellationToken::new();
        let close_reason = Arc::new(OnceLock::new());

        tokio::spawn(read_loop(
            FramedRead::new(read_half, ApiCodec::default()),
            Arc::clone(&pending),
            closed.clone(),
            Arc::clone(&close_reason),
        ));

        Self {
            writer: Mutex::new(FramedWrite::new(writer, ApiCodec::default())),
            pending,
            next_tag: AtomicU64::new(1),
            closed,
            close_reason,
            peer: peer.into(),
        }
    }

    /// Remote address this session talks to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Authenticate with `/login`.
    ///
    /// A `!trap` reply is reported as [`Error::Authentication`].
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        let mut params = Params::new();
        params.insert("name".into(), username.to_owned());
        params.insert("password".into(), password.expose_secret().to_owned());

        match self.call("/login", &params).await {
            Ok(_) => {
                debug!(username, peer = %self.peer, "login successful");
                Ok(())
            }
            Err(Error::Trap { message, .. }) => Err(Error::Authentication { message }),
            Err(e) => Err(e),
        }
    }

    /// Send one request and collect its rows until `!done`.
    pub async fn call(&self, command: &str, params: &Params) -> Result<Vec<Row>, Error> {
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }

        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.pending.insert(tag.clone(), tx);
        let _registration = Registration {
            pending: &self.pending,
            tag: tag.clone(),
        };

        trace!(command, tag = %tag, "sending request");
        self.writer
            .lock()
            .await
            .send(request_sentence(command, params, &tag))
            .await?;

        let mut rows = Vec::new();
        let mut trap: Option<Reply> = None;
        loop {
            let reply = tokio::select! {
                biased;
                reply = rx.recv() => reply,
                () = self.closed.cancelled() => None,
            };
            let Some(reply) = reply else {
                return Err(self.closed_error());
            };

            match reply.kind {
                ReplyKind::Re => rows.push(reply.attributes),
                ReplyKind::Empty => {}
                ReplyKind::Trap => {
                    trap.get_or_insert(reply);
                }
                ReplyKind::Done => {
                    return match trap {
                        Some(t) => Err(Error::Trap {
                            category: t.attributes.get("category").cloned(),
                            message: t.failure_message(),
                        }),
                        None => Ok(rows),
                    };
                }
                ReplyKind::Fatal => return Err(Error::Fatal(reply.failure_message())),
            }
        }
    }

    /// Say goodbye with `/quit` and shut the session down. Idempotent.
    pub async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }

        {
            let mut writer = self.writer.lock().await;
            let quit = request_sentence("/quit", &Params::new(), "quit");
            match tokio::time::timeout(QUIT_GRACE, writer.send(quit)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "quit request failed"),
                Err(_) => debug!("quit request timed out"),
            }
            let _ = tokio::time::timeout(QUIT_GRACE, writer.close()).await;
        }

        let _ = self.close_reason.set("closed by client".into());
        self.closed.cancel();
        debug!(peer = %self.peer, "API session closed");
    }

    /// Token cancelled once the session is unusable, for any reason.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Why the session ended, once it has.
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.get().cloned()
    }

    fn closed_error(&self) -> Error {
        Error::SessionClosed {
            reason: self
                .close_reason()
                .unwrap_or_else(|| "session closed".into()),
        }
    }
}

impl Drop for ApiSession {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

// ── Reply routing ────────────────────────────────────────────────────

/// Removes the pending entry for a request however its future ends.
struct Registration<'a> {
    pending: &'a Pending,
    tag: String,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.tag);
    }
}

async fn read_loop<R>(
    mut frames: FramedRead<R, ApiCodec>,
    pending: Pending,
    closed: CancellationToken,
    close_reason: Arc<OnceLock<String>>,
) where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        tokio::select! {
            biased;
            () = closed.cancelled() => break "closed by client".to_owned(),
            frame = frames.next() => match frame {
                Some(Ok(sentence)) => match Reply::parse(sentence) {
                    Ok(reply) if reply.kind == ReplyKind::Fatal => {
                        break format!("device sent !fatal: {}", reply.failure_message());
                    }
                    Ok(reply) => route_reply(&pending, reply),
                    Err(e) => warn!(error = %e, "discarding malformed reply"),
                },
                Some(Err(e)) => break format!("read failed: {e}"),
                None => break "connection closed by device".to_owned(),
            },
        }
    };

    debug!(%reason, "API reader stopped");
    let _ = close_reason.set(reason);
    pending.clear();
    closed.cancel();
}

fn route_reply(pending: &Pending, reply: Reply) {
    let Some(tag) = reply.tag.clone() else {
        debug!(kind = ?reply.kind, "ignoring untagged reply");
        return;
    };

    match pending.get(&tag) {
        Some(tx) => {
            let _ = tx.send(reply);
        }
        None => trace!(tag = %tag, "dropping reply for abandoned request"),
    }
}
