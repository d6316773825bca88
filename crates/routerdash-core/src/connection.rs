// ── Connection manager ──
//
// Owns the one device session: connects on demand (single-flight), keeps
// it alive, notices when it dies, and reconnects with bounded backoff.
// Losses are handed to a supervisor task over a channel; the supervisor is
// the only place automatic reconnects run, which keeps at most one
// reconnect loop alive at any time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use routerdash_api::Params;
use strum::Display;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::config::DeviceConfig;
use crate::convert;
use crate::error::{CoreError, millis};
use crate::queue::CommandQueue;
use crate::session::{Connector, DeviceSession, LiveSession, SessionSlot};

const EVENT_CHANNEL_SIZE: usize = 64;

/// Command used both as the keepalive probe and to learn the identity.
pub(crate) const IDENTITY_COMMAND: &str = "/system/identity/print";

type SharedConnect = Shared<BoxFuture<'static, Result<(), CoreError>>>;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `delay` before reconnect attempt number `attempt` (1-based).
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Automatic reconnects gave up. Only an explicit `connect()` leaves
    /// this state.
    ReconnectExhausted,
}

/// Lifecycle notifications, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { generation: u64 },
    /// Closed on request.
    Disconnected { reason: String },
    /// Closed by the device or the network.
    Lost { reason: String },
    ReconnectScheduled { attempt: u32, delay: Duration },
    ReconnectExhausted { attempts: u32 },
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SessionInfo {
    pub(crate) connected_since: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<String>,
    pub(crate) identity: Option<String>,
}

// ── ConnectionManager ────────────────────────────────────────────

/// Session lifecycle owner.
///
/// Cheaply cloneable via `Arc<ManagerInner>`.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: Arc<ArcSwap<DeviceConfig>>,
    connector: Arc<dyn Connector>,
    session: SessionSlot,
    queue: CommandQueue,
    cache: Arc<ResponseCache>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    info: Mutex<SessionInfo>,

    /// The attempt currently in flight, tagged with its sequence number so
    /// a finished attempt only clears its own slot.
    in_flight: Mutex<Option<(u64, SharedConnect)>>,
    connect_seq: AtomicU64,
    generation: AtomicU64,
    /// Bumped by every `disconnect`. Attempts and loss reports carry the
    /// value they started under and are dropped if it moved.
    teardown: AtomicU64,
    /// Serializes session install, teardown and loss handling.
    lifecycle: Mutex<()>,

    attempts: AtomicU32,
    reconnecting: AtomicBool,
    loss_tx: mpsc::UnboundedSender<u64>,
    loss_rx: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,

    shutdown: CancellationToken,
    /// Child token for the current session's keepalive and close watcher.
    session_cancel: Mutex<CancellationToken>,
    /// Child token for the running reconnect loop, if any.
    reconnect_cancel: Mutex<CancellationToken>,
}

impl ConnectionManager {
    pub(crate) fn new(
        config: Arc<ArcSwap<DeviceConfig>>,
        connector: Arc<dyn Connector>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let session: SessionSlot = Arc::new(ArcSwapOption::empty());
        let shutdown = CancellationToken::new();
        let queue = CommandQueue::new(
            Arc::clone(&session),
            Arc::clone(&config),
            shutdown.child_token(),
        );
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (loss_tx, loss_rx) = mpsc::unbounded_channel();
        let session_cancel = shutdown.child_token();
        let reconnect_cancel = shutdown.child_token();

        Self {
            inner: Arc::new(ManagerInner {
                config,
                connector,
                session,
                queue,
                cache,
                state,
                events,
                info: Mutex::new(SessionInfo::default()),
                in_flight: Mutex::new(None),
                connect_seq: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                teardown: AtomicU64::new(0),
                lifecycle: Mutex::new(()),
                attempts: AtomicU32::new(0),
                reconnecting: AtomicBool::new(false),
                loss_tx,
                loss_rx: Mutex::new(Some(loss_rx)),
                shutdown,
                session_cancel: Mutex::new(session_cancel),
                reconnect_cancel: Mutex::new(reconnect_cancel),
            }),
        }
    }

    // ── Observers ────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.load().is_some()
    }

    /// Consecutive reconnect attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Whether an automatic reconnect loop is running right now.
    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnecting.load(Ordering::Acquire)
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.inner.queue
    }

    pub fn config(&self) -> Arc<DeviceConfig> {
        self.inner.config.load_full()
    }

    pub(crate) async fn info(&self) -> SessionInfo {
        self.inner.info.lock().await.clone()
    }

    /// Record the identity of the live session. Ignored when none is live,
    /// so a late reply cannot outlive the session it came from.
    pub(crate) async fn set_identity(&self, identity: String) {
        if self.is_connected() {
            self.inner.info.lock().await.identity = Some(identity);
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Make sure a session is live.
    ///
    /// No-op when connected. Concurrent callers share one attempt and all
    /// observe its result. A failure is returned to every caller and does
    /// not by itself schedule a reconnect.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(CoreError::QueueClosed);
        }
        self.ensure_supervisor().await;
        self.connect_once().await
    }

    /// Close the session and stop keepalive and any reconnect loop.
    /// Idempotent.
    pub async fn disconnect(&self, reason: &str) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.teardown.fetch_add(1, Ordering::SeqCst);
        self.inner.reconnect_cancel.lock().await.cancel();
        self.inner.session_cancel.lock().await.cancel();
        *self.inner.in_flight.lock().await = None;

        let previous = self.inner.session.swap(None);
        self.inner.cache.invalidate_all();
        {
            let mut info = self.inner.info.lock().await;
            info.connected_since = None;
            info.identity = None;
        }

        if let Some(live) = previous {
            live.handle.close().await;
            info!(reason, generation = live.generation, "disconnected from device");
            let _ = self.inner.events.send(ConnectionEvent::Disconnected {
                reason: reason.to_owned(),
            });
        } else {
            debug!(reason, "disconnect requested while not connected");
        }

        if self.state() != ConnectionState::ReconnectExhausted {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Swap in new configuration and reconnect from scratch.
    ///
    /// Resets the reconnect attempt counter and empties the response cache.
    pub async fn refresh_connection(&self, config: DeviceConfig) -> Result<(), CoreError> {
        config.validate()?;
        self.disconnect("configuration changed").await;
        info!(addr = %config.addr(), "applying new device configuration");
        self.inner.config.store(Arc::new(config));
        self.inner.attempts.store(0, Ordering::SeqCst);
        self.inner.cache.invalidate_all();
        self.inner.info.lock().await.identity = None;
        self.set_state(ConnectionState::Disconnected);
        self.connect().await
    }

    /// Tear everything down for good. The manager cannot reconnect
    /// afterwards.
    pub async fn shutdown(&self) {
        self.disconnect("shutting down").await;
        self.inner.queue.shutdown();
        self.inner.shutdown.cancel();
    }

    // ── Internals ────────────────────────────────────────────────

    async fn connect_once(&self) -> Result<(), CoreError> {
        if self.is_connected() {
            return Ok(());
        }

        let attempt = {
            let mut slot = self.inner.in_flight.lock().await;
            if self.is_connected() {
                return Ok(());
            }
            if let Some((_, shared)) = slot.as_ref() {
                debug!("joining connection attempt already in flight");
                shared.clone()
            } else {
                let seq = self.inner.connect_seq.fetch_add(1, Ordering::SeqCst);
                let this = self.clone();
                let shared = async move { this.establish(seq).await }.boxed().shared();
                *slot = Some((seq, shared.clone()));
                shared
            }
        };

        attempt.await
    }

    async fn establish(&self, seq: u64) -> Result<(), CoreError> {
        let config = self.inner.config.load_full();
        let teardown = self.inner.teardown.load(Ordering::SeqCst);
        let previous = self.state();
        self.set_state(ConnectionState::Connecting);
        info!(addr = %config.addr(), "connecting to device");

        let result = match tokio::time::timeout(
            config.connect_timeout,
            self.inner.connector.connect(&config),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout {
                operation: format!("connect to {}", config.addr()),
                timeout_ms: millis(config.connect_timeout),
            }),
        };

        let outcome = match result {
            Ok(handle) => self.install(handle, teardown).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            self.record_failure(e, seq, teardown, previous).await;
        }

        let mut slot = self.inner.in_flight.lock().await;
        if slot.as_ref().is_some_and(|(s, _)| *s == seq) {
            *slot = None;
        }
        outcome
    }

    async fn install(
        &self,
        handle: Arc<dyn DeviceSession>,
        teardown: u64,
    ) -> Result<(), CoreError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.teardown.load(Ordering::SeqCst) != teardown {
            handle.close().await;
            return Err(CoreError::SessionClosed {
                reason: "disconnected while connecting".into(),
            });
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = self.inner.shutdown.child_token();
        *self.inner.session_cancel.lock().await = token.clone();

        self.inner.session.store(Some(Arc::new(LiveSession {
            handle: Arc::clone(&handle),
            generation,
        })));
        self.inner.attempts.store(0, Ordering::SeqCst);
        {
            let mut info = self.inner.info.lock().await;
            info.connected_since = Some(Utc::now());
            info.last_error = None;
        }

        tokio::spawn(watch_close(
            self.clone(),
            handle.close_signal(),
            generation,
            token.clone(),
        ));
        tokio::spawn(keepalive(self.clone(), token));

        self.set_state(ConnectionState::Connected);
        let _ = self
            .inner
            .events
            .send(ConnectionEvent::Connected { generation });
        info!(addr = %self.inner.config.load().addr(), generation, "connected to device");
        Ok(())
    }

    /// Publish a failed attempt, unless it no longer owns the lifecycle.
    ///
    /// An attempt is stale once a disconnect happened after it started or a
    /// newer attempt took its slot; its failure is then only logged. A
    /// current failure restores `ReconnectExhausted`, or the pending
    /// `ReconnectScheduled` while the reconnect loop runs, and otherwise
    /// falls back to `Disconnected`.
    async fn record_failure(
        &self,
        error: &CoreError,
        seq: u64,
        teardown: u64,
        previous: ConnectionState,
    ) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let current = self.inner.teardown.load(Ordering::SeqCst) == teardown
            && self
                .inner
                .in_flight
                .lock()
                .await
                .as_ref()
                .is_some_and(|(s, _)| *s == seq);
        if !current || self.is_connected() {
            debug!(error = %error, seq, "superseded connection attempt failed");
            return;
        }

        warn!(error = %error, "connection attempt failed");
        self.inner.info.lock().await.last_error = Some(error.to_string());

        let next = match previous {
            ConnectionState::ReconnectExhausted => ConnectionState::ReconnectExhausted,
            scheduled @ ConnectionState::ReconnectScheduled { .. } if self.is_reconnecting() => {
                scheduled
            }
            _ => ConnectionState::Disconnected,
        };
        self.set_state(next);
    }

    /// Called by the close watcher when a session ends on its own.
    async fn handle_loss(&self, generation: u64) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let Some(live) = self.inner.session.load_full() else {
            return;
        };
        if live.generation != generation {
            return;
        }

        let reason = live
            .handle
            .close_reason()
            .unwrap_or_else(|| "session closed".into());
        self.inner.session.store(None);
        self.inner.session_cancel.lock().await.cancel();
        self.inner.cache.invalidate_all();
        {
            let mut info = self.inner.info.lock().await;
            info.connected_since = None;
            info.identity = None;
            info.last_error = Some(reason.clone());
        }

        warn!(%reason, generation, "device session lost");
        self.set_state(ConnectionState::Disconnected);
        let _ = self.inner.events.send(ConnectionEvent::Lost {
            reason: reason.clone(),
        });

        let teardown = self.inner.teardown.load(Ordering::SeqCst);
        if self.inner.loss_tx.send(teardown).is_err() {
            debug!("reconnect supervisor is gone, not scheduling reconnect");
        }
    }

    async fn ensure_supervisor(&self) {
        let mut rx = self.inner.loss_rx.lock().await;
        if let Some(rx) = rx.take() {
            debug!("starting reconnect supervisor");
            tokio::spawn(supervise(self.clone(), rx));
        }
    }

    /// Retry with backoff until connected, cancelled, or out of attempts.
    async fn reconnect(&self, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() || self.is_connected() {
                return;
            }

            let config = self.inner.config.load_full();
            let attempt = self.inner.attempts.load(Ordering::SeqCst);
            if attempt >= config.max_reconnect_attempts {
                warn!(
                    attempts = attempt,
                    "reconnect attempts exhausted, waiting for an explicit connect"
                );
                self.set_state(ConnectionState::ReconnectExhausted);
                let _ = self
                    .inner
                    .events
                    .send(ConnectionEvent::ReconnectExhausted { attempts: attempt });
                return;
            }

            let delay = config.backoff_delay(attempt);
            let attempt = attempt + 1;
            self.inner.attempts.store(attempt, Ordering::SeqCst);
            self.set_state(ConnectionState::ReconnectScheduled { attempt, delay });
            let _ = self
                .inner
                .events
                .send(ConnectionEvent::ReconnectScheduled { attempt, delay });
            info!(attempt, delay_ms = millis(delay), "reconnect scheduled");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            if let Err(e) = self.connect_once().await {
                debug!(attempt, error = %e, "reconnect attempt failed");
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.send_replace(state);
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn watch_close(
    manager: ConnectionManager,
    signal: CancellationToken,
    generation: u64,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = signal.cancelled() => {}
    }
    manager.handle_loss(generation).await;
}

/// Periodic identity probe through the command queue.
///
/// Failures are only logged: the session's close signal is what decides
/// that the connection is gone.
async fn keepalive(manager: ConnectionManager, cancel: CancellationToken) {
    let period = manager.inner.config.load().keepalive_interval;
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match manager
            .inner
            .queue
            .execute(IDENTITY_COMMAND, Params::new())
            .await
        {
            Ok(rows) => {
                if let Some(identity) = convert::identity(&rows) {
                    manager.set_identity(identity).await;
                }
                debug!("keepalive ok");
            }
            Err(e) => warn!(error = %e, "keepalive probe failed"),
        }
    }
    debug!("keepalive stopped");
}

async fn supervise(manager: ConnectionManager, mut losses: mpsc::UnboundedReceiver<u64>) {
    loop {
        let teardown = tokio::select! {
            biased;
            () = manager.inner.shutdown.cancelled() => break,
            loss = losses.recv() => match loss {
                Some(teardown) => teardown,
                None => break,
            },
        };

        if teardown != manager.inner.teardown.load(Ordering::SeqCst) || manager.is_connected() {
            debug!("ignoring stale session loss");
            continue;
        }
        // Queued while the previous loop ran; that loop already gave up on it.
        if manager.state() == ConnectionState::ReconnectExhausted {
            debug!("reconnects exhausted, ignoring queued session loss");
            continue;
        }

        let token = manager.inner.shutdown.child_token();
        *manager.inner.reconnect_cancel.lock().await = token.clone();
        // A disconnect may have landed between the check above and storing
        // the token, in which case it cancelled the previous token instead.
        if teardown != manager.inner.teardown.load(Ordering::SeqCst) {
            continue;
        }

        manager.inner.reconnecting.store(true, Ordering::Release);
        manager.reconnect(&token).await;
        manager.inner.reconnecting.store(false, Ordering::Release);
    }
    debug!("reconnect supervisor stopped");
}
