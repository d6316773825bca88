// ── Command queue ──
//
// Every command sent to the device goes through here. A single drain task
// takes entries in submission order and runs each one to completion
// against whatever session is published at that moment, so requests never
// interleave on the wire and results complete FIFO.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use routerdash_api::{Params, Row};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::DeviceConfig;
use crate::error::{CoreError, millis};
use crate::session::SessionSlot;

type CommandResult = Result<Vec<Row>, CoreError>;

struct QueuedCommand {
    command: String,
    params: Params,
    reply: oneshot::Sender<CommandResult>,
}

/// Serializing dispatcher in front of the device session.
///
/// Cheaply cloneable; all clones feed the same queue.
#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    tx: mpsc::UnboundedSender<QueuedCommand>,
    /// Taken by the first `execute` to start the drain task.
    rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedCommand>>>,
    session: SessionSlot,
    config: Arc<ArcSwap<DeviceConfig>>,
    draining: AtomicBool,
    depth: AtomicUsize,
    cancel: CancellationToken,
}

impl CommandQueue {
    pub(crate) fn new(
        session: SessionSlot,
        config: Arc<ArcSwap<DeviceConfig>>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                tx,
                rx: Mutex::new(Some(rx)),
                session,
                config,
                draining: AtomicBool::new(false),
                depth: AtomicUsize::new(0),
                cancel,
            }),
        }
    }

    /// Enqueue a command and wait for its result.
    ///
    /// Fails with [`CoreError::NotConnected`] if no session is published
    /// when the command reaches the head of the queue, and with
    /// [`CoreError::CommandTimeout`] if the device does not answer within
    /// `command_timeout`. Either way the queue moves on to the next entry.
    pub async fn execute(&self, command: &str, params: Params) -> CommandResult {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::QueueClosed);
        }
        self.ensure_drain_task().await;

        let (reply, rx) = oneshot::channel();
        self.inner.depth.fetch_add(1, Ordering::AcqRel);
        let entry = QueuedCommand {
            command: command.to_owned(),
            params,
            reply,
        };
        if self.inner.tx.send(entry).is_err() {
            self.inner.depth.fetch_sub(1, Ordering::AcqRel);
            return Err(CoreError::QueueClosed);
        }

        rx.await.unwrap_or(Err(CoreError::QueueClosed))
    }

    /// Commands submitted but not yet completed, including the one running.
    pub fn pending(&self) -> usize {
        self.inner.depth.load(Ordering::Acquire)
    }

    /// Whether the drain task is currently running a command.
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stop the drain task. Queued commands fail with `QueueClosed`.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    async fn ensure_drain_task(&self) {
        let mut rx = self.inner.rx.lock().await;
        if let Some(rx) = rx.take() {
            debug!("starting command queue drain task");
            tokio::spawn(drain_loop(rx, Arc::clone(&self.inner)));
        }
    }
}

async fn drain_loop(mut rx: mpsc::UnboundedReceiver<QueuedCommand>, inner: Arc<QueueInner>) {
    loop {
        let entry = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            entry = rx.recv() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };

        inner.draining.store(true, Ordering::Release);
        let result = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => Err(CoreError::QueueClosed),
            result = run_command(&inner, &entry.command, &entry.params) => result,
        };
        inner.depth.fetch_sub(1, Ordering::AcqRel);
        inner.draining.store(false, Ordering::Release);

        if entry.reply.send(result).is_err() {
            trace!(command = %entry.command, "caller went away before result");
        }
    }

    rx.close();
    let mut abandoned = 0usize;
    while let Ok(entry) = rx.try_recv() {
        inner.depth.fetch_sub(1, Ordering::AcqRel);
        let _ = entry.reply.send(Err(CoreError::QueueClosed));
        abandoned += 1;
    }
    debug!(abandoned, "command queue drain task stopped");
}

async fn run_command(inner: &QueueInner, command: &str, params: &Params) -> CommandResult {
    let Some(live) = inner.session.load_full() else {
        return Err(CoreError::NotConnected);
    };
    let timeout = inner.config.load().command_timeout;

    trace!(command, generation = live.generation, "running command");
    match tokio::time::timeout(timeout, live.handle.call(command, params)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(command, timeout_ms = millis(timeout), "command timed out");
            Err(CoreError::CommandTimeout {
                command: command.to_owned(),
                timeout_ms: millis(timeout),
            })
        }
    }
}
