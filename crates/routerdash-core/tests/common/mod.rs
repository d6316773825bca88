#![allow(clippy::unwrap_used, dead_code)]
// Scripted in-memory device shared by the core integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use routerdash_core::{
    ConnectionEvent, Connector, CoreError, DeviceClient, DeviceConfig, DeviceSession, Params, Row,
};

pub const IDENTITY: &str = "/system/identity/print";
pub const RESOURCE: &str = "/system/resource/print";

pub fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

/// Config with small, test-friendly numbers.
pub fn test_config() -> DeviceConfig {
    let mut config = DeviceConfig::new("fake-router", "admin", SecretString::from("pw".to_owned()));
    config.connect_timeout = Duration::from_secs(2);
    config.command_timeout = Duration::from_secs(2);
    config.keepalive_interval = Duration::from_secs(3600);
    config.backoff = [1, 2, 4].into_iter().map(Duration::from_secs).collect();
    config.max_reconnect_attempts = 5;
    config
}

// ── Fake device ─────────────────────────────────────────────────────

#[derive(Default)]
struct DeviceState {
    connects: AtomicUsize,
    refuse: AtomicBool,
    fail_identity: AtomicBool,
    connect_delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
    tables: Mutex<HashMap<String, Vec<Row>>>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

/// Connector handing out sessions backed by in-memory tables.
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<DeviceState>,
}

impl FakeDevice {
    pub fn new() -> Self {
        let device = Self::default();
        device.set_table(IDENTITY, vec![row(&[("name", "fake-router")])]);
        device.set_table(
            RESOURCE,
            vec![row(&[
                ("uptime", "1d02:03:04"),
                ("version", "7.15 (stable)"),
                ("cpu-load", "7"),
                ("free-memory", "200"),
                ("total-memory", "1000"),
                ("board-name", "RB5009"),
            ])],
        );
        device
    }

    pub fn client(&self) -> DeviceClient {
        self.client_with(test_config())
    }

    pub fn client_with(&self, config: DeviceConfig) -> DeviceClient {
        DeviceClient::with_connector(config, Arc::new(self.clone())).unwrap()
    }

    pub fn set_table(&self, command: &str, rows: Vec<Row>) {
        self.state
            .tables
            .lock()
            .unwrap()
            .insert(command.to_owned(), rows);
    }

    pub fn remove_table(&self, command: &str) {
        self.state.tables.lock().unwrap().remove(command);
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn fail_identity(&self, fail: bool) {
        self.state.fail_identity.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock().unwrap() = delay;
    }

    /// Connection attempts seen so far, successful or not.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// How many times `command` reached the device.
    pub fn calls(&self, command: &str) -> usize {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == command)
            .count()
    }

    /// Simulate the device hanging up on the newest session.
    pub fn hang_up(&self) {
        let session = self.state.sessions.lock().unwrap().last().cloned().unwrap();
        *session.reason.lock().unwrap() = Some("connection closed by device".into());
        session.closed.cancel();
    }

    pub fn last_session_closed(&self) -> bool {
        self.state
            .sessions
            .lock()
            .unwrap()
            .last()
            .is_some_and(|s| s.closed.is_cancelled())
    }
}

#[async_trait]
impl Connector for FakeDevice {
    async fn connect(&self, _config: &DeviceConfig) -> Result<Arc<dyn DeviceSession>, CoreError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(CoreError::ConnectionFailed {
                addr: "fake-router:8728".into(),
                reason: "connection refused".into(),
            });
        }

        let session = Arc::new(FakeSession {
            state: Arc::clone(&self.state),
            closed: CancellationToken::new(),
            reason: Mutex::new(None),
        });
        self.state
            .sessions
            .lock()
            .unwrap()
            .push(Arc::clone(&session));
        Ok(session)
    }
}

struct FakeSession {
    state: Arc<DeviceState>,
    closed: CancellationToken,
    reason: Mutex<Option<String>>,
}

#[async_trait]
impl DeviceSession for FakeSession {
    async fn call(&self, command: &str, _params: &Params) -> Result<Vec<Row>, CoreError> {
        if self.closed.is_cancelled() {
            return Err(CoreError::SessionClosed {
                reason: "closed".into(),
            });
        }
        self.state.calls.lock().unwrap().push(command.to_owned());

        if command == IDENTITY && self.state.fail_identity.load(Ordering::SeqCst) {
            return Err(CoreError::CommandFailed {
                command: command.to_owned(),
                category: None,
                message: "simulated failure".into(),
            });
        }
        self.state
            .tables
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .ok_or_else(|| CoreError::CommandFailed {
                command: command.to_owned(),
                category: Some("0".into()),
                message: "no such command".into(),
            })
    }

    async fn close(&self) {
        self.reason
            .lock()
            .unwrap()
            .get_or_insert_with(|| "closed by client".into());
        self.closed.cancel();
    }

    fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }

    fn close_reason(&self) -> Option<String> {
        self.reason.lock().unwrap().clone()
    }
}

// ── Event helpers ───────────────────────────────────────────────────

/// Wait (in virtual time) for the first event matching `pred`.
pub async fn wait_for(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    pred: impl Fn(&ConnectionEvent) -> bool,
) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive")
}
