#![allow(clippy::unwrap_used)]
// Connection lifecycle: single-flight connect, loss handling, backoff and
// exhaustion, keepalive. All tests run on paused virtual time.

mod common;

use std::time::Duration;

use futures_util::future::join_all;
use pretty_assertions::assert_eq;

use common::{FakeDevice, IDENTITY, test_config, wait_for};
use routerdash_core::{ConnectionEvent, ConnectionState, CoreError};

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_attempt() {
    let device = FakeDevice::new();
    device.set_connect_delay(Duration::from_millis(200));
    let client = device.client();

    let results = join_all((0..8).map(|_| {
        let client = client.clone();
        async move { client.connect().await }
    }))
    .await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(device.connects(), 1);
    assert_eq!(client.connection().state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_failure() {
    let device = FakeDevice::new();
    device.set_connect_delay(Duration::from_millis(200));
    device.refuse_connections(true);
    let client = device.client();

    let results = join_all((0..5).map(|_| {
        let client = client.clone();
        async move { client.connect().await }
    }))
    .await;

    assert_eq!(device.connects(), 1);
    for result in &results {
        assert!(matches!(result, Err(CoreError::ConnectionFailed { .. })));
    }
    let health = client.get_health().await;
    assert!(!health.connected);
    assert_eq!(health.state, "disconnected");
    assert!(health.last_error.unwrap().contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_noop_when_connected() {
    let device = FakeDevice::new();
    let client = device.client();

    client.connect().await.unwrap();
    client.connect().await.unwrap();
    assert_eq!(device.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_is_reported() {
    let device = FakeDevice::new();
    device.set_connect_delay(Duration::from_secs(30));
    let client = device.client();

    let result = client.connect().await;
    assert!(
        matches!(result, Err(CoreError::Timeout { timeout_ms: 2000, .. })),
        "got {result:?}"
    );
    assert_eq!(client.connection().state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let device = FakeDevice::new();
    let client = device.client();
    let mut events = client.events();

    client.connect().await.unwrap();
    client.disconnect(Some("test")).await;
    client.disconnect(None).await;

    assert!(device.last_session_closed());
    assert_eq!(client.connection().state(), ConnectionState::Disconnected);
    wait_for(&mut events, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;

    // An explicit disconnect is not a loss: nothing reconnects.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(device.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_loss_reconnects_after_backoff() {
    let device = FakeDevice::new();
    let client = device.client();
    let mut events = client.events();

    client.connect().await.unwrap();
    device.hang_up();

    let lost = wait_for(&mut events, |e| matches!(e, ConnectionEvent::Lost { .. })).await;
    assert_eq!(
        lost,
        ConnectionEvent::Lost {
            reason: "connection closed by device".into()
        }
    );
    let scheduled = wait_for(&mut events, |e| {
        matches!(e, ConnectionEvent::ReconnectScheduled { .. })
    })
    .await;
    assert_eq!(
        scheduled,
        ConnectionEvent::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_secs(1)
        }
    );
    wait_for(&mut events, |e| {
        matches!(e, ConnectionEvent::Connected { generation: 2 })
    })
    .await;

    assert_eq!(device.connects(), 2);
    assert_eq!(client.connection().reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_and_is_capped() {
    let device = FakeDevice::new();
    let client = device.client();
    let mut events = client.events();

    client.connect().await.unwrap();
    device.refuse_connections(true);
    device.hang_up();

    let mut delays = Vec::new();
    while delays.len() < 5 {
        if let ConnectionEvent::ReconnectScheduled { delay, .. } = wait_for(&mut events, |e| {
            matches!(e, ConnectionEvent::ReconnectScheduled { .. })
        })
        .await
        {
            delays.push(delay.as_secs());
        }
    }

    assert_eq!(delays, [1, 2, 4, 4, 4]);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_stops_automatic_retries() {
    let device = FakeDevice::new();
    let mut config = test_config();
    config.max_reconnect_attempts = 3;
    let client = device.client_with(config);
    let mut events = client.events();

    client.connect().await.unwrap();
    device.refuse_connections(true);
    device.hang_up();

    let exhausted = wait_for(&mut events, |e| {
        matches!(e, ConnectionEvent::ReconnectExhausted { .. })
    })
    .await;
    assert_eq!(exhausted, ConnectionEvent::ReconnectExhausted { attempts: 3 });
    assert_eq!(device.connects(), 4);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(device.connects(), 4, "no retries after exhaustion");

    let health = client.get_health().await;
    assert!(health.needs_intervention);
    assert_eq!(health.state, "reconnect_exhausted");

    // A failed explicit connect keeps the exhausted state.
    assert!(client.connect().await.is_err());
    assert_eq!(
        client.connection().state(),
        ConnectionState::ReconnectExhausted
    );

    device.refuse_connections(false);
    client.connect().await.unwrap();
    assert_eq!(client.connection().state(), ConnectionState::Connected);
    assert_eq!(client.connection().reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let device = FakeDevice::new();
    let client = device.client();
    let mut events = client.events();

    client.connect().await.unwrap();
    device.hang_up();
    wait_for(&mut events, |e| {
        matches!(e, ConnectionEvent::ReconnectScheduled { .. })
    })
    .await;

    client.disconnect(Some("user asked")).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(device.connects(), 1);
    assert!(!client.connection().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_attempt_does_not_override_newer_one() {
    let device = FakeDevice::new();
    device.set_connect_delay(Duration::from_millis(200));
    let client = device.client();

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.disconnect(Some("test")).await;

    device.set_connect_delay(Duration::from_millis(400));
    let second = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    // The first attempt finishes at 200ms into a torn-down lifecycle.
    tokio::time::sleep(Duration::from_millis(210)).await;
    assert!(matches!(
        first.await.unwrap(),
        Err(CoreError::SessionClosed { .. })
    ));
    assert_eq!(client.connection().state(), ConnectionState::Connecting);
    assert_eq!(client.get_health().await.last_error, None);

    second.await.unwrap().unwrap();
    assert_eq!(client.connection().state(), ConnectionState::Connected);
    assert_eq!(device.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_during_backoff_keeps_reconnect_scheduled() {
    let device = FakeDevice::new();
    let client = device.client();
    let mut events = client.events();

    client.connect().await.unwrap();
    device.refuse_connections(true);
    device.hang_up();
    wait_for(&mut events, |e| {
        matches!(e, ConnectionEvent::ReconnectScheduled { attempt: 2, .. })
    })
    .await;

    assert!(client.connect().await.is_err());
    assert_eq!(
        client.connection().state(),
        ConnectionState::ReconnectScheduled {
            attempt: 2,
            delay: Duration::from_secs(2)
        }
    );
    assert!(client.connection().is_reconnecting());

    // The loop carries on and picks the device up again.
    device.refuse_connections(false);
    wait_for(&mut events, |e| matches!(e, ConnectionEvent::Connected { .. })).await;
    assert_eq!(client.connection().state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_loss_during_reconnect_loop_exhausts_once() {
    let device = FakeDevice::new();
    let mut config = test_config();
    config.max_reconnect_attempts = 2;
    let client = device.client_with(config);
    let mut events = client.events();

    client.connect().await.unwrap();
    device.hang_up();
    wait_for(&mut events, |e| {
        matches!(e, ConnectionEvent::ReconnectScheduled { .. })
    })
    .await;

    // Connect by hand during the backoff, then lose that session as well
    // while the loop is still sleeping.
    client.connect().await.unwrap();
    device.refuse_connections(true);
    device.hang_up();
    wait_for(&mut events, |e| matches!(e, ConnectionEvent::Lost { .. })).await;

    let exhausted = wait_for(&mut events, |e| {
        matches!(e, ConnectionEvent::ReconnectExhausted { .. })
    })
    .await;
    assert_eq!(exhausted, ConnectionEvent::ReconnectExhausted { attempts: 2 });
    let connects = device.connects();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(device.connects(), connects);
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, ConnectionEvent::ReconnectExhausted { .. }),
            "exhausted twice: {event:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_failure_does_not_reconnect() {
    let device = FakeDevice::new();
    let mut config = test_config();
    config.keepalive_interval = Duration::from_secs(1);
    let client = device.client_with(config);

    device.fail_identity(true);
    client.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5500)).await;

    assert!(device.calls(IDENTITY) >= 5);
    assert_eq!(device.connects(), 1);
    assert!(client.connection().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_records_identity() {
    let device = FakeDevice::new();
    let mut config = test_config();
    config.keepalive_interval = Duration::from_secs(1);
    let client = device.client_with(config);

    client.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(device.calls(IDENTITY), 1);

    let health = client.get_health().await;
    assert_eq!(health.identity.as_deref(), Some("fake-router"));
    // Already known from the keepalive, so no extra lookup.
    assert_eq!(device.calls(IDENTITY), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_connection_reconnects_with_new_config() {
    let device = FakeDevice::new();
    let client = device.client();

    client.connect().await.unwrap();
    let mut config = test_config();
    config.host = "10.0.0.2".into();
    client.refresh_connection(config).await.unwrap();

    assert_eq!(device.connects(), 2);
    assert_eq!(client.config().host, "10.0.0.2");
    assert_eq!(client.connection().state(), ConnectionState::Connected);
    assert_eq!(client.connection().reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_refuses_further_work() {
    let device = FakeDevice::new();
    let client = device.client();

    client.connect().await.unwrap();
    client.shutdown().await;

    assert!(client.connect().await.is_err());
    assert!(client.queue().is_closed());
}
