// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client integration tests against an in-process server: request guards,
//! the keep-alive/reconnect state machine, and subscription continuity
//! across session replacement.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tagnet_client::{ClientConfig, ConnectionState, TagClient};
use tagnet_core::error::ClientError;
use tagnet_core::{EventLog, NodeId, Value};
use tagnet_server::{nodes, LoopbackTransport, ServerConfig, TagServer};

const ENDPOINT: &str = "tagnet://localhost:62541/SimpleServer";

/// Server + transport with test-friendly timings.
async fn test_rig() -> (Arc<TagServer>, Arc<LoopbackTransport>) {
    let config = ServerConfig::default()
        .with_simulation_interval(Duration::from_millis(50))
        .with_simulation_amplitude(0.5);
    let server = Arc::new(TagServer::new(config, EventLog::disabled()).unwrap());
    server.start().await;
    let transport = Arc::new(LoopbackTransport::new(Arc::clone(&server)));
    (server, transport)
}

fn fast_config() -> ClientConfig {
    ClientConfig::new(ENDPOINT)
        .with_request_timeout(Duration::from_millis(500))
        .with_keep_alive_interval(Duration::from_millis(40))
        .with_probe_timeout(Duration::from_millis(50))
        .with_reconnect_interval(Duration::from_millis(40))
        .with_publishing_interval(Duration::from_millis(60))
        .with_sampling_interval(Duration::from_millis(30))
}

async fn wait_for_state(client: &TagClient, wanted: ConnectionState, deadline: Duration) {
    let result = tokio::time::timeout(deadline, async {
        loop {
            if client.state().await == wanted {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        result.is_ok(),
        "client did not reach {:?} within {:?} (state: {:?})",
        wanted,
        deadline,
        client.state().await
    );
}

// =============================================================================
// Request guards and idempotence
// =============================================================================

#[tokio::test]
async fn requests_require_connected_state() {
    let (server, transport) = test_rig().await;
    let client = TagClient::new(fast_config(), transport);

    let err = client.read(&NodeId::new(nodes::HELLO_WORLD)).await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));

    let err = client
        .write(&NodeId::new(nodes::IS_ACTIVE), Value::Bool(true))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));

    let err = client
        .subscribe(vec![NodeId::new(nodes::TEMPERATURE)])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));

    // Disconnect from Disconnected is a no-op.
    client.disconnect().await.unwrap();
    assert_eq!(client.state().await, ConnectionState::Disconnected);

    server.stop().await;
}

#[tokio::test]
async fn connect_is_exclusive_and_disconnect_idempotent() {
    let (server, transport) = test_rig().await;
    let client = TagClient::new(fast_config(), Arc::clone(&transport) as _);

    client.connect().await.unwrap();
    assert_eq!(client.state().await, ConnectionState::Connected);
    assert!(client.session_id().await.is_some());

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::AlreadyConnected));

    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();
    assert_eq!(client.state().await, ConnectionState::Disconnected);
    assert!(client.session_id().await.is_none());
    assert_eq!(transport.session_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn failed_connect_leaves_no_partial_session() {
    let (server, transport) = test_rig().await;
    transport.set_offline(true);

    let client = TagClient::new(fast_config(), Arc::clone(&transport) as _);
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)));
    assert_eq!(client.state().await, ConnectionState::Disconnected);
    assert_eq!(transport.session_count(), 0);

    // The failure is not sticky.
    transport.set_offline(false);
    client.connect().await.unwrap();
    assert_eq!(client.state().await, ConnectionState::Connected);

    client.disconnect().await.unwrap();
    server.stop().await;
}

// =============================================================================
// Reads, writes, and subscription flow
// =============================================================================

#[tokio::test]
async fn read_write_subscribe_round_trip() {
    let (server, transport) = test_rig().await;
    let client = TagClient::new(fast_config(), transport);
    client.connect().await.unwrap();

    let (hello, _) = client.read(&NodeId::new(nodes::HELLO_WORLD)).await.unwrap();
    assert_eq!(hello, Value::from("Hello World!"));

    client
        .write(&NodeId::new(nodes::IS_ACTIVE), Value::Bool(true))
        .await
        .unwrap();
    let (active, _) = client.read(&NodeId::new(nodes::IS_ACTIVE)).await.unwrap();
    assert_eq!(active, Value::Bool(true));

    // The simulated sensor rejects client writes but feeds the subscription.
    let err = client
        .write(&NodeId::new(nodes::TEMPERATURE), Value::Double(0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::AddressSpace(_)));

    let mut subscription = client
        .subscribe(vec![NodeId::new(nodes::TEMPERATURE)])
        .await
        .unwrap();
    assert_eq!(subscription.nodes().len(), 1);

    let err = client
        .subscribe(vec![NodeId::new(nodes::IS_ACTIVE)])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Subscription(_)));

    let batch = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("simulation should drive a batch")
        .unwrap();
    assert_eq!(batch.notifications[0].node_id, NodeId::new(nodes::TEMPERATURE));

    client.unsubscribe().await.unwrap();
    assert_eq!(server.engine().subscription_count().await, 0);

    assert!(client.stats().reads() >= 2);
    assert!(client.stats().writes() >= 1);

    client.disconnect().await.unwrap();
    server.stop().await;
}

// =============================================================================
// Reconnect state machine
// =============================================================================

#[tokio::test]
async fn link_loss_reconnects_and_preserves_subscription() {
    let (server, transport) = test_rig().await;

    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let captured = Arc::clone(&lines);
    let event_log = EventLog::new(move |line| captured.lock().unwrap().push(line.to_string()));

    let client = TagClient::with_event_log(
        fast_config(),
        Arc::clone(&transport) as _,
        event_log,
    );

    let first_session = client.connect().await.unwrap();
    let mut subscription = client
        .subscribe(vec![NodeId::new(nodes::TEMPERATURE)])
        .await
        .unwrap();

    // The feed is alive before the fault.
    let batch = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!batch.is_empty());

    // Sever the link long enough for several consecutive probe/reconnect
    // failures, then restore it.
    transport.set_offline(true);
    wait_for_state(&client, ConnectionState::ReconnectPending, Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    transport.set_offline(false);

    wait_for_state(&client, ConnectionState::Connected, Duration::from_secs(2)).await;

    let failed_attempts = lines
        .lock()
        .unwrap()
        .iter()
        .filter(|line| line.starts_with("[reconnect] attempt") && line.contains("failed"))
        .count();
    assert!(
        failed_attempts >= 3,
        "expected at least 3 failed attempts, saw {}",
        failed_attempts
    );

    // A new session replaced the old one.
    let second_session = client.session_id().await.unwrap();
    assert_ne!(first_session, second_session);

    // Notifications resume on the pre-existing proxy without resubscribing,
    // and no duplicate subscription exists server-side.
    while subscription.try_recv().is_some() {}
    let batch = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("notifications should resume after reconnect")
        .unwrap();
    assert!(!batch.is_empty());
    assert_eq!(server.engine().subscription_count().await, 1);
    assert_eq!(transport.session_count(), 1);
    assert_eq!(client.stats().reconnects(), 1);

    client.disconnect().await.unwrap();
    assert_eq!(server.engine().subscription_count().await, 0);
    server.stop().await;
}

#[tokio::test]
async fn transient_probe_failures_recover() {
    let (server, transport) = test_rig().await;
    let client = TagClient::new(fast_config(), Arc::clone(&transport) as _);
    client.connect().await.unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&states);
    client.set_state_change_callback(move |old, new| {
        recorded.lock().unwrap().push((old, new));
    });

    // Only probes fail; session opening still works, so every bounce
    // reconnects immediately.
    transport.fail_keep_alives(3);
    tokio::time::sleep(Duration::from_millis(600)).await;

    wait_for_state(&client, ConnectionState::Connected, Duration::from_secs(2)).await;
    assert!(client.stats().reconnects() >= 1);
    assert!(states
        .lock()
        .unwrap()
        .iter()
        .any(|(old, new)| *old == ConnectionState::Connected
            && *new == ConnectionState::ReconnectPending));
    assert_eq!(transport.session_count(), 1);

    client.disconnect().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn reconnect_ceiling_gives_up_into_disconnected() {
    let (server, transport) = test_rig().await;
    let config = fast_config().with_max_reconnect_attempts(3);
    let client = TagClient::new(config, Arc::clone(&transport) as _);
    client.connect().await.unwrap();

    transport.set_offline(true);
    wait_for_state(&client, ConnectionState::Disconnected, Duration::from_secs(3)).await;

    // Requests fail cleanly after giving up.
    let err = client.read(&NodeId::new(nodes::HELLO_WORLD)).await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));

    transport.set_offline(false);
    server.stop().await;
}

#[tokio::test]
async fn disconnect_cancels_reconnect_loop() {
    let (server, transport) = test_rig().await;
    let client = TagClient::new(fast_config(), Arc::clone(&transport) as _);
    client.connect().await.unwrap();

    transport.set_offline(true);
    wait_for_state(&client, ConnectionState::ReconnectPending, Duration::from_secs(2)).await;

    // Explicit disconnect wins over the retry loop immediately.
    client.disconnect().await.unwrap();
    assert_eq!(client.state().await, ConnectionState::Disconnected);

    // The loop stays dead: restoring the link does not resurrect it.
    transport.set_offline(false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.state().await, ConnectionState::Disconnected);

    server.stop().await;
}
