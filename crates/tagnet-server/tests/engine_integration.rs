// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! End-to-end tests for the server side: address space, subscription
//! engine, simulation source, and loopback transport working together.
//!
//! Timing-sensitive tests use intervals scaled well apart (simulation faster
//! than publishing) so assertions hold under scheduler jitter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use tagnet_core::error::AddressSpaceError;
use tagnet_core::{
    AccessLevel, ChannelSink, DataType, EndpointDescriptor, EventLog, Identity, NodeId,
    SessionTransport, Value,
};
use tagnet_server::{nodes, AddressSpace, ChangeNotifier, LoopbackTransport, ServerConfig, TagServer};

fn endpoint() -> EndpointDescriptor {
    EndpointDescriptor::new("tagnet://localhost:62541/SimpleServer")
}

// =============================================================================
// Address-space properties
// =============================================================================

#[tokio::test]
async fn create_then_read_returns_initial_value() {
    let space = AddressSpace::new(Arc::new(ChangeNotifier::new()));
    let before = Utc::now();

    for (id, data_type, initial) in [
        ("S", DataType::String, Value::from("x")),
        ("D", DataType::Double, Value::Double(1.25)),
        ("B", DataType::Bool, Value::Bool(true)),
    ] {
        space
            .create_variable(
                &NodeId::root(),
                id,
                id,
                data_type,
                AccessLevel::ReadWrite,
                initial.clone(),
            )
            .unwrap();
        let (value, timestamp) = space.read(&NodeId::new(id)).unwrap();
        assert_eq!(value, initial);
        assert!(timestamp >= before);
    }
}

#[tokio::test]
async fn failed_writes_leave_state_untouched() {
    let space = AddressSpace::new(Arc::new(ChangeNotifier::new()));
    let sensor = space
        .create_variable(
            &NodeId::root(),
            "Sensor",
            "Sensor",
            DataType::Double,
            AccessLevel::ReadOnly,
            Value::Double(20.5),
        )
        .unwrap();
    let switch = space
        .create_variable(
            &NodeId::root(),
            "Switch",
            "Switch",
            DataType::Bool,
            AccessLevel::ReadWrite,
            Value::Bool(false),
        )
        .unwrap();

    // AccessDenied never changes value or sequence, no matter how often.
    for _ in 0..10 {
        let err = space.write(&sensor, Value::Double(99.0)).unwrap_err();
        assert!(matches!(err, AddressSpaceError::AccessDenied { .. }));
    }
    let (value, _, seq) = space.sample(&sensor).unwrap();
    assert_eq!(value, Value::Double(20.5));
    assert_eq!(seq, 0);

    // TypeMismatch is a no-op on stored state.
    let err = space.write(&switch, Value::from("on")).unwrap_err();
    assert!(matches!(err, AddressSpaceError::TypeMismatch { .. }));
    let (value, _, seq) = space.sample(&switch).unwrap();
    assert_eq!(value, Value::Bool(false));
    assert_eq!(seq, 0);
}

// =============================================================================
// Publish-cycle properties through the transport
// =============================================================================

#[tokio::test]
async fn many_writes_one_notification_with_last_value() {
    let server = Arc::new(TagServer::new(ServerConfig::default(), EventLog::disabled()).unwrap());
    let transport = LoopbackTransport::new(Arc::clone(&server));
    let handle = transport
        .open_session(&endpoint(), &Identity::Anonymous)
        .await
        .unwrap();

    let (sink, mut rx) = ChannelSink::with_channel(16);
    let (subscription_id, _items) = transport
        .create_subscription(
            &handle,
            Duration::from_millis(80),
            Duration::from_millis(40),
            &[NodeId::new(nodes::IS_ACTIVE)],
            Arc::new(sink),
        )
        .await
        .unwrap();

    // A burst of writes inside one publishing window.
    for i in 0..20 {
        transport
            .write(&handle, &NodeId::new(nodes::IS_ACTIVE), Value::Bool(i % 2 == 0))
            .await
            .unwrap();
    }

    let batch = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("a batch within one publish interval")
        .unwrap();
    assert_eq!(batch.len(), 1, "one item changed, one notification");
    assert_eq!(batch.notifications[0].value, Value::Bool(false));
    assert!(server.engine().stats().batches_delivered() >= 1);

    transport
        .delete_subscription(&handle, subscription_id)
        .await
        .unwrap();
    transport.close_session(&handle).await.unwrap();
}

#[tokio::test]
async fn deleted_subscription_never_fires_again() {
    let server = Arc::new(TagServer::new(ServerConfig::default(), EventLog::disabled()).unwrap());
    let transport = LoopbackTransport::new(Arc::clone(&server));
    let handle = transport
        .open_session(&endpoint(), &Identity::Anonymous)
        .await
        .unwrap();

    let (sink, mut rx) = ChannelSink::with_channel(16);
    let (subscription_id, _) = transport
        .create_subscription(
            &handle,
            Duration::from_millis(40),
            Duration::from_millis(40),
            &[NodeId::new(nodes::IS_ACTIVE)],
            Arc::new(sink),
        )
        .await
        .unwrap();

    transport
        .delete_subscription(&handle, subscription_id)
        .await
        .unwrap();
    assert_eq!(server.engine().subscription_count().await, 0);

    transport
        .write(&handle, &NodeId::new(nodes::IS_ACTIVE), Value::Bool(true))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(rx.try_recv().is_err(), "no delivery after deletion");

    transport.close_session(&handle).await.unwrap();
}

// =============================================================================
// Concurrency: simulation + writers against one variable
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_never_tear_value_and_timestamp() {
    let space = Arc::new(AddressSpace::new(Arc::new(ChangeNotifier::new())));
    let node = space
        .create_variable(
            &NodeId::root(),
            "Shared",
            "Shared",
            DataType::Double,
            AccessLevel::ReadWrite,
            Value::Double(0.0),
        )
        .unwrap();

    const WRITERS: usize = 50;
    const WRITES_PER_WRITER: usize = 20; // 1000 writes total

    // Simulation-style internal updates racing the client writers.
    let sim_space = Arc::clone(&space);
    let sim_node = node.clone();
    let simulation = tokio::spawn(async move {
        for _ in 0..200 {
            let current = sim_space
                .read(&sim_node)
                .ok()
                .and_then(|(v, _)| v.as_double())
                .unwrap_or(0.0);
            let _ = sim_space.update(&sim_node, Value::Double(current + 0.25));
            tokio::task::yield_now().await;
        }
    });

    // Concurrent readers recording atomically sampled triples.
    let mut readers = Vec::new();
    for _ in 0..4 {
        let space = Arc::clone(&space);
        let node = node.clone();
        readers.push(tokio::spawn(async move {
            let mut samples = Vec::new();
            for _ in 0..500 {
                samples.push(space.sample(&node).unwrap());
                tokio::task::yield_now().await;
            }
            samples
        }));
    }

    let mut writers = Vec::new();
    for writer in 0..WRITERS {
        let space = Arc::clone(&space);
        let node = node.clone();
        writers.push(tokio::spawn(async move {
            for i in 0..WRITES_PER_WRITER {
                let value = (writer * WRITES_PER_WRITER + i) as f64;
                space.write(&node, Value::Double(value)).unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }

    for writer in writers {
        writer.await.unwrap();
    }
    simulation.await.unwrap();

    // Each change sequence maps to exactly one (value, timestamp) pair: a
    // torn read would surface as the same sequence with different pairs.
    let mut by_seq: HashMap<u64, (Value, chrono::DateTime<Utc>)> = HashMap::new();
    for reader in readers {
        for (value, timestamp, seq) in reader.await.unwrap() {
            match by_seq.get(&seq) {
                None => {
                    by_seq.insert(seq, (value, timestamp));
                }
                Some((seen_value, seen_timestamp)) => {
                    assert_eq!(seen_value, &value, "torn value at seq {}", seq);
                    assert_eq!(seen_timestamp, &timestamp, "torn timestamp at seq {}", seq);
                }
            }
        }
    }

    // Timestamps are monotone in sequence order: the final value is the one
    // from the last write observed by timestamp.
    let mut ordered: Vec<_> = by_seq.iter().collect();
    ordered.sort_by_key(|(seq, _)| **seq);
    for pair in ordered.windows(2) {
        assert!(pair[0].1 .1 <= pair[1].1 .1, "timestamps regressed");
    }

    let (final_value, final_timestamp, final_seq) = space.sample(&node).unwrap();
    assert_eq!(final_seq, (WRITERS * WRITES_PER_WRITER) as u64 + 200);
    let (read_value, read_timestamp) = space.read(&node).unwrap();
    assert_eq!(read_value, final_value);
    assert_eq!(read_timestamp, final_timestamp);
}

// =============================================================================
// End-to-end: the 3D printer scenario
// =============================================================================

#[tokio::test]
async fn printer_temperature_subscription_end_to_end() {
    let config = ServerConfig::default()
        .with_simulation_interval(Duration::from_millis(100))
        .with_simulation_amplitude(0.5);
    let server = Arc::new(TagServer::new(config, EventLog::disabled()).unwrap());
    server.start().await;

    let transport = LoopbackTransport::new(Arc::clone(&server));
    let handle = transport
        .open_session(&endpoint(), &Identity::Anonymous)
        .await
        .unwrap();

    let temperature = NodeId::new(nodes::TEMPERATURE);
    let (sink, mut rx) = ChannelSink::with_channel(16);
    let (subscription_id, _) = transport
        .create_subscription(
            &handle,
            Duration::from_millis(250),
            Duration::from_millis(100),
            &[temperature.clone()],
            Arc::new(sink),
        )
        .await
        .unwrap();

    // Two publish cycles, one batch each, every value inside the cumulative
    // perturbation bound.
    for cycle in 1..=2u32 {
        let batch = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("cycle {} delivered no batch", cycle))
            .unwrap();
        assert_eq!(batch.len(), 1);
        let notification = &batch.notifications[0];
        assert_eq!(notification.node_id, temperature);

        let value = notification.value.as_double().unwrap();
        let ticks = server
            .address_space()
            .change_sequence(&temperature)
            .unwrap();
        let bound = 0.5 * ticks as f64;
        assert!(
            (value - 20.5).abs() <= bound,
            "cycle {}: {} outside 20.5 ± {}",
            cycle,
            value,
            bound
        );
    }

    // Tear down: once the subscription is gone and the server stopped, the
    // feed is silent.
    transport
        .delete_subscription(&handle, subscription_id)
        .await
        .unwrap();
    transport.close_session(&handle).await.unwrap();
    server.stop().await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());
    assert!(server.engine().stats().notifications_delivered() >= 2);
    assert_eq!(server.engine().stats().subscriptions_deleted(), 1);
}
