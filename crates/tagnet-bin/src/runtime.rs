// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The demo runtime.
//!
//! Starts a tag server with the simulated 3D printer, connects a client
//! through the in-process loopback transport, and streams the temperature
//! subscription to stdout until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tagnet_client::{ClientConfig, TagClient};
use tagnet_core::{EventLog, NodeId, Value};
use tagnet_server::{nodes, LoopbackTransport, ServerConfig, TagServer};

use crate::cli::RunArgs;
use crate::error::BinResult;
use crate::shutdown::ShutdownCoordinator;

/// Builds the event log that renders core events as timestamped lines,
/// matching the `[HH:MM:SS] message` format of the log panel this demo
/// replaces.
fn stdout_event_log() -> EventLog {
    EventLog::new(|line| {
        println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line);
    })
}

/// Runs the in-process server/client demo until shutdown.
pub async fn run(args: RunArgs, coordinator: ShutdownCoordinator) -> BinResult<()> {
    let event_log = stdout_event_log();

    // Server side: address space, simulation, subscription engine.
    let server_config = ServerConfig::default()
        .with_simulation_interval(args.simulation_interval());
    let server = Arc::new(TagServer::new(server_config, event_log.clone())?);
    server.start().await;

    // Client side, wired through the loopback transport.
    let transport = Arc::new(LoopbackTransport::new(Arc::clone(&server)));
    let client_config = ClientConfig::new(args.endpoint.clone())
        .with_publishing_interval(args.publishing_interval());
    let client = TagClient::with_event_log(client_config, transport, event_log.clone());

    client.connect().await?;

    // The classic demo flow: greet, flip the switch, watch the sensor.
    let (greeting, _) = client.read(&NodeId::new(nodes::HELLO_WORLD)).await?;
    tracing::info!(%greeting, "server greeting");

    client
        .write(&NodeId::new(nodes::IS_ACTIVE), Value::Bool(true))
        .await?;

    let mut subscription = client
        .subscribe(vec![NodeId::new(nodes::TEMPERATURE)])
        .await?;

    let notification_log = event_log.clone();
    let printer = tokio::spawn(async move {
        while let Some(batch) = subscription.recv().await {
            for notification in &batch.notifications {
                notification_log.logf(format_args!(
                    "[notify] {} = {} @ {}",
                    notification.node_id,
                    notification.value,
                    notification.timestamp.format("%H:%M:%S%.3f")
                ));
            }
        }
    });

    // Run until a signal arrives or the requested duration elapses.
    if let Some(secs) = args.run_for_secs {
        let timer = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            timer.initiate_shutdown();
        });
    }
    coordinator.wait_for_shutdown().await;

    // Orderly teardown: client first, then the server's background tasks.
    client.disconnect().await?;
    server.stop().await;
    let _ = printer.await;

    Ok(())
}
