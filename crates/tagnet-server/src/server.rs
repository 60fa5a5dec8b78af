// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server lifecycle.
//!
//! [`TagServer`] wires the address space, change notifier, subscription
//! engine, and simulation source together and manages their Start/Stop
//! lifecycle. The address space is rebuilt in memory on every start; nothing
//! is persisted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use tagnet_core::error::AddressSpaceResult;
use tagnet_core::{AccessLevel, DataType, EventLog, NodeId, Value};

use crate::address_space::AddressSpace;
use crate::notifier::ChangeNotifier;
use crate::simulation::{SimulationSource, DEFAULT_AMPLITUDE, DEFAULT_INTERVAL};
use crate::subscription::SubscriptionEngine;

// =============================================================================
// ServerConfig
// =============================================================================

/// Configuration for a [`TagServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Simulation tick interval.
    pub simulation_interval: Duration,

    /// Simulation perturbation bound.
    pub simulation_amplitude: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            simulation_interval: DEFAULT_INTERVAL,
            simulation_amplitude: DEFAULT_AMPLITUDE,
        }
    }
}

impl ServerConfig {
    /// Sets the simulation interval.
    pub fn with_simulation_interval(mut self, interval: Duration) -> Self {
        self.simulation_interval = interval;
        self
    }

    /// Sets the simulation amplitude.
    pub fn with_simulation_amplitude(mut self, amplitude: f64) -> Self {
        self.simulation_amplitude = amplitude;
        self
    }
}

// =============================================================================
// Well-known nodes
// =============================================================================

/// The demo address space, matching the simulated 3D-printer device.
pub mod nodes {
    /// Greeting variable (String, ReadOnly).
    pub const HELLO_WORLD: &str = "HelloWorld";

    /// Printer folder.
    pub const PRINTER: &str = "3DPrinter";

    /// Simulated temperature sensor (Double, ReadOnly).
    pub const TEMPERATURE: &str = "3DPrinter/Temperature";

    /// Printer activity switch (Bool, ReadWrite).
    pub const IS_ACTIVE: &str = "3DPrinter/IsActive";
}

// =============================================================================
// TagServer
// =============================================================================

/// The tag-data server.
///
/// Owns the node tree and the background tasks mutating and publishing it.
/// `stop` is cooperative and idempotent: the simulation's in-flight tick
/// completes and every publish task winds down before it returns.
pub struct TagServer {
    address_space: Arc<AddressSpace>,
    engine: Arc<SubscriptionEngine>,
    simulation: SimulationSource,
    event_log: EventLog,
    running: Mutex<bool>,
}

impl TagServer {
    /// Builds the server and its demo address space. Background tasks are
    /// not started until [`Self::start`].
    ///
    /// # Errors
    ///
    /// Propagates address-space errors from building the initial node tree.
    pub fn new(config: ServerConfig, event_log: EventLog) -> AddressSpaceResult<Self> {
        let notifier = Arc::new(ChangeNotifier::new());
        let address_space = Arc::new(AddressSpace::new(notifier));
        Self::build_demo_nodes(&address_space)?;

        let engine = Arc::new(SubscriptionEngine::new(Arc::clone(&address_space)));
        let simulation = SimulationSource::with_settings(
            Arc::clone(&address_space),
            NodeId::new(nodes::TEMPERATURE),
            config.simulation_interval,
            config.simulation_amplitude,
        );

        Ok(Self {
            address_space,
            engine,
            simulation,
            event_log,
            running: Mutex::new(false),
        })
    }

    fn build_demo_nodes(space: &AddressSpace) -> AddressSpaceResult<()> {
        space.create_variable(
            &NodeId::root(),
            nodes::HELLO_WORLD,
            "HelloWorld",
            DataType::String,
            AccessLevel::ReadOnly,
            Value::from("Hello World!"),
        )?;

        let printer = space.create_folder(&NodeId::root(), nodes::PRINTER, "3D Printer")?;
        space.create_variable(
            &printer,
            nodes::TEMPERATURE,
            "Temperature",
            DataType::Double,
            AccessLevel::ReadOnly,
            Value::Double(20.5),
        )?;
        space.create_variable(
            &printer,
            nodes::IS_ACTIVE,
            "IsActive",
            DataType::Bool,
            AccessLevel::ReadWrite,
            Value::Bool(false),
        )?;
        Ok(())
    }

    /// Starts the simulation source. Idempotent.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if *running {
            return;
        }
        self.simulation.start().await;
        *running = true;

        self.event_log.log("[server] started");
        tracing::info!("tag server started");
    }

    /// Stops the simulation and every subscription's publish task.
    /// Idempotent; in-flight work completes before this returns.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        if !*running {
            return;
        }
        self.simulation.stop().await;
        self.engine.shutdown().await;
        *running = false;

        self.event_log.log("[server] stopped");
        tracing::info!("tag server stopped");
    }

    /// Returns `true` if the server has been started and not stopped.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns the address space.
    pub fn address_space(&self) -> &Arc<AddressSpace> {
        &self.address_space
    }

    /// Returns the subscription engine.
    pub fn engine(&self) -> &Arc<SubscriptionEngine> {
        &self.engine
    }

    /// Returns the server's event log.
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }
}

impl std::fmt::Debug for TagServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagServer").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_address_space() {
        let server = TagServer::new(ServerConfig::default(), EventLog::disabled()).unwrap();
        let space = server.address_space();

        let (hello, _) = space.read(&NodeId::new(nodes::HELLO_WORLD)).unwrap();
        assert_eq!(hello, Value::from("Hello World!"));

        let (temp, _) = space.read(&NodeId::new(nodes::TEMPERATURE)).unwrap();
        assert_eq!(temp, Value::Double(20.5));

        let (active, _) = space.read(&NodeId::new(nodes::IS_ACTIVE)).unwrap();
        assert_eq!(active, Value::Bool(false));

        let children = space.browse(&NodeId::new(nodes::PRINTER)).unwrap();
        assert_eq!(children.len(), 2);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let config = ServerConfig::default()
            .with_simulation_interval(Duration::from_millis(20))
            .with_simulation_amplitude(0.5);
        let server = TagServer::new(config, EventLog::disabled()).unwrap();

        assert!(!server.is_running().await);
        server.start().await;
        server.start().await; // idempotent
        assert!(server.is_running().await);

        tokio::time::sleep(Duration::from_millis(70)).await;
        let node = NodeId::new(nodes::TEMPERATURE);
        assert!(server.address_space().change_sequence(&node).unwrap() >= 1);

        server.stop().await;
        server.stop().await; // idempotent
        assert!(!server.is_running().await);

        // No simulation ticks after stop.
        let seq = server.address_space().change_sequence(&node).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(server.address_space().change_sequence(&node).unwrap(), seq);
    }
}
