// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Periodic sensor simulation.
//!
//! The simulation source emulates a live sensor by perturbing one variable
//! on a fixed interval, independent of any subscription's publishing
//! interval. Each tick reads the current value, applies a bounded random
//! delta, and writes the result back through the address space's internal
//! write path so the normal type-check/notify path is exercised.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use tagnet_core::{NodeId, Value};

use crate::address_space::AddressSpace;

/// Default tick interval, matching a 1 Hz sensor.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default perturbation bound: each tick moves the value by a uniform delta
/// in `[-0.5, +0.5]`.
pub const DEFAULT_AMPLITUDE: f64 = 0.5;

/// A periodic task that mutates one double variable.
pub struct SimulationSource {
    address_space: Arc<AddressSpace>,
    node_id: NodeId,
    interval: Duration,
    amplitude: f64,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulationSource {
    /// Creates a simulation source for `node_id` with default interval and
    /// amplitude.
    pub fn new(address_space: Arc<AddressSpace>, node_id: NodeId) -> Self {
        Self::with_settings(address_space, node_id, DEFAULT_INTERVAL, DEFAULT_AMPLITUDE)
    }

    /// Creates a simulation source with explicit interval and amplitude.
    pub fn with_settings(
        address_space: Arc<AddressSpace>,
        node_id: NodeId,
        interval: Duration,
        amplitude: f64,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            address_space,
            node_id,
            interval,
            amplitude,
            stop_tx,
            task: Mutex::new(None),
        }
    }

    /// Returns the simulated node's ID.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Starts the periodic task. Starting an already-running source is a
    /// no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        // send_replace updates the value even when no receiver is alive,
        // which matters when restarting after a stop.
        self.stop_tx.send_replace(false);
        let space = Arc::clone(&self.address_space);
        let node_id = self.node_id.clone();
        let interval = self.interval;
        let amplitude = self.amplitude;
        let mut stop_rx = self.stop_tx.subscribe();

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick fires immediately; consume it so the
            // first perturbation lands one full interval after start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        Self::tick(&space, &node_id, amplitude);
                    }
                }
            }

            tracing::debug!(node = %node_id, "simulation stopped");
        }));

        tracing::info!(node = %self.node_id, interval_ms = self.interval.as_millis(), "simulation started");
    }

    /// One simulation step. A failed tick is logged and does not stop the
    /// task.
    fn tick(space: &AddressSpace, node_id: &NodeId, amplitude: f64) {
        let result = space.read(node_id).and_then(|(value, _)| {
            let current = value.as_double().unwrap_or(0.0);
            let delta = rand::thread_rng().gen_range(-amplitude..=amplitude);
            space.update(node_id, Value::Double(current + delta))
        });

        if let Err(error) = result {
            tracing::warn!(node = %node_id, %error, "simulation tick failed");
        }
    }

    /// Stops the task cooperatively: no tick fires after this returns, and
    /// any in-flight tick completes first. Idempotent.
    pub async fn stop(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = self.stop_tx.send(true);
            let _ = handle.await;
            tracing::info!(node = %self.node_id, "simulation source stopped");
        }
    }

    /// Returns `true` if the periodic task is running.
    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }
}

impl std::fmt::Debug for SimulationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationSource")
            .field("node_id", &self.node_id)
            .field("interval", &self.interval)
            .field("amplitude", &self.amplitude)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
