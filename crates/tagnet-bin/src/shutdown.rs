// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shutdown signalling for the demo runtime.
//!
//! One coordinator fans the shutdown event out to every interested task,
//! whether it came from an OS signal (SIGTERM/SIGINT) or from the runtime
//! itself (the `--run-for-secs` timer).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Fans a one-shot shutdown event out to subscribers.
///
/// Cloning shares the event: any clone can fire it, every subscriber sees
/// it exactly once.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with the event unfired.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribes to the shutdown event.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fires the shutdown event. Later calls are no-ops.
    pub fn initiate_shutdown(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            tracing::info!("shutdown requested");
            let _ = self.tx.send(());
        }
    }

    /// Returns `true` once the event has fired.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Blocks until an OS signal arrives or another task fires the event,
    /// then ensures the event is fired so all subscribers wake.
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutdown_initiated() {
            return;
        }
        let mut rx = self.subscribe();
        tokio::select! {
            _ = os_signal() => {}
            _ = rx.recv() => {}
        }
        self.initiate_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves when the process receives a termination signal. If handler
/// registration fails the future never resolves; manual initiation still
/// works.
#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut term), Ok(mut int)) => {
            tokio::select! {
                _ = term.recv() => tracing::info!("received SIGTERM"),
                _ = int.recv() => tracing::info!("received SIGINT"),
            }
        }
        _ => {
            tracing::error!("signal handler registration failed");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn os_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received Ctrl+C");
    } else {
        tracing::error!("signal handler registration failed");
        std::future::pending::<()>().await;
    }
}

// =============================================================================
// Tests
// =============================================================================
