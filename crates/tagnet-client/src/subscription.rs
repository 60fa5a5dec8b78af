// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Caller-visible subscription proxy.
//!
//! [`SubscriptionProxy`] is the client's view of its one subscription. The
//! proxy's identity and notification channel survive reconnects: the client
//! re-creates the server-side subscription through the new session and keeps
//! feeding the same channel, so the caller never re-subscribes.

use tokio::sync::mpsc;

use tagnet_core::{NodeId, NotificationBatch, SubscriptionId};

/// The caller-visible handle to the client's subscription.
pub struct SubscriptionProxy {
    id: SubscriptionId,
    nodes: Vec<NodeId>,
    receiver: mpsc::Receiver<NotificationBatch>,
}

impl SubscriptionProxy {
    pub(crate) fn new(
        id: SubscriptionId,
        nodes: Vec<NodeId>,
        receiver: mpsc::Receiver<NotificationBatch>,
    ) -> Self {
        Self {
            id,
            nodes,
            receiver,
        }
    }

    /// The subscription ID as first assigned by the server. Stable for the
    /// proxy's lifetime even if a reconnect re-creates the subscription
    /// server-side.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The monitored nodes, in registration order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Receives the next notification batch. Returns `None` once the
    /// subscription has been torn down and the queue drained.
    pub async fn recv(&mut self) -> Option<NotificationBatch> {
        self.receiver.recv().await
    }

    /// Receives a batch without waiting.
    pub fn try_recv(&mut self) -> Option<NotificationBatch> {
        self.receiver.try_recv().ok()
    }
}

impl std::fmt::Debug for SubscriptionProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionProxy")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
