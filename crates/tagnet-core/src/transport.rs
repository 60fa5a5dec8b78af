// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The transport boundary.
//!
//! TagNet's core never speaks a wire protocol. Everything below the session
//! abstraction (framing, encryption, certificate handling) is an external
//! collaborator reached through [`SessionTransport`]. The loopback transport
//! in `tagnet-server` implements this trait in-process; a real protocol
//! stack would implement it over the network.
//!
//! Notification delivery flows the other way: the transport (or the server
//! engine behind it) pushes value-change batches into a [`NotificationSink`]
//! registered at subscription creation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ClientError, ConnectionError};
use crate::node::{MonitoredItemId, NodeId, SessionId, SubscriptionId};
use crate::value::Value;

// =============================================================================
// EndpointDescriptor / Identity
// =============================================================================

/// Describes a server endpoint to connect to.
///
/// Opaque to the core; the transport decides how to interpret the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Endpoint URL, e.g. `"tagnet://localhost:62541/SimpleServer"`.
    pub url: String,
}

impl EndpointDescriptor {
    /// Creates a new endpoint descriptor.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Client identity presented when opening a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    /// Anonymous access.
    #[default]
    Anonymous,

    /// Username identification. Password handling belongs to the transport.
    UserName {
        /// The user name.
        user: String,
    },
}

// =============================================================================
// SessionHandle
// =============================================================================

/// Handle to an established session.
///
/// A reconnect yields a handle with a different [`SessionId`]; the client
/// swaps handles atomically while preserving caller-visible subscription
/// identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Server-assigned session identifier.
    pub session_id: SessionId,

    /// The endpoint this session is bound to.
    pub endpoint: EndpointDescriptor,
}

impl SessionHandle {
    /// Creates a new session handle.
    pub fn new(session_id: SessionId, endpoint: EndpointDescriptor) -> Self {
        Self {
            session_id,
            endpoint,
        }
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {} @ {}", self.session_id, self.endpoint)
    }
}

// =============================================================================
// KeepAliveStatus
// =============================================================================

/// Result of a keep-alive probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepAliveStatus {
    /// The session is alive.
    Healthy,

    /// The server answered but the session is gone; a new session is needed.
    SessionLost,
}

impl KeepAliveStatus {
    /// Returns `true` if the session is still usable.
    #[inline]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// A single value-change notification for a monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// The monitored item this notification belongs to.
    pub item_id: MonitoredItemId,

    /// The node that changed.
    pub node_id: NodeId,

    /// The node's latest value (last value wins; no intermediate history).
    pub value: Value,

    /// Source timestamp of the reported value.
    pub timestamp: DateTime<Utc>,
}

/// A batch of notifications from one publish cycle.
///
/// Items appear in the order they were added to the subscription. Batches
/// across cycles are strictly time-ordered per subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationBatch {
    /// The notifications in this batch, in item-registration order.
    pub notifications: Vec<Notification>,
}

impl NotificationBatch {
    /// Creates a batch from a list of notifications.
    pub fn new(notifications: Vec<Notification>) -> Self {
        Self { notifications }
    }

    /// Returns the number of notifications in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Returns `true` if the batch carries no notifications.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

// =============================================================================
// NotificationSink
// =============================================================================

/// Callback for delivered notification batches.
///
/// Registered once per subscription at creation time and invoked by the
/// publish cycle outside the address-space lock, so implementations may
/// issue new reads or writes without deadlocking.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Called with each non-empty batch, in publish order.
    async fn on_notifications(&self, subscription_id: SubscriptionId, batch: NotificationBatch);
}

/// A channel-backed [`NotificationSink`].
///
/// Forwards batches into an mpsc channel; dropped receivers make delivery a
/// best-effort no-op.
pub struct ChannelSink {
    sender: mpsc::Sender<NotificationBatch>,
}

impl ChannelSink {
    /// Creates a sink from an existing sender.
    pub fn new(sender: mpsc::Sender<NotificationBatch>) -> Self {
        Self { sender }
    }

    /// Creates a sink together with its receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationBatch>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn on_notifications(&self, _subscription_id: SubscriptionId, batch: NotificationBatch) {
        // Best effort; a closed receiver is not an error.
        let _ = self.sender.send(batch).await;
    }
}

// =============================================================================
// SessionTransport
// =============================================================================

/// Abstract session transport.
///
/// All methods that cross the boundary may block on a round-trip; everything
/// else in the core is non-blocking bookkeeping. Implementations must be
/// `Send + Sync` for concurrent use from the client's background tasks.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Opens a session against the endpoint.
    async fn open_session(
        &self,
        endpoint: &EndpointDescriptor,
        identity: &Identity,
    ) -> Result<SessionHandle, ConnectionError>;

    /// Closes a session. Closing an unknown session is a no-op.
    async fn close_session(&self, handle: &SessionHandle) -> Result<(), ConnectionError>;

    /// Reads a node's value and source timestamp.
    async fn read(
        &self,
        handle: &SessionHandle,
        node_id: &NodeId,
    ) -> Result<(Value, DateTime<Utc>), ClientError>;

    /// Writes a node's value.
    async fn write(
        &self,
        handle: &SessionHandle,
        node_id: &NodeId,
        value: Value,
    ) -> Result<(), ClientError>;

    /// Creates a subscription with monitored items and a registered sink.
    ///
    /// Returns the server-assigned subscription ID and the monitored item
    /// IDs in the order of `node_ids`.
    async fn create_subscription(
        &self,
        handle: &SessionHandle,
        publishing_interval: Duration,
        sampling_interval: Duration,
        node_ids: &[NodeId],
        sink: Arc<dyn NotificationSink>,
    ) -> Result<(SubscriptionId, Vec<MonitoredItemId>), ClientError>;

    /// Deletes a subscription. Idempotent.
    async fn delete_subscription(
        &self,
        handle: &SessionHandle,
        subscription_id: SubscriptionId,
    ) -> Result<(), ClientError>;

    /// Probes session health.
    async fn keep_alive(&self, handle: &SessionHandle) -> Result<KeepAliveStatus, ConnectionError>;
}

// =============================================================================
// Tests
// =============================================================================
