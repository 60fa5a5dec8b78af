// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process loopback transport.
//!
//! [`LoopbackTransport`] implements the [`SessionTransport`] boundary
//! directly against a [`TagServer`] in the same process. It stands in for
//! the external protocol stack: the demo binary and the integration tests
//! speak to the server through it exactly as a networked client would.
//!
//! Sessions are tracked here, and a subscription never outlives its owning
//! session: closing the session deletes its subscriptions from the engine.
//! Fault injection hooks (`set_offline`, `fail_keep_alives`) let tests drive
//! the client's reconnect state machine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use tagnet_core::error::{ClientError, ConnectionError};
use tagnet_core::{
    EndpointDescriptor, EventLog, Identity, KeepAliveStatus, MonitoredItemId, NodeId,
    NotificationSink, SessionHandle, SessionId, SessionTransport, SubscriptionId, Value,
};

use crate::server::TagServer;

/// Session bookkeeping on the server side of the loopback.
#[derive(Debug, Default)]
struct SessionEntry {
    subscriptions: Vec<SubscriptionId>,
}

/// An in-process [`SessionTransport`] bound to a [`TagServer`].
pub struct LoopbackTransport {
    server: Arc<TagServer>,
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    event_log: EventLog,

    /// While set, session opening and keep-alive probes fail, emulating a
    /// severed link.
    offline: AtomicBool,

    /// Number of upcoming keep-alive probes to fail, emulating transient
    /// probe loss.
    keep_alive_failures: AtomicU32,
}

impl LoopbackTransport {
    /// Creates a transport over a server, reporting through the server's
    /// event log.
    pub fn new(server: Arc<TagServer>) -> Self {
        let event_log = server.event_log().clone();
        Self {
            server,
            sessions: Mutex::new(HashMap::new()),
            event_log,
            offline: AtomicBool::new(false),
            keep_alive_failures: AtomicU32::new(0),
        }
    }

    /// Emulates link loss: while offline, `open_session` and `keep_alive`
    /// fail.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fails the next `count` keep-alive probes.
    pub fn fail_keep_alives(&self, count: u32) {
        self.keep_alive_failures.store(count, Ordering::SeqCst);
    }

    /// Returns the number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn ensure_session(&self, handle: &SessionHandle) -> Result<(), ConnectionError> {
        if self.sessions.lock().contains_key(&handle.session_id) {
            Ok(())
        } else {
            Err(ConnectionError::SessionInvalid)
        }
    }
}

#[async_trait]
impl SessionTransport for LoopbackTransport {
    async fn open_session(
        &self,
        endpoint: &EndpointDescriptor,
        identity: &Identity,
    ) -> Result<SessionHandle, ConnectionError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ConnectionError::refused(endpoint.url.clone()));
        }

        let session_id = SessionId::generate();
        self.sessions
            .lock()
            .insert(session_id, SessionEntry::default());

        self.event_log
            .logf(format_args!("[connect] session {} ({:?})", session_id, identity));
        tracing::info!(session = %session_id, endpoint = %endpoint, "session opened");
        Ok(SessionHandle::new(session_id, endpoint.clone()))
    }

    async fn close_session(&self, handle: &SessionHandle) -> Result<(), ConnectionError> {
        let entry = self.sessions.lock().remove(&handle.session_id);
        let Some(entry) = entry else {
            return Ok(()); // closing an unknown session is a no-op
        };

        // Subscriptions must not outlive their owning session.
        for subscription_id in entry.subscriptions {
            self.server.engine().delete_subscription(subscription_id).await;
        }

        self.event_log
            .logf(format_args!("[disconnect] session {}", handle.session_id));
        tracing::info!(session = %handle.session_id, "session closed");
        Ok(())
    }

    async fn read(
        &self,
        handle: &SessionHandle,
        node_id: &NodeId,
    ) -> Result<(Value, DateTime<Utc>), ClientError> {
        self.ensure_session(handle)?;

        match self.server.address_space().read(node_id) {
            Ok((value, timestamp)) => {
                self.event_log.logf(format_args!(
                    "[read] session {} node {} -> {}",
                    handle.session_id, node_id, value
                ));
                Ok((value, timestamp))
            }
            Err(error) => {
                self.event_log.logf(format_args!(
                    "[read] session {} node {} failed: {}",
                    handle.session_id, node_id, error
                ));
                Err(error.into())
            }
        }
    }

    async fn write(
        &self,
        handle: &SessionHandle,
        node_id: &NodeId,
        value: Value,
    ) -> Result<(), ClientError> {
        self.ensure_session(handle)?;

        match self.server.address_space().write(node_id, value.clone()) {
            Ok(()) => {
                self.event_log.logf(format_args!(
                    "[write] session {} node {} = {}",
                    handle.session_id, node_id, value
                ));
                Ok(())
            }
            Err(error) => {
                self.event_log.logf(format_args!(
                    "[write] session {} node {} failed: {}",
                    handle.session_id, node_id, error
                ));
                Err(error.into())
            }
        }
    }

    async fn create_subscription(
        &self,
        handle: &SessionHandle,
        publishing_interval: Duration,
        sampling_interval: Duration,
        node_ids: &[NodeId],
        sink: Arc<dyn NotificationSink>,
    ) -> Result<(SubscriptionId, Vec<MonitoredItemId>), ClientError> {
        self.ensure_session(handle)?;

        let engine = self.server.engine();
        let subscription_id = engine
            .create_subscription(publishing_interval, sink)
            .await?;

        let mut item_ids = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            match engine
                .add_monitored_item(subscription_id, node_id.clone(), sampling_interval)
                .await
            {
                Ok(item_id) => item_ids.push(item_id),
                Err(error) => {
                    // No partial subscription is left behind.
                    engine.delete_subscription(subscription_id).await;
                    return Err(error.into());
                }
            }
        }

        self.sessions
            .lock()
            .entry(handle.session_id)
            .or_default()
            .subscriptions
            .push(subscription_id);

        for node_id in node_ids {
            self.event_log.logf(format_args!(
                "[subscribe] session {} node {} ({})",
                handle.session_id, node_id, subscription_id
            ));
        }
        Ok((subscription_id, item_ids))
    }

    async fn delete_subscription(
        &self,
        handle: &SessionHandle,
        subscription_id: SubscriptionId,
    ) -> Result<(), ClientError> {
        self.ensure_session(handle)?;

        self.server.engine().delete_subscription(subscription_id).await;
        if let Some(entry) = self.sessions.lock().get_mut(&handle.session_id) {
            entry.subscriptions.retain(|id| *id != subscription_id);
        }

        self.event_log.logf(format_args!(
            "[unsubscribe] session {} ({})",
            handle.session_id, subscription_id
        ));
        Ok(())
    }

    async fn keep_alive(&self, handle: &SessionHandle) -> Result<KeepAliveStatus, ConnectionError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ConnectionError::other("link down"));
        }

        let remaining = self.keep_alive_failures.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .keep_alive_failures
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(ConnectionError::other("probe failed"));
        }

        if self.sessions.lock().contains_key(&handle.session_id) {
            Ok(KeepAliveStatus::Healthy)
        } else {
            Ok(KeepAliveStatus::SessionLost)
        }
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("sessions", &self.session_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
