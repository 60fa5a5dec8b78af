// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client connection state machine.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!      ▲                          │                 │
//!      │                        error         probe failure
//!      │                          ▼                 ▼
//!      └──────disconnect()──── ReconnectPending ◀───┘
//!                                  │    ▲
//!                             reconnect ok (session swapped,
//!                             subscription re-established)
//!                                  ▼
//!                              Connected
//! ```
//!
//! While connected, a keep-alive task probes the session on a fixed
//! interval with a bounded per-probe timeout. A failed probe moves the
//! client to `ReconnectPending` and starts the reconnect loop, which retries
//! at a fixed interval until it succeeds, hits the configured attempt
//! ceiling, or `disconnect` cancels it. On success the new session is
//! swapped in atomically and the caller-visible subscription is explicitly
//! re-established through the new session; the caller never re-subscribes.
//!
//! Keep-alive failures are never surfaced as request errors; requests issued
//! outside the `Connected` state fail with `NotConnected`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use tagnet_core::error::{ClientError, ClientResult, ConnectionError, SubscriptionError};
use tagnet_core::{
    ChannelSink, EventLog, MonitoredItemId, NodeId, NotificationSink, SessionHandle, SessionId,
    SessionTransport, SubscriptionId, Value,
};

use crate::config::ClientConfig;
use crate::subscription::SubscriptionProxy;

// =============================================================================
// ConnectionState
// =============================================================================

/// State of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session; requests fail with `NotConnected`.
    #[default]
    Disconnected,

    /// A connect attempt is in flight.
    Connecting,

    /// A session is established and keep-alive monitoring is armed.
    Connected,

    /// The session was lost; the reconnect loop is retrying.
    ReconnectPending,
}

impl ConnectionState {
    /// Returns `true` if requests may be issued.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if a connect or reconnect is in flight.
    #[inline]
    pub const fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::ReconnectPending)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::ReconnectPending => write!(f, "ReconnectPending"),
        }
    }
}

/// Callback invoked on every state transition.
type StateChangeCallback = Box<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

// =============================================================================
// ClientStats
// =============================================================================

/// Counters for client operations.
#[derive(Debug, Default)]
pub struct ClientStats {
    reads: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
    reconnects: AtomicU64,
}

impl ClientStats {
    /// Total successful reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Total successful writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Total request errors.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Total successful reconnects.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Internal shared state
// =============================================================================

/// Client-side record of the one subscription, used to re-establish it after
/// a reconnect.
struct SubscriptionRecord {
    node_ids: Vec<NodeId>,
    sink: Arc<dyn NotificationSink>,
    server_id: SubscriptionId,
    item_ids: Vec<MonitoredItemId>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn SessionTransport>,
    event_log: EventLog,
    state: RwLock<ConnectionState>,
    session: RwLock<Option<SessionHandle>>,
    subscription: Mutex<Option<SubscriptionRecord>>,
    keep_alive_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    on_state_change: SyncMutex<Option<StateChangeCallback>>,
    stats: ClientStats,
}

impl ClientInner {
    /// Sets the state unconditionally, reporting the transition.
    async fn set_state(&self, new: ConnectionState) {
        let old = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, new)
        };
        self.report_transition(old, new);
    }

    /// Sets the state only if it currently equals `expected`. Returns `true`
    /// on success.
    async fn set_state_if(&self, expected: ConnectionState, new: ConnectionState) -> bool {
        let swapped = {
            let mut state = self.state.write().await;
            if *state == expected {
                *state = new;
                true
            } else {
                false
            }
        };
        if swapped {
            self.report_transition(expected, new);
        }
        swapped
    }

    fn report_transition(&self, old: ConnectionState, new: ConnectionState) {
        if old != new {
            tracing::debug!(%old, %new, "connection state changed");
            if let Some(callback) = self.on_state_change.lock().as_ref() {
                callback(old, new);
            }
        }
    }
}

// =============================================================================
// TagClient
// =============================================================================

/// A tag-data client over an abstract [`SessionTransport`].
///
/// All connection state lives inside the client; there are no ambient
/// globals. The client is cheap to clone and fully thread-safe.
#[derive(Clone)]
pub struct TagClient {
    inner: Arc<ClientInner>,
}

impl TagClient {
    /// Creates a client over a transport.
    pub fn new(config: ClientConfig, transport: Arc<dyn SessionTransport>) -> Self {
        Self::with_event_log(config, transport, EventLog::disabled())
    }

    /// Creates a client that reports user-facing events through `event_log`.
    pub fn with_event_log(
        config: ClientConfig,
        transport: Arc<dyn SessionTransport>,
        event_log: EventLog,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                event_log,
                state: RwLock::new(ConnectionState::Disconnected),
                session: RwLock::new(None),
                subscription: Mutex::new(None),
                keep_alive_task: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                stop_tx: Mutex::new(None),
                on_state_change: SyncMutex::new(None),
                stats: ClientStats::default(),
            }),
        }
    }

    /// Returns the current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    /// Returns the current session ID, if connected.
    pub async fn session_id(&self) -> Option<SessionId> {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(|handle| handle.session_id)
    }

    /// Returns the client statistics.
    pub fn stats(&self) -> &ClientStats {
        &self.inner.stats
    }

    /// Registers a callback invoked on every state transition.
    pub fn set_state_change_callback<F>(&self, callback: F)
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        *self.inner.on_state_change.lock() = Some(Box::new(callback));
    }

    // =========================================================================
    // Connect / disconnect
    // =========================================================================

    /// Connects to the configured endpoint.
    ///
    /// On success the client is `Connected` with keep-alive monitoring
    /// armed. On failure the client is back in `Disconnected` with no
    /// partial session left live, and the error is surfaced.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` if the client is not `Disconnected`
    /// - `Connection` / `Timeout` from the transport
    pub async fn connect(&self) -> ClientResult<SessionId> {
        let inner = &self.inner;
        if !inner
            .set_state_if(ConnectionState::Disconnected, ConnectionState::Connecting)
            .await
        {
            return Err(ClientError::AlreadyConnected);
        }

        let opened = tokio::time::timeout(
            inner.config.request_timeout,
            inner
                .transport
                .open_session(&inner.config.endpoint, &inner.config.identity),
        )
        .await;

        let handle = match opened {
            Ok(Ok(handle)) => handle,
            Ok(Err(error)) => {
                inner.set_state(ConnectionState::Disconnected).await;
                inner
                    .event_log
                    .logf(format_args!("[connect] failed: {}", error));
                return Err(error.into());
            }
            Err(_) => {
                inner.set_state(ConnectionState::Disconnected).await;
                let error = ConnectionError::ConnectTimeout(inner.config.request_timeout);
                inner
                    .event_log
                    .logf(format_args!("[connect] failed: {}", error));
                return Err(error.into());
            }
        };

        let session_id = handle.session_id;
        *inner.session.write().await = Some(handle);

        let (stop_tx, stop_rx) = watch::channel(false);
        *inner.stop_tx.lock().await = Some(stop_tx);

        inner.set_state(ConnectionState::Connected).await;
        *inner.keep_alive_task.lock().await =
            Some(Self::spawn_keep_alive(Arc::clone(inner), stop_rx));

        inner.event_log.logf(format_args!(
            "[connect] connected, session {}",
            session_id
        ));
        tracing::info!(session = %session_id, endpoint = %inner.config.endpoint, "connected");
        Ok(session_id)
    }

    /// Disconnects from the server.
    ///
    /// Cancels any in-flight keep-alive or reconnect loop, tears down the
    /// subscription and session if present, and leaves the client
    /// `Disconnected`. Idempotent: a second call is a no-op.
    pub async fn disconnect(&self) -> ClientResult<()> {
        let inner = &self.inner;

        let old = {
            let mut state = inner.state.write().await;
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };
        if old == ConnectionState::Disconnected {
            return Ok(());
        }
        inner.report_transition(old, ConnectionState::Disconnected);

        // Stop background tasks cooperatively and wait them out. Handles
        // are taken out first so no lock is held across the awaits.
        let stop_tx = inner.stop_tx.lock().await.take();
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(true);
        }
        let keep_alive = inner.keep_alive_task.lock().await.take();
        if let Some(task) = keep_alive {
            let _ = task.await;
        }
        let reconnect = inner.reconnect_task.lock().await.take();
        if let Some(task) = reconnect {
            let _ = task.await;
        }

        // Tear down subscription and session, best effort.
        let session = inner.session.write().await.take();
        let record = inner.subscription.lock().await.take();
        if let Some(session) = session {
            if let Some(record) = record {
                let _ = inner
                    .transport
                    .delete_subscription(&session, record.server_id)
                    .await;
            }
            let _ = inner.transport.close_session(&session).await;
        }

        inner.event_log.log("[disconnect] disconnected");
        tracing::info!("disconnected");
        Ok(())
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Reads a node's value and source timestamp.
    ///
    /// # Errors
    ///
    /// - `NotConnected` outside the `Connected` state
    /// - `Timeout` / transport / server errors otherwise
    pub async fn read(&self, node_id: &NodeId) -> ClientResult<(Value, DateTime<Utc>)> {
        let inner = &self.inner;
        let session = self.connected_session().await?;

        let result = tokio::time::timeout(
            inner.config.request_timeout,
            inner.transport.read(&session, node_id),
        )
        .await
        .unwrap_or(Err(ClientError::timeout(inner.config.request_timeout)));

        match &result {
            Ok((value, _)) => {
                inner.stats.reads.fetch_add(1, Ordering::Relaxed);
                inner
                    .event_log
                    .logf(format_args!("[read] {} -> {}", node_id, value));
            }
            Err(error) => {
                inner.stats.errors.fetch_add(1, Ordering::Relaxed);
                inner
                    .event_log
                    .logf(format_args!("[read] {} failed: {}", node_id, error));
            }
        }
        result
    }

    /// Writes a node's value.
    ///
    /// # Errors
    ///
    /// - `NotConnected` outside the `Connected` state
    /// - `Timeout` / transport / server errors otherwise
    pub async fn write(&self, node_id: &NodeId, value: Value) -> ClientResult<()> {
        let inner = &self.inner;
        let session = self.connected_session().await?;

        let result = tokio::time::timeout(
            inner.config.request_timeout,
            inner.transport.write(&session, node_id, value.clone()),
        )
        .await
        .unwrap_or(Err(ClientError::timeout(inner.config.request_timeout)));

        match &result {
            Ok(()) => {
                inner.stats.writes.fetch_add(1, Ordering::Relaxed);
                inner
                    .event_log
                    .logf(format_args!("[write] {} = {}", node_id, value));
            }
            Err(error) => {
                inner.stats.errors.fetch_add(1, Ordering::Relaxed);
                inner
                    .event_log
                    .logf(format_args!("[write] {} failed: {}", node_id, error));
            }
        }
        result
    }

    /// Subscribes to value changes on `node_ids`.
    ///
    /// The client holds at most one subscription; its proxy survives
    /// reconnects without any action from the caller.
    ///
    /// # Errors
    ///
    /// - `NotConnected` outside the `Connected` state
    /// - `AlreadySubscribed` if a subscription exists
    /// - transport / server errors otherwise
    pub async fn subscribe(&self, node_ids: Vec<NodeId>) -> ClientResult<SubscriptionProxy> {
        let inner = &self.inner;
        let session = self.connected_session().await?;

        let mut record_slot = inner.subscription.lock().await;
        if record_slot.is_some() {
            return Err(SubscriptionError::AlreadySubscribed.into());
        }

        let (sink, receiver) = ChannelSink::with_channel(64);
        let sink: Arc<dyn NotificationSink> = Arc::new(sink);

        let (server_id, item_ids) = inner
            .transport
            .create_subscription(
                &session,
                inner.config.publishing_interval,
                inner.config.sampling_interval,
                &node_ids,
                Arc::clone(&sink),
            )
            .await?;

        *record_slot = Some(SubscriptionRecord {
            node_ids: node_ids.clone(),
            sink,
            server_id,
            item_ids,
        });

        inner.event_log.logf(format_args!(
            "[subscribe] {} ({} nodes)",
            server_id,
            node_ids.len()
        ));
        Ok(SubscriptionProxy::new(server_id, node_ids, receiver))
    }

    /// Deletes the client's subscription. A client without a subscription is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// - `NotConnected` outside the `Connected` state
    /// - transport errors otherwise
    pub async fn unsubscribe(&self) -> ClientResult<()> {
        let inner = &self.inner;
        let session = self.connected_session().await?;

        let record = inner.subscription.lock().await.take();
        if let Some(record) = record {
            inner
                .transport
                .delete_subscription(&session, record.server_id)
                .await?;
            inner
                .event_log
                .logf(format_args!("[unsubscribe] {}", record.server_id));
        }
        Ok(())
    }

    async fn connected_session(&self) -> ClientResult<SessionHandle> {
        if !self.inner.state.read().await.is_connected() {
            return Err(ClientError::not_connected());
        }
        self.inner
            .session
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)
    }

    // =========================================================================
    // Keep-alive
    // =========================================================================

    fn spawn_keep_alive(
        inner: Arc<ClientInner>,
        mut stop_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.keep_alive_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick fires immediately; the first probe
            // should land one full interval after connect.
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        if !inner.state.read().await.is_connected() {
                            return;
                        }
                        let Some(session) = inner.session.read().await.clone() else {
                            return;
                        };

                        let healthy = match tokio::time::timeout(
                            inner.config.probe_timeout,
                            inner.transport.keep_alive(&session),
                        )
                        .await
                        {
                            Ok(Ok(status)) => status.is_healthy(),
                            Ok(Err(_)) | Err(_) => false,
                        };

                        if !healthy {
                            tracing::warn!(session = %session.session_id, "keep-alive probe failed");
                            inner
                                .event_log
                                .log("[keep-alive] probe failed, reconnecting");

                            if inner
                                .set_state_if(
                                    ConnectionState::Connected,
                                    ConnectionState::ReconnectPending,
                                )
                                .await
                            {
                                let task = Self::spawn_reconnect(
                                    Arc::clone(&inner),
                                    stop_rx.clone(),
                                );
                                *inner.reconnect_task.lock().await = Some(task);
                            }
                            return;
                        }
                    }
                }
            }
        })
    }

    // =========================================================================
    // Reconnect
    // =========================================================================

    fn spawn_reconnect(
        inner: Arc<ClientInner>,
        mut stop_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut attempt: u32 = 0;

            loop {
                if *stop_rx.borrow()
                    || *inner.state.read().await != ConnectionState::ReconnectPending
                {
                    return;
                }
                attempt += 1;

                let reconnected = tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            return;
                        }
                        continue;
                    }
                    result = Self::try_reconnect(&inner) => result,
                };

                match reconnected {
                    Ok(session_id) => {
                        inner.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                        inner.event_log.logf(format_args!(
                            "[reconnect] attempt {} succeeded, session {}",
                            attempt, session_id
                        ));
                        tracing::info!(session = %session_id, attempt, "reconnected");

                        // Re-arm keep-alive for the new session.
                        let task = Self::spawn_keep_alive(Arc::clone(&inner), stop_rx.clone());
                        *inner.keep_alive_task.lock().await = Some(task);
                        return;
                    }
                    Err(error) => {
                        inner.event_log.logf(format_args!(
                            "[reconnect] attempt {} failed: {}",
                            attempt, error
                        ));
                        tracing::warn!(attempt, %error, "reconnect attempt failed");

                        if let Some(max) = inner.config.max_reconnect_attempts {
                            if attempt >= max {
                                inner.event_log.logf(format_args!(
                                    "[reconnect] giving up after {} attempts",
                                    attempt
                                ));
                                let stale = inner.session.write().await.take();
                                if let Some(stale) = stale {
                                    let _ = inner.transport.close_session(&stale).await;
                                }
                                *inner.subscription.lock().await = None;
                                inner
                                    .set_state_if(
                                        ConnectionState::ReconnectPending,
                                        ConnectionState::Disconnected,
                                    )
                                    .await;
                                return;
                            }
                        }

                        tokio::select! {
                            changed = stop_rx.changed() => {
                                if changed.is_err() || *stop_rx.borrow() {
                                    return;
                                }
                            }
                            _ = tokio::time::sleep(inner.config.reconnect_interval) => {}
                        }
                    }
                }
            }
        })
    }

    /// One reconnect attempt: open a session, re-establish the subscription
    /// through it, then swap it in atomically.
    ///
    /// Subscription continuity is verified explicitly rather than assumed: a
    /// failed resubscription fails the whole attempt and the new session is
    /// closed again.
    async fn try_reconnect(inner: &Arc<ClientInner>) -> ClientResult<SessionId> {
        let opened = tokio::time::timeout(
            inner.config.request_timeout,
            inner
                .transport
                .open_session(&inner.config.endpoint, &inner.config.identity),
        )
        .await
        .map_err(|_| ConnectionError::ConnectTimeout(inner.config.request_timeout))?;
        let new_session = opened?;

        // Re-establish the caller-visible subscription on the new session,
        // reusing the registered sink so notifications resume on the same
        // channel.
        {
            let mut record_slot = inner.subscription.lock().await;
            if let Some(record) = record_slot.as_mut() {
                let resubscribed = inner
                    .transport
                    .create_subscription(
                        &new_session,
                        inner.config.publishing_interval,
                        inner.config.sampling_interval,
                        &record.node_ids,
                        Arc::clone(&record.sink),
                    )
                    .await;

                match resubscribed {
                    Ok((server_id, item_ids)) => {
                        record.server_id = server_id;
                        record.item_ids = item_ids;
                    }
                    Err(error) => {
                        let _ = inner.transport.close_session(&new_session).await;
                        return Err(error);
                    }
                }
            }
        }

        // Swap the session in, then retire the old one so no server-side
        // state outlives it.
        let old_session = {
            let mut session = inner.session.write().await;
            session.replace(new_session.clone())
        };
        if let Some(old_session) = old_session {
            if old_session.session_id != new_session.session_id {
                let _ = inner.transport.close_session(&old_session).await;
            }
        }

        if !inner
            .set_state_if(ConnectionState::ReconnectPending, ConnectionState::Connected)
            .await
        {
            // Disconnect won the race; undo our session.
            let _ = inner.transport.close_session(&new_session).await;
            return Err(ClientError::not_connected());
        }

        Ok(new_session.session_id)
    }
}

impl fmt::Debug for TagClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagClient")
            .field("endpoint", &self.inner.config.endpoint)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
