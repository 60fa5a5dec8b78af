// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The subscription engine.
//!
//! The engine turns node mutations into timed, batched notifications. Each
//! subscription runs its own publish task at its publishing interval; a tick
//! samples every monitored item under the address-space lock, diffs the
//! node's change sequence against the item's last-notified sequence, and
//! delivers the resulting batch to the subscription's registered sink
//! outside the lock. A node that changed several times between two cycles is
//! reported once with its latest value.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  SubscriptionEngine                    │
//! │      (creates/deletes subscriptions, owns tasks)       │
//! └────────────────────────────────────────────────────────┘
//!            │                        │
//!            ▼                        ▼
//! ┌─────────────────────┐  ┌─────────────────────┐
//! │  Subscription (1)   │  │  Subscription (2)   │   one publish task each
//! │  [Item1, Item2]     │  │  [Item3]            │
//! └─────────────────────┘  └─────────────────────┘
//!            │                        │
//!            ▼                        ▼
//!     NotificationSink         NotificationSink
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use tagnet_core::error::{SubscriptionError, SubscriptionResult};
use tagnet_core::{
    MonitoredItemId, NodeId, Notification, NotificationBatch, NotificationSink, SubscriptionId,
    Value,
};

use crate::address_space::AddressSpace;

// =============================================================================
// MonitoredItem
// =============================================================================

/// A monitored item inside a subscription.
#[derive(Debug, Clone)]
pub struct MonitoredItem {
    /// Server-assigned item ID.
    pub id: MonitoredItemId,

    /// The node being watched. Only the value attribute is monitored.
    pub node_id: NodeId,

    /// Requested sampling interval. Delivery is always batched at the
    /// subscription's publishing interval, never faster.
    pub sampling_interval: Duration,

    /// Change sequence of the last notified value.
    last_seq: u64,

    /// Last notified value.
    last_value: Option<Value>,

    /// Last notified source timestamp.
    last_timestamp: Option<DateTime<Utc>>,

    /// Number of notifications produced for this item.
    notification_count: u64,
}

impl MonitoredItem {
    fn new(
        id: MonitoredItemId,
        node_id: NodeId,
        sampling_interval: Duration,
        current_seq: u64,
    ) -> Self {
        Self {
            id,
            node_id,
            sampling_interval,
            last_seq: current_seq,
            last_value: None,
            last_timestamp: None,
            notification_count: 0,
        }
    }

    /// Returns the last value this item reported, if any.
    pub fn last_value(&self) -> Option<&Value> {
        self.last_value.as_ref()
    }

    /// Returns the timestamp of the last reported value, if any.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// Returns how many notifications this item has produced.
    pub fn notification_count(&self) -> u64 {
        self.notification_count
    }
}

// =============================================================================
// Subscription
// =============================================================================

#[derive(Debug)]
struct SubscriptionInner {
    /// Items in registration order; batches preserve this order.
    items: Vec<MonitoredItem>,

    /// Publishing flag. Disabled subscriptions keep sampling state advancing
    /// but deliver nothing, so re-enabling does not replay history.
    publishing_enabled: bool,

    /// Notifier total observed by the previous cycle; used as a cheap
    /// "anything changed at all?" skip.
    last_seen_total: u64,

    next_item_id: u32,
}

/// A subscription with its monitored items and registered sink.
pub struct Subscription {
    /// Server-assigned subscription ID.
    pub id: SubscriptionId,

    /// Publishing interval of this subscription's publish task.
    pub publishing_interval: Duration,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    inner: Mutex<SubscriptionInner>,
    sink: Arc<dyn NotificationSink>,
    stop_tx: watch::Sender<bool>,
    batches_delivered: AtomicU64,
    notifications_delivered: AtomicU64,
}

impl Subscription {
    fn new(
        id: SubscriptionId,
        publishing_interval: Duration,
        sink: Arc<dyn NotificationSink>,
        stop_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            id,
            publishing_interval,
            created_at: Utc::now(),
            inner: Mutex::new(SubscriptionInner {
                items: Vec::new(),
                publishing_enabled: true,
                last_seen_total: 0,
                next_item_id: 1,
            }),
            sink,
            stop_tx,
            batches_delivered: AtomicU64::new(0),
            notifications_delivered: AtomicU64::new(0),
        }
    }

    /// Returns the number of batches delivered so far.
    pub fn batches_delivered(&self) -> u64 {
        self.batches_delivered.load(Ordering::Relaxed)
    }

    /// Returns the number of notifications delivered so far.
    pub fn notifications_delivered(&self) -> u64 {
        self.notifications_delivered.load(Ordering::Relaxed)
    }

    /// One publish cycle: sample, diff, deliver.
    ///
    /// Sampling and bookkeeping happen under the subscription lock (with
    /// short excursions into the address-space read lock); the sink is
    /// invoked after both are released so a callback may issue new reads or
    /// writes without deadlocking.
    async fn publish_cycle(&self, space: &AddressSpace, stats: &EngineStats) {
        let batch = {
            let mut inner = self.inner.lock().await;

            let total = space.notifier().total_changes();
            if total == inner.last_seen_total {
                return;
            }

            let mut notifications = Vec::new();
            for item in inner.items.iter_mut() {
                match space.sample(&item.node_id) {
                    Ok((value, timestamp, seq)) => {
                        if seq != item.last_seq {
                            item.last_seq = seq;
                            item.last_value = Some(value.clone());
                            item.last_timestamp = Some(timestamp);
                            item.notification_count += 1;
                            notifications.push(Notification {
                                item_id: item.id,
                                node_id: item.node_id.clone(),
                                value,
                                timestamp,
                            });
                        }
                    }
                    Err(error) => {
                        // One bad item must not stop the cycle.
                        tracing::warn!(
                            subscription = %self.id,
                            item = %item.id,
                            %error,
                            "monitored item sampling failed"
                        );
                    }
                }
            }
            inner.last_seen_total = total;

            if !inner.publishing_enabled || notifications.is_empty() {
                return;
            }
            notifications
        };

        let count = batch.len() as u64;
        self.sink
            .on_notifications(self.id, NotificationBatch::new(batch))
            .await;

        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.notifications_delivered
            .fetch_add(count, Ordering::Relaxed);
        stats.record_delivery(count);

        tracing::trace!(subscription = %self.id, notifications = count, "batch delivered");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("publishing_interval", &self.publishing_interval)
            .finish()
    }
}

// =============================================================================
// SubscriptionEngine
// =============================================================================

/// Creates, runs, and deletes subscriptions.
///
/// The engine is fully thread-safe and shared behind an `Arc`. Each
/// subscription gets an independent tokio interval task; errors inside a
/// tick are logged and the next tick still fires.
pub struct SubscriptionEngine {
    address_space: Arc<AddressSpace>,
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<Subscription>>>,
    tasks: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
    next_id: AtomicU32,
    stats: EngineStats,
}

impl SubscriptionEngine {
    /// Creates a new engine over an address space.
    pub fn new(address_space: Arc<AddressSpace>) -> Self {
        Self {
            address_space,
            subscriptions: RwLock::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            stats: EngineStats::new(),
        }
    }

    /// Returns the engine statistics.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Creates a subscription and starts its publish task.
    ///
    /// The sink is registered here, once, and invoked for every non-empty
    /// batch the publish cycle produces.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInterval` for a zero publishing interval.
    pub async fn create_subscription(
        &self,
        publishing_interval: Duration,
        sink: Arc<dyn NotificationSink>,
    ) -> SubscriptionResult<SubscriptionId> {
        if publishing_interval.is_zero() {
            return Err(SubscriptionError::invalid_interval(
                "publishing interval must be greater than 0",
            ));
        }

        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (stop_tx, stop_rx) = watch::channel(false);
        let subscription = Arc::new(Subscription::new(id, publishing_interval, sink, stop_tx));

        self.subscriptions
            .write()
            .await
            .insert(id, Arc::clone(&subscription));

        let task = tokio::spawn(Self::run_publish_task(
            Arc::clone(&subscription),
            Arc::clone(&self.address_space),
            self.stats.clone(),
            stop_rx,
        ));
        self.tasks.lock().await.insert(id, task);

        self.stats.created.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            subscription = %id,
            publishing_interval_ms = publishing_interval.as_millis(),
            "subscription created"
        );
        Ok(id)
    }

    async fn run_publish_task(
        subscription: Arc<Subscription>,
        space: Arc<AddressSpace>,
        stats: EngineStats,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(subscription.publishing_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick fires immediately; consume it so delivery
        // is never faster than the publishing interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    subscription.publish_cycle(&space, &stats).await;
                }
            }
        }

        tracing::debug!(subscription = %subscription.id, "publish task stopped");
    }

    /// Adds a monitored item to a subscription.
    ///
    /// The item's last-notified sequence starts at the node's current
    /// sequence, so only changes after registration are reported.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the subscription does not exist
    /// - `NodeNotFound` if the node is missing or not a variable
    pub async fn add_monitored_item(
        &self,
        subscription_id: SubscriptionId,
        node_id: NodeId,
        sampling_interval: Duration,
    ) -> SubscriptionResult<MonitoredItemId> {
        let subscription = self.get(subscription_id).await?;

        let (_, _, current_seq) = self
            .address_space
            .sample(&node_id)
            .map_err(|_| SubscriptionError::node_not_found(node_id.clone()))?;

        let mut inner = subscription.inner.lock().await;
        let item_id = MonitoredItemId::new(inner.next_item_id);
        inner.next_item_id += 1;
        inner.items.push(MonitoredItem::new(
            item_id,
            node_id.clone(),
            sampling_interval,
            current_seq,
        ));

        tracing::debug!(
            subscription = %subscription_id,
            item = %item_id,
            node = %node_id,
            "monitored item added"
        );
        Ok(item_id)
    }

    /// Removes a monitored item. Idempotent: a missing subscription or item
    /// is a no-op.
    pub async fn delete_monitored_item(
        &self,
        subscription_id: SubscriptionId,
        item_id: MonitoredItemId,
    ) {
        if let Ok(subscription) = self.get(subscription_id).await {
            let mut inner = subscription.inner.lock().await;
            inner.items.retain(|item| item.id != item_id);
        }
    }

    /// Deletes a subscription, all its items, and its publish task.
    /// Idempotent: deleting an unknown subscription is a no-op.
    pub async fn delete_subscription(&self, id: SubscriptionId) {
        let removed = self.subscriptions.write().await.remove(&id);
        let task = self.tasks.lock().await.remove(&id);

        if let Some(subscription) = removed {
            let _ = subscription.stop_tx.send(true);
            if let Some(task) = task {
                // Cancel rather than await: deletion may be issued from a
                // sink callback running inside the publish task itself.
                task.abort();
            }
            self.stats.deleted.fetch_add(1, Ordering::Relaxed);
            tracing::info!(subscription = %id, "subscription deleted");
        }
    }

    /// Enables or disables publishing for a subscription.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionNotFound` if the subscription does not exist.
    pub async fn set_publishing_enabled(
        &self,
        id: SubscriptionId,
        enabled: bool,
    ) -> SubscriptionResult<()> {
        let subscription = self.get(id).await?;
        subscription.inner.lock().await.publishing_enabled = enabled;
        tracing::debug!(subscription = %id, enabled, "publishing mode changed");
        Ok(())
    }

    /// Returns the number of active subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Returns the number of monitored items in a subscription.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionNotFound` if the subscription does not exist.
    pub async fn monitored_item_count(&self, id: SubscriptionId) -> SubscriptionResult<usize> {
        let subscription = self.get(id).await?;
        let count = subscription.inner.lock().await.items.len();
        Ok(count)
    }

    /// Returns a subscription handle for inspection.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionNotFound` if the subscription does not exist.
    pub async fn subscription(&self, id: SubscriptionId) -> SubscriptionResult<Arc<Subscription>> {
        self.get(id).await
    }

    /// Stops every subscription's publish task and clears the engine.
    ///
    /// Cooperative: each task finishes its in-flight cycle before the call
    /// returns.
    pub async fn shutdown(&self) {
        let subscriptions: Vec<Arc<Subscription>> =
            self.subscriptions.write().await.drain().map(|(_, s)| s).collect();
        for subscription in &subscriptions {
            let _ = subscription.stop_tx.send(true);
        }

        let tasks: Vec<JoinHandle<()>> =
            self.tasks.lock().await.drain().map(|(_, t)| t).collect();
        for task in tasks {
            let _ = task.await;
        }

        tracing::info!("subscription engine stopped");
    }

    async fn get(&self, id: SubscriptionId) -> SubscriptionResult<Arc<Subscription>> {
        self.subscriptions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SubscriptionError::not_found(id))
    }
}

impl std::fmt::Debug for SubscriptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionEngine").finish_non_exhaustive()
    }
}

// =============================================================================
// EngineStats
// =============================================================================

/// Counters for subscription activity. Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    created: Arc<AtomicU64>,
    deleted: Arc<AtomicU64>,
    batches: Arc<AtomicU64>,
    notifications: Arc<AtomicU64>,
}

impl EngineStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_delivery(&self, notifications: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.notifications.fetch_add(notifications, Ordering::Relaxed);
    }

    /// Total subscriptions created.
    pub fn subscriptions_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Total subscriptions deleted.
    pub fn subscriptions_deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    /// Total batches delivered.
    pub fn batches_delivered(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Total notifications delivered.
    pub fn notifications_delivered(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
