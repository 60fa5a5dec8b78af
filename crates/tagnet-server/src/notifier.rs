// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Change-mask bookkeeping.
//!
//! The [`ChangeNotifier`] sits between the address space and the
//! subscription engine: every successful mutation marks the node dirty here,
//! and the engine consults the notifier to decide whether a publish cycle
//! has any sampling work to do. The notifier never knows who is subscribed;
//! authoritative change detection is the per-item sequence diff in the
//! engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use tagnet_core::NodeId;

/// Per-variable change-mask bookkeeping.
///
/// `notify_changed` is a pure side-effect: it records the change and returns
/// immediately, without delivering anything. It is safe to call while
/// holding the address-space mutation lock; the notifier's own lock is a
/// leaf lock.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    /// Per-node change counts.
    masks: Mutex<HashMap<NodeId, u64>>,

    /// Total mutations observed across all nodes. Monotone; used by the
    /// publish cycle as a cheap "anything changed at all?" check.
    total: AtomicU64,
}

impl ChangeNotifier {
    /// Creates a new notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a node as changed. Side-effect only; no notification is
    /// delivered synchronously.
    pub fn notify_changed(&self, node: &NodeId) {
        let mut masks = self.masks.lock();
        *masks.entry(node.clone()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::Release);
    }

    /// Returns the total number of mutations observed.
    #[inline]
    pub fn total_changes(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Returns the number of changes recorded for one node.
    pub fn changes_for(&self, node: &NodeId) -> u64 {
        self.masks.lock().get(node).copied().unwrap_or(0)
    }
}
