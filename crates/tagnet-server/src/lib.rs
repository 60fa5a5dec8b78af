// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The TagNet server: address space, subscription engine, and lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       TagServer                         │
//! │                  (Start/Stop lifecycle)                 │
//! └─────────────────────────────────────────────────────────┘
//!        │                 │                    │
//!        ▼                 ▼                    ▼
//! ┌─────────────┐  ┌─────────────────┐  ┌─────────────────┐
//! │ AddressSpace│──│ ChangeNotifier  │  │ SimulationSource│
//! │ (node tree) │  │ (change masks)  │  │ (periodic task) │
//! └─────────────┘  └─────────────────┘  └─────────────────┘
//!        │                 │
//!        ▼                 ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SubscriptionEngine                     │
//! │       (publish cycles → NotificationSink batches)       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`LoopbackTransport`] exposes a running server through the
//! `tagnet-core` transport boundary for in-process clients and tests.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod address_space;
pub mod local;
pub mod notifier;
pub mod server;
pub mod simulation;
pub mod subscription;

pub use address_space::{AddressSpace, NodeInfo};
pub use local::LoopbackTransport;
pub use notifier::ChangeNotifier;
pub use server::{nodes, ServerConfig, TagServer};
pub use simulation::SimulationSource;
pub use subscription::{EngineStats, MonitoredItem, Subscription, SubscriptionEngine};
