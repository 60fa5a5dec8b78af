// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data model and boundary traits for TagNet.
//!
//! TagNet is a minimal industrial tag-data server/client pair: a server
//! exposes a small tree of named data points that can be read, written, and
//! subscribed to for change notifications; a client connects, issues
//! reads/writes, and maintains a live subscription with automatic
//! reconnection on link loss.
//!
//! This crate holds everything shared between the server and client sides:
//!
//! - **Values**: [`Value`], [`DataType`], [`AccessLevel`]
//! - **Identifiers**: [`NodeId`], [`SessionId`], [`SubscriptionId`],
//!   [`MonitoredItemId`]
//! - **Errors**: the [`error`] hierarchy
//! - **Transport boundary**: [`SessionTransport`], [`NotificationSink`] and
//!   the session/notification types they exchange
//! - **Event logging**: the [`EventLog`] text callback

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod log;
pub mod node;
pub mod transport;
pub mod value;

/// Crate version, shared by the binary's `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::{
    AddressSpaceError, AddressSpaceResult, ClientError, ClientResult, ConnectionError,
    SubscriptionError, SubscriptionResult,
};
pub use log::EventLog;
pub use node::{MonitoredItemId, NodeId, SessionId, SubscriptionId};
pub use transport::{
    ChannelSink, EndpointDescriptor, Identity, KeepAliveStatus, Notification, NotificationBatch,
    NotificationSink, SessionHandle, SessionTransport,
};
pub use value::{AccessLevel, DataType, Value};
