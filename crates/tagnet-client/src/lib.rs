// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The TagNet client: connection lifecycle, keep-alive, and reconnection.
//!
//! [`TagClient`] wraps an abstract [`SessionTransport`] with the connection
//! state machine: connect, read/write, one caller-visible subscription, a
//! keep-alive probe loop, and an automatic reconnect loop that preserves the
//! subscription across session replacements.
//!
//! # Example
//!
//! ```rust,ignore
//! use tagnet_client::{ClientConfig, TagClient};
//! use tagnet_core::NodeId;
//!
//! let config = ClientConfig::new("tagnet://localhost:62541/SimpleServer");
//! let client = TagClient::new(config, transport);
//!
//! client.connect().await?;
//! let (value, _) = client.read(&NodeId::new("HelloWorld")).await?;
//! println!("server says: {}", value);
//!
//! let mut subscription = client
//!     .subscribe(vec![NodeId::new("3DPrinter/Temperature")])
//!     .await?;
//! while let Some(batch) = subscription.recv().await {
//!     println!("{} notifications", batch.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod subscription;

pub use config::ClientConfig;
pub use connection::{ClientStats, ConnectionState, TagClient};
pub use subscription::SubscriptionProxy;

pub use tagnet_core::transport::SessionTransport;
