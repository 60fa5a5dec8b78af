// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for TagNet.
//!
//! # Error Hierarchy
//!
//! ```text
//! ClientError (client-facing root)
//! ├── NotConnected / AlreadyConnected  - Connection state violations
//! ├── Connection(ConnectionError)      - Transport-level failures
//! ├── AddressSpace(AddressSpaceError)  - Server node-tree errors
//! ├── Subscription(SubscriptionError)  - Subscription bookkeeping errors
//! └── Timeout                          - Request deadline exceeded
//! ```
//!
//! Address-space and subscription errors are always returned to the
//! immediate caller and never affect other nodes, subscriptions, or
//! sessions. Keep-alive failures are not surfaced as request errors; they
//! drive the client's reconnect state machine instead.
//!
//! # Examples
//!
//! ```
//! use tagnet_core::error::{ClientError, ConnectionError};
//!
//! let error = ClientError::from(ConnectionError::refused("tagnet://demo"));
//! assert!(error.is_retryable());
//! ```

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::node::{NodeId, SubscriptionId};
use crate::value::DataType;

// =============================================================================
// AddressSpaceError
// =============================================================================

/// Errors from address-space operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AddressSpaceError {
    /// The requested node does not exist.
    #[error("node not found: {node}")]
    NodeNotFound {
        /// The missing node.
        node: NodeId,
    },

    /// The parent node does not exist or is not a folder.
    #[error("invalid parent for {node}: {reason}")]
    InvalidParent {
        /// The node being created.
        node: NodeId,
        /// Why the parent was rejected.
        reason: String,
    },

    /// A node with the same ID already exists.
    #[error("duplicate node id: {node}")]
    DuplicateId {
        /// The conflicting node.
        node: NodeId,
    },

    /// The variable's access mask forbids the operation.
    #[error("access denied on {node}: variable is {access}")]
    AccessDenied {
        /// The target node.
        node: NodeId,
        /// The variable's access mask, as text.
        access: String,
    },

    /// The written value's type does not match the variable's declared type.
    #[error("type mismatch on {node}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The target node.
        node: NodeId,
        /// The variable's declared type.
        expected: DataType,
        /// The type of the offered value.
        actual: DataType,
    },

    /// The node exists but is not a variable.
    #[error("{node} is not a variable")]
    NotAVariable {
        /// The target node.
        node: NodeId,
    },
}

impl AddressSpaceError {
    /// Creates a node-not-found error.
    pub fn node_not_found(node: impl Into<NodeId>) -> Self {
        Self::NodeNotFound { node: node.into() }
    }

    /// Creates an invalid-parent error.
    pub fn invalid_parent(node: impl Into<NodeId>, reason: impl Into<String>) -> Self {
        Self::InvalidParent {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Creates a duplicate-id error.
    pub fn duplicate_id(node: impl Into<NodeId>) -> Self {
        Self::DuplicateId { node: node.into() }
    }

    /// Creates an access-denied error.
    pub fn access_denied(node: impl Into<NodeId>, access: impl Into<String>) -> Self {
        Self::AccessDenied {
            node: node.into(),
            access: access.into(),
        }
    }

    /// Creates a type-mismatch error.
    pub fn type_mismatch(node: impl Into<NodeId>, expected: DataType, actual: DataType) -> Self {
        Self::TypeMismatch {
            node: node.into(),
            expected,
            actual,
        }
    }

    /// Creates a not-a-variable error.
    pub fn not_a_variable(node: impl Into<NodeId>) -> Self {
        Self::NotAVariable { node: node.into() }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Errors from subscription bookkeeping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubscriptionError {
    /// The subscription does not exist.
    #[error("subscription not found: {id}")]
    SubscriptionNotFound {
        /// The missing subscription.
        id: SubscriptionId,
    },

    /// The monitored node does not exist in the address space.
    #[error("monitored node not found: {node}")]
    NodeNotFound {
        /// The missing node.
        node: NodeId,
    },

    /// The publishing interval is invalid.
    #[error("invalid publishing interval: {reason}")]
    InvalidInterval {
        /// Why the interval was rejected.
        reason: String,
    },

    /// The client already holds its one subscription.
    #[error("client already holds an active subscription")]
    AlreadySubscribed,
}

impl SubscriptionError {
    /// Creates a subscription-not-found error.
    pub fn not_found(id: SubscriptionId) -> Self {
        Self::SubscriptionNotFound { id }
    }

    /// Creates a monitored-node-not-found error.
    pub fn node_not_found(node: impl Into<NodeId>) -> Self {
        Self::NodeNotFound { node: node.into() }
    }

    /// Creates an invalid-interval error.
    pub fn invalid_interval(reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Transport-level connection errors, carrying the underlying cause.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The endpoint refused the connection.
    #[error("connection refused: {endpoint}")]
    Refused {
        /// The endpoint that refused.
        endpoint: String,
    },

    /// The session is no longer valid on the server.
    #[error("session invalid or expired")]
    SessionInvalid,

    /// The connection attempt timed out.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// An I/O error from the underlying transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl ConnectionError {
    /// Creates a connection-refused error.
    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a generic transport error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Returns `true` if this error is retryable.
    ///
    /// All connection errors are transient from the client's point of view;
    /// the reconnect loop retries them.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

// =============================================================================
// ClientError
// =============================================================================

/// The client-facing error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation requires a connected client.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on an already-connected client.
    #[error("already connected")]
    AlreadyConnected,

    /// A transport-level failure.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// A server-side address-space error.
    #[error("{0}")]
    AddressSpace(#[from] AddressSpaceError),

    /// A server-side subscription error.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// The request exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    /// Creates a not-connected error.
    #[inline]
    pub fn not_connected() -> Self {
        Self::NotConnected
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout(after)
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::NotConnected | Self::AlreadyConnected => false,
            Self::AddressSpace(_) | Self::Subscription(_) => false,
        }
    }
}

/// Result alias for address-space operations.
pub type AddressSpaceResult<T> = Result<T, AddressSpaceError>;

/// Result alias for subscription operations.
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

// =============================================================================
// Tests
// =============================================================================
