// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the TagNet binary.

use thiserror::Error;

/// Result type alias for tagnet-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that can occur in the TagNet binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Initialization error.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Server-side error.
    #[error("server error: {0}")]
    Server(#[from] tagnet_core::AddressSpaceError),

    /// Client-side error.
    #[error("client error: {0}")]
    Client(#[from] tagnet_core::ClientError),
}

impl BinError {
    /// Creates an initialization error.
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }
}
