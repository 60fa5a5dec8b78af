// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use tagnet_core::{EndpointDescriptor, Identity};

/// Configuration for a [`TagClient`](crate::TagClient).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tagnet_client::ClientConfig;
///
/// let config = ClientConfig::new("tagnet://localhost:62541/SimpleServer")
///     .with_keep_alive_interval(Duration::from_secs(5))
///     .with_reconnect_interval(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server endpoint to connect to.
    pub endpoint: EndpointDescriptor,

    /// Identity presented when opening a session.
    #[serde(default)]
    pub identity: Identity,

    /// Timeout for a single request round-trip (connect, read, write).
    #[serde(default = "default_request_timeout")]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Interval between keep-alive probes while connected.
    #[serde(default = "default_keep_alive_interval")]
    #[serde(with = "humantime_serde")]
    pub keep_alive_interval: Duration,

    /// Timeout for a single keep-alive probe; a timed-out probe counts as a
    /// failure.
    #[serde(default = "default_probe_timeout")]
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Fixed interval between reconnect attempts.
    #[serde(default = "default_reconnect_interval")]
    #[serde(with = "humantime_serde")]
    pub reconnect_interval: Duration,

    /// Ceiling on reconnect attempts. `None` retries indefinitely, which is
    /// the appropriate default for long-lived field connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,

    /// Publishing interval requested for the client's subscription.
    #[serde(default = "default_publishing_interval")]
    #[serde(with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Sampling interval requested for monitored items.
    #[serde(default = "default_sampling_interval")]
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_keep_alive_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_publishing_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(500)
}

impl ClientConfig {
    /// Creates a configuration for an endpoint with default timings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: EndpointDescriptor::new(endpoint),
            identity: Identity::Anonymous,
            request_timeout: default_request_timeout(),
            keep_alive_interval: default_keep_alive_interval(),
            probe_timeout: default_probe_timeout(),
            reconnect_interval: default_reconnect_interval(),
            max_reconnect_attempts: None,
            publishing_interval: default_publishing_interval(),
            sampling_interval: default_sampling_interval(),
        }
    }

    /// Sets the identity.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the keep-alive probe interval.
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Sets the keep-alive probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the reconnect retry interval.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets a ceiling on reconnect attempts.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Sets the subscription publishing interval.
    pub fn with_publishing_interval(mut self, interval: Duration) -> Self {
        self.publishing_interval = interval;
        self
    }

    /// Sets the monitored-item sampling interval.
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }
}
