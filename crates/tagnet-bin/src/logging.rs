// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tracing initialization for the `tagnet` binary.
//!
//! The CLI level is the default; directives from the environment
//! (`RUST_LOG`) win when present. The core's [`EventLog`] lines go to
//! stdout separately and are not routed through tracing.
//!
//! [`EventLog`]: tagnet_core::EventLog

use std::io::IsTerminal;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;

/// Installs the global tracing subscriber.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = env_filter(level);
    let registry = tracing_subscriber::registry().with(filter);
    let ansi = std::io::stdout().is_terminal();

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_ansi(ansi))
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(true),
            )
            .init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_ansi(ansi))
            .init(),
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},tokio=info")))
}

// =============================================================================
// Tests
// =============================================================================
