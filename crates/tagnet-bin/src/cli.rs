// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// TagNet - minimal industrial tag-data server/client
#[derive(Parser, Debug)]
#[command(
    name = "tagnet",
    version = tagnet_core::VERSION,
    about = "Minimal industrial tag-data server/client demo",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "TAGNET_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "TAGNET_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the in-process server/client demo
    ///
    /// This is the default command when no subcommand is specified. It
    /// starts a tag server with the simulated 3D printer, connects a client
    /// through the loopback transport, and streams temperature
    /// notifications until interrupted.
    Run(RunArgs),

    /// Show version information
    Version,
}

/// Arguments for the `run` command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Endpoint label for the demo session
    #[arg(long, default_value = "tagnet://localhost:62541/SimpleServer")]
    pub endpoint: String,

    /// Simulation tick interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub simulation_interval_ms: u64,

    /// Subscription publishing interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub publishing_interval_ms: u64,

    /// Stop automatically after this many seconds (runs until Ctrl+C if
    /// omitted)
    #[arg(long)]
    pub run_for_secs: Option<u64>,
}

impl RunArgs {
    /// Simulation interval as a `Duration`.
    pub fn simulation_interval(&self) -> Duration {
        Duration::from_millis(self.simulation_interval_ms)
    }

    /// Publishing interval as a `Duration`.
    pub fn publishing_interval(&self) -> Duration {
        Duration::from_millis(self.publishing_interval_ms)
    }
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            endpoint: "tagnet://localhost:62541/SimpleServer".to_string(),
            simulation_interval_ms: 1000,
            publishing_interval_ms: 1000,
            run_for_secs: None,
        }
    }
}

// =============================================================================
// LogFormat
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,

    /// JSON output for log aggregation.
    Json,

    /// Compact single-line output.
    Compact,
}

// =============================================================================
// Tests
// =============================================================================
