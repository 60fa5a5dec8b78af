// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TagNet binary support library: CLI, logging, shutdown, and the demo
//! runtime.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;
