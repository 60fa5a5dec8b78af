// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TagNet - minimal industrial tag-data server/client
//!
//! Main binary entry point.

use clap::Parser;

use tagnet_bin::cli::{Cli, Commands};
use tagnet_bin::logging::init_logging;
use tagnet_bin::runtime;
use tagnet_bin::shutdown::ShutdownCoordinator;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    match cli.command {
        Some(Commands::Version) => {
            println!("tagnet v{}", tagnet_core::VERSION);
            std::process::ExitCode::SUCCESS
        }
        Some(Commands::Run(args)) => run(args).await,
        None => run(tagnet_bin::cli::RunArgs::default()).await,
    }
}

async fn run(args: tagnet_bin::cli::RunArgs) -> std::process::ExitCode {
    let coordinator = ShutdownCoordinator::new();

    match runtime::run(args, coordinator).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "demo runtime failed");
            eprintln!("error: {}", error);
            std::process::ExitCode::FAILURE
        }
    }
}
