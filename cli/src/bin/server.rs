// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! `conflux-server <resources-path>`: single worker, runs `Api::init` then
//! blocks on a shutdown signal (spec §6.3, SPEC_FULL.md §10.7).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use conflux_engine::executor::AdapterRegistry;

#[derive(Parser)]
#[command(name = "conflux-server", about = "Runs a single conflux_engine worker")]
struct Args {
    /// Path to the resources directory (spec §6.2 `<resourcesPath>`).
    resources_path: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    conflux_cli::init_logging();
    let args = Args::parse();

    let api = match conflux_cli::init_api(args.resources_path, AdapterRegistry::new()).await {
        Ok(api) => api,
        Err(err) => {
            tracing::error!(error = %err, "failed to start server");
            return ExitCode::from(conflux_cli::EXIT_STARTUP_FAILURE as u8);
        }
    };

    tracing::info!("conflux-server ready");
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install signal handler");
    }

    tracing::info!("shutting down");
    if let Err(err) = api.close().await {
        tracing::error!(error = %err, "error during shutdown");
    }

    ExitCode::from(conflux_cli::EXIT_OK as u8)
}
