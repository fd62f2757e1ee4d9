// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! `conflux-master <resources-path> [--workers N] [--startup-timeout SECS]
//! [--shutdown-timeout SECS] [--watch]`: supervises `workers` server workers
//! sharing one hot-reloadable [`conflux_engine::facade::Api`], optionally
//! watching the resources path for dev hot-reload (spec §6.3,
//! SPEC_FULL.md §10.7).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use conflux_engine::executor::AdapterRegistry;
use conflux_engine::facade::Api;
use notify::{RecursiveMode, Watcher};

#[derive(Parser)]
#[command(name = "conflux-master", about = "Supervises conflux_engine workers")]
struct Args {
    /// Path to the resources directory (spec §6.2 `<resourcesPath>`).
    resources_path: PathBuf,
    /// Number of workers to supervise.
    #[arg(long, default_value_t = 1)]
    workers: usize,
    #[arg(long, default_value_t = 30)]
    startup_timeout: u64,
    #[arg(long, default_value_t = 30)]
    shutdown_timeout: u64,
    /// Watch the resources path and hot-reload on change (dev only).
    #[arg(long, default_value_t = false)]
    watch: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    conflux_cli::init_logging();
    let args = Args::parse();

    let init_result = tokio::time::timeout(
        Duration::from_secs(args.startup_timeout),
        conflux_cli::init_api(args.resources_path.clone(), AdapterRegistry::new()),
    )
    .await;

    let api = match init_result {
        Ok(Ok(api)) => Arc::new(api),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "failed to start master");
            return ExitCode::from(conflux_cli::EXIT_STARTUP_FAILURE as u8);
        }
        Err(_) => {
            tracing::error!(timeout_secs = args.startup_timeout, "startup timed out");
            return ExitCode::from(conflux_cli::EXIT_STARTUP_FAILURE as u8);
        }
    };

    let _watcher = if args.watch {
        match spawn_watcher(args.resources_path.clone(), api.clone()) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                tracing::error!(error = %err, "failed to install resources watcher");
                None
            }
        }
    } else {
        None
    };

    let mut handles = Vec::with_capacity(args.workers);
    for worker_id in 0..args.workers {
        let api = api.clone();
        handles.push(tokio::spawn(async move {
            tracing::info!(worker_id, "worker ready");
            let _ = api;
            std::future::pending::<()>().await;
        }));
    }

    tracing::info!(workers = args.workers, "conflux-master ready");
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install signal handler");
    }

    for handle in &handles {
        handle.abort();
    }
    tracing::info!("shutting down");
    let shutdown = tokio::time::timeout(Duration::from_secs(args.shutdown_timeout), api.close()).await;
    match shutdown {
        Ok(Ok(())) => ExitCode::from(conflux_cli::EXIT_OK as u8),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "error during shutdown");
            ExitCode::from(conflux_cli::EXIT_STARTUP_FAILURE as u8)
        }
        Err(_) => {
            tracing::error!(timeout_secs = args.shutdown_timeout, "shutdown timed out");
            ExitCode::from(conflux_cli::EXIT_STARTUP_FAILURE as u8)
        }
    }
}

/// Installs a filesystem watcher that calls [`Api::reload`] on every event
/// under `resources_path` (SPEC_FULL.md §10.3 "dev hot-reload"). The watcher
/// itself runs notify's blocking callback on its own thread; only the cheap
/// `reload()` call (a filesystem walk plus an `ArcSwap::store`) crosses back
/// onto the async side, via `Handle::block_on`.
fn spawn_watcher(resources_path: PathBuf, api: Arc<Api>) -> notify::Result<notify::RecommendedWatcher> {
    let runtime = tokio::runtime::Handle::current();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| match event {
        Ok(event) => {
            tracing::debug!(?event, "resources path changed, reloading");
            let api = api.clone();
            runtime.spawn_blocking(move || {
                if let Err(err) = api.reload() {
                    tracing::error!(error = %err, "hot reload failed");
                }
            });
        }
        Err(err) => tracing::error!(error = %err, "resources watcher error"),
    })?;
    watcher.watch(&resources_path, RecursiveMode::Recursive)?;
    Ok(watcher)
}
