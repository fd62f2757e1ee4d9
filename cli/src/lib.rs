// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Shared process plumbing for the `conflux-server`/`conflux-master`
//! binaries (spec §6.3, SPEC_FULL.md §10.7).

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Clean shutdown (spec §6.3 "0 normal").
pub const EXIT_OK: i32 = 0;
/// Config load or other startup failure (spec §6.3 "non-zero on startup failure").
pub const EXIT_STARTUP_FAILURE: i32 = 1;

/// Installs `tracing_subscriber::fmt` with `RUST_LOG`-driven filtering,
/// defaulting to `info` (SPEC_FULL.md §10.2).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Builds the engine's default [`conflux_engine::config::ParserRegistry`]
/// and loads resources once, surfacing a config error as a startup failure
/// rather than a per-request one.
pub async fn init_api(
    resources_path: PathBuf,
    adapters: conflux_engine::executor::AdapterRegistry,
) -> conflux_engine::Result<conflux_engine::facade::Api> {
    let opts = conflux_engine::facade::InitOptions {
        resources_path,
        parsers: conflux_engine::config::ParserRegistry::with_defaults(),
        adapters,
        expose_errors: false,
    };
    conflux_engine::facade::Api::init(opts).await
}
