// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! The adapter contract (spec §4.2 "Adapters see the `process` contract").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::watch;

use crate::resolver::AdapterRequest;
use crate::Result;

/// One row of adapter output: an unstructured `{column -> value}` map, since
/// the core never interprets column values beyond the key/mapped-column
/// bookkeeping done in [`crate::result`].
pub type Row = Map<String, JsonValue>;

/// What `process` returns (spec §4.2 `{data: row[], totalCount: int|null}`).
#[derive(Debug, Clone, Default)]
pub struct RawPayload {
    pub data: Vec<Row>,
    pub total_count: Option<u64>,
}

/// Cooperative cancellation + per-request deadline, threaded through every
/// adapter call (spec §5 "Cancellation and timeouts"). Built on a
/// `tokio::sync::watch` channel rather than `tokio_util::sync::CancellationToken`:
/// every clone shares the same underlying flag, so cancelling one clone (e.g.
/// the root context held by the facade) is observed by every sibling
/// sub-request's clone without any extra bookkeeping.
#[derive(Clone)]
pub struct ExecutionContext {
    cancel_tx: watch::Sender<bool>,
    cancelled: watch::Receiver<bool>,
    pub auth: Option<String>,
}

impl ExecutionContext {
    pub fn new(auth: Option<String>) -> Self {
        let (cancel_tx, cancelled) = watch::channel(false);
        Self {
            cancel_tx,
            cancelled,
            auth,
        }
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(None)
    }
}

/// The native async adapter interface. One implementation per datasource
/// `type` (e.g. `"mysql"`, `"solr"`).
#[async_trait]
pub trait DataSourceAdapter: Send + Sync {
    /// Called once per adapter per request during the prepare phase (spec
    /// §4.2 step 1), before any `process` call, so the adapter can
    /// compile/validate its request payload upfront.
    async fn prepare(&self, request: &AdapterRequest) -> Result<()>;

    /// Executes `request` and returns its rows.
    async fn process(&self, request: &AdapterRequest, ctx: &ExecutionContext) -> Result<RawPayload>;

    /// Releases any held resources. Called once at facade shutdown, not
    /// per-request.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// The older callback/sync-style adapter interface (spec §9 open question:
/// "Two adapter signatures (callback vs promise) coexist; the core must
/// accept both"). Implement this when an adapter's underlying client is
/// blocking; [`SyncAdapterBridge`] lifts it onto [`DataSourceAdapter`].
pub trait SyncDataSourceAdapter: Send + Sync + 'static {
    fn prepare(&self, request: &AdapterRequest) -> Result<()>;
    fn process(&self, request: &AdapterRequest, ctx: &ExecutionContext) -> Result<RawPayload>;
}

/// Bridges a [`SyncDataSourceAdapter`] onto the async [`DataSourceAdapter`]
/// trait via [`tokio::task::spawn_blocking`], so the executor's concurrent
/// sibling fan-out never blocks the runtime on a synchronous adapter.
///
/// Kept rather than retired per the open question in spec §9: both adapter
/// shapes stay supported, with a one-time deprecation log for the sync form.
pub struct SyncAdapterBridge<A> {
    inner: Arc<A>,
    warned: AtomicBool,
}

impl<A> SyncAdapterBridge<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner: Arc::new(inner),
            warned: AtomicBool::new(false),
        }
    }

    fn warn_once(&self) {
        if !self.warned.swap(true, Ordering::SeqCst) {
            tracing::warn!("datasource adapter uses the deprecated synchronous/callback interface");
        }
    }
}

#[async_trait]
impl<A: SyncDataSourceAdapter> DataSourceAdapter for SyncAdapterBridge<A> {
    async fn prepare(&self, request: &AdapterRequest) -> Result<()> {
        self.warn_once();
        let inner = self.inner.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || inner.prepare(&request))
            .await
            .map_err(|e| crate::error::ErrorKind::Adapter.with_source(e))?
    }

    async fn process(&self, request: &AdapterRequest, ctx: &ExecutionContext) -> Result<RawPayload> {
        self.warn_once();
        let inner = self.inner.clone();
        let request = request.clone();
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || inner.process(&request, &ctx))
            .await
            .map_err(|e| crate::error::ErrorKind::Adapter.with_source(e))?
    }
}

/// `{datasource type -> adapter}`, built once at facade `init` and shared
/// read-only across concurrent requests (spec §5 "Shared resources").
pub type AdapterRegistry = std::collections::HashMap<String, Arc<dyn DataSourceAdapter>>;
