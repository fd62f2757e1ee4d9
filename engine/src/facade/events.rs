// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! The event bus (spec §4.4, §9 "registry `{eventName → ordered handler
//! list}`, not inheritance-based emitter").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::executor::RawResult;
use crate::request::Request;
use crate::resolver::DataSourceTree;
use crate::Result;

/// The payload carried by each named event (spec §4.4's event list). The
/// `PreExecute`/`PostExecute` variants borrow mutably so a handler can amend
/// the plan or the raw results in place before the pipeline continues.
pub enum Event<'a> {
    Init,
    Request { request: &'a Request },
    PreExecute { tree: &'a mut DataSourceTree },
    PostExecute { raw_results: &'a mut Vec<RawResult> },
    Response { body: &'a JsonValue },
    Close,
}

/// One registered event handler. Implemented via `async_trait` (rather than
/// a `Fn(&Event) -> BoxFuture<'static, _>`) so a handler can borrow `Event`'s
/// non-`'static` mutable references across an `.await` point.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &mut Event<'_>) -> Result<()>;
}

pub type BoxedHandler = Arc<dyn EventHandler>;

struct SyncHandler<F>(F);

#[async_trait]
impl<F> EventHandler for SyncHandler<F>
where
    F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync,
{
    async fn handle(&self, event: &mut Event<'_>) -> Result<()> {
        (self.0)(event)
    }
}

/// Wraps a plain synchronous closure as a [`BoxedHandler`] (spec §9 "handlers
/// may be synchronous or asynchronous").
pub fn sync_handler<F>(f: F) -> BoxedHandler
where
    F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(SyncHandler(f))
}

#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<&'static str, Vec<BoxedHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, name: &'static str, handler: BoxedHandler) {
        self.handlers.entry(name).or_default().push(handler);
    }

    pub fn handlers_for(&self, name: &str) -> Vec<BoxedHandler> {
        self.handlers.get(name).cloned().unwrap_or_default()
    }
}
