// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! C6: the API Facade (spec §4.4). Lifecycle (`init`/`execute`/`close`), the
//! event bus, and the plugin registry; owns the hot-reloadable resource map.

mod events;

pub use events::{sync_handler, BoxedHandler, Event, EventHandler};

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::config::{load_resources, ParserRegistry, ResourceMap};
use crate::error::ErrorKind;
use crate::executor::{AdapterRegistry, ExecutionContext};
use crate::processor::{self, PipelineHooks};
use crate::request::Request;
use crate::resolver::DataSourceTree;
use crate::Result;

use events::EventBus;

/// What [`Api::init`] needs to load the first resource map and wire up
/// adapters (spec §5 "Shared resources").
pub struct InitOptions {
    pub resources_path: PathBuf,
    pub parsers: ParserRegistry,
    pub adapters: AdapterRegistry,
    /// Whether `ImplementationError` messages are exposed to the client
    /// (spec §7 "message hidden unless `exposeErrors`").
    pub expose_errors: bool,
}

impl InitOptions {
    pub fn new(resources_path: impl Into<PathBuf>) -> Self {
        Self {
            resources_path: resources_path.into(),
            parsers: ParserRegistry::with_defaults(),
            adapters: AdapterRegistry::new(),
            expose_errors: false,
        }
    }
}

type Plugin = (Arc<dyn Any + Send + Sync>, JsonValue);

/// The facade: one instance per running process, shared across concurrent
/// requests (spec §5).
pub struct Api {
    resources: ArcSwap<ResourceMap>,
    resources_path: PathBuf,
    parsers: ParserRegistry,
    adapters: AdapterRegistry,
    events: Mutex<EventBus>,
    plugins: Mutex<HashMap<String, Plugin>>,
    pub expose_errors: bool,
}

impl Api {
    /// `init(opts) → Promise` (spec §4.4): loads the resource map, runs every
    /// resource's `init` extension, then emits the `init` event.
    #[tracing::instrument(level = "debug", skip_all, err)]
    pub async fn init(opts: InitOptions) -> Result<Self> {
        let resources = load_resources(&opts.resources_path, &opts.parsers)?;

        for node in resources.values() {
            if let Some(init_hook) = &node.extensions.init {
                init_hook()?;
            }
        }

        let api = Self {
            resources: ArcSwap::from_pointee(resources),
            resources_path: opts.resources_path,
            parsers: opts.parsers,
            adapters: opts.adapters,
            events: Mutex::new(EventBus::new()),
            plugins: Mutex::new(HashMap::new()),
            expose_errors: opts.expose_errors,
        };

        let mut event = Event::Init;
        api.emit("init", &mut event).await?;
        Ok(api)
    }

    /// `execute(request) → Promise<response>` (spec §4.4). Emits `request`
    /// before dispatch (a failing handler aborts the request), then
    /// `response` after a successful one.
    #[tracing::instrument(level = "debug", skip_all, fields(resource = %request.resource), err)]
    pub async fn execute(&self, request: &Request) -> Result<JsonValue> {
        let mut request_event = Event::Request { request };
        self.emit("request", &mut request_event).await?;

        let resources = self.resources.load_full();
        let ctx = ExecutionContext::new(request.auth.clone());
        let body = processor::dispatch(&resources, &self.adapters, &ctx, request, self).await?;

        let mut response_event = Event::Response { body: &body };
        self.emit("response", &mut response_event).await?;
        Ok(body)
    }

    /// `close() → Promise` (spec §4.4): emits `close`, then closes every
    /// adapter exactly once.
    #[tracing::instrument(level = "debug", skip_all, err)]
    pub async fn close(&self) -> Result<()> {
        let mut event = Event::Close;
        self.emit("close", &mut event).await?;
        for adapter in self.adapters.values() {
            adapter.close().await?;
        }
        Ok(())
    }

    /// Reloads the resource map from disk and atomically swaps it in (spec
    /// §5 "a hot config reload atomically swaps the map; in-flight requests
    /// finish against the old snapshot"). The snapshot an in-flight
    /// `execute` already took via [`arc_swap::ArcSwap::load_full`] is
    /// unaffected by this swap.
    #[tracing::instrument(level = "debug", skip_all, err)]
    pub fn reload(&self) -> Result<()> {
        let resources = load_resources(&self.resources_path, &self.parsers)?;
        self.resources.store(Arc::new(resources));
        Ok(())
    }

    /// Registers an event handler under `name`, appended after any already
    /// registered (spec §9 "registry {eventName → ordered handler list}").
    pub fn on(&self, name: &'static str, handler: BoxedHandler) {
        self.events.lock().unwrap().on(name, handler);
    }

    /// `register(name, fn, options)` (spec §4.4): attaches an opaque plugin
    /// value under `name`, retrievable later via [`Api::get_plugin`].
    pub fn register(&self, name: impl Into<String>, plugin: Arc<dyn Any + Send + Sync>, options: JsonValue) {
        self.plugins.lock().unwrap().insert(name.into(), (plugin, options));
    }

    /// `getPlugin(name)` (spec §4.4): "unknown plugin lookup fails".
    pub fn get_plugin(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>> {
        self.plugins
            .lock()
            .unwrap()
            .get(name)
            .map(|(plugin, _)| plugin.clone())
            .ok_or_else(|| ErrorKind::UnknownPlugin.with_message(format!("no plugin registered under '{name}'")))
    }

    async fn emit(&self, name: &'static str, event: &mut Event<'_>) -> Result<()> {
        let handlers = {
            let bus = self.events.lock().unwrap();
            bus.handlers_for(name)
        };
        for handler in handlers {
            if let Err(err) = handler.handle(event).await {
                // Only the `request` handler's failure aborts the primary
                // flow (spec §9); every other event logs and swallows.
                if name == "request" {
                    return Err(err);
                }
                tracing::error!(event = name, error = %err, "event handler failed");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineHooks for Api {
    async fn pre_execute(&self, tree: &mut DataSourceTree) -> Result<()> {
        let mut event = Event::PreExecute { tree };
        self.emit("preExecute", &mut event).await
    }

    async fn post_execute(&self, raw_results: &mut Vec<crate::executor::RawResult>) -> Result<()> {
        let mut event = Event::PostExecute { raw_results };
        self.emit("postExecute", &mut event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tempdir_with_article() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("conflux-facade-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("article")).unwrap();
        std::fs::write(
            dir.join("article").join("config.json"),
            r#"{"primaryKey":[["id"]],"dataSources":{"primary":{"type":"fake","primary":true}},"attributes":{"id":{"map":{"default":{"primary":"id"}}}}}"#,
        )
        .unwrap();
        dir
    }

    struct FakeAdapter;

    #[async_trait]
    impl crate::executor::DataSourceAdapter for FakeAdapter {
        async fn prepare(&self, _request: &crate::resolver::AdapterRequest) -> Result<()> {
            Ok(())
        }
        async fn process(
            &self,
            _request: &crate::resolver::AdapterRequest,
            _ctx: &ExecutionContext,
        ) -> Result<crate::executor::RawPayload> {
            let mut row = crate::executor::Row::new();
            row.insert("id".into(), JsonValue::from(1));
            Ok(crate::executor::RawPayload { data: vec![row], total_count: Some(1) })
        }
    }

    #[tokio::test]
    async fn init_loads_resources_and_emits_init_event() {
        let dir = tempdir_with_article();
        let mut opts = InitOptions::new(dir.clone());
        opts.adapters.insert("fake".into(), Arc::new(FakeAdapter) as Arc<dyn crate::executor::DataSourceAdapter>);
        let api = Api::init(opts).await.unwrap();
        assert!(api.resources.load().contains_key("article"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn execute_runs_the_full_pipeline_and_emits_response() {
        let dir = tempdir_with_article();
        let mut opts = InitOptions::new(dir.clone());
        opts.adapters.insert("fake".into(), Arc::new(FakeAdapter) as Arc<dyn crate::executor::DataSourceAdapter>);
        let api = Api::init(opts).await.unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        api.on(
            "response",
            sync_handler(move |_event| {
                seen2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let request = Request::new("article");
        let body = api.execute(&request).await.unwrap();
        assert!(body.get("data").is_some());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unknown_plugin_lookup_fails() {
        let dir = tempdir_with_article();
        let opts = InitOptions::new(dir.clone());
        let api = Api::init(opts).await.unwrap();
        let err = api.get_plugin("missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownPlugin);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failing_request_handler_aborts_execute() {
        let dir = tempdir_with_article();
        let opts = InitOptions::new(dir.clone());
        let api = Api::init(opts).await.unwrap();
        api.on(
            "request",
            sync_handler(|_event| Err(ErrorKind::Timeout.with_message("rejected by handler"))),
        );
        let request = Request::new("article");
        let err = api.execute(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
