// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! C7: the Resource Processor (spec §4.4). Dispatches a request to the
//! resource's configured action — the built-in `"retrieve"` wires
//! resolve → execute → build; anything else is a user function the
//! embedding application attached to the resource's `actions` table.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::config::{ActionFn, ActionHandler, AttrNode, ResourceMap};
use crate::error::ErrorKind;
use crate::executor::{self, AdapterRegistry, ExecutionContext, RawResult};
use crate::request::Request;
use crate::resolver::{self, DataSourceTree};
use crate::result;
use crate::Result;

/// Extension point the facade (C6) uses to splice its `preExecute`/
/// `postExecute` bus events into the built-in `"retrieve"` pipeline without
/// this module depending on the facade's event bus types.
#[async_trait]
pub trait PipelineHooks: Send + Sync {
    async fn pre_execute(&self, _tree: &mut DataSourceTree) -> Result<()> {
        Ok(())
    }
    async fn post_execute(&self, _raw_results: &mut Vec<RawResult>) -> Result<()> {
        Ok(())
    }
}

/// The hooks to use when running the pipeline outside a facade (e.g. tests,
/// or an embedding app that doesn't need the event bus).
#[derive(Debug, Default)]
pub struct NoHooks;

#[async_trait]
impl PipelineHooks for NoHooks {}

/// `dispatch(resources, adapters, ctx, request) → response JSON` (spec §4.4:
/// "dispatches a request to the resource's `actions[action]`").
#[tracing::instrument(level = "debug", skip_all, fields(resource = %request.resource, action = %request.action), err)]
pub async fn dispatch(
    resources: &ResourceMap,
    adapters: &AdapterRegistry,
    ctx: &ExecutionContext,
    request: &Request,
    hooks: &dyn PipelineHooks,
) -> Result<JsonValue> {
    let node = resources.get(&request.resource).ok_or_else(|| {
        ErrorKind::UnknownResource.with_message(format!("unknown resource '{}'", request.resource))
    })?;

    let action = if request.action.is_empty() { "retrieve" } else { request.action.as_str() };

    match node.actions.get(action) {
        None if action == "retrieve" => retrieve(resources, adapters, ctx, request, node, hooks).await,
        None => Err(ErrorKind::UnknownAction
            .with_message(format!("resource '{}' has no action '{action}'", request.resource))),
        Some(handler) => {
            let action_fn = select_action_fn(handler, &request.format)?;
            action_fn(request).await
        }
    }
}

/// Picks which callable to run for a non-`retrieve` action (spec §4.4:
/// "picking `.default` if the action is an object and `format == "json"`,
/// else `actions[action][format]`; unknown format → `RequestError`").
fn select_action_fn<'a>(handler: &'a ActionHandler, format: &str) -> Result<&'a ActionFn> {
    match handler {
        ActionHandler::Direct(f) => Ok(f),
        ActionHandler::ByFormat(by_format) => {
            let key = if format == "json" { "default" } else { format };
            by_format
                .get(key)
                .ok_or_else(|| ErrorKind::InvalidFormat.with_message(format!("action has no '{format}' format")))
        }
    }
}

/// The built-in `"retrieve"` action: resolve → (resource `preExecute`) →
/// execute → (resource `postExecute`) → build, with the facade's bus hooks
/// spliced around the same two extension points.
async fn retrieve(
    resources: &ResourceMap,
    adapters: &AdapterRegistry,
    ctx: &ExecutionContext,
    request: &Request,
    _node: &AttrNode,
    hooks: &dyn PipelineHooks,
) -> Result<JsonValue> {
    let (resolved, mut tree) = resolver::resolve(request, resources)?;

    if let Some(pre_execute) = &resolved.root.extensions.pre_execute {
        pre_execute(&mut tree)?;
    }
    hooks.pre_execute(&mut tree).await?;

    let mut raw_results = executor::execute(&tree, adapters, ctx).await?;

    if let Some(post_execute) = &resolved.root.extensions.post_execute {
        post_execute(&mut raw_results)?;
    }
    hooks.post_execute(&mut raw_results).await?;

    let response = result::build(request, &resolved, &raw_results)?;
    Ok(response.to_json())
}
