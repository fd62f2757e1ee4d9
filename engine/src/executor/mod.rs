// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! C4: the Data-Source Executor (spec §4.2). Walks the `dataSourceTree`,
//! dispatches `prepare`/`process` to adapters, and threads sub-filter and
//! parent-key values through the tree as it descends.

mod adapter;

pub use adapter::{
    AdapterRegistry, DataSourceAdapter, ExecutionContext, RawPayload, Row, SyncAdapterBridge,
    SyncDataSourceAdapter,
};

use std::collections::HashSet;

use futures::future::try_join_all;
use serde_json::Value as JsonValue;

use crate::error::ErrorKind;
use crate::resolver::{AdapterRequest, DataSourceRequest, DataSourceTree, FilterValueSource, PhysicalFilterDnf};
use crate::Result;

/// The flat output of one tree node's execution (spec §3.5).
#[derive(Debug, Clone)]
pub struct RawResult {
    pub attribute_path: Vec<String>,
    pub data_source_name: String,
    pub data: Vec<Row>,
    pub total_count: Option<u64>,
    pub child_key: Option<Vec<String>>,
    pub parent_key: Option<Vec<String>>,
    /// Whether this node is itself a `many` 1:n relation (spec §3.5), needed
    /// by the result builder to decide whether `indexedData` holds one row
    /// or a list per key.
    pub many: bool,
}

/// Runs the whole prepare-then-execute algorithm against `tree` (spec §4.2).
#[tracing::instrument(level = "debug", skip_all, err)]
pub async fn execute(
    tree: &DataSourceTree,
    adapters: &AdapterRegistry,
    ctx: &ExecutionContext,
) -> Result<Vec<RawResult>> {
    prepare_node(&tree.root, adapters).await?;
    let mut results = Vec::new();
    execute_node(&tree.root, adapters, ctx, None, &mut results).await?;
    Ok(results)
}

fn adapter_for<'a>(node: &DataSourceRequest, adapters: &'a AdapterRegistry) -> Result<&'a dyn DataSourceAdapter> {
    let ds_type = node
        .request
        .native
        .get("type")
        .and_then(JsonValue::as_str)
        .unwrap_or(node.data_source_name.as_str());
    adapters
        .get(ds_type)
        .map(|a| a.as_ref())
        .ok_or_else(|| ErrorKind::Adapter.with_message(format!("no adapter registered for datasource type '{ds_type}'")))
}

fn prepare_node<'a>(
    node: &'a DataSourceRequest,
    adapters: &'a AdapterRegistry,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let adapter = adapter_for(node, adapters)?;
        adapter.prepare(&node.request).await?;
        for sub_filter in &node.sub_filters {
            prepare_node(sub_filter, adapters).await?;
        }
        for sub_request in &node.sub_requests {
            prepare_node(sub_request, adapters).await?;
        }
        Ok(())
    })
}

/// Depth-first execution of one tree node. `parent_rows` is `None` at the
/// root; for a sub-request it carries the parent's freshly-fetched rows so
/// `valueFromParentKey` placeholders can be substituted (spec §4.2 step 2).
fn execute_node<'a>(
    node: &'a DataSourceRequest,
    adapters: &'a AdapterRegistry,
    ctx: &'a ExecutionContext,
    parent_rows: Option<(&'a [String], &'a [Row])>,
    out: &'a mut Vec<RawResult>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if ctx.is_cancelled() {
            return Err(ErrorKind::Timeout.with_message("execution cancelled"));
        }

        // Sub-filters first: their result key sets feed valueFromSubFilter
        // placeholders in this node's own filter.
        let mut sub_filter_results = Vec::with_capacity(node.sub_filters.len());
        let futures = node
            .sub_filters
            .iter()
            .map(|sf| run_sub_filter(sf, adapters, ctx));
        for result in try_join_all(futures).await? {
            sub_filter_results.push(result);
        }

        let mut request = node.request.clone();
        if let Some((parent_key_cols, rows)) = parent_rows {
            substitute_parent_key(&mut request, node, parent_key_cols, rows)?;
        }
        substitute_sub_filters(&mut request, &sub_filter_results)?;

        let adapter = adapter_for(node, adapters)?;
        let payload = adapter.process(&request, ctx).await?;

        let child_key_cols = node.child_key.clone();
        out.push(RawResult {
            attribute_path: node.attribute_path.clone(),
            data_source_name: node.data_source_name.clone(),
            data: payload.data.clone(),
            total_count: payload.total_count,
            child_key: child_key_cols,
            parent_key: node.parent_key.clone(),
            many: node.many,
        });

        if node.sub_requests.is_empty() {
            return Ok(());
        }

        // All sub-requests join against columns of *this* node's own result
        // (the child-key-from-this-node's-perspective columns named by each
        // sub-request's own `parent_key`). Siblings run concurrently.
        let rows = &payload.data;
        let mut handles = Vec::with_capacity(node.sub_requests.len());
        for sub in &node.sub_requests {
            let parent_cols: &[String] = sub.parent_key.as_deref().unwrap_or(&[]);
            handles.push(async move {
                let mut sub_out = Vec::new();
                execute_node(sub, adapters, ctx, Some((parent_cols, rows)), &mut sub_out).await?;
                Ok::<_, crate::Error>(sub_out)
            });
        }
        for sub_out in try_join_all(handles).await? {
            out.extend(sub_out);
        }

        Ok(())
    })
}

async fn run_sub_filter(
    node: &DataSourceRequest,
    adapters: &AdapterRegistry,
    ctx: &ExecutionContext,
) -> Result<RawResult> {
    let mut out = Vec::new();
    execute_node(node, adapters, ctx, None, &mut out).await?;
    out.into_iter()
        .next()
        .ok_or_else(|| ErrorKind::MissingDataSourceResult.with_message("sub-filter produced no result"))
}

/// `request`'s filter may carry `valueFromParentKey(i)` placeholders; fill
/// each from the `i`-th parent-key column's distinct values across `rows`
/// (spec §4.2 step 2: "set-in operator ... tuple-IN ... multiValuedParentKey
/// ... split on the configured delimiter").
fn substitute_parent_key(
    request: &mut AdapterRequest,
    node: &DataSourceRequest,
    parent_key_cols: &[String],
    rows: &[Row],
) -> Result<()> {
    let Some(filter) = &mut request.filter else {
        return Ok(());
    };
    let mut values_by_index: Vec<HashSet<String>> = vec![HashSet::new(); parent_key_cols.len()];
    for row in rows {
        for (i, col) in parent_key_cols.iter().enumerate() {
            let Some(value) = row.get(col) else {
                return Err(ErrorKind::MissingKeyColumn
                    .with_message(format!("row is missing parentKey column '{col}'")));
            };
            if node.multi_valued_parent_key {
                let delimiter = node.parent_key_delimiter.as_deref().unwrap_or(",");
                if let Some(text) = value.as_str() {
                    for part in text.split(delimiter) {
                        values_by_index[i].insert(part.to_string());
                    }
                    continue;
                }
            }
            values_by_index[i].insert(crate::key::value_to_key_part(value));
        }
    }

    let json_values: Vec<JsonValue> = values_by_index
        .into_iter()
        .map(|set| JsonValue::Array(set.into_iter().map(JsonValue::String).collect()))
        .collect();

    apply_value_source(filter, &|source| match source {
        FilterValueSource::FromParentKey(i) => json_values.get(*i).cloned(),
        _ => None,
    });
    Ok(())
}

fn substitute_sub_filters(request: &mut AdapterRequest, sub_filter_results: &[RawResult]) -> Result<()> {
    let Some(filter) = &mut request.filter else {
        return Ok(());
    };

    let mut missing = None;
    apply_value_source(filter, &|source| match source {
        FilterValueSource::FromSubFilter(i) => match sub_filter_results.get(*i) {
            Some(result) => Some(collect_sub_filter_values(result)),
            None => {
                missing = Some(*i);
                None
            }
        },
        _ => None,
    });
    if let Some(i) = missing {
        return Err(ErrorKind::MissingSubFilter.with_message(format!("no sibling subFilters[{i}]")));
    }
    Ok(())
}

fn collect_sub_filter_values(result: &RawResult) -> JsonValue {
    let column = result.data.first().and_then(|row| row.keys().next().cloned());
    let Some(column) = column else {
        return JsonValue::Array(Vec::new());
    };
    let values: Vec<JsonValue> = result
        .data
        .iter()
        .filter_map(|row| row.get(&column).cloned())
        .collect();
    JsonValue::Array(values)
}

fn apply_value_source(dnf: &mut PhysicalFilterDnf, resolve: &dyn Fn(&FilterValueSource) -> Option<JsonValue>) {
    for group in dnf.iter_mut() {
        for entry in group.iter_mut() {
            if let Some(value) = resolve(&entry.value) {
                entry.value = FilterValueSource::Literal(value);
            }
        }
    }
}
