// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! C5: the Result Builder (spec §4.3). Stitches the executor's flat
//! [`RawResult`] list back into a recursive response object, enforcing
//! cardinality, composite-key linkage, `internal` stripping, and per-item
//! hooks.

mod indexed;

pub use indexed::{IndexedEntry, IndexedResults};

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};

use crate::config::AttrNode;
use crate::error::ErrorKind;
use crate::executor::{RawResult, Row};
use crate::key::{all_null, join_key};
use crate::request::Request;
use crate::resolver::ResolvedConfig;
use crate::Result;

/// `{totalCount}` accompanying a list response.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    pub total_count: Option<u64>,
}

/// A built response is either one item (`id` request) or a list (spec §4.3
/// "Top level").
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Item(JsonValue),
    List(Vec<JsonValue>),
}

#[derive(Debug, Clone)]
pub struct Response {
    pub data: ResponseBody,
    pub cursor: Option<Cursor>,
}

impl Response {
    /// The wire shape (spec §3.6: `{data, cursor?}` — `meta` is the HTTP
    /// collaborator's concern, out of scope here).
    pub fn to_json(&self) -> JsonValue {
        let data = match &self.data {
            ResponseBody::Item(item) => item.clone(),
            ResponseBody::List(items) => JsonValue::Array(items.clone()),
        };
        let mut object = Map::new();
        object.insert("data".into(), data);
        if let Some(cursor) = &self.cursor {
            object.insert(
                "cursor".into(),
                serde_json::json!({ "totalCount": cursor.total_count }),
            );
        }
        JsonValue::Object(object)
    }
}

/// Entry point: `build(request, resolvedConfig, rawResults) → response` (spec
/// §4.3 "Contract").
#[tracing::instrument(level = "debug", skip_all, fields(resource = %request.resource), err)]
pub fn build(request: &Request, resolved: &ResolvedConfig, raw_results: &[RawResult]) -> Result<Response> {
    let indexed = IndexedResults::build(raw_results)?;
    let root_primary_ds = node_primary_ds(&resolved.root, request.search.as_deref())?;
    let root_result = raw_results
        .iter()
        .find(|r| r.attribute_path.is_empty() && r.data_source_name == root_primary_ds)
        .ok_or_else(|| ErrorKind::MissingDataSourceResult.with_message("no root datasource result"))?;

    if request.id.is_some() {
        let Some(row) = root_result.data.first() else {
            return Err(ErrorKind::NotFound.with_message("Requested item not found"));
        };
        let item = build_resource_item(&resolved.root, row, &[], &indexed, raw_results, request)?;
        return Ok(Response {
            data: ResponseBody::Item(item),
            cursor: None,
        });
    }

    let mut items = Vec::with_capacity(root_result.data.len());
    for row in &root_result.data {
        items.push(build_resource_item(&resolved.root, row, &[], &indexed, raw_results, request)?);
    }
    Ok(Response {
        data: ResponseBody::List(items),
        cursor: Some(Cursor {
            total_count: root_result.total_count,
        }),
    })
}

/// Picks the datasource a resource-level node's own rows were fetched from:
/// the fulltextSearch datasource at the root when `request.search` is given,
/// else the resource's primary (mirrors [`crate::resolver::build`]'s own
/// choice, recomputed here rather than threaded through so the result builder
/// doesn't need a second copy of the data-source tree).
fn node_primary_ds<'a>(node: &'a AttrNode, search: Option<&str>) -> Result<&'a str> {
    if search.is_some() {
        if let Some((name, _)) = node
            .data_sources
            .iter()
            .find(|(_, ds)| ds.ds_type.eq_ignore_ascii_case("fulltextsearch"))
        {
            return Ok(name.as_str());
        }
    }
    node.primary_data_source()
        .ok_or_else(|| ErrorKind::NoDataSources.with_message("No DataSources defined in resource"))
}

fn pk_values(row: &Row, cols: &[String]) -> Result<Vec<JsonValue>> {
    cols.iter()
        .map(|c| {
            row.get(c)
                .cloned()
                .ok_or_else(|| ErrorKind::MissingKeyColumn.with_message(format!("row is missing key column '{c}'")))
        })
        .collect()
}

/// Builds one resource-level item: resolves its own primary datasource,
/// collects its secondary-datasource row (spec §4.3 step 2), assembles
/// fields, then runs the `item` extension hook (step 5).
fn build_resource_item(
    node: &AttrNode,
    row: &Row,
    path: &[String],
    indexed: &IndexedResults,
    raw_results: &[RawResult],
    request: &Request,
) -> Result<JsonValue> {
    let primary_ds = node_primary_ds(node, if path.is_empty() { request.search.as_deref() } else { None })?;
    let secondary_rows = collect_secondary_rows(node, primary_ds, row, path, raw_results, indexed)?;
    let fields = build_fields(node, primary_ds, row, &secondary_rows, path, indexed, raw_results, request)?;
    let mut json = JsonValue::Object(fields);
    if let Some(item_hook) = &node.extensions.item {
        item_hook(request, &mut json)?;
    }
    Ok(json)
}

/// For every secondary datasource `node` declares, looks up the row matching
/// this level's own primary key via `indexedData` (spec §4.3 step 2). A
/// datasource whose result is entirely absent from `rawResults` is an
/// `ImplementationError`; a present result with no matching row is not fatal.
fn collect_secondary_rows(
    node: &AttrNode,
    primary_ds: &str,
    row: &Row,
    path: &[String],
    raw_results: &[RawResult],
    indexed: &IndexedResults,
) -> Result<HashMap<String, Option<Row>>> {
    let flat_pk = node.flat_primary_key();
    let pk_cols = node.resolved_key_for(&flat_pk).get(primary_ds).cloned().unwrap_or_default();

    let mut secondary = HashMap::new();
    for ds_name in node.data_sources.keys() {
        if ds_name == primary_ds {
            continue;
        }
        let has_result = raw_results
            .iter()
            .any(|r| r.attribute_path == path && &r.data_source_name == ds_name);
        if !has_result {
            return Err(ErrorKind::MissingDataSourceResult.with_message(format!(
                "executor produced no raw result for secondary datasource '{ds_name}' at {path:?}"
            )));
        }
        if pk_cols.is_empty() {
            secondary.insert(ds_name.clone(), None);
            continue;
        }
        let key = join_key(&pk_values(row, &pk_cols)?);
        match indexed.lookup(path, ds_name, &key) {
            Some(IndexedEntry::One(found)) => {
                secondary.insert(ds_name.clone(), Some(found.clone()));
            }
            Some(IndexedEntry::Many(list)) => {
                secondary.insert(ds_name.clone(), list.first().cloned());
            }
            None => {
                tracing::debug!(datasource = %ds_name, path = ?path, key = %key, "secondary datasource row not found");
                secondary.insert(ds_name.clone(), None);
            }
        }
    }
    Ok(secondary)
}

/// Assembles one node's selected fields in `response_order` (spec §4.3 step
/// 3), recursing into nested non-resource groups with the same row/ds
/// context and into sub-resources with a fresh one. `internal` attributes
/// never appear in `response_order` (spec §4.1.2), so step 4 ("strip
/// internal") falls out of iterating it rather than needing a second pass.
fn build_fields(
    node: &AttrNode,
    primary_ds: &str,
    row: &Row,
    secondary_rows: &HashMap<String, Option<Row>>,
    path: &[String],
    indexed: &IndexedResults,
    raw_results: &[RawResult],
    request: &Request,
) -> Result<Map<String, JsonValue>> {
    let mut object = Map::new();
    for name in &node.response_order {
        let Some(attr) = node.attributes.get(name) else {
            continue;
        };

        let value = if attr.is_resource() {
            build_sub_resource_value(node, primary_ds, row, name, attr, path, indexed, raw_results, request)?
        } else if let Some(value) = &attr.value {
            value.clone()
        } else if !attr.attributes.is_empty() {
            let nested = build_fields(attr, primary_ds, row, secondary_rows, path, indexed, raw_results, request)?;
            JsonValue::Object(nested)
        } else {
            leaf_value(attr, primary_ds, row, secondary_rows)?
        };
        object.insert(name.clone(), value);
    }
    Ok(object)
}

fn leaf_value(
    attr: &AttrNode,
    primary_ds: &str,
    row: &Row,
    secondary_rows: &HashMap<String, Option<Row>>,
) -> Result<JsonValue> {
    if let Some(col) = attr.mapped_column(primary_ds) {
        return row
            .get(col)
            .cloned()
            .ok_or_else(|| ErrorKind::MissingColumn.with_message(format!("row is missing mapped column '{col}'")));
    }
    for (ds_name, maybe_row) in secondary_rows {
        let Some(col) = attr.mapped_column(ds_name) else {
            continue;
        };
        return match maybe_row {
            Some(found) => found
                .get(col)
                .cloned()
                .ok_or_else(|| ErrorKind::MissingColumn.with_message(format!("secondary row is missing mapped column '{col}'"))),
            None => Ok(JsonValue::Null),
        };
    }
    Ok(JsonValue::Null)
}

/// Builds one sub-resource attribute's value (spec §4.3 step 3 "Sub-resource
/// node"): joins via `parentKey`, looks the key up in the sub-resource's own
/// indexed primary result, and handles `many` vs 1:1, null-linking, and
/// `joinVia`'s two-hop traversal.
fn build_sub_resource_value(
    parent: &AttrNode,
    parent_primary_ds: &str,
    row: &Row,
    attr_name: &str,
    attr: &AttrNode,
    path: &[String],
    indexed: &IndexedResults,
    raw_results: &[RawResult],
    request: &Request,
) -> Result<JsonValue> {
    let mut child_path = path.to_vec();
    child_path.push(attr_name.to_string());

    let flat_parent_key = attr.flat_parent_key();
    let parent_key_cols = parent
        .resolved_key_for(&flat_parent_key)
        .get(parent_primary_ds)
        .cloned()
        .unwrap_or_default();
    if parent_key_cols.is_empty() {
        return Err(ErrorKind::ConfigInvariantViolated
            .with_message(format!("no resolved parentKey for '{attr_name}'")));
    }
    let parent_key_values = pk_values(row, &parent_key_cols)?;
    let all_null_parent = all_null(&parent_key_values);

    if let Some(join_via) = &attr.join_via {
        return build_joinvia_value(
            attr_name,
            attr,
            join_via,
            &child_path,
            &parent_key_values,
            all_null_parent,
            indexed,
            raw_results,
            request,
        );
    }

    let sub_primary_ds = attr
        .primary_data_source()
        .ok_or_else(|| ErrorKind::NoDataSources.with_message(format!("No DataSources defined for {attr_name}")))?;
    let flat_child_key = attr.flat_child_key();
    let child_key_cols = attr
        .resolved_key_for(&flat_child_key)
        .get(sub_primary_ds)
        .cloned()
        .unwrap_or_default();
    if child_key_cols.len() != parent_key_cols.len() {
        return Err(ErrorKind::ConfigInvariantViolated
            .with_message(format!("parentKey/childKey length mismatch for '{attr_name}'")));
    }

    let key = join_key(&parent_key_values);
    let found = indexed.lookup(&child_path, sub_primary_ds, &key);

    if attr.many {
        let rows: Vec<Row> = match found {
            Some(IndexedEntry::Many(list)) => list.clone(),
            Some(IndexedEntry::One(r)) => vec![r.clone()],
            None => return Ok(JsonValue::Array(Vec::new())),
        };
        let mut items = Vec::with_capacity(rows.len());
        for sub_row in &rows {
            items.push(build_resource_item(attr, sub_row, &child_path, indexed, raw_results, request)?);
        }
        return Ok(JsonValue::Array(items));
    }

    match found {
        Some(IndexedEntry::One(sub_row)) => build_resource_item(attr, sub_row, &child_path, indexed, raw_results, request),
        Some(IndexedEntry::Many(list)) => match list.first() {
            Some(sub_row) => build_resource_item(attr, sub_row, &child_path, indexed, raw_results, request),
            None => Ok(JsonValue::Null),
        },
        None => {
            if !all_null_parent {
                tracing::debug!(attribute = %attr_name, path = ?child_path, "sub-resource row not found for non-null parentKey");
            }
            Ok(JsonValue::Null)
        }
    }
}

/// Two-hop `joinVia` traversal (spec §4.3 step 3: "`joinVia` paths traverse
/// the join table's raw result, then the target resource's raw result, in
/// two steps"). This is the same approximation of composite tuple-IN joins
/// as [`crate::resolver::build`] — see DESIGN.md.
fn build_joinvia_value(
    attr_name: &str,
    attr: &AttrNode,
    join_via: &AttrNode,
    child_path: &[String],
    parent_key_values: &[JsonValue],
    all_null_parent: bool,
    indexed: &IndexedResults,
    raw_results: &[RawResult],
    request: &Request,
) -> Result<JsonValue> {
    let join_ds = join_via
        .primary_data_source()
        .ok_or_else(|| ErrorKind::NoDataSources.with_message(format!("No DataSources defined for {attr_name}.joinVia")))?;
    let flat_child_key = attr.flat_child_key();
    let hop1_child_cols = join_via
        .resolved_key_for(&flat_child_key)
        .get(join_ds)
        .cloned()
        .unwrap_or_default();
    if hop1_child_cols.is_empty() {
        return Err(ErrorKind::ConfigInvariantViolated
            .with_message(format!("joinVia childKey not mapped for '{attr_name}'")));
    }

    let key = join_key(parent_key_values);
    let join_rows: Vec<Row> = match indexed.lookup(child_path, join_ds, &key) {
        Some(IndexedEntry::Many(list)) => list.clone(),
        Some(IndexedEntry::One(r)) => vec![r.clone()],
        None => {
            if attr.many {
                return Ok(JsonValue::Array(Vec::new()));
            }
            if !all_null_parent {
                tracing::debug!(attribute = %attr_name, path = ?child_path, "joinVia row not found for non-null parentKey");
            }
            return Ok(JsonValue::Null);
        }
    };

    let sub_primary_ds = attr
        .primary_data_source()
        .ok_or_else(|| ErrorKind::NoDataSources.with_message(format!("No DataSources defined for {attr_name}")))?;

    let mut items = Vec::new();
    for join_row in &join_rows {
        let hop2_key = join_key(&pk_values(join_row, &hop1_child_cols)?);
        match indexed.lookup(child_path, sub_primary_ds, &hop2_key) {
            Some(IndexedEntry::One(sub_row)) => {
                items.push(build_resource_item(attr, sub_row, child_path, indexed, raw_results, request)?);
            }
            Some(IndexedEntry::Many(list)) => {
                for sub_row in list {
                    items.push(build_resource_item(attr, sub_row, child_path, indexed, raw_results, request)?);
                }
            }
            None => {
                tracing::debug!(attribute = %attr_name, path = ?child_path, "joinVia target row not found");
            }
        }
    }

    if attr.many {
        Ok(JsonValue::Array(items))
    } else {
        Ok(items.into_iter().next().unwrap_or(JsonValue::Null))
    }
}
