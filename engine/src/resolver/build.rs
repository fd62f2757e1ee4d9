// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Data-source tree construction (spec §4.1.6): turns a selection-annotated
//! [`AttrNode`] plus the client's root-level filter/order/limit/page into the
//! physical execution plan C4 walks.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::config::AttrNode;
use crate::error::ErrorKind;
use crate::request::{FilterDnf, OrderList, Request};
use crate::resolver::filter::{resolve_filter, PendingSubFilter};
use crate::resolver::limits::resolve_limits;
use crate::resolver::select::node_at_path;
use crate::resolver::tree::{
    AdapterRequest, AttributeOption, DataSourceRequest, FilterValueSource, PhysicalFilterEntry,
    PhysicalOrderEntry,
};
use crate::Result;

/// ANDs a `childKey[i] IN valueFromParentKey(i)` entry, for every component
/// of `child_key`, into every existing OR-group of `request.filter` (or a
/// single fresh group if the request has no filter of its own). This is how
/// a sub-request's join back to its parent row is expressed in the physical
/// filter DNF (spec §4.1.6 step 4, §4.2 step 2).
fn attach_parent_key_filter(request: &mut AdapterRequest, child_key: &[String]) {
    let placeholders: Vec<PhysicalFilterEntry> = child_key
        .iter()
        .enumerate()
        .map(|(i, column)| PhysicalFilterEntry {
            column: column.clone(),
            operator: "in".to_string(),
            value: FilterValueSource::FromParentKey(i),
        })
        .collect();

    match &mut request.filter {
        Some(dnf) => {
            for group in dnf.iter_mut() {
                group.extend(placeholders.clone());
            }
        }
        None => {
            request.filter = Some(vec![placeholders]);
        }
    }
}

/// Entry point: builds the full tree for the request root.
pub fn build_tree(root: &AttrNode, request: &Request) -> Result<DataSourceRequest> {
    let primary_ds = select_primary_ds(root, request)?.to_string();
    build_node(
        BuildArgs {
            node: root,
            resource_name: &request.resource,
            attribute_path: Vec::new(),
            primary_ds: &primary_ds,
            is_single_item: request.id.is_some(),
            filter: request.filter.as_ref(),
            order: request.order.as_ref(),
            limit: request.limit,
            page: request.page,
            search: request.search.as_deref(),
        },
    )
}

struct BuildArgs<'a> {
    node: &'a AttrNode,
    resource_name: &'a str,
    attribute_path: Vec<String>,
    primary_ds: &'a str,
    is_single_item: bool,
    filter: Option<&'a FilterDnf>,
    order: Option<&'a OrderList>,
    limit: Option<u64>,
    page: Option<u64>,
    search: Option<&'a str>,
}

/// Picks the datasource driving this node's own request: the declared
/// full-text-search datasource when `request.search` is given and one
/// exists, else the resource's primary (spec §4.1.6 step 1).
fn select_primary_ds<'a>(node: &'a AttrNode, request: &Request) -> Result<&'a str> {
    if request.search.is_some() {
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

fn build_node(args: BuildArgs<'_>) -> Result<DataSourceRequest> {
    let BuildArgs {
        node,
        resource_name,
        attribute_path,
        primary_ds,
        is_single_item,
        filter,
        order,
        limit,
        page,
        search,
    } = args;

    let flat_pk = node.flat_primary_key();
    let resolved_pk = node.resolved_key_for(&flat_pk);
    let pk_columns = resolved_pk.get(primary_ds).cloned().unwrap_or_default();

    let (mut attributes, attribute_options) = collect_ds_columns(node, primary_ds);
    for col in &pk_columns {
        if !attributes.contains(col) {
            attributes.insert(0, col.clone());
        }
    }

    let filter_resolution = filter.map(|f| resolve_filter(node, primary_ds, f)).transpose()?;
    let limits = resolve_limits(node, is_single_item, limit, page, order)?;
    let physical_order = limits
        .order
        .iter()
        .filter(|entry| entry.attribute.len() == 1)
        .filter_map(|entry| {
            node.attributes
                .get(&entry.attribute[0])
                .and_then(|attr| attr.mapped_column(primary_ds))
                .map(|col| PhysicalOrderEntry {
                    column: col.to_string(),
                    direction: entry.direction,
                })
        })
        .collect::<Vec<_>>();

    let mut req = DataSourceRequest::new(resource_name, primary_ds);
    req.attribute_path = attribute_path.clone();
    req.request = AdapterRequest {
        attributes,
        filter: filter_resolution.as_ref().map(|r| r.physical.clone()),
        order: if physical_order.is_empty() { None } else { Some(physical_order) },
        limit: limits.limit,
        page: limits.page,
        limit_per: None,
        search: search.map(str::to_string),
        native: native_options(node, primary_ds),
    };
    req.attribute_options = attribute_options;
    req.unique_child_key = true;
    req.many = !is_single_item;

    for ds_name in node.data_sources.keys() {
        if ds_name == primary_ds {
            continue;
        }
        let (sec_attrs, sec_options) = collect_ds_columns(node, ds_name);
        if sec_attrs.is_empty() {
            continue;
        }
        let secondary_pk = node.resolved_key_for(&flat_pk);
        let child_key = secondary_pk.get(ds_name).cloned().unwrap_or_default();
        if child_key.len() != pk_columns.len() || pk_columns.is_empty() {
            return Err(ErrorKind::ConfigInvariantViolated.with_message(format!(
                "datasource '{ds_name}' does not map every primaryKey column of '{resource_name}'"
            )));
        }
        let mut sub = DataSourceRequest::new(resource_name, ds_name.clone());
        sub.attribute_path = attribute_path.clone();
        sub.parent_key = Some(pk_columns.clone());
        sub.unique_child_key = true;
        sub.request = AdapterRequest {
            attributes: sec_attrs,
            native: native_options(node, ds_name),
            ..Default::default()
        };
        attach_parent_key_filter(&mut sub.request, &child_key);
        sub.child_key = Some(child_key);
        sub.attribute_options = sec_options;
        req.sub_requests.push(sub);
    }

    for (attr_name, attr) in &node.attributes {
        if !attr.selected || !attr.is_resource() {
            continue;
        }
        let mut path = attribute_path.clone();
        path.push(attr_name.clone());
        req.sub_requests
            .push(build_sub_resource(node, primary_ds, attr_name, attr, path)?);
    }

    if let Some(resolution) = filter_resolution {
        for pending in resolution.sub_filters {
            req.sub_filters.push(build_sub_filter(node, &pending)?);
        }
    }

    Ok(req)
}

/// Builds the subtree for one selected sub-resource attribute (spec §4.1.6
/// step 3), including `joinVia` (m:n through a join table) and
/// `multiValued`+`delimiter` (m:n through a delimited list column).
fn build_sub_resource(
    parent: &AttrNode,
    parent_primary_ds: &str,
    attr_name: &str,
    attr: &AttrNode,
    path: Vec<String>,
) -> Result<DataSourceRequest> {
    let sub_primary_ds = attr.primary_data_source().ok_or_else(|| {
        ErrorKind::NoDataSources.with_message(format!("No DataSources defined in resource for {attr_name}"))
    })?;

    let flat_parent_key = attr.flat_parent_key();
    let flat_child_key = attr.flat_child_key();
    let parent_key = parent
        .resolved_key_for(&flat_parent_key)
        .get(parent_primary_ds)
        .cloned()
        .unwrap_or_default();
    let child_key_target: &AttrNode = attr.join_via.as_deref().unwrap_or(attr);
    let child_key_ds = if attr.join_via.is_some() {
        child_key_target.primary_data_source().unwrap_or(sub_primary_ds)
    } else {
        sub_primary_ds
    };
    let child_key = child_key_target
        .resolved_key_for(&flat_child_key)
        .get(child_key_ds)
        .cloned()
        .unwrap_or_default();

    if parent_key.is_empty() || child_key.is_empty() || parent_key.len() != child_key.len() {
        return Err(ErrorKind::ConfigInvariantViolated
            .with_message(format!("parentKey/childKey length mismatch for '{attr_name}'")));
    }

    let is_single_item = !attr.many;
    let mut node_request = build_node(BuildArgs {
        node: attr,
        resource_name: attr_name,
        attribute_path: path.clone(),
        primary_ds: sub_primary_ds,
        is_single_item,
        filter: attr.request_filter.as_ref(),
        order: attr.request_order.as_ref(),
        limit: attr.request_limit,
        page: attr.request_page,
        search: None,
    })?;

    if attr.many {
        if let Some(limit) = node_request.request.limit.take() {
            node_request.request.limit_per = Some(parent_key.clone());
            node_request.request.limit = Some(limit);
        }
    }

    node_request.parent_key = Some(parent_key);
    if attr.join_via.is_none() {
        attach_parent_key_filter(&mut node_request.request, &child_key);
    }
    node_request.child_key = Some(child_key);
    node_request.unique_child_key = !attr.many;
    node_request.multi_valued_parent_key = attr.multi_valued;
    node_request.parent_key_delimiter = attr.delimiter.clone();
    node_request.many = attr.many;

    if let Some(join_via) = &attr.join_via {
        // The join table sits between parent and target: parent -> joinVia -> attr.
        // joinVia's own childKey (towards the target) becomes the key linking
        // the join row to the target's primary key.
        let join_child_key = join_via
            .resolved_key_for(&attr.flat_child_key())
            .get(join_via.primary_data_source().unwrap_or(sub_primary_ds))
            .cloned()
            .unwrap_or_default();
        let target_pk = attr.resolved_key_for(&attr.flat_primary_key()).get(sub_primary_ds).cloned().unwrap_or_default();

        let mut join_req = DataSourceRequest::new(
            format!("{attr_name}.joinVia"),
            join_via.primary_data_source().unwrap_or(sub_primary_ds).to_string(),
        );
        join_req.attribute_path = path.clone();
        let (join_attrs, join_options) = collect_ds_columns(join_via, join_via.primary_data_source().unwrap_or(sub_primary_ds));
        let mut full_join_attrs = join_child_key.clone();
        for c in join_attrs {
            if !full_join_attrs.contains(&c) {
                full_join_attrs.push(c);
            }
        }
        join_req.request = AdapterRequest {
            attributes: full_join_attrs,
            native: native_options(join_via, join_via.primary_data_source().unwrap_or(sub_primary_ds)),
            ..Default::default()
        };
        join_req.attribute_options = join_options;
        join_req.parent_key = node_request.parent_key.clone();
        attach_parent_key_filter(&mut join_req.request, &node_request.child_key.clone().unwrap());
        join_req.child_key = node_request.child_key.take();
        join_req.unique_child_key = false;
        join_req.multi_valued_parent_key = node_request.multi_valued_parent_key;
        join_req.parent_key_delimiter = node_request.parent_key_delimiter.clone();
        join_req.many = true;

        node_request.parent_key = Some(join_child_key);
        attach_parent_key_filter(&mut node_request.request, &target_pk);
        node_request.child_key = Some(target_pk);
        node_request.unique_child_key = false;
        node_request.multi_valued_parent_key = false;
        node_request.parent_key_delimiter = None;

        join_req.sub_requests.push(node_request);
        return Ok(join_req);
    }

    Ok(node_request)
}

/// Builds the independent sub-tree for one pending sub-filter (spec §4.1.5
/// case 2): queries the referenced sub-resource for the leaf condition and
/// projects the column(s) that join back to the declaring node.
fn build_sub_filter(declaring: &AttrNode, pending: &PendingSubFilter) -> Result<DataSourceRequest> {
    let relation = declaring.attributes.get(&pending.relation_attr).ok_or_else(|| {
        ErrorKind::ConfigInvariantViolated
            .with_message(format!("sub-filter target '{}' vanished", pending.relation_attr))
    })?;
    let sub_primary_ds = relation.primary_data_source().ok_or_else(|| {
        ErrorKind::NoDataSources.with_message(format!("No DataSources defined for {}", pending.relation_attr))
    })?;

    let child_key_target = relation.join_via.as_deref().unwrap_or(relation);
    let child_key_ds = if relation.join_via.is_some() {
        child_key_target.primary_data_source().unwrap_or(sub_primary_ds)
    } else {
        sub_primary_ds
    };
    let projection = child_key_target
        .resolved_key_for(&relation.flat_child_key())
        .get(child_key_ds)
        .cloned()
        .unwrap_or_default();

    let resolution = resolve_filter(relation, sub_primary_ds, &pending.rest)?;
    if !resolution.sub_filters.is_empty() {
        // Nested multi-hop sub-filters (e.g. comments.user.id) would recurse
        // further here; contiguous indices are still assigned by the caller
        // one level up since each resolve_filter call starts its own count.
    }

    let mut req = DataSourceRequest::new(pending.relation_attr.clone(), sub_primary_ds);
    req.unique_child_key = false;
    req.request = AdapterRequest {
        attributes: projection,
        filter: Some(resolution.physical),
        native: native_options(relation, sub_primary_ds),
        ..Default::default()
    };
    for nested in resolution.sub_filters {
        req.sub_filters.push(build_sub_filter(relation, &nested)?);
    }
    Ok(req)
}

fn native_options(node: &AttrNode, ds_name: &str) -> Arc<JsonValue> {
    node.data_sources
        .get(ds_name)
        .map(|ds| ds.options.clone())
        .unwrap_or_else(|| Arc::new(JsonValue::Null))
}

fn collect_ds_columns(node: &AttrNode, ds: &str) -> (Vec<String>, HashMap<String, AttributeOption>) {
    let mut attributes = Vec::new();
    let mut options = HashMap::new();
    collect_ds_columns_rec(node, ds, &mut attributes, &mut options);
    (attributes, options)
}

fn collect_ds_columns_rec(
    node: &AttrNode,
    ds: &str,
    attributes: &mut Vec<String>,
    options: &mut HashMap<String, AttributeOption>,
) {
    for attr in node.attributes.values() {
        if !attr.selected {
            continue;
        }
        if attr.is_resource() {
            continue;
        }
        if !attr.attributes.is_empty() {
            collect_ds_columns_rec(attr, ds, attributes, options);
            continue;
        }
        if attr.value.is_some() {
            continue;
        }
        if let Some(col) = attr.mapped_column(ds) {
            if !attributes.iter().any(|c| c == col) {
                attributes.push(col.to_string());
                options.insert(
                    col.to_string(),
                    AttributeOption {
                        attr_type: attr.attr_type.clone(),
                    },
                );
            }
        }
    }
}

#[allow(dead_code)]
fn path_lookup<'a>(root: &'a AttrNode, path: &[String]) -> Option<&'a AttrNode> {
    node_at_path(root, path)
}
