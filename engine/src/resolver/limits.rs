// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Limit/order resolution (spec §4.1.3).

use crate::config::{AttrNode, Direction, OrderEntry};
use crate::error::ErrorKind;
use crate::request::OrderList;
use crate::Result;

/// Platform default list limit when neither the request nor the resource
/// config name one (spec §4.1.3 "platform default (10 for list...)").
pub const DEFAULT_LIST_LIMIT: u64 = 10;

/// A node's resolved limit/order, ready to attach to a [`crate::resolver::AdapterRequest`].
#[derive(Debug, Clone, Default)]
pub struct ResolvedLimits {
    pub limit: Option<u64>,
    pub page: Option<u64>,
    pub order: Vec<OrderEntry>,
}

/// Resolves `node`'s effective limit/page/order for one selection level.
///
/// `is_single_item` is true for the request root when `id` is present, and
/// for any 1:1 sub-resource (`!many`) — both forbid an explicit `limit`.
pub fn resolve_limits(
    node: &AttrNode,
    is_single_item: bool,
    requested_limit: Option<u64>,
    requested_page: Option<u64>,
    requested_order: Option<&OrderList>,
) -> Result<ResolvedLimits> {
    if requested_limit.is_some() && is_single_item {
        return Err(ErrorKind::InvalidLimit.with_message("Invalid limit on a single resource"));
    }

    if let (Some(limit), Some(max)) = (requested_limit, node.max_limit) {
        if limit > max {
            return Err(ErrorKind::InvalidLimit
                .with_message(format!("Invalid limit {limit}, maxLimit is {max}")));
        }
    }

    if requested_page.is_some() && requested_limit.is_none() {
        return Err(ErrorKind::InvalidLimit.with_message("page requires limit"));
    }

    let limit = if is_single_item {
        None
    } else {
        Some(
            requested_limit
                .or(node.default_limit)
                .or(node.max_limit)
                .unwrap_or(DEFAULT_LIST_LIMIT),
        )
    };

    let order = match requested_order {
        Some(list) => {
            validate_order(node, list)?;
            list.iter()
                .map(|entry| OrderEntry {
                    attribute: entry.attribute.clone(),
                    direction: entry.direction,
                })
                .collect()
        }
        None => node.default_order.clone(),
    };

    Ok(ResolvedLimits {
        limit,
        page: requested_page,
        order,
    })
}

/// Checks that every requested order entry targets an attribute (at any
/// depth reachable locally from `node`) that declares `order` and allows the
/// requested direction.
fn validate_order(node: &AttrNode, list: &OrderList) -> Result<()> {
    for entry in list {
        let Some((leaf_name, leaf)) = resolve_order_target(node, &entry.attribute) else {
            return Err(ErrorKind::UnknownAttribute
                .with_message(format!("Unknown attribute {}", entry.attribute.join("."))));
        };
        let Some(spec) = &leaf.order else {
            return Err(ErrorKind::NotSortable
                .with_message(format!("attribute is not sortable {leaf_name}")));
        };
        if !spec.allows(entry.direction) {
            return Err(ErrorKind::NotSortable.with_message(format!(
                "direction {:?} not allowed for {leaf_name}",
                entry.direction
            )));
        }
    }
    Ok(())
}

fn resolve_order_target<'a>(node: &'a AttrNode, path: &[String]) -> Option<(String, &'a AttrNode)> {
    let mut current = node;
    for (i, segment) in path.iter().enumerate() {
        let next = current.attributes.get(segment)?;
        if i == path.len() - 1 {
            return Some((path.join("."), next));
        }
        current = next;
    }
    None
}
