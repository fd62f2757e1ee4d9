// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Filter validation, sub-filter rewrite-vs-emit decision (spec §4.1.5).

use crate::config::AttrNode;
use crate::error::ErrorKind;
use crate::request::{FilterDnf, FilterEntry};
use crate::resolver::tree::{FilterValueSource, PhysicalFilterDnf, PhysicalFilterEntry};
use crate::Result;

/// A sub-filter still awaiting its own data-source sub-tree (built recursively
/// by [`crate::resolver::build`]). `index` matches the
/// [`FilterValueSource::FromSubFilter`] placeholder left in the parent's
/// physical filter.
#[derive(Debug, Clone)]
pub struct PendingSubFilter {
    pub index: usize,
    /// Name of the sub-resource attribute on the declaring node this
    /// sub-filter traverses (e.g. `"categories"` for a filter on
    /// `categories.id`).
    pub relation_attr: String,
    /// The remaining filter, rooted at the sub-resource, to resolve there.
    pub rest: FilterDnf,
}

#[derive(Debug, Clone, Default)]
pub struct FilterResolution {
    pub physical: PhysicalFilterDnf,
    pub sub_filters: Vec<PendingSubFilter>,
}

/// Resolves a client [`FilterDnf`] against `node` (the resource/sub-resource
/// this filter is attached to in the request), splitting entries whose path
/// reaches through a sub-resource into either a local rewrite or a pending
/// sub-filter (spec §4.1.5).
pub fn resolve_filter(node: &AttrNode, primary_ds: &str, filter: &FilterDnf) -> Result<FilterResolution> {
    let mut physical = Vec::with_capacity(filter.len());
    let mut sub_filters = Vec::new();

    for group in filter {
        let mut physical_group = Vec::with_capacity(group.len());
        for entry in group {
            let resolved = resolve_entry(node, primary_ds, entry, &mut sub_filters)?;
            physical_group.push(resolved);
        }
        physical.push(physical_group);
    }

    Ok(FilterResolution {
        physical,
        sub_filters,
    })
}

fn resolve_entry(
    node: &AttrNode,
    primary_ds: &str,
    entry: &FilterEntry,
    sub_filters: &mut Vec<PendingSubFilter>,
) -> Result<PhysicalFilterEntry> {
    let path_str = entry.attribute.join(".");

    if entry.attribute.len() == 1 {
        return resolve_local(node, primary_ds, &entry.attribute[0], &entry.operator, entry.value.clone());
    }

    if let Some(spec) = node.sub_filters.iter().find(|s| s.attribute == path_str) {
        if let Some(rewrite_to) = &spec.rewrite_to {
            return resolve_local(node, primary_ds, rewrite_to, &entry.operator, entry.value.clone());
        }
    }

    let relation_attr = entry.attribute[0].clone();
    let relation = node.attributes.get(&relation_attr).ok_or_else(|| {
        ErrorKind::UnknownAttribute.with_message(format!("Unknown attribute {path_str}"))
    })?;
    if !relation.is_resource() {
        return Err(ErrorKind::UnknownAttribute
            .with_message(format!("{relation_attr} is not a sub-resource, cannot filter by {path_str}")));
    }

    let index = sub_filters.len();
    sub_filters.push(PendingSubFilter {
        index,
        relation_attr: relation_attr.clone(),
        rest: vec![vec![FilterEntry {
            attribute: entry.attribute[1..].to_vec(),
            operator: entry.operator.clone(),
            value: entry.value.clone(),
        }]],
    });

    let parent_key = relation.flat_parent_key();
    let join_column = parent_key
        .first()
        .and_then(|attr_name| node.attributes.get(attr_name))
        .and_then(|attr| attr.mapped_column(primary_ds))
        .ok_or_else(|| {
            ErrorKind::ConfigInvariantViolated
                .with_message(format!("no parentKey mapping for sub-filter on {relation_attr}"))
        })?
        .to_string();

    Ok(PhysicalFilterEntry {
        column: join_column,
        operator: "in".to_string(),
        value: FilterValueSource::FromSubFilter(index),
    })
}

fn resolve_local(
    node: &AttrNode,
    primary_ds: &str,
    attr_name: &str,
    operator: &str,
    value: serde_json::Value,
) -> Result<PhysicalFilterEntry> {
    let attr = node
        .attributes
        .get(attr_name)
        .ok_or_else(|| ErrorKind::UnknownAttribute.with_message(format!("Unknown attribute {attr_name}")))?;

    let Some(allowed) = &attr.filter else {
        return Err(ErrorKind::NotFilterable
            .with_message(format!("Can not filter by {attr_name}")));
    };
    if !allowed.iter().any(|op| op == operator) {
        return Err(ErrorKind::InvalidOperator.with_message(format!(
            "Can not filter by {attr_name} with {operator} (allowed: {})",
            allowed.join(", ")
        )));
    }

    let column = attr
        .mapped_column(primary_ds)
        .or_else(|| attr.mapped_column("default"))
        .ok_or_else(|| {
            ErrorKind::ConfigInvariantViolated
                .with_message(format!("attribute {attr_name} has no column mapping for {primary_ds}"))
        })?
        .to_string();

    Ok(PhysicalFilterEntry {
        column,
        operator: operator.to_string(),
        value: FilterValueSource::Literal(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn leaf_with_filter(ds: &str, column: &str, ops: &[&str]) -> AttrNode {
        let mut node = AttrNode::default();
        let mut map = StdHashMap::new();
        map.insert(ds.to_string(), column.to_string());
        node.map.insert("default".into(), map);
        node.filter = Some(ops.iter().map(|s| s.to_string()).collect());
        node
    }

    fn sample_node() -> AttrNode {
        let mut node = AttrNode::default();
        node.attributes.insert("title".into(), leaf_with_filter("primary", "title", &["equal"]));

        let mut author = AttrNode::default();
        author.data_sources.insert(
            "primary".into(),
            crate::config::DataSourceConfig {
                ds_type: "mysql".into(),
                primary: true,
                inherit: None,
                options: std::sync::Arc::new(serde_json::json!({})),
            },
        );
        author.parent_key = Some(vec![vec!["author_id".into()]]);
        node.attributes.insert("author".into(), author);
        node.attributes.insert(
            "author_id".into(),
            leaf_with_filter("primary", "authorId", &["equal"]),
        );

        node
    }

    #[test]
    fn local_filter_resolves_to_physical_column() {
        let node = sample_node();
        let filter = vec![vec![FilterEntry {
            attribute: vec!["title".into()],
            operator: "equal".into(),
            value: serde_json::json!("hello"),
        }]];
        let resolved = resolve_filter(&node, "primary", &filter).unwrap();
        assert_eq!(resolved.physical[0][0].column, "title");
        assert!(resolved.sub_filters.is_empty());
    }

    #[test]
    fn disallowed_operator_is_rejected() {
        let node = sample_node();
        let filter = vec![vec![FilterEntry {
            attribute: vec!["title".into()],
            operator: "gt".into(),
            value: serde_json::json!("hello"),
        }]];
        let err = resolve_filter(&node, "primary", &filter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperator);
    }

    #[test]
    fn rewrite_target_avoids_subfilter() {
        let mut node = sample_node();
        node.sub_filters.push(crate::config::SubFilterSpec {
            attribute: "author.id".into(),
            rewrite_to: Some("author_id".into()),
        });
        let filter = vec![vec![FilterEntry {
            attribute: vec!["author".into(), "id".into()],
            operator: "equal".into(),
            value: serde_json::json!([11, 12, 13]),
        }]];
        let resolved = resolve_filter(&node, "primary", &filter).unwrap();
        assert!(resolved.sub_filters.is_empty());
        assert_eq!(resolved.physical[0][0].column, "authorId");
    }

    #[test]
    fn unmatched_foreign_path_emits_subfilter() {
        let node = sample_node();
        let filter = vec![vec![FilterEntry {
            attribute: vec!["author".into(), "id".into()],
            operator: "equal".into(),
            value: serde_json::json!([11, 12, 13]),
        }]];
        let resolved = resolve_filter(&node, "primary", &filter).unwrap();
        assert_eq!(resolved.sub_filters.len(), 1);
        assert_eq!(resolved.sub_filters[0].relation_attr, "author");
        match &resolved.physical[0][0].value {
            FilterValueSource::FromSubFilter(0) => {}
            other => panic!("expected FromSubFilter(0), got {other:?}"),
        }
    }
}
