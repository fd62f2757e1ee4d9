// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Resource lookup and inclusion resolution (spec §4.1.1).

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::config::{AttrNode, DataSourceConfig, Inherit, ResourceMap};
use crate::error::ErrorKind;
use crate::Result;

/// Hard limit on transitive `resource` include chains (spec §4.1.1).
pub const MAX_INCLUSION_DEPTH: usize = 10;

/// Looks up `name` in `resources`, following `resource` includes
/// transitively, and returns an owned clone of the final resource (merged
/// with every inclusion site's local overrides along the way).
pub fn resolve_resource(name: &str, resources: &ResourceMap) -> Result<AttrNode> {
    let site = resources
        .get(name)
        .ok_or_else(|| ErrorKind::UnknownResource.with_message(format!("Unknown resource {name}")))?;

    let mut chain = vec![name.to_string()];
    let resolved = follow_include(site, resources, &mut chain, 0)?;

    if resolved.data_sources.is_empty() {
        return Err(ErrorKind::NoDataSources.with_message("No DataSources defined in resource"));
    }

    Ok(resolved)
}

/// Recursively follows `node.resource`, if present, merging each inclusion
/// site's local `attributes`/`dataSources` into the final clone.
fn follow_include(
    node: &AttrNode,
    resources: &ResourceMap,
    chain: &mut Vec<String>,
    depth: usize,
) -> Result<AttrNode> {
    let Some(target_name) = &node.resource else {
        return Ok(node.clone());
    };

    if depth >= MAX_INCLUSION_DEPTH {
        return Err(ErrorKind::InclusionDepthExceeded.with_message("Resource inclusion depth too big"));
    }

    let target = resources.get(target_name).ok_or_else(|| {
        ErrorKind::UnknownIncludedResource.with_message(format!(
            "Unknown resource {target_name} (included from: {})",
            chain.join(" -> ")
        ))
    })?;

    chain.push(target_name.clone());
    let mut resolved = follow_include(target, resources, chain, depth + 1)?;
    chain.pop();

    merge_inclusion_site(&mut resolved, node)?;
    Ok(resolved)
}

/// Merges an inclusion site's local `attributes`/`dataSources` into the
/// already-resolved target clone (spec §4.1.2 "Merge rules for included
/// sub-resources").
fn merge_inclusion_site(target: &mut AttrNode, site: &AttrNode) -> Result<()> {
    for (attr_name, attr) in &site.attributes {
        if target.attributes.contains_key(attr_name) {
            return Err(ErrorKind::InvalidOverwrite
                .with_message(format!("Cannot overwrite attribute {attr_name}")));
        }
        target.attributes.insert(attr_name.clone(), attr.clone());
    }

    for (ds_name, ds) in &site.data_sources {
        match target.data_sources.get(ds_name).cloned() {
            None => {
                target.data_sources.insert(ds_name.clone(), ds.clone());
            }
            Some(existing) => {
                let merged = match ds.inherit {
                    Some(Inherit::Inherit) => DataSourceConfig {
                        ds_type: if ds.ds_type.is_empty() {
                            existing.ds_type.clone()
                        } else {
                            ds.ds_type.clone()
                        },
                        primary: ds.primary || existing.primary,
                        inherit: None,
                        options: Arc::new(merge_json_objects(&existing.options, &ds.options)),
                    },
                    Some(Inherit::Replace) => DataSourceConfig {
                        inherit: None,
                        ..ds.clone()
                    },
                    None => {
                        return Err(ErrorKind::InvalidOverwrite
                            .with_message(format!("Cannot overwrite datasource {ds_name}")));
                    }
                };
                target.data_sources.insert(ds_name.clone(), merged);
            }
        }
    }

    // Every other resource-level override (primaryKey, subFilters, limits,
    // extensions, ...) declared at the inclusion site takes precedence over
    // the included resource's own, since the site is describing how this
    // particular use of the resource should behave.
    if !site.primary_key.is_empty() {
        target.primary_key = site.primary_key.clone();
    }
    if !site.resolved_primary_key.is_empty() {
        target.resolved_primary_key = site.resolved_primary_key.clone();
    }
    if site.parent_key.is_some() {
        target.parent_key = site.parent_key.clone();
        target.resolved_parent_key = site.resolved_parent_key.clone();
    }
    if site.child_key.is_some() {
        target.child_key = site.child_key.clone();
        target.resolved_child_key = site.resolved_child_key.clone();
    }
    target.many = site.many || target.many;
    if site.join_via.is_some() {
        target.join_via = site.join_via.clone();
    }
    if site.multi_valued {
        target.multi_valued = true;
        target.delimiter = site.delimiter.clone();
    }
    if site.default_limit.is_some() {
        target.default_limit = site.default_limit;
    }
    if site.max_limit.is_some() {
        target.max_limit = site.max_limit;
    }
    if !site.default_order.is_empty() {
        target.default_order = site.default_order.clone();
    }
    if !site.sub_filters.is_empty() {
        target.sub_filters = site.sub_filters.clone();
    }

    Ok(())
}

/// Shallow-recursive JSON object merge: `overlay`'s keys win, nested objects
/// merge recursively, everything else is replaced wholesale.
fn merge_json_objects(base: &JsonValue, overlay: &JsonValue) -> JsonValue {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => merge_json_objects(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            JsonValue::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}
