// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Static invariant checks run once at load time (spec §3.1 "Invariants"),
//! so a broken resource config fails at `init` rather than on the first request
//! that happens to touch the broken part.

use crate::config::node::AttrNode;
use crate::error::ErrorKind;
use crate::Result;

/// Validates every non-include resource node reachable from `root`.
///
/// Include nodes (`resource: Some(_)`) are skipped here: they carry no
/// attributes of their own to validate, and the resource they point at is
/// validated independently when its own directory is loaded.
pub fn validate_node(name: &str, node: &AttrNode) -> Result<()> {
    if node.resource.is_some() {
        return Ok(());
    }
    if !node.is_resource() {
        // A plain attribute-group node (no datasources) with no parent is only
        // reachable as a nested attribute; nothing to validate at this level.
        return Ok(());
    }

    if node.data_sources.is_empty() {
        return Err(ErrorKind::NoDataSources.with_message(format!("resource '{name}'")));
    }

    let flat_pk = node.flat_primary_key();
    for attr in &flat_pk {
        if !node.attributes.contains_key(attr) {
            return Err(ErrorKind::ConfigInvariantViolated.with_message(format!(
                "resource '{name}': primaryKey attribute '{attr}' does not exist"
            )));
        }
    }

    let Some(primary_ds) = node.primary_data_source() else {
        return Err(ErrorKind::NoDataSources.with_message(format!("resource '{name}'")));
    };

    for attr in &flat_pk {
        let child = &node.attributes[attr];
        if child.mapped_column(primary_ds).is_none() && child.value.is_none() {
            return Err(ErrorKind::ConfigInvariantViolated.with_message(format!(
                "resource '{name}': primary datasource '{primary_ds}' does not map primaryKey attribute '{attr}'"
            )));
        }
    }

    for (attr_name, attr) in &node.attributes {
        for ds_name in attr.map.values().flat_map(|m| m.keys()) {
            if !node.data_sources.contains_key(ds_name) {
                return Err(ErrorKind::ConfigInvariantViolated.with_message(format!(
                    "resource '{name}': attribute '{attr_name}' maps to undeclared datasource '{ds_name}'"
                )));
            }
        }
        if let Some(filter) = &attr.filter {
            if filter.is_empty() {
                return Err(ErrorKind::ConfigInvariantViolated.with_message(format!(
                    "resource '{name}': attribute '{attr_name}' declares an empty filter operator set"
                )));
            }
        }
        if attr.is_resource() {
            validate_node(&format!("{name}.{attr_name}"), attr)?;
        }
    }

    for order_entry in &node.default_order {
        if let Some(first) = order_entry.attribute.first() {
            if !node.attributes.contains_key(first) {
                return Err(ErrorKind::ConfigInvariantViolated.with_message(format!(
                    "resource '{name}': defaultOrder references unknown attribute '{first}'"
                )));
            }
        }
    }

    Ok(())
}
