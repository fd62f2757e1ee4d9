// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! C3: the Request Resolver (spec §4.1). Merges a validated [`Request`] with
//! the parsed resource config into a `resolvedConfig` (selection-annotated
//! attribute tree) and a `dataSourceTree` (the physical execution plan C4
//! walks).

mod build;
mod filter;
mod include;
mod limits;
mod select;
mod tree;

pub use build::build_tree;
pub use filter::{resolve_filter, FilterResolution, PendingSubFilter};
pub use include::{resolve_resource, MAX_INCLUSION_DEPTH};
pub use limits::{resolve_limits, ResolvedLimits, DEFAULT_LIST_LIMIT};
pub use select::{mark_selection, node_at_path, node_at_path_mut, resolve_depends};
pub use tree::{
    AdapterRequest, AttributeOption, DataSourceRequest, DataSourceTree, FilterValueSource,
    PhysicalFilterDnf, PhysicalFilterEntry, PhysicalOrderEntry, ResolvedConfig,
};

use crate::config::ResourceMap;
use crate::error::ErrorKind;
use crate::request::Request;
use crate::Result;

/// Runs the whole resolution pipeline for one request (spec §4.1 "Public
/// contract"): resource lookup + inclusion, selection marking, `depends`
/// closure, then data-source tree construction.
#[tracing::instrument(level = "debug", skip_all, fields(resource = %request.resource), err)]
pub fn resolve(request: &Request, resources: &ResourceMap) -> Result<(ResolvedConfig, DataSourceTree)> {
    let mut root = resolve_resource(&request.resource, resources)?;

    if request.id.is_some() && root.many {
        return Err(ErrorKind::ConfigInvariantViolated
            .with_message("resource root cannot be a many-relation"));
    }

    mark_selection(&mut root, request.select.as_ref(), "")?;
    resolve_depends(&mut root)?;

    let data_source_tree = build_tree(&root, request)?;

    Ok((
        ResolvedConfig { root },
        DataSourceTree { root: data_source_tree },
    ))
}
