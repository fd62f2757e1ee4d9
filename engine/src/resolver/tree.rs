// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! The data-source tree (spec §3.4): the physical execution plan handed to
//! C4. Every node here is in terms of *physical* columns and datasource
//! names, never attribute paths into the resource config.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::config::Direction;

/// Where a physical filter entry's comparison value comes from (spec §3.4).
#[derive(Debug, Clone)]
pub enum FilterValueSource {
    /// A literal value taken directly from the client's filter.
    Literal(JsonValue),
    /// Filled in at execution time from the `i`-th component of the parent
    /// row's key columns (`valueFromParentKey: true` in the spec; indexed
    /// here because composite keys substitute component-wise — see
    /// DESIGN.md for the accepted column-wise-IN approximation of a true
    /// tuple-IN join).
    FromParentKey(usize),
    /// Filled in from the N-th sibling `subFilters` tree's result key set
    /// (`valueFromSubFilter: <index>`).
    FromSubFilter(usize),
}

#[derive(Debug, Clone)]
pub struct PhysicalFilterEntry {
    pub column: String,
    pub operator: String,
    pub value: FilterValueSource,
}

/// Disjunction-of-conjunctions over physical columns (spec §3.4 `filter`).
pub type PhysicalFilterDnf = Vec<Vec<PhysicalFilterEntry>>;

#[derive(Debug, Clone)]
pub struct PhysicalOrderEntry {
    pub column: String,
    pub direction: Direction,
}

/// Per-column metadata for downstream decoding (spec §3.4 `attributeOptions`).
#[derive(Debug, Clone, Default)]
pub struct AttributeOption {
    pub attr_type: Option<String>,
}

/// The adapter-facing payload of one [`DataSourceRequest`] (spec §3.4
/// `request`).
#[derive(Debug, Clone, Default)]
pub struct AdapterRequest {
    pub attributes: Vec<String>,
    pub filter: Option<PhysicalFilterDnf>,
    pub order: Option<Vec<PhysicalOrderEntry>>,
    pub limit: Option<u64>,
    pub page: Option<u64>,
    /// Per-parent-key TOP-N limit columns for 1:n sub-requests (spec §3.4,
    /// §4.1.3 `limitPer`). Carries the full `parentKey` tuple, since a
    /// composite key must group on every column, not just the first.
    pub limit_per: Option<Vec<String>>,
    pub search: Option<String>,
    /// Adapter-native fields (`type`, `table`, `database`, ...), sourced
    /// verbatim from the resource's `dataSources` config for this adapter.
    pub native: Arc<JsonValue>,
}

/// One node of the data-source tree (spec §3.4).
#[derive(Debug, Clone, Default)]
pub struct DataSourceRequest {
    pub resource_name: String,
    pub attribute_path: Vec<String>,
    pub data_source_name: String,
    pub request: AdapterRequest,
    pub attribute_options: HashMap<String, AttributeOption>,

    // --- join metadata; `None` on the root node ---
    pub parent_key: Option<Vec<String>>,
    pub child_key: Option<Vec<String>>,
    pub multi_valued_parent_key: bool,
    pub unique_child_key: bool,
    /// Delimiter used to split a `multiValuedParentKey` column's value before
    /// substituting it as a set-in filter (spec §4.2 step 2).
    pub parent_key_delimiter: Option<String>,
    /// True if this node is itself `many` (a 1:n relation) — the result
    /// builder needs this to know whether a lookup miss should emit `[]`.
    pub many: bool,

    pub sub_requests: Vec<DataSourceRequest>,
    pub sub_filters: Vec<DataSourceRequest>,
}

impl DataSourceRequest {
    pub fn new(resource_name: impl Into<String>, data_source_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            data_source_name: data_source_name.into(),
            unique_child_key: true,
            ..Default::default()
        }
    }
}

/// The per-request plan returned by [`crate::resolver::resolve`]: the
/// selection-annotated config clone plus the physical execution plan.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub root: crate::config::AttrNode,
}

#[derive(Debug, Clone)]
pub struct DataSourceTree {
    pub root: DataSourceRequest,
}
