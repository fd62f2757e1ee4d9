// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::request::SelectTree;

/// An ordered tuple of attribute names forming one alternative of a (possibly
/// composite, possibly multi-alternative) key. See spec §3.1 `primaryKey`.
pub type KeyGroup = Vec<String>;

/// `{datasource-name -> ordered list of mapped column names}`, the pre-computed
/// physical projection of a key (spec §3.1 `resolvedPrimaryKey`).
pub type ResolvedKey = HashMap<String, Vec<String>>;

/// Sort direction allowed by an attribute's `order` spec, and used in request
/// `OrderList` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// An attribute's `order` metadata: either a plain boolean (any direction is
/// allowed, or ordering is disabled entirely) or an explicit subset of allowed
/// directions (spec §3.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OrderSpec {
    Allowed(bool),
    Directions(Vec<Direction>),
}

impl OrderSpec {
    pub fn allows(&self, direction: Direction) -> bool {
        match self {
            OrderSpec::Allowed(allowed) => *allowed,
            OrderSpec::Directions(dirs) => dirs.contains(&direction),
        }
    }
}

/// `{attribute: "author.id", rewriteTo: Some("authorId")}` — a resource-level
/// sub-filter rule (spec §4.1.5). When `rewrite_to` is absent, a matching filter
/// is resolved by emitting a subFilter sub-tree instead of a local rewrite.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubFilterSpec {
    pub attribute: String,
    pub rewrite_to: Option<String>,
}

/// `{defaultOrder}` entry: an attribute path plus a direction.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEntry {
    pub attribute: Vec<String>,
    pub direction: Direction,
}

/// Inheritance directive for a datasource declared at an inclusion site that
/// collides with one inherited from the included resource (spec §4.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inherit {
    /// Merge the override's fields into the inherited datasource, keep the rest.
    Inherit,
    /// Drop all inherited fields, then merge the override on top of nothing.
    Replace,
}

/// Opaque, adapter-specific datasource configuration (spec §3.1 `dataSources`).
///
/// The core never interprets these fields beyond `type` (the adapter identity)
/// and `primary`; everything else is passed through to the adapter untouched.
/// The payload is `Arc`-wrapped so that cloning a resource node while resolving
/// a request (spec §4.1.1 "deep clone... except datasource adapter configs")
/// never re-serializes or deep-copies adapter configuration.
#[derive(Clone)]
pub struct DataSourceConfig {
    pub ds_type: String,
    pub primary: bool,
    pub inherit: Option<Inherit>,
    pub options: Arc<JsonValue>,
}

impl fmt::Debug for DataSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceConfig")
            .field("ds_type", &self.ds_type)
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}

impl<'de> Deserialize<'de> for DataSourceConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        let ds_type = value
            .get("type")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let primary = value
            .get("primary")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        let inherit = value
            .get("inherit")
            .and_then(JsonValue::as_str)
            .and_then(|s| match s {
                "inherit" => Some(Inherit::Inherit),
                "replace" => Some(Inherit::Replace),
                _ => None,
            });
        Ok(Self {
            ds_type,
            primary,
            inherit,
            options: Arc::new(value),
        })
    }
}

/// User-supplied hook and action callbacks attached to a resource (spec §3.1,
/// §4.4). These aren't deserialized from `config.<ext>` — the embedding
/// application builds them from the resource's `index.<native>` entry point
/// (spec §6.2) and attaches them after loading.
/// A single action implementation (spec §4.4, §6.2 `index.<native>`): either
/// one function handling every `format`, or a format-keyed table (picking
/// `"default"` for `format == "json"`, per §4.4's dispatch rule).
pub type ActionFn = Arc<
    dyn Fn(&crate::request::Request) -> futures::future::BoxFuture<'static, crate::Result<JsonValue>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub enum ActionHandler {
    Direct(ActionFn),
    ByFormat(HashMap<String, ActionFn>),
}

impl fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionHandler::Direct(_) => f.write_str("ActionHandler::Direct(..)"),
            ActionHandler::ByFormat(map) => f.debug_tuple("ActionHandler::ByFormat").field(&map.keys().collect::<Vec<_>>()).finish(),
        }
    }
}

#[derive(Clone, Default)]
pub struct Extensions {
    pub init: Option<Arc<dyn Fn() -> crate::Result<()> + Send + Sync>>,
    pub item: Option<
        Arc<dyn Fn(&crate::request::Request, &mut JsonValue) -> crate::Result<()> + Send + Sync>,
    >,
    pub pre_execute: Option<
        Arc<dyn Fn(&mut crate::resolver::DataSourceTree) -> crate::Result<()> + Send + Sync>,
    >,
    pub post_execute: Option<
        Arc<dyn Fn(&mut Vec<crate::executor::RawResult>) -> crate::Result<()> + Send + Sync>,
    >,
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("init", &self.init.is_some())
            .field("item", &self.item.is_some())
            .field("pre_execute", &self.pre_execute.is_some())
            .field("post_execute", &self.post_execute.is_some())
            .finish()
    }
}

/// A single node in the resource/attribute tree (spec §3.1). `ResourceNode` and
/// `AttrNode` are the same recursive shape in the spec; a node is a "resource"
/// iff [`AttrNode::is_resource`] is true (it owns at least one datasource).
///
/// This same type doubles as the resolved config node (spec §3.3): the
/// `selected`/`selected_data_source`/`parent_data_source`/`internal` fields are
/// left at their defaults in a freshly parsed config and are only set by the
/// resolver on its private clone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttrNode {
    // --- resource-level fields ---
    pub primary_key: Vec<KeyGroup>,
    pub resolved_primary_key: ResolvedKey,
    pub data_sources: IndexMap<String, DataSourceConfig>,
    pub attributes: IndexMap<String, AttrNode>,
    pub resource: Option<String>,

    // --- relation (sub-resource) fields ---
    pub parent_key: Option<Vec<KeyGroup>>,
    pub child_key: Option<Vec<KeyGroup>>,
    pub resolved_parent_key: Option<ResolvedKey>,
    pub resolved_child_key: Option<ResolvedKey>,
    pub many: bool,
    pub join_via: Option<Box<AttrNode>>,
    pub multi_valued: bool,
    pub delimiter: Option<String>,

    // --- leaf attribute metadata ---
    #[serde(rename = "type")]
    pub attr_type: Option<String>,
    /// `{defaultTargetName -> {datasource -> physical column}}`. In practice
    /// flora-style configs have exactly one target, `"default"`.
    pub map: HashMap<String, HashMap<String, String>>,
    pub filter: Option<Vec<String>>,
    pub order: Option<OrderSpec>,
    pub hidden: bool,
    pub depends: Option<SelectTree>,
    pub value: Option<JsonValue>,

    // --- resource-level metadata ---
    pub default_limit: Option<u64>,
    pub max_limit: Option<u64>,
    pub default_order: Vec<OrderEntry>,
    pub sub_filters: Vec<SubFilterSpec>,

    #[serde(skip)]
    pub extensions: Extensions,
    /// `{actionName -> handler}` attached by the embedding application from
    /// the resource's `index.<native>` entry point (spec §6.2); the built-in
    /// `"retrieve"` action runs even when absent from this map.
    #[serde(skip)]
    pub actions: HashMap<String, ActionHandler>,

    // --- resolver annotations (spec §3.3); absent in a freshly parsed config ---
    #[serde(skip)]
    pub selected: bool,
    #[serde(skip)]
    pub internal: bool,
    #[serde(skip)]
    pub selected_data_source: Option<String>,
    #[serde(skip)]
    pub parent_data_source: Option<String>,
    /// Child attribute names in the order the client's `select` named them,
    /// used to compute response field order (spec §5, §9 — see
    /// DESIGN.md for the request-order-vs-config-order decision).
    #[serde(skip)]
    pub select_order: Vec<String>,
    /// Final response field order for this node's selected, non-internal
    /// children: primary key first (config order), then `select_order`.
    #[serde(skip)]
    pub response_order: Vec<String>,

    /// Per-node `filter`/`order`/`limit`/`page` carried over from the
    /// client's `SelectTree` options for this sub-resource (spec §3.2), used
    /// by the data-source tree builder once selection has settled.
    #[serde(skip)]
    pub request_filter: Option<crate::request::FilterDnf>,
    #[serde(skip)]
    pub request_order: Option<crate::request::OrderList>,
    #[serde(skip)]
    pub request_limit: Option<u64>,
    #[serde(skip)]
    pub request_page: Option<u64>,
}

impl AttrNode {
    /// A node "is a resource" iff it owns one or more datasources (spec §3.1).
    pub fn is_resource(&self) -> bool {
        !self.data_sources.is_empty()
    }

    /// The primary datasource: the one tagged `primary`, or the first declared
    /// one if none is tagged (spec §3.1).
    pub fn primary_data_source(&self) -> Option<&str> {
        self.data_sources
            .iter()
            .find(|(_, ds)| ds.primary)
            .or_else(|| self.data_sources.iter().next())
            .map(|(name, _)| name.as_str())
    }

    /// The flat concatenation of all `primaryKey` groups (spec §3.1).
    pub fn flat_primary_key(&self) -> Vec<String> {
        self.primary_key.iter().flatten().cloned().collect()
    }

    pub fn flat_parent_key(&self) -> Vec<String> {
        self.parent_key
            .iter()
            .flatten()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn flat_child_key(&self) -> Vec<String> {
        self.child_key
            .iter()
            .flatten()
            .flatten()
            .cloned()
            .collect()
    }

    /// Looks up the physical column an attribute maps to on `datasource`,
    /// using the first (and conventionally only) map target.
    pub fn mapped_column(&self, datasource: &str) -> Option<&str> {
        self.map
            .values()
            .next()
            .and_then(|targets| targets.get(datasource))
            .map(String::as_str)
    }

    /// Computes `{datasource -> ordered mapped columns}` for `flat_key`,
    /// skipping datasources that don't map every attribute in it (spec §3.1
    /// `resolvedPrimaryKey`/`resolvedParentKey`/`resolvedChildKey`; the
    /// loader leaves these fields for an embedding application to
    /// precompute, so the resolver derives them itself when absent).
    pub fn resolved_key_for(&self, flat_key: &[String]) -> ResolvedKey {
        let mut resolved = ResolvedKey::new();
        for ds_name in self.data_sources.keys() {
            let mut columns = Vec::with_capacity(flat_key.len());
            let mut complete = true;
            for attr_name in flat_key {
                match self.attributes.get(attr_name).and_then(|a| a.mapped_column(ds_name)) {
                    Some(col) => columns.push(col.to_string()),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                resolved.insert(ds_name.clone(), columns);
            }
        }
        resolved
    }
}

/// Top-level parsed configuration: `{resource name -> node}` (spec §3.1).
pub type ResourceMap = HashMap<String, Arc<AttrNode>>;
