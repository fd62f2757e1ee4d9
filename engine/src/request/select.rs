// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::config::Direction;

/// One entry of a client-issued `FilterDNF` group (spec §3.2): a dotted
/// attribute path (e.g. `["author", "id"]` for `author.id`), an operator name,
/// and the value to compare against.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterEntry {
    pub attribute: Vec<String>,
    pub operator: String,
    pub value: JsonValue,
}

/// Disjunction-of-conjunctions filter (spec §3.2): a list of groups, each
/// group a list of [`FilterEntry`] ANDed together; groups are ORed.
pub type FilterDnf = Vec<Vec<FilterEntry>>;

/// One `OrderList` entry (spec §3.2).
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequestEntry {
    pub attribute: Vec<String>,
    pub direction: Direction,
}

pub type OrderList = Vec<OrderRequestEntry>;

/// Per-node options in a client `SelectTree` (spec §3.2). Sub-options
/// (`filter`, `order`, `limit`, `page`) are only legal on sub-resource nodes;
/// `id` is only legal at the request root, which is why it lives on
/// [`crate::request::Request`] rather than here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectOptions {
    #[serde(default)]
    pub select: Option<SelectTree>,
    #[serde(default)]
    pub filter: Option<FilterDnf>,
    #[serde(default)]
    pub order: Option<OrderList>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
}

/// Recursive mapping `{attributeName -> options}` (spec §3.2 `SelectTree`).
pub type SelectTree = IndexMap<String, SelectOptions>;
