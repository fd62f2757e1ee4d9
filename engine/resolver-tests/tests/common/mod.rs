// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Shared fixtures for the end-to-end pipeline tests: a config-builder
//! helper and an in-memory fake adapter good enough to honor the `in`/`eq`
//! filters the resolver actually emits for key joins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conflux_engine::config::{AttrNode, ResourceMap};
use conflux_engine::executor::{DataSourceAdapter, ExecutionContext, RawPayload, Row};
use conflux_engine::key::value_to_key_part;
use conflux_engine::resolver::{AdapterRequest, FilterValueSource, PhysicalFilterEntry};
use conflux_engine::Result;
use serde_json::Value as JsonValue;

/// Parses `json` as one resource's [`AttrNode`] tree and registers it under
/// `name` in a fresh [`ResourceMap`].
pub fn resources(name: &str, json: JsonValue) -> ResourceMap {
    let node: AttrNode = serde_json::from_value(json).expect("valid resource config fixture");
    let mut map = ResourceMap::new();
    map.insert(name.to_string(), Arc::new(node));
    map
}

/// One pre-loaded table the [`FakeAdapter`] serves rows from.
pub struct FakeAdapter {
    tables: HashMap<String, Vec<Row>>,
}

impl FakeAdapter {
    pub fn new(tables: HashMap<&str, Vec<JsonValue>>) -> Self {
        let tables = tables
            .into_iter()
            .map(|(table, rows)| {
                let rows = rows
                    .into_iter()
                    .map(|v| v.as_object().cloned().expect("row fixture must be a JSON object"))
                    .collect();
                (table.to_string(), rows)
            })
            .collect();
        Self { tables }
    }
}

#[async_trait]
impl DataSourceAdapter for FakeAdapter {
    async fn prepare(&self, _request: &AdapterRequest) -> Result<()> {
        Ok(())
    }

    async fn process(&self, request: &AdapterRequest, _ctx: &ExecutionContext) -> Result<RawPayload> {
        let table = request.native.get("table").and_then(JsonValue::as_str).unwrap_or_default();
        let mut rows: Vec<Row> = self
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|row| matches_filter(row, request.filter.as_ref()))
            .collect();
        if let Some(limit) = request.limit {
            rows.truncate(limit as usize);
        }
        Ok(RawPayload { data: rows, total_count: None })
    }
}

fn matches_filter(row: &Row, filter: Option<&conflux_engine::resolver::PhysicalFilterDnf>) -> bool {
    let Some(dnf) = filter else { return true };
    dnf.iter().any(|group| group.iter().all(|entry| matches_entry(row, entry)))
}

fn matches_entry(row: &Row, entry: &PhysicalFilterEntry) -> bool {
    let FilterValueSource::Literal(literal) = &entry.value else {
        // Unresolved placeholder; the executor always substitutes these
        // before calling `process`, so treat it as "don't filter" here.
        return true;
    };
    let row_value = match row.get(&entry.column) {
        Some(v) => value_to_key_part(v),
        None => return false,
    };
    match entry.operator.as_str() {
        // A client `equal`/`eq` filter carrying a list value (spec §8
        // scenario 3's `operator: "equal", value: [11,12,13]`) is matched
        // the same way a real SQL adapter would turn it into an `IN`
        // clause: the core doesn't normalize the operator string itself.
        "in" | "eq" | "equal" => match literal {
            JsonValue::Array(items) => items.iter().any(|item| value_to_key_part(item) == row_value),
            other => value_to_key_part(other) == row_value,
        },
        _ => true,
    }
}
