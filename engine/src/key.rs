// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Composite-key helpers shared by the resolver (building join specs) and the
//! result builder (indexing raw rows by key).

use serde_json::Value;

/// Separator used to concatenate composite key column values into a single
/// string, e.g. `"articleId-versionId"` for the value tuple `(12, 3)`.
pub const KEY_SEPARATOR: &str = "-";

/// Joins the string representation of each value in `values` with
/// [`KEY_SEPARATOR`], producing the lookup key used by `indexedData` (spec §4.3).
///
/// `Value::Null` renders as the literal text `"null"` so that a key containing a
/// null component is still distinguishable from one that's merely short -
/// callers that care about null-linking check the source values directly,
/// not the joined string.
pub fn join_key(values: &[Value]) -> String {
    values
        .iter()
        .map(value_to_key_part)
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// The non-JSON-quoted string form of one key component (`"hello"` not
/// `"\"hello\""`), shared by [`join_key`] and by the executor's parent-key
/// substitution, which needs the same plain-text rendering to compare
/// adapter-returned values.
pub fn value_to_key_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// True if every value in the tuple is `Value::Null`.
pub fn all_null(values: &[Value]) -> bool {
    values.iter().all(|v| v.is_null())
}
