// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Preprocessing step of the Result Builder (spec §4.3 "Preprocess"): turns
//! the flat [`RawResult`] list into `indexedData`, keyed by `(attributePath,
//! dataSourceName)` then by the joined `childKey` tuple.

use std::collections::HashMap;

use crate::error::ErrorKind;
use crate::executor::{RawResult, Row};
use crate::key::join_key;
use crate::Result;

/// One indexed slot: either the single row a unique child key maps to, or the
/// ordered list a `many` 1:n relation's child key maps to.
#[derive(Debug, Clone)]
pub enum IndexedEntry {
    One(Row),
    Many(Vec<Row>),
}

/// `indexedData`: every raw result that carries a `childKey`, indexed by its
/// joined key tuple. Results without a `childKey` (the root, and any other
/// node with no join back to a parent) aren't indexed — callers read their
/// rows directly off the matching [`RawResult`].
#[derive(Debug, Default)]
pub struct IndexedResults {
    by_path_ds: HashMap<(Vec<String>, String), HashMap<String, IndexedEntry>>,
}

impl IndexedResults {
    pub fn build(raw_results: &[RawResult]) -> Result<Self> {
        let mut by_path_ds = HashMap::new();
        for result in raw_results {
            let Some(child_key_cols) = &result.child_key else {
                continue;
            };
            let mut index: HashMap<String, IndexedEntry> = HashMap::new();
            for row in &result.data {
                let mut values = Vec::with_capacity(child_key_cols.len());
                for col in child_key_cols {
                    match row.get(col) {
                        Some(value) => values.push(value.clone()),
                        None => {
                            return Err(ErrorKind::MissingKeyColumn.with_message(format!(
                                "row from datasource '{}' at {:?} is missing childKey column '{col}'",
                                result.data_source_name, result.attribute_path
                            )))
                        }
                    }
                }
                let key = join_key(&values);
                if result.many {
                    match index.entry(key).or_insert_with(|| IndexedEntry::Many(Vec::new())) {
                        IndexedEntry::Many(list) => list.push(row.clone()),
                        IndexedEntry::One(_) => unreachable!("many result never mixes with a unique entry"),
                    }
                } else {
                    // Duplicates silently overwrite (spec §4.3, documented behavior).
                    index.insert(key, IndexedEntry::One(row.clone()));
                }
            }
            by_path_ds.insert((result.attribute_path.clone(), result.data_source_name.clone()), index);
        }
        Ok(Self { by_path_ds })
    }

    pub fn lookup(&self, path: &[String], data_source: &str, key: &str) -> Option<&IndexedEntry> {
        self.by_path_ds.get(&(path.to_vec(), data_source.to_string()))?.get(key)
    }
}
