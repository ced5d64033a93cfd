//! Flat rows to nested records.
//!
//! ```text
//!   {"title": "Dune", "author__name": "Herbert"}
//!     => {"title": "Dune", "author": {"name": "Herbert"}}
//! ```

use serde_json::{Map, Value};

use crate::space::SEPARATOR;

/// Splits qualified column aliases into nested objects and, optionally,
/// collapses nested objects whose every value is null.
#[derive(Debug, Clone, Copy)]
pub struct Squeezer {
    collapse_none: bool,
}

impl Default for Squeezer {
    fn default() -> Self {
        Self {
            collapse_none: true,
        }
    }
}

impl Squeezer {
    pub fn new(collapse_none: bool) -> Self {
        Self { collapse_none }
    }

    /// Unflatten one flat row.
    pub fn unflatten(&self, row: Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in row {
            insert_path(&mut out, &key, value);
        }
        out
    }

    /// Replace nested objects whose values are all null by null. The record
    /// itself is never replaced.
    pub fn collapse(&self, record: Map<String, Value>) -> Map<String, Value> {
        if !self.collapse_none {
            return record;
        }
        record
            .into_iter()
            .map(|(key, value)| (key, collapse_value(value)))
            .collect()
    }

    pub fn squeeze(&self, row: Map<String, Value>) -> Map<String, Value> {
        self.collapse(self.unflatten(row))
    }
}

fn insert_path(out: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once(SEPARATOR) {
        Some((head, rest)) => {
            let slot = out
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                insert_path(inner, rest, value);
            }
        }
        None => {
            out.insert(key.to_string(), value);
        }
    }
}

fn collapse_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, collapse_value(v)))
                .collect();
            if map.values().all(Value::is_null) {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(
                        map.into_iter()
                            .map(|(k, v)| (k, collapse_value(v)))
                            .collect(),
                    ),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}
