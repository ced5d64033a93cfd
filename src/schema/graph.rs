//! Foreign-key graph: tables as nodes, foreign keys as edges.
//!
//! Edges point from the owning table to the referenced table. Node and edge
//! order follow declaration order, which makes "first match" lookups stable.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::error::SchemaError;
use crate::space::TrackUnit;

/// `table.column -> target_table.target_column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub target_table: String,
    pub target_column: String,
}

impl ForeignKey {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
        }
    }

    /// Whether this key leads to `unit`: same table, and when the unit has a
    /// qualifier `q`, the owning column is `{q}_id`.
    pub fn matches(&self, unit: &TrackUnit) -> bool {
        self.target_table == unit.name
            && unit
                .qualifier
                .as_ref()
                .map_or(true, |q| self.column == format!("{}_id", q))
    }
}

impl std::fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.table, self.column, self.target_table, self.target_column
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForeignKeyGraph {
    graph: DiGraph<String, ForeignKey>,
    index: HashMap<String, NodeIndex>,
}

impl ForeignKeyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table node. Adding an existing table is a no-op.
    pub fn add_table(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Add a foreign key edge. Both tables must already be present.
    /// Duplicate keys are ignored.
    pub fn add_foreign_key(&mut self, fk: ForeignKey) -> Result<(), SchemaError> {
        let source = *self
            .index
            .get(&fk.table)
            .ok_or_else(|| SchemaError::UnknownTable(fk.table.clone()))?;
        let target =
            *self
                .index
                .get(&fk.target_table)
                .ok_or_else(|| SchemaError::DanglingForeignKey {
                    table: fk.table.clone(),
                    column: fk.column.clone(),
                    target: fk.target_table.clone(),
                })?;
        if self.outgoing(&fk.table).contains(&&fk) {
            return Ok(());
        }
        self.graph.add_edge(source, target, fk);
        Ok(())
    }

    pub fn contains(&self, table: &str) -> bool {
        self.index.contains_key(table)
    }

    /// Table names in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|i| self.graph[i].as_str())
    }

    /// Foreign keys owned by `table`, in declaration order.
    pub fn outgoing(&self, table: &str) -> Vec<&ForeignKey> {
        let Some(&node) = self.index.get(table) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges(node).collect();
        edges.sort_by_key(|e| e.id().index());
        edges.into_iter().map(|e| e.weight()).collect()
    }

    /// Every foreign key, in declaration order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.graph.edge_weights()
    }
}
