//! Table catalogue and relationship resolution.
//!
//! A [`Schema`] answers three questions for the query builder:
//!
//! - which table (and alias) a [`Space`] denotes,
//! - which column (and output alias) an [`Address`] denotes,
//! - how two spaces are related ([`Link`]).
//!
//! Relationship resolution tries many-to-one, then one-to-many, then
//! many-to-many, and returns the first match in declaration order. All three
//! lookups are memoized; the schema is immutable after construction and safe
//! to share across tasks.

mod error;
mod graph;
pub mod introspect;
mod link;

pub use error::SchemaError;
pub use graph::{ForeignKey, ForeignKeyGraph};
pub use link::{Link, LinkKind};

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::space::{Address, Space, TrackUnit};
use crate::sql::expr::{table_col, Expr, ExprExt};
use crate::sql::query::{SelectExpr, TableRef};

// =============================================================================
// Catalogue definitions
// =============================================================================

/// Foreign key declared on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

/// A table as known to the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    pub fn columns(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key.push(column.into());
        self
    }

    pub fn foreign_key(
        mut self,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyDef {
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        });
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Add key columns that were declared but not listed as columns.
    fn normalize(mut self) -> Self {
        let implied: Vec<String> = self
            .primary_key
            .iter()
            .chain(self.foreign_keys.iter().map(|fk| &fk.column))
            .filter(|c| !self.has_column(c))
            .cloned()
            .collect();
        for column in implied {
            if !self.has_column(&column) {
                self.columns.push(column);
            }
        }
        self
    }
}

// =============================================================================
// Resolved handles
// =============================================================================

/// A column bound to the table handle of its space.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumn {
    pub table: TableRef,
    pub name: String,
    /// Output alias: the address display form relative to the root.
    pub alias: String,
}

impl ResolvedColumn {
    /// Qualified column reference.
    pub fn expr(&self) -> Expr {
        table_col(self.table.reference(), &self.name)
    }

    /// SELECT list entry carrying the output alias.
    pub fn select(&self) -> SelectExpr {
        self.expr().alias(&self.alias)
    }
}

// =============================================================================
// Builder
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    tables: Vec<TableDef>,
    custom: Vec<ForeignKey>,
    junctions: Vec<(String, String, String)>,
}

impl SchemaBuilder {
    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn tables(mut self, tables: impl IntoIterator<Item = TableDef>) -> Self {
        self.tables.extend(tables);
        self
    }

    /// Extra foreign key not declared by the tables themselves.
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.custom.push(fk);
        self
    }

    /// Name the junction table used between `a` and `b` (either direction).
    pub fn junction(
        mut self,
        a: impl Into<String>,
        b: impl Into<String>,
        interim: impl Into<String>,
    ) -> Self {
        self.junctions.push((a.into(), b.into(), interim.into()));
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut graph = ForeignKeyGraph::new();
        let mut tables = HashMap::new();

        let defs: Vec<TableDef> = self.tables.into_iter().map(TableDef::normalize).collect();
        for def in &defs {
            graph.add_table(&def.name);
        }
        for def in &defs {
            for fk in &def.foreign_keys {
                graph.add_foreign_key(ForeignKey::new(
                    &def.name,
                    &fk.column,
                    &fk.references_table,
                    &fk.references_column,
                ))?;
            }
        }
        for def in defs {
            tables.insert(def.name.clone(), def);
        }
        for fk in self.custom {
            let owner = tables
                .get_mut(&fk.table)
                .ok_or_else(|| SchemaError::UnknownTable(fk.table.clone()))?;
            if !owner.has_column(&fk.column) {
                owner.columns.push(fk.column.clone());
            }
            graph.add_foreign_key(fk)?;
        }
        // Referenced key columns are selectable even when not listed.
        for fk in graph.foreign_keys() {
            if let Some(target) = tables.get_mut(&fk.target_table) {
                if !target.has_column(&fk.target_column) {
                    target.columns.push(fk.target_column.clone());
                }
            }
        }

        let mut junctions = HashMap::new();
        for (a, b, interim) in self.junctions {
            if !graph.contains(&interim) {
                return Err(SchemaError::UnknownTable(interim));
            }
            junctions.insert((a.clone(), b.clone()), interim.clone());
            junctions.insert((b, a), interim);
        }

        Ok(Schema {
            tables,
            graph,
            junctions,
            table_cache: DashMap::new(),
            column_cache: DashMap::new(),
            link_cache: DashMap::new(),
        })
    }
}

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug)]
pub struct Schema {
    tables: HashMap<String, TableDef>,
    graph: ForeignKeyGraph,
    junctions: HashMap<(String, String), String>,
    table_cache: DashMap<String, TableRef>,
    column_cache: DashMap<String, ResolvedColumn>,
    link_cache: DashMap<(String, String), Link>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn table_def(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Table definitions in declaration order.
    pub fn table_defs(&self) -> impl Iterator<Item = &TableDef> {
        self.graph.tables().filter_map(|t| self.tables.get(t))
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.graph.foreign_keys()
    }

    // -------------------------------------------------------------------------
    // Tables
    // -------------------------------------------------------------------------

    /// Table handle for the innermost unit of `space`.
    ///
    /// Units with a qualifier or label get an alias equal to the space's
    /// display form, so the same table can appear several times in one query.
    pub fn get_table(&self, space: &Space) -> Option<TableRef> {
        let key = space.qualified_name();
        if let Some(hit) = self.table_cache.get(&key) {
            trace!(space = %space, "table cache hit");
            return Some(hit.clone());
        }

        let unit = space.last_unit()?;
        let def = self.tables.get(&unit.name)?;
        let mut table = TableRef::new(&def.name);
        if let Some(schema) = &def.schema {
            table = table.with_schema(schema);
        }
        if unit.is_aliased() {
            table = table.with_alias(&space.to_string());
        }

        self.table_cache.insert(key, table.clone());
        Some(table)
    }

    pub fn table(&self, space: &Space) -> Result<TableRef, SchemaError> {
        self.get_table(space)
            .ok_or_else(|| SchemaError::UnknownTable(space.last().to_string()))
    }

    // -------------------------------------------------------------------------
    // Columns
    // -------------------------------------------------------------------------

    pub fn get_column(&self, address: &Address) -> Option<ResolvedColumn> {
        let key = address.qualified_name();
        if let Some(hit) = self.column_cache.get(&key) {
            trace!(address = %address, "column cache hit");
            return Some(hit.clone());
        }

        let def = self.tables.get(address.space.last())?;
        if !def.has_column(&address.name) {
            return None;
        }
        let resolved = ResolvedColumn {
            table: self.get_table(&address.space)?,
            name: address.name.clone(),
            alias: address.alias(),
        };

        self.column_cache.insert(key, resolved.clone());
        Some(resolved)
    }

    pub fn column(&self, address: &Address) -> Result<ResolvedColumn, SchemaError> {
        self.get_column(address).ok_or_else(|| {
            let table = address.space.last().to_string();
            if self.tables.contains_key(&table) {
                SchemaError::UnknownColumn {
                    table,
                    column: address.name.clone(),
                }
            } else {
                SchemaError::UnknownTable(table)
            }
        })
    }

    // -------------------------------------------------------------------------
    // Links
    // -------------------------------------------------------------------------

    /// Relationship from `source` to `target`, trying many-to-one, then
    /// one-to-many, then many-to-many.
    pub fn get_link(&self, source: &Space, target: &Space) -> Result<Option<Link>, SchemaError> {
        let key = (source.qualified_name(), target.qualified_name());
        if let Some(hit) = self.link_cache.get(&key) {
            trace!(source = %source, target = %target, "link cache hit");
            return Ok(Some(hit.clone()));
        }

        let (Some(source_unit), Some(target_unit)) = (source.last_unit(), target.last_unit())
        else {
            return Ok(None);
        };

        let link = match self.many_to_one(source, target, target_unit) {
            Some(link) => Some(link),
            None => match self.one_to_many(source, target, source_unit, target_unit) {
                Some(link) => Some(link),
                None => self.many_to_many(source, target, source_unit, target_unit)?,
            },
        };

        if let Some(link) = &link {
            self.link_cache.insert(key, link.clone());
        }
        Ok(link)
    }

    pub fn link(&self, source: &Space, target: &Space) -> Result<Link, SchemaError> {
        self.get_link(source, target)?
            .ok_or_else(|| SchemaError::NoLink {
                from: source.to_string(),
                to: target.to_string(),
            })
    }

    fn many_to_one(&self, source: &Space, target: &Space, target_unit: &TrackUnit) -> Option<Link> {
        self.graph
            .outgoing(source.last())
            .into_iter()
            .find(|fk| fk.matches(target_unit))
            .map(|fk| Link::ManyToOne {
                source: Address::new(fk.column.clone(), source.clone()),
                target: Address::new(fk.target_column.clone(), target.clone()),
            })
    }

    fn one_to_many(
        &self,
        source: &Space,
        target: &Space,
        source_unit: &TrackUnit,
        target_unit: &TrackUnit,
    ) -> Option<Link> {
        let parent = TrackUnit {
            name: source_unit.name.clone(),
            qualifier: target_unit.qualifier.clone(),
            label: None,
        };
        self.graph
            .outgoing(&target_unit.name)
            .into_iter()
            .find(|fk| fk.matches(&parent))
            .map(|fk| Link::OneToMany {
                source: Address::new(fk.target_column.clone(), source.clone()),
                target: Address::new(fk.column.clone(), target.clone()),
            })
    }

    fn many_to_many(
        &self,
        source: &Space,
        target: &Space,
        source_unit: &TrackUnit,
        target_unit: &TrackUnit,
    ) -> Result<Option<Link>, SchemaError> {
        let pair = (source_unit.name.clone(), target_unit.name.clone());

        if let Some(interim) = self.junctions.get(&pair) {
            return match self.junction_keys(interim, source_unit, target_unit) {
                Some((to_source, to_target)) => {
                    Ok(Some(m2m_link(source, target, interim, to_source, to_target)))
                }
                None => Err(SchemaError::InvalidJunction {
                    from: pair.0,
                    to: pair.1,
                    interim: interim.clone(),
                }),
            };
        }

        let mut candidates = Vec::new();
        for table in self.graph.tables() {
            if table == source_unit.name || table == target_unit.name {
                continue;
            }
            if let Some(keys) = self.junction_keys(table, source_unit, target_unit) {
                candidates.push((table, keys));
            }
        }

        match candidates.len() {
            0 => Ok(None),
            1 => {
                let (interim, (to_source, to_target)) = candidates.remove(0);
                Ok(Some(m2m_link(source, target, interim, to_source, to_target)))
            }
            _ => Err(SchemaError::AmbiguousJunction {
                from: pair.0,
                to: pair.1,
                candidates: candidates.iter().map(|(t, _)| t.to_string()).collect(),
            }),
        }
    }

    /// Keys of `interim` leading to the source table and to the target unit.
    /// The target key honours the target's qualifier; the source key is the
    /// first other key into the source table.
    fn junction_keys<'a>(
        &'a self,
        interim: &str,
        source_unit: &TrackUnit,
        target_unit: &TrackUnit,
    ) -> Option<(&'a ForeignKey, &'a ForeignKey)> {
        let keys = self.graph.outgoing(interim);
        let to_target = keys.iter().find(|fk| fk.matches(target_unit))?;
        let source_table = TrackUnit::new(source_unit.name.clone());
        let to_source = keys
            .iter()
            .find(|fk| fk.matches(&source_table) && fk.column != to_target.column)?;
        Some((*to_source, *to_target))
    }
}

fn m2m_link(
    source: &Space,
    target: &Space,
    interim: &str,
    to_source: &ForeignKey,
    to_target: &ForeignKey,
) -> Link {
    let interim_space = Space::root(TrackUnit::new(interim));
    Link::ManyToMany {
        source: Address::new(to_source.target_column.clone(), source.clone()),
        interim_source: Address::new(to_source.column.clone(), interim_space.clone()),
        interim_target: Address::new(to_target.column.clone(), interim_space),
        target: Address::new(to_target.target_column.clone(), target.clone()),
    }
}
