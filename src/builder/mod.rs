//! Query building: one bucket to one statement.
//!
//! The builder walks a bucket recursively. Each level resolves its nested
//! buckets through the schema: many-to-one relations become LEFT JOINs and
//! are walked in turn, one-to-many and many-to-many relations are skipped
//! here and fetched later by the read executor.
//!
//! The statement kind follows from what the walk collected:
//!
//! | columns | rows | filter | statement            |
//! |---------|------|--------|----------------------|
//! | yes     | -    | -      | SELECT               |
//! | no      | yes  | no     | INSERT (all rows)    |
//! | no      | 1    | yes    | UPDATE               |
//! | no      | no   | yes    | DELETE               |
//! | no      | no   | no     | error                |

mod plan;

pub use plan::SelectParts;
use plan::Fragment;

use serde_json::Value;
use tracing::{debug, warn};

use crate::compiler::{ClauseSet, FilterCompiler, OrderCompiler};
use crate::error::{Error, Result};
use crate::extension::Extensions;
use crate::notation::{Bucket, Element, Item, Slice};
use crate::schema::{Link, Schema};
use crate::space::{Address, Space};
use crate::sql::dml::{Delete, Insert, Update};
use crate::sql::expr::{count_star, lit_json, ExprExt};
use crate::sql::query::{Join, JoinType, Query};
use crate::sql::statement::Statement;

/// Default name of the synthetic row-count column.
pub const TOTAL_FIELD: &str = "total";

#[derive(Clone, Copy)]
pub struct QueryBuilder<'a> {
    schema: &'a Schema,
    extensions: Option<&'a Extensions>,
    total_field: &'a str,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            extensions: None,
            total_field: TOTAL_FIELD,
        }
    }

    pub fn with_extensions(mut self, extensions: &'a Extensions) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn with_total_field(mut self, field: &'a str) -> Self {
        self.total_field = field;
        self
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn total_field(&self) -> &'a str {
        self.total_field
    }

    /// Namespace of a top-level bucket. Write buckets address their table
    /// by its bare name so UPDATE and DELETE can qualify columns with it.
    pub fn root_space(bucket: &Bucket) -> Space {
        if bucket.is_projection() {
            Space::root(bucket.unit())
        } else {
            Space::root(bucket.unit().bare())
        }
    }

    /// Build the single statement for `bucket`.
    pub fn build(&self, bucket: &Bucket) -> Result<Statement> {
        let space = Self::root_space(bucket);
        let fragment = self.walk(bucket, &space)?;

        if !fragment.columns.is_empty() || fragment.total {
            return Ok(Statement::Select(self.select(bucket, &space, fragment)?));
        }

        let filter = fragment.filter();
        match (fragment.rows.len(), fragment.has_filter, filter) {
            (0, false, _) => Err(Error::ambiguous(
                &bucket.name,
                "bucket has no columns, rows or filter",
            )),
            (_, true, None) => Err(Error::ambiguous(
                &bucket.name,
                "filter compiles to nothing; refusing to touch every row",
            )),
            (0, true, Some(filter)) => {
                let table = self.schema.table(&space)?;
                let mut delete = Delete::from(&table.table).filter(filter);
                if let Some(schema) = &table.schema {
                    delete = delete.schema(schema);
                }
                Ok(Statement::Delete(delete))
            }
            (_, false, _) => Ok(Statement::Insert(self.insert(&space, &fragment.rows)?)),
            (1, true, Some(filter)) => {
                let table = self.schema.table(&space)?;
                let mut update = Update::table(&table.table).filter(filter);
                if let Some(schema) = &table.schema {
                    update = update.schema(schema);
                }
                for (column, value) in &fragment.rows[0] {
                    self.schema
                        .column(&Address::new(column.clone(), space.clone()))?;
                    update = update.set(column, lit_json(value));
                }
                Ok(Statement::Update(update))
            }
            (n, true, Some(_)) => Err(Error::ambiguous(
                &bucket.name,
                format!("{} rows share one update filter", n),
            )),
        }
    }

    /// SELECT parts for a projection bucket, after read extensions ran.
    pub fn select_parts(&self, bucket: &Bucket) -> Result<SelectParts> {
        let space = Self::root_space(bucket);
        let fragment = self.walk(bucket, &space)?;
        self.parts(&space, fragment)
    }

    fn select(
        &self,
        bucket: &Bucket,
        space: &Space,
        fragment: Fragment,
    ) -> Result<Query> {
        if !fragment.rows.is_empty() {
            return Err(Error::ambiguous(
                &bucket.name,
                "row data mixed with selected columns",
            ));
        }
        Ok(self.parts(space, fragment)?.into_query())
    }

    fn parts(&self, space: &Space, fragment: Fragment) -> Result<SelectParts> {
        let filter = fragment.filter();
        let mut columns = fragment.columns;
        if fragment.total {
            columns.push(count_star().over().alias(self.total_field));
        }

        let mut parts = SelectParts {
            table: self.schema.table(space)?,
            columns,
            joins: fragment.joins.into_iter().map(|(_, join)| join).collect(),
            filter,
            order: fragment.order,
            limit: fragment.limit,
            offset: fragment.offset,
        };

        for beacon in &fragment.beacons {
            match self.extensions.and_then(|e| e.read(beacon.key())) {
                Some(extension) => parts = extension.rewrite(beacon, parts)?,
                None => debug!(key = beacon.key(), "no read extension for beacon"),
            }
        }
        Ok(parts)
    }

    fn insert(&self, space: &Space, rows: &[serde_json::Map<String, Value>]) -> Result<Insert> {
        // Union of keys in first-seen order; absent values are NULL.
        let mut columns: Vec<&String> = Vec::new();
        for row in rows {
            for column in row.keys() {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }
        for column in &columns {
            self.schema
                .column(&Address::new((*column).clone(), space.clone()))?;
        }

        let table = self.schema.table(space)?;
        let mut insert = Insert::into(&table.table).columns(columns.iter().map(|c| c.as_str()));
        if let Some(schema) = &table.schema {
            insert = insert.schema(schema);
        }
        let values = rows.iter().map(|row| {
            columns
                .iter()
                .map(|c| lit_json(row.get(*c).unwrap_or(&Value::Null)))
                .collect::<Vec<_>>()
        });
        Ok(insert.values_many(values))
    }

    /// Walk one level. `space` is this bucket's namespace.
    fn walk(&self, bucket: &Bucket, space: &Space) -> Result<Fragment> {
        let mut fragment = Fragment::default();
        let mut clauses = ClauseSet::default();
        let nested = space.len() > 1;

        for element in &bucket.elements {
            match element {
                Element::Item(Item::Column(name)) => {
                    let column = self
                        .schema
                        .column(&Address::new(name.clone(), space.clone()))?;
                    fragment.columns.push(column.select());
                }
                Element::Item(Item::Row(row)) => {
                    if nested {
                        return Err(Error::ambiguous(
                            &bucket.name,
                            "row data in a nested bucket",
                        ));
                    }
                    fragment.rows.push(row.clone());
                }
                Element::Bucket(child) => {
                    let child_space = space.child(child.unit());
                    let link = self.schema.link(space, &child_space)?;
                    match &link {
                        Link::ManyToOne { source, target } => {
                            let on = self
                                .schema
                                .column(source)?
                                .expr()
                                .eq(self.schema.column(target)?.expr());
                            let join = Join {
                                join_type: JoinType::Left,
                                table: self.schema.table(&child_space)?,
                                on,
                            };
                            fragment.add_join(link.identity(), join);
                            let child_fragment = self.walk(child, &child_space)?;
                            fragment.absorb(child_fragment);
                        }
                        _ => debug!(link = %link, "deferring nested bucket"),
                    }
                }
                Element::Clause(expression) => clauses.push(expression.clone())?,
                Element::Slice(Slice::Limit(n)) => fragment.limit = (*n > 0).then_some(*n),
                Element::Slice(Slice::Offset(n)) => fragment.offset = (*n > 0).then_some(*n),
                Element::Total => {
                    if nested {
                        warn!(bucket = %bucket.name, "total is only honoured on the root bucket");
                    } else {
                        fragment.total = true;
                    }
                }
                Element::Beacon(beacon) => fragment.beacons.push(beacon.clone()),
            }
        }

        fragment.has_filter |= clauses.has_filter();
        if let Some(filter) = FilterCompiler::new(self.schema, space).compile(&clauses.filter)? {
            fragment.filters.push(filter);
        }
        fragment
            .order
            .extend(OrderCompiler::new(self.schema, space).compile(&clauses.order)?);

        Ok(fragment)
    }
}
