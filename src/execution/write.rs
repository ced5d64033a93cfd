//! Write path: classify buckets into INSERT, UPDATE or DELETE and run them.

use std::sync::Arc;

use tracing::{instrument, warn};

use super::driver::{transaction, Connection};
use crate::builder::QueryBuilder;
use crate::error::{Error, Result};
use crate::extension::Extensions;
use crate::notation::{Bucket, Category, Element, Expression, Item, Row};
use crate::schema::Schema;
use crate::sql::statement::Statement;

/// Runs write statements on one connection. Extensions receive it to issue
/// their own statements.
pub struct WriteExecutor<'a> {
    conn: &'a dyn Connection,
    builder: QueryBuilder<'a>,
}

impl<'a> WriteExecutor<'a> {
    pub fn new(conn: &'a dyn Connection, schema: &'a Schema) -> Self {
        Self {
            conn,
            builder: QueryBuilder::new(schema),
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.builder.schema()
    }

    /// Run a statement and return the affected row count.
    pub async fn execute(&self, statement: &Statement) -> Result<u64> {
        Ok(super::run(self.conn, statement).await?.affected())
    }

    /// Delete rows of `table` matching `expression`.
    pub async fn delete(&self, table: &str, expression: &Expression) -> Result<u64> {
        let bucket = Bucket::new(table).clause(expression.clone());
        self.execute(&self.builder.build(&bucket)?).await
    }

    pub async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<u64> {
        let bucket = Bucket::new(table).rows(rows);
        self.execute(&self.builder.build(&bucket)?).await
    }

    pub async fn update(&self, table: &str, row: Row, expression: &Expression) -> Result<u64> {
        let bucket = Bucket::new(table).row(row).clause(expression.clone());
        self.execute(&self.builder.build(&bucket)?).await
    }

    /// Classify and run one bucket. Several rows with a filter become one
    /// UPDATE per row, all sharing the filter.
    #[instrument(skip_all, fields(bucket = %bucket.name))]
    pub async fn write(&self, bucket: &Bucket) -> Result<u64> {
        let rows: Vec<&Row> = bucket.rows_iter().collect();
        if rows.len() > 1 && has_filter(bucket) {
            let mut affected = 0;
            for row in rows {
                let single = Bucket {
                    elements: bucket
                        .elements
                        .iter()
                        .filter(|e| !matches!(e, Element::Item(Item::Row(_))))
                        .cloned()
                        .collect(),
                    ..bucket.clone()
                }
                .row(row.clone());
                affected += self.execute(&self.builder.build(&single)?).await?;
            }
            return Ok(affected);
        }

        let statement = self.builder.build(bucket)?;
        if statement.returns_rows() {
            return Err(Error::ambiguous(
                &bucket.name,
                "write request selects columns",
            ));
        }
        self.execute(&statement).await
    }
}

fn has_filter(bucket: &Bucket) -> bool {
    bucket.elements.iter().any(|e| match e {
        Element::Clause(expression) => expression.category() == Some(Category::Filter),
        _ => false,
    })
}

/// Writes whole invoices. Buckets run in declaration order inside one
/// transaction, so a later bucket can rely on rows an earlier one wrote.
pub struct WriteClient {
    schema: Arc<Schema>,
    conn: Arc<dyn Connection>,
    extensions: Arc<Extensions>,
}

impl WriteClient {
    pub fn new(schema: Arc<Schema>, conn: Arc<dyn Connection>) -> Self {
        Self {
            schema,
            conn,
            extensions: Arc::new(Extensions::default()),
        }
    }

    pub fn with_extensions(mut self, extensions: Arc<Extensions>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Apply every bucket; returns the total affected row count.
    #[instrument(skip_all, fields(buckets = invoice.len()))]
    pub async fn write(&self, invoice: &[Bucket]) -> Result<u64> {
        let executor = WriteExecutor::new(self.conn.as_ref(), &self.schema);
        transaction(self.conn.as_ref(), async {
            let mut affected = 0;
            for bucket in invoice {
                let bucket = self.apply_extensions(bucket, &executor).await?;
                affected += executor.write(&bucket).await?;
            }
            Ok(affected)
        })
        .await
    }

    async fn apply_extensions(&self, bucket: &Bucket, executor: &WriteExecutor<'_>) -> Result<Bucket> {
        let beacons: Vec<_> = bucket.beacons().cloned().collect();
        let mut current = Bucket {
            elements: bucket
                .elements
                .iter()
                .filter(|e| !matches!(e, Element::Beacon(_)))
                .cloned()
                .collect(),
            ..bucket.clone()
        };
        for beacon in &beacons {
            match self.extensions.write(beacon.key()) {
                Some(extension) => current = extension.apply(beacon, current, executor).await?,
                None => warn!(key = beacon.key(), bucket = %bucket.name, "no write extension for beacon"),
            }
        }
        Ok(current)
    }
}
