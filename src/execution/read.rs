//! Read path: run a bucket's statement, fetch deferred children, assemble
//! nested records.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::driver::{transaction, Connection};
use super::squeeze::Squeezer;
use crate::builder::QueryBuilder;
use crate::error::{Error, Result};
use crate::extension::Extensions;
use crate::notation::{clause, Bucket, Element, Item, Operator, View};
use crate::schema::{Link, Schema};
use crate::space::Space;
use crate::sql::statement::StatementKind;

type Record = Map<String, Value>;

/// A nested bucket fetched by its own statement after its parent.
#[derive(Debug, Clone)]
struct Deferred {
    /// Output names from the root record down to the parent object.
    path: Vec<String>,
    /// Output name the children are attached under.
    field: String,
    link: Link,
    child: Bucket,
}

/// Columns added only to carry join keys; removed before returning.
#[derive(Debug, Clone, PartialEq)]
struct Injected {
    path: Vec<String>,
    column: String,
}

/// Executes read buckets against one connection.
pub struct ReadExecutor<'a> {
    conn: &'a dyn Connection,
    builder: QueryBuilder<'a>,
    extensions: Option<&'a Extensions>,
    squeezer: Squeezer,
}

impl<'a> ReadExecutor<'a> {
    pub fn new(conn: &'a dyn Connection, schema: &'a Schema) -> Self {
        Self {
            conn,
            builder: QueryBuilder::new(schema),
            extensions: None,
            squeezer: Squeezer::default(),
        }
    }

    pub fn with_extensions(mut self, extensions: &'a Extensions) -> Self {
        self.builder = self.builder.with_extensions(extensions);
        self.extensions = Some(extensions);
        self
    }

    pub fn with_squeezer(mut self, squeezer: Squeezer) -> Self {
        self.squeezer = squeezer;
        self
    }

    pub fn with_total_field(mut self, field: &'a str) -> Self {
        self.builder = self.builder.with_total_field(field);
        self
    }

    /// Read one bucket into a view.
    #[instrument(skip_all, fields(bucket = %bucket.name))]
    pub async fn read(&self, bucket: &Bucket) -> Result<View> {
        let (records, meta) = self.fetch(bucket).await?;
        Ok(View {
            data: records.into_iter().map(Value::Object).collect(),
            meta,
        })
    }

    fn fetch<'b>(&'b self, bucket: &'b Bucket) -> BoxFuture<'b, Result<(Vec<Record>, Option<Record>)>> {
        async move {
            let space = QueryBuilder::root_space(bucket);
            let mut deferred = Vec::new();
            let mut injected = Vec::new();
            let prepared = self.prepare(bucket, &space, &[], &mut deferred, &mut injected)?;

            let statement = self.builder.build(&prepared)?;
            if statement.kind() != StatementKind::Select {
                return Err(Error::ambiguous(
                    &bucket.name,
                    format!("read request compiles to {}", statement.kind()),
                ));
            }
            let mut rows = super::run(self.conn, &statement).await?.into_rows();

            let mut meta = None;
            if prepared.has_total() {
                let field = self.builder.total_field();
                let total = rows
                    .first()
                    .and_then(|row| row.get(field))
                    .cloned()
                    .unwrap_or(Value::from(0));
                for row in &mut rows {
                    row.remove(field);
                }
                meta.get_or_insert_with(Record::new)
                    .insert(field.to_string(), total);
            }

            let mut records: Vec<Record> = rows
                .into_iter()
                .map(|row| self.squeezer.unflatten(row))
                .collect();

            let indexes = try_join_all(deferred.iter().map(|d| self.fetch_deferred(d, &records))).await?;
            for (d, index) in deferred.iter().zip(indexes) {
                let key_column = &d.link.source().name;
                for record in &mut records {
                    let Some(parent) = object_at(record, &d.path) else {
                        continue;
                    };
                    // A null key marks an unmatched left join, not a parent.
                    let Some(key) = parent.get(key_column).and_then(index_key) else {
                        continue;
                    };
                    let children = index.get(&key).cloned().unwrap_or_default();
                    parent.insert(d.field.clone(), Value::Array(children));
                }
            }

            for record in &mut records {
                for key in &injected {
                    if let Some(parent) = object_at(record, &key.path) {
                        parent.remove(&key.column);
                    }
                }
            }

            let mut records: Vec<Record> = records
                .into_iter()
                .map(|record| self.squeezer.collapse(record))
                .collect();

            for beacon in bucket.beacons() {
                if let Some(extension) = self.extensions.and_then(|e| e.read(beacon.key())) {
                    if let Some(extra) = extension.meta(beacon, &mut records)? {
                        meta.get_or_insert_with(Record::new).extend(extra);
                    }
                }
            }

            Ok((records, meta))
        }
        .boxed()
    }

    /// Copy of `bucket` with deferred children removed and the key columns
    /// they need added. Walks into many-to-one children so deferred
    /// relations below a join are found too.
    fn prepare(
        &self,
        bucket: &Bucket,
        space: &Space,
        path: &[String],
        deferred: &mut Vec<Deferred>,
        injected: &mut Vec<Injected>,
    ) -> Result<Bucket> {
        let requested: HashSet<&str> = bucket.requested_columns().collect();
        let mut out = Bucket {
            elements: Vec::with_capacity(bucket.elements.len()),
            ..bucket.clone()
        };

        for element in &bucket.elements {
            let Element::Bucket(child) = element else {
                out.elements.push(element.clone());
                continue;
            };

            let child_space = space.child(child.unit());
            let link = self.builder.schema().link(space, &child_space)?;
            if link.is_deferred() {
                let key = link.source().name.clone();
                let marker = Injected {
                    path: path.to_vec(),
                    column: key.clone(),
                };
                if !requested.contains(key.as_str()) && !injected.contains(&marker) {
                    out.elements.push(Element::Item(Item::Column(key)));
                    injected.push(marker);
                }
                debug!(link = %link, field = child.output_name(), "deferred child");
                deferred.push(Deferred {
                    path: path.to_vec(),
                    field: child.output_name().to_string(),
                    link,
                    child: child.clone(),
                });
            } else {
                let mut child_path = path.to_vec();
                child_path.push(child.output_name().to_string());
                let prepared = self.prepare(child, &child_space, &child_path, deferred, injected)?;
                out.elements.push(Element::Bucket(prepared));
            }
        }
        Ok(out)
    }

    /// Children of one deferred relation, indexed by the parent key they
    /// belong to.
    async fn fetch_deferred(
        &self,
        deferred: &Deferred,
        records: &[Record],
    ) -> Result<HashMap<String, Vec<Value>>> {
        let keys = parent_keys(records, &deferred.path, &deferred.link.source().name);
        let mut index: HashMap<String, Vec<Value>> = HashMap::new();
        if keys.is_empty() {
            debug!(field = %deferred.field, "no parent keys, skipping fetch");
            return Ok(index);
        }

        match &deferred.link {
            Link::OneToMany { target, .. } => {
                let key_column = target.name.as_str();
                let requested = deferred.child.requested_columns().any(|c| c == key_column);

                let mut secondary = Bucket::new(deferred.child.name.clone());
                secondary.elements = deferred
                    .child
                    .elements
                    .iter()
                    .filter(|e| !matches!(e, Element::Total))
                    .cloned()
                    .collect();
                if !requested {
                    secondary = secondary.column(key_column);
                }
                secondary = secondary.clause(clause(key_column, Operator::Set(keys)));

                let (rows, _) = self.fetch(&secondary).await?;
                for mut row in rows {
                    let key = row.get(key_column).and_then(index_key);
                    if !requested {
                        row.remove(key_column);
                    }
                    if let Some(key) = key {
                        index.entry(key).or_default().push(Value::Object(row));
                    }
                }
            }
            Link::ManyToMany {
                interim_source,
                interim_target,
                target: target_key,
                ..
            } => {
                let key_column = interim_source.name.as_str();
                let field = deferred.field.as_str();
                let target_column = target_key.name.as_str();
                let requested = deferred.child.requested_columns().any(|c| c == target_column);

                // Pin the interim -> target join to the key this link found.
                let qualifier = interim_target
                    .name
                    .strip_suffix("_id")
                    .map(str::to_string)
                    .or_else(|| deferred.child.qualifier.clone());
                let (slices, rest): (Vec<Element>, Vec<Element>) = deferred
                    .child
                    .elements
                    .iter()
                    .filter(|e| !matches!(e, Element::Total))
                    .cloned()
                    .partition(|e| matches!(e, Element::Slice(_)));
                let mut target = Bucket::new(deferred.child.name.clone()).label(field);
                target.qualifier = qualifier;
                target.elements = rest;
                if !requested {
                    target = target.column(target_column);
                }

                let mut secondary = Bucket::new(interim_source.space.last())
                    .column(key_column)
                    .clause(clause(key_column, Operator::Set(keys)))
                    .bucket(target);
                secondary.elements.extend(slices);

                let (rows, _) = self.fetch(&secondary).await?;
                for mut row in rows {
                    let key = row.get(key_column).and_then(index_key);
                    let (Some(key), Some(Value::Object(mut child))) = (key, row.remove(field)) else {
                        continue;
                    };
                    // The target exists when its key came back.
                    let exists = child.get(target_column).is_some_and(|v| !v.is_null());
                    if !requested {
                        child.remove(target_column);
                    }
                    if exists {
                        index.entry(key).or_default().push(Value::Object(child));
                    }
                }
            }
            Link::ManyToOne { .. } => {}
        }
        Ok(index)
    }
}

/// Mutable object reached by following `path` from `record`.
fn object_at<'r>(record: &'r mut Record, path: &[String]) -> Option<&'r mut Record> {
    let mut current = record;
    for segment in path {
        current = current.get_mut(segment)?.as_object_mut()?;
    }
    Some(current)
}

/// Distinct non-null values of `column` at `path`, in first-seen order.
fn parent_keys(records: &[Record], path: &[String], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for record in records {
        let mut current = Some(record);
        for segment in path {
            current = current.and_then(|r| r.get(segment)).and_then(Value::as_object);
        }
        let Some(value) = current.and_then(|r| r.get(column)) else {
            continue;
        };
        if let Some(key) = index_key(value) {
            if seen.insert(key) {
                keys.push(value.clone());
            }
        }
    }
    keys
}

/// Join key of a value, in its JSON form so `1` and `"1"` stay distinct.
fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Reads whole invoices. Top-level buckets run concurrently inside one
/// transaction.
pub struct ReadClient {
    schema: Arc<Schema>,
    conn: Arc<dyn Connection>,
    extensions: Arc<Extensions>,
    squeezer: Squeezer,
    total_field: String,
}

impl ReadClient {
    pub fn new(schema: Arc<Schema>, conn: Arc<dyn Connection>) -> Self {
        Self {
            schema,
            conn,
            extensions: Arc::new(Extensions::default()),
            squeezer: Squeezer::default(),
            total_field: crate::builder::TOTAL_FIELD.to_string(),
        }
    }

    pub fn with_extensions(mut self, extensions: Arc<Extensions>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_collapse_none(mut self, collapse_none: bool) -> Self {
        self.squeezer = Squeezer::new(collapse_none);
        self
    }

    pub fn with_total_field(mut self, field: impl Into<String>) -> Self {
        self.total_field = field.into();
        self
    }

    fn executor(&self) -> ReadExecutor<'_> {
        ReadExecutor::new(self.conn.as_ref(), &self.schema)
            .with_extensions(&self.extensions)
            .with_squeezer(self.squeezer)
            .with_total_field(&self.total_field)
    }

    /// One view per top-level bucket, in invoice order.
    #[instrument(skip_all, fields(buckets = invoice.len()))]
    pub async fn read(&self, invoice: &[Bucket]) -> Result<Vec<View>> {
        let executor = self.executor();
        transaction(
            self.conn.as_ref(),
            try_join_all(invoice.iter().map(|bucket| executor.read(bucket))),
        )
        .await
    }

    pub async fn read_one(&self, bucket: &Bucket) -> Result<View> {
        let executor = self.executor();
        transaction(self.conn.as_ref(), executor.read(bucket)).await
    }
}
