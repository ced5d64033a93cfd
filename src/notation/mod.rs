//! Request notation: buckets of elements forming an invoice.
//!
//! A [`Bucket`] names a table and lists what to do with it: columns to
//! select, rows to write, nested buckets for related tables, filter and
//! ordering clauses, pagination, a total-count request and extension
//! beacons. An [`Invoice`] is a list of top-level buckets.
//!
//! ```ignore
//! use trellis::notation::{clause, Bucket, Operator};
//!
//! let bucket = Bucket::new("book")
//!     .column("title")
//!     .bucket(Bucket::new("author").column("name"))
//!     .clause(clause("title", Operator::ilike("go")))
//!     .limit(10);
//! ```

mod clause;

pub use clause::{clause, Category, Clause, Expression, Operator, Term};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::space::TrackUnit;

/// A write record: column name to value.
pub type Row = Map<String, Value>;

/// Leaf element of a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    /// Column to select.
    Column(String),
    /// Record to write.
    Row(Row),
}

/// Pagination directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slice {
    Limit(u64),
    Offset(u64),
}

/// Meta-element dispatched to a registered extension by its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Beacon {
    /// Delete rows matching the expression, then write.
    Upsert(Expression),
    Custom { key: String, value: Value },
}

impl Beacon {
    pub fn key(&self) -> &str {
        match self {
            Beacon::Upsert(_) => "upsert",
            Beacon::Custom { key, .. } => key,
        }
    }
}

/// One entry of a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Item(Item),
    Bucket(Bucket),
    Clause(Expression),
    Slice(Slice),
    Total,
    Beacon(Beacon),
}

/// A request against one table and, through nested buckets, its relatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
            label: None,
            elements: Vec::new(),
        }
    }

    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn column(self, name: impl Into<String>) -> Self {
        self.element(Element::Item(Item::Column(name.into())))
    }

    pub fn columns(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.elements.extend(
            names
                .into_iter()
                .map(|n| Element::Item(Item::Column(n.into()))),
        );
        self
    }

    pub fn row(self, row: Row) -> Self {
        self.element(Element::Item(Item::Row(row)))
    }

    pub fn rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.elements
            .extend(rows.into_iter().map(|r| Element::Item(Item::Row(r))));
        self
    }

    pub fn bucket(self, child: Bucket) -> Self {
        self.element(Element::Bucket(child))
    }

    /// Filter or ordering expression, depending on its operators.
    pub fn clause(self, expression: Expression) -> Self {
        self.element(Element::Clause(expression))
    }

    pub fn limit(self, limit: u64) -> Self {
        self.element(Element::Slice(Slice::Limit(limit)))
    }

    pub fn offset(self, offset: u64) -> Self {
        self.element(Element::Slice(Slice::Offset(offset)))
    }

    pub fn total(self) -> Self {
        self.element(Element::Total)
    }

    pub fn beacon(self, beacon: Beacon) -> Self {
        self.element(Element::Beacon(beacon))
    }

    pub fn upsert(self, expression: Expression) -> Self {
        self.beacon(Beacon::Upsert(expression))
    }

    /// The namespace unit this bucket contributes.
    pub fn unit(&self) -> TrackUnit {
        TrackUnit {
            name: self.name.clone(),
            qualifier: self.qualifier.clone(),
            label: self.label.clone(),
        }
    }

    /// Field name of this bucket's data in its parent's output.
    pub fn output_name(&self) -> &str {
        self.label
            .as_deref()
            .or(self.qualifier.as_deref())
            .unwrap_or(&self.name)
    }

    pub fn requested_columns(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|e| match e {
            Element::Item(Item::Column(c)) => Some(c.as_str()),
            _ => None,
        })
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = &Row> {
        self.elements.iter().filter_map(|e| match e {
            Element::Item(Item::Row(r)) => Some(r),
            _ => None,
        })
    }

    pub fn beacons(&self) -> impl Iterator<Item = &Beacon> {
        self.elements.iter().filter_map(|e| match e {
            Element::Beacon(b) => Some(b),
            _ => None,
        })
    }

    pub fn has_total(&self) -> bool {
        self.elements.iter().any(|e| matches!(e, Element::Total))
    }

    /// Whether this bucket asks for data back: selected columns, nested
    /// buckets or a total.
    pub fn is_projection(&self) -> bool {
        self.elements.iter().any(|e| {
            matches!(
                e,
                Element::Item(Item::Column(_)) | Element::Bucket(_) | Element::Total
            )
        })
    }
}

/// Top-level request: independent buckets.
pub type Invoice = Vec<Bucket>;

/// Result of reading one bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}
