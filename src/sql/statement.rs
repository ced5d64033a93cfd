//! A single executable statement of any kind.

use std::fmt;

use super::dialect::Dialect;
use super::dml::{Delete, Insert, Update};
use super::query::Query;

/// Any statement the builder can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Query),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

/// Statement kind, used for logging and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Select(_) => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update(_) => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
        }
    }

    /// Whether executing this statement yields rows.
    pub fn returns_rows(&self) -> bool {
        matches!(self, Statement::Select(_))
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        match self {
            Statement::Select(query) => query.to_sql(dialect),
            Statement::Insert(insert) => insert.to_sql(dialect),
            Statement::Update(update) => update.to_sql(dialect),
            Statement::Delete(delete) => delete.to_sql(dialect),
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

impl From<Query> for Statement {
    fn from(query: Query) -> Self {
        Statement::Select(query)
    }
}

impl From<Insert> for Statement {
    fn from(insert: Insert) -> Self {
        Statement::Insert(insert)
    }
}

impl From<Update> for Statement {
    fn from(update: Update) -> Self {
        Statement::Update(update)
    }
}

impl From<Delete> for Statement {
    fn from(delete: Delete) -> Self {
        Statement::Delete(delete)
    }
}
