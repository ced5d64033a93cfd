//! Storage driver seam.
//!
//! The executors only need three things from a store: run a statement,
//! report rows or a row count, and scope work in a transaction.

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::notation::Row;
use crate::sql::dialect::Dialect;
use crate::sql::statement::Statement;

/// Errors raised by a connection.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Statement failed for a driver-specific reason.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Commit or rollback without an open transaction, or nested begin.
    #[error("transaction state: {0}")]
    Transaction(String),
}

/// What executing a statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Rows(Vec<Row>),
    Affected(u64),
}

impl Outcome {
    /// Rows of a query; empty for DML.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Outcome::Rows(rows) => rows,
            Outcome::Affected(_) => Vec::new(),
        }
    }

    pub fn affected(&self) -> u64 {
        match self {
            Outcome::Rows(rows) => rows.len() as u64,
            Outcome::Affected(n) => *n,
        }
    }
}

/// A single logical connection to a relational store.
///
/// Implementations must be safe to call from concurrent tasks; a connection
/// that cannot run statements in parallel serialises them internally.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Dialect statements are rendered in for this connection.
    fn dialect(&self) -> Dialect;

    async fn execute(&self, statement: &Statement) -> Result<Outcome, DriverError>;

    async fn begin(&self) -> Result<(), DriverError>;

    async fn commit(&self) -> Result<(), DriverError>;

    async fn rollback(&self) -> Result<(), DriverError>;
}

/// Run `work` inside a transaction on `conn`.
///
/// Commits when `work` succeeds. On failure the transaction is rolled back
/// and the original error returned; a failing rollback is logged.
pub async fn transaction<T, F>(conn: &dyn Connection, work: F) -> crate::Result<T>
where
    F: Future<Output = crate::Result<T>> + Send,
{
    conn.begin().await?;
    match work.await {
        Ok(value) => {
            conn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = conn.rollback().await {
                warn!(error = %rollback, "rollback failed after: {}", err);
            }
            Err(err)
        }
    }
}
