//! Embedded SQLite driver.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use rusqlite::types::ValueRef;
use serde_json::{Number, Value};
use tokio::sync::Mutex;

use super::driver::{Connection, DriverError, Outcome};
use crate::notation::Row;
use crate::schema::{introspect, TableDef};
use crate::sql::dialect::Dialect;
use crate::sql::statement::Statement;

/// Session settings for every opened database. Plain LIKE is made case
/// sensitive; case-insensitive matches render as `LOWER(..) LIKE LOWER(..)`.
const PRAGMAS: &str = "PRAGMA foreign_keys = ON; PRAGMA case_sensitive_like = ON;";

/// A rusqlite connection behind an async mutex, so tasks sharing it take
/// turns.
pub struct SqliteConnection {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteConnection {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DriverError> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, DriverError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        conn.execute_batch(PRAGMAS)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run raw SQL (schema setup, fixtures).
    pub async fn execute_batch(&self, sql: &str) -> Result<(), DriverError> {
        self.conn.lock().await.execute_batch(sql)?;
        Ok(())
    }

    /// Table definitions of the open database.
    pub async fn introspect(&self) -> Result<Vec<TableDef>, DriverError> {
        let conn = self.conn.lock().await;
        Ok(introspect::sqlite(&conn)?)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, statement: &Statement) -> Result<Outcome, DriverError> {
        let sql = statement.to_sql(Dialect::Sqlite);
        let conn = self.conn.lock().await;
        run(&conn, &sql, statement.returns_rows())
    }

    async fn begin(&self) -> Result<(), DriverError> {
        let conn = self.conn.lock().await;
        if !conn.is_autocommit() {
            return Err(DriverError::Transaction("already in a transaction".into()));
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), DriverError> {
        let conn = self.conn.lock().await;
        if conn.is_autocommit() {
            return Err(DriverError::Transaction("commit without begin".into()));
        }
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DriverError> {
        let conn = self.conn.lock().await;
        if conn.is_autocommit() {
            return Err(DriverError::Transaction("rollback without begin".into()));
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

fn run(conn: &rusqlite::Connection, sql: &str, returns_rows: bool) -> Result<Outcome, DriverError> {
    if !returns_rows {
        let affected = conn.execute(sql, [])?;
        return Ok(Outcome::Affected(affected as u64));
    }

    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, name) in names.iter().enumerate() {
            record.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        records.push(record);
    }
    Ok(Outcome::Rows(records))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}
