//! Shared fixtures: a small library database in in-memory SQLite.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use trellis::execution::{Connection, DriverError, Outcome, SqliteConnection};
use trellis::notation::Row;
use trellis::schema::Schema;
use trellis::sql::{Dialect, Statement};

pub const LIBRARY: &str = "
CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE book (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    price REAL,
    author_id INTEGER REFERENCES author(id),
    editor_id INTEGER REFERENCES person(id)
);
CREATE TABLE review (
    id INTEGER PRIMARY KEY,
    body TEXT,
    book_id INTEGER NOT NULL REFERENCES book(id)
);
CREATE TABLE tag (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE book_tag (
    book_id INTEGER NOT NULL REFERENCES book(id),
    tag_id INTEGER NOT NULL REFERENCES tag(id)
);

INSERT INTO author (id, name) VALUES (1, 'Le Guin'), (2, 'Herbert'), (3, 'Nobody');
INSERT INTO person (id, name) VALUES (1, 'Ann');
INSERT INTO book (id, title, price, author_id, editor_id) VALUES
    (1, 'Dune', 9.5, 2, 1),
    (2, 'Earthsea', 7.5, 1, NULL),
    (3, 'Lathe', 12.0, 1, NULL);
INSERT INTO review (id, body, book_id) VALUES (1, 'Great', 1), (2, 'Classic', 1), (3, 'Quiet', 2);
INSERT INTO tag (id, name) VALUES (1, 'scifi'), (2, 'fantasy'), (3, 'unused');
INSERT INTO book_tag (book_id, tag_id) VALUES (1, 1), (2, 2), (3, 1);
";

/// Wraps a SQLite connection and remembers the SQL of every statement.
pub struct Recording {
    inner: SqliteConnection,
    statements: Mutex<Vec<String>>,
}

impl Recording {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.statements.lock().unwrap().clear();
    }

    pub async fn execute_batch(&self, sql: &str) {
        self.inner.execute_batch(sql).await.unwrap();
    }
}

#[async_trait]
impl Connection for Recording {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn execute(&self, statement: &Statement) -> Result<Outcome, DriverError> {
        self.statements
            .lock()
            .unwrap()
            .push(statement.to_sql(Dialect::Sqlite));
        self.inner.execute(statement).await
    }

    async fn begin(&self) -> Result<(), DriverError> {
        self.inner.begin().await
    }

    async fn commit(&self) -> Result<(), DriverError> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<(), DriverError> {
        self.inner.rollback().await
    }
}

/// Seeded library database and the schema introspected from it.
pub async fn library() -> (Arc<Schema>, Arc<Recording>) {
    database(LIBRARY).await
}

/// In-memory database built from `sql`, with its introspected schema.
pub async fn database(sql: &str) -> (Arc<Schema>, Arc<Recording>) {
    let inner = SqliteConnection::open_in_memory().unwrap();
    inner.execute_batch(sql).await.unwrap();
    let tables = inner.introspect().await.unwrap();
    let schema = Schema::builder().tables(tables).build().unwrap();
    let conn = Recording {
        inner,
        statements: Mutex::new(Vec::new()),
    };
    (Arc::new(schema), Arc::new(conn))
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}
