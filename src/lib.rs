//! # Trellis
//!
//! Turns nested declarative requests over a relational schema into SQL,
//! runs them, and assembles nested results.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │         Invoice (buckets, clauses, rows, beacons)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [schema: link resolution]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Spaces / Addresses  +  M2O / O2M / M2M links           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [builder + compiler]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Statement (SELECT / INSERT / UPDATE / DELETE)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [execution]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Connection → rows → deferred fetches → nested View     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod builder;
pub mod compiler;
pub mod config;
pub mod error;
pub mod execution;
pub mod extension;
pub mod notation;
pub mod schema;
pub mod space;
pub mod sql;

pub use error::{Error, Result};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::builder::{QueryBuilder, SelectParts};
    pub use crate::config::Settings;
    pub use crate::error::{Error, Result};
    pub use crate::execution::{
        transaction, Connection, Outcome, ReadClient, ReadExecutor, SqliteConnection, Squeezer,
        WriteClient, WriteExecutor,
    };
    pub use crate::extension::{Extensions, ReadExtension, Upsert, WriteExtension};
    pub use crate::notation::{
        clause, Beacon, Bucket, Clause, Element, Expression, Invoice, Item, Operator, Row, Slice,
        View,
    };
    pub use crate::schema::{ForeignKey, Link, LinkKind, Schema, SchemaError, TableDef};
    pub use crate::space::{Address, Space, TrackUnit};
    pub use crate::sql::{Dialect, Statement};
}
