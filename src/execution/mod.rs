//! Statement execution and result assembly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   build    ┌──────────────┐  execute  ┌────────────┐
//! │ ReadExecutor │──────────▶│ QueryBuilder │─────────▶│ Connection │
//! │ WriteExecutor│            └──────────────┘           └────────────┘
//! └──────┬───────┘                                              │
//!        │ deferred children (O2M / M2M)         rows / counts  │
//!        ▼                                                      ▼
//! ┌──────────────┐                                      ┌────────────┐
//! │ secondary    │                                      │  Squeezer  │
//! │ fetches      │                                      │ (unflatten,│
//! └──────────────┘                                      │  collapse) │
//!                                                       └────────────┘
//! ```

mod driver;
mod read;
mod sqlite;
mod squeeze;
mod write;

pub use driver::{transaction, Connection, DriverError, Outcome};
pub use read::{ReadClient, ReadExecutor};
pub use sqlite::SqliteConnection;
pub use squeeze::Squeezer;
pub use write::{WriteClient, WriteExecutor};

use tracing::debug;

use crate::error::Result;
use crate::sql::statement::Statement;

/// Execute one statement, logging the SQL it renders to.
pub(crate) async fn run(conn: &dyn Connection, statement: &Statement) -> Result<Outcome> {
    debug!(
        kind = %statement.kind(),
        sql = %statement.to_sql(conn.dialect()),
        "executing statement"
    );
    Ok(conn.execute(statement).await?)
}
