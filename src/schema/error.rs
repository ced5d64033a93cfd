//! Resolution errors.

use thiserror::Error;

/// Failure to resolve a table, column or relationship.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("no relationship between '{from}' and '{to}'")]
    NoLink { from: String, to: String },

    /// More than one junction table relates the pair and none is configured.
    #[error("ambiguous junction between '{from}' and '{to}': candidates {}", .candidates.join(", "))]
    AmbiguousJunction {
        from: String,
        to: String,
        candidates: Vec<String>,
    },

    /// A configured junction does not reference both tables.
    #[error("junction '{interim}' does not link '{from}' and '{to}'")]
    InvalidJunction {
        from: String,
        to: String,
        interim: String,
    },

    /// A declared foreign key points at a table outside the catalogue.
    #[error("foreign key {table}.{column} references unknown table '{target}'")]
    DanglingForeignKey {
        table: String,
        column: String,
        target: String,
    },
}
