//! SQLite SQL dialect.
//!
//! - ANSI identifier quoting (`"`)
//! - Booleans stored as integers (1/0)
//! - OFFSET is only valid after LIMIT
//! - No ILIKE (the driver turns on `case_sensitive_like`; insensitive
//!   matches lower both sides)

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_sqlite(limit, offset)
    }
}
