//! SQL generation module.
//!
//! A type-safe SQL builder that renders multi-dialect SQL:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`dml`] - INSERT, UPDATE, DELETE
//! - [`statement`] - Any of the above as one executable unit
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod statement;
pub mod token;

#[cfg(test)]
pub mod test_utils;

pub use dialect::{Dialect, SqlDialect};
pub use dml::{Delete, Insert, Update};
pub use expr::{
    col, count_star, func, lit_bool, lit_float, lit_int, lit_json, lit_null, lit_str, table_col,
    BinaryOperator, Expr, ExprExt, IsValue, Literal, UnaryOperator,
};
pub use query::{Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use statement::{Statement, StatementKind};
pub use token::{Token, TokenStream};
