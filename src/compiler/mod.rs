//! Clause compilation.
//!
//! Both compilers evaluate a postfix [`Expression`] against columns bound to
//! one [`Space`](crate::space::Space):
//!
//! - [`FilterCompiler`] reduces it to a single boolean [`Expr`](crate::sql::Expr)
//! - [`OrderCompiler`] flattens it into ORDER BY keys

mod filter;
mod order;

pub use filter::FilterCompiler;
pub use order::OrderCompiler;

use crate::error::{Error, Result};
use crate::notation::{Category, Expression};

/// Filter and order clauses gathered from one bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseSet {
    pub filter: Expression,
    pub order: Expression,
}

impl ClauseSet {
    /// Route `expression` by its operators' category, conjoining it with
    /// what was already collected.
    pub fn push(&mut self, expression: Expression) -> Result<()> {
        if !expression.is_uniform() {
            return Err(Error::malformed(
                "expression mixes filter and ordering operators",
            ));
        }
        match expression.category() {
            Some(Category::Filter) => {
                self.filter = std::mem::take(&mut self.filter) & expression;
            }
            Some(Category::Order) => {
                self.order = std::mem::take(&mut self.order) & expression;
            }
            None => {}
        }
        Ok(())
    }

    pub fn has_filter(&self) -> bool {
        !self.filter.is_empty()
    }
}
