//! Order compilation: postfix clause sequence to sort keys.
//!
//! Ordering has no boolean algebra. `AND` separates sort keys and `OR` is
//! rejected.

use crate::error::{Error, Result};
use crate::notation::{Expression, Operator, Term};
use crate::schema::Schema;
use crate::space::{Address, Space};
use crate::sql::query::OrderByExpr;

#[derive(Debug, Clone, Copy)]
pub struct OrderCompiler<'a> {
    schema: &'a Schema,
    space: &'a Space,
}

impl<'a> OrderCompiler<'a> {
    pub fn new(schema: &'a Schema, space: &'a Space) -> Self {
        Self { schema, space }
    }

    pub fn compile(&self, expression: &Expression) -> Result<Vec<OrderByExpr>> {
        let mut keys = Vec::new();
        let mut pending = Vec::new();

        for term in expression.terms() {
            match term {
                Term::Clause(clause) => {
                    let address = Address::new(clause.column.clone(), self.space.clone());
                    let column = self.schema.column(&address)?.expr();
                    let key = match clause.operator {
                        Operator::Asc => OrderByExpr::asc(column),
                        Operator::Desc => OrderByExpr::desc(column),
                        _ => {
                            return Err(Error::malformed(format!(
                                "filter operator on '{}' inside an ordering",
                                clause.column
                            )))
                        }
                    };
                    pending.push(key);
                }
                Term::And => keys.append(&mut pending),
                Term::Or => {
                    return Err(Error::malformed(format!(
                        "OR between sort keys on '{}'",
                        self.space
                    )))
                }
            }
        }
        keys.append(&mut pending);
        Ok(keys)
    }
}
