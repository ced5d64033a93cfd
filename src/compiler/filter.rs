//! Filter compilation: postfix clause sequence to a boolean `Expr`.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::notation::{Clause, Expression, Operator, Term};
use crate::schema::Schema;
use crate::space::{Address, Space};
use crate::sql::expr::{lit_json, lit_str, Expr, ExprExt, IsValue};

/// Compiles filter expressions with columns bound to one space.
#[derive(Debug, Clone, Copy)]
pub struct FilterCompiler<'a> {
    schema: &'a Schema,
    space: &'a Space,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(schema: &'a Schema, space: &'a Space) -> Self {
        Self { schema, space }
    }

    /// Reduce a postfix expression to one predicate.
    ///
    /// Returns `None` for an empty expression, or when every clause compiles
    /// to nothing (a range without bounds).
    pub fn compile(&self, expression: &Expression) -> Result<Option<Expr>> {
        if expression.is_empty() {
            return Ok(None);
        }

        let mut stack: Vec<Option<Expr>> = Vec::new();
        for term in expression.terms() {
            match term {
                Term::Clause(clause) => stack.push(self.compile_clause(clause)?),
                Term::And | Term::Or => {
                    let (Some(right), Some(left)) = (stack.pop(), stack.pop()) else {
                        return Err(Error::malformed(format!(
                            "logical operator without two operands on '{}'",
                            self.space
                        )));
                    };
                    let combined = match (left, right) {
                        (Some(l), Some(r)) if matches!(term, Term::And) => Some(l.and(r)),
                        (Some(l), Some(r)) => Some(l.or(r)),
                        (Some(only), None) | (None, Some(only)) => Some(only),
                        (None, None) => None,
                    };
                    stack.push(combined);
                }
            }
        }

        if stack.len() != 1 {
            return Err(Error::malformed(format!(
                "filter on '{}' reduces to {} results, expected 1",
                self.space,
                stack.len()
            )));
        }
        Ok(stack.pop().flatten())
    }

    fn compile_clause(&self, clause: &Clause) -> Result<Option<Expr>> {
        let address = Address::new(clause.column.clone(), self.space.clone());
        let column = self.schema.column(&address)?.expr();
        compile_operator(column, &clause.operator, &clause.column)
    }
}

/// Compile one operator applied to `column`.
pub(crate) fn compile_operator(column: Expr, operator: &Operator, name: &str) -> Result<Option<Expr>> {
    let expr = match operator {
        Operator::Eq(Value::Null) => column.is(IsValue::Null),
        Operator::Ne(Value::Null) => column.is_not(IsValue::Null),
        Operator::Eq(v) => column.eq(lit_json(v)),
        Operator::Ne(v) => column.ne(lit_json(v)),
        Operator::Le(v) => column.lte(lit_json(v)),
        Operator::Lt(v) => column.lt(lit_json(v)),
        Operator::Ge(v) => column.gte(lit_json(v)),
        Operator::Gt(v) => column.gt(lit_json(v)),
        Operator::Is(v) => column.is(is_value(v, name)?),
        Operator::Like {
            pattern,
            case_sensitive,
        } => like(column, pattern, *case_sensitive, false),
        Operator::Set(values) => column.in_list(values.iter().map(lit_json).collect()),
        Operator::Range { lower, upper } => {
            let mut bounds = Vec::new();
            for bound in [lower, upper].into_iter().flatten() {
                if let Some(expr) = compile_operator(column.clone(), bound, name)? {
                    bounds.push(expr);
                }
            }
            return Ok(bounds.into_iter().reduce(|acc, b| acc.and(b)));
        }
        Operator::Not(inner) => return compile_negated(column, inner, name),
        Operator::Asc | Operator::Desc => {
            return Err(Error::malformed(format!(
                "ordering operator on '{}' inside a filter",
                name
            )))
        }
    };
    Ok(Some(expr))
}

/// Negation folds into the operator where SQL has a direct negative form.
fn compile_negated(column: Expr, inner: &Operator, name: &str) -> Result<Option<Expr>> {
    let expr = match inner {
        Operator::Is(v) => column.is_not(is_value(v, name)?),
        Operator::Eq(Value::Null) => column.is_not(IsValue::Null),
        Operator::Eq(v) => column.ne(lit_json(v)),
        Operator::Like {
            pattern,
            case_sensitive,
        } => like(column, pattern, *case_sensitive, true),
        Operator::Set(values) => column.not_in_list(values.iter().map(lit_json).collect()),
        other => match compile_operator(column, other, name)? {
            Some(expr) => expr.not(),
            None => return Ok(None),
        },
    };
    Ok(Some(expr))
}

fn like(column: Expr, pattern: &str, case_sensitive: bool, negated: bool) -> Expr {
    Expr::Like {
        expr: Box::new(column),
        pattern: Box::new(lit_str(&format!("%{}%", pattern))),
        negated,
        case_insensitive: !case_sensitive,
    }
}

fn is_value(value: &Value, name: &str) -> Result<IsValue> {
    match value {
        Value::Null => Ok(IsValue::Null),
        Value::Bool(true) => Ok(IsValue::True),
        Value::Bool(false) => Ok(IsValue::False),
        other => Err(Error::malformed(format!(
            "IS on '{}' expects null or a boolean, got {}",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::clause;
    use crate::schema::TableDef;
    use crate::sql::dialect::Dialect;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder()
            .table(TableDef::new("book").columns(["id", "title", "price", "archived"]))
            .build()
            .unwrap()
    }

    fn compile(expression: &Expression) -> Result<Option<String>> {
        let schema = schema();
        let space = Space::parse("book");
        let compiled = FilterCompiler::new(&schema, &space).compile(expression)?;
        Ok(compiled.map(|e| e.to_tokens_for_dialect(Dialect::Postgres).serialize(Dialect::Postgres)))
    }

    #[test]
    fn test_comparisons() {
        let sql = compile(&clause("price", Operator::ge(10))).unwrap().unwrap();
        assert_eq!(sql, "\"book\".\"price\" >= 10");

        let sql = compile(&clause("title", Operator::eq(Value::Null)))
            .unwrap()
            .unwrap();
        assert_eq!(sql, "\"book\".\"title\" IS NULL");
    }

    #[test]
    fn test_like_wraps_pattern() {
        let sql = compile(&clause("title", Operator::ilike("Go")))
            .unwrap()
            .unwrap();
        assert_eq!(sql, "\"book\".\"title\" ILIKE '%Go%'");

        let sql = compile(&clause("title", Operator::like("Go")))
            .unwrap()
            .unwrap();
        assert_eq!(sql, "\"book\".\"title\" LIKE '%Go%'");
    }

    #[test]
    fn test_not_like_folds_into_operator() {
        let sql = compile(&clause("title", Operator::ilike("x").negate()))
            .unwrap()
            .unwrap();
        assert_eq!(sql, "\"book\".\"title\" NOT ILIKE '%x%'");
    }

    #[test]
    fn test_negations() {
        let sql = compile(&clause("archived", Operator::is(true).negate()))
            .unwrap()
            .unwrap();
        assert_eq!(sql, "\"book\".\"archived\" IS NOT TRUE");

        let sql = compile(&clause("id", Operator::eq(3).negate()))
            .unwrap()
            .unwrap();
        assert_eq!(sql, "\"book\".\"id\" <> 3");

        let sql = compile(&clause("id", Operator::set([1, 2]).negate()))
            .unwrap()
            .unwrap();
        assert_eq!(sql, "\"book\".\"id\" NOT IN (1, 2)");

        let sql = compile(&clause("price", Operator::gt(5).negate()))
            .unwrap()
            .unwrap();
        assert_eq!(sql, "NOT (\"book\".\"price\" > 5)");
    }

    #[test]
    fn test_range_bounds() {
        let none = compile(&clause("price", Operator::range(None, None))).unwrap();
        assert_eq!(none, None);

        let lower = compile(&clause("price", Operator::range(Some(Operator::ge(1)), None)))
            .unwrap()
            .unwrap();
        assert_eq!(lower, "\"book\".\"price\" >= 1");

        let both = compile(&clause(
            "price",
            Operator::range(Some(Operator::ge(1)), Some(Operator::lt(9))),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(both, "\"book\".\"price\" >= 1 AND \"book\".\"price\" < 9");
    }

    #[test]
    fn test_empty_range_inside_conjunction() {
        let expr = clause("price", Operator::range(None, None)) & clause("id", Operator::eq(1));
        let sql = compile(&expr).unwrap().unwrap();
        assert_eq!(sql, "\"book\".\"id\" = 1");
    }

    #[test]
    fn test_postfix_grouping() {
        let expr = clause("id", Operator::eq(1))
            & (clause("price", Operator::lt(5)) | clause("price", Operator::gt(50)));
        let sql = compile(&expr).unwrap().unwrap();
        assert_eq!(
            sql,
            "\"book\".\"id\" = 1 AND (\"book\".\"price\" < 5 OR \"book\".\"price\" > 50)"
        );
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(compile(&Expression::new()).unwrap(), None);
    }

    #[test]
    fn test_malformed_expressions() {
        let dangling = Expression::from_terms(vec![Term::And]);
        assert!(matches!(
            compile(&dangling),
            Err(Error::MalformedExpression(_))
        ));

        let leftover: Expression = serde_json::from_value(json!([
            {"clause": {"column": "id", "operator": {"eq": 1}}},
            {"clause": {"column": "id", "operator": {"eq": 2}}}
        ]))
        .unwrap();
        assert!(matches!(
            compile(&leftover),
            Err(Error::MalformedExpression(_))
        ));

        let order_in_filter = clause("id", Operator::Asc);
        assert!(matches!(
            compile(&order_in_filter),
            Err(Error::MalformedExpression(_))
        ));

        let bad_is = clause("id", Operator::is(3));
        assert!(matches!(compile(&bad_is), Err(Error::MalformedExpression(_))));
    }

    #[test]
    fn test_unknown_column_is_schema_error() {
        let result = compile(&clause("isbn", Operator::eq("x")));
        assert!(matches!(result, Err(Error::Schema(_))));
    }
}
