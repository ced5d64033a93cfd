//! Clauses and postfix logical expressions.
//!
//! An [`Expression`] is a postfix sequence: operands first, then the logical
//! marker that combines the two most recent results.
//!
//! ```text
//!   (a & b) | c   =>   [a, b, AND, c, OR]
//! ```

use std::ops::{BitAnd, BitOr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether an operator filters rows or orders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Filter,
    Order,
}

/// Comparison, match and ordering operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq(Value),
    Ne(Value),
    Le(Value),
    Lt(Value),
    Ge(Value),
    Gt(Value),
    Is(Value),
    Like {
        pattern: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    Not(Box<Operator>),
    Set(Vec<Value>),
    Range {
        #[serde(default)]
        lower: Option<Box<Operator>>,
        #[serde(default)]
        upper: Option<Box<Operator>>,
    },
    Asc,
    Desc,
}

impl Operator {
    pub fn category(&self) -> Category {
        match self {
            Operator::Asc | Operator::Desc => Category::Order,
            _ => Category::Filter,
        }
    }

    pub fn eq(value: impl Into<Value>) -> Self {
        Operator::Eq(value.into())
    }

    pub fn ne(value: impl Into<Value>) -> Self {
        Operator::Ne(value.into())
    }

    pub fn le(value: impl Into<Value>) -> Self {
        Operator::Le(value.into())
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Operator::Lt(value.into())
    }

    pub fn ge(value: impl Into<Value>) -> Self {
        Operator::Ge(value.into())
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Operator::Gt(value.into())
    }

    pub fn is(value: impl Into<Value>) -> Self {
        Operator::Is(value.into())
    }

    /// Case-sensitive substring match.
    pub fn like(pattern: impl Into<String>) -> Self {
        Operator::Like {
            pattern: pattern.into(),
            case_sensitive: true,
        }
    }

    /// Case-insensitive substring match.
    pub fn ilike(pattern: impl Into<String>) -> Self {
        Operator::Like {
            pattern: pattern.into(),
            case_sensitive: false,
        }
    }

    pub fn set(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Operator::Set(values.into_iter().map(Into::into).collect())
    }

    pub fn range(lower: Option<Operator>, upper: Option<Operator>) -> Self {
        Operator::Range {
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
        }
    }

    pub fn negate(self) -> Self {
        Operator::Not(Box::new(self))
    }
}

/// A single predicate or ordering key on one column of a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub column: String,
    pub operator: Operator,
}

impl Clause {
    pub fn new(column: impl Into<String>, operator: Operator) -> Self {
        Self {
            column: column.into(),
            operator,
        }
    }
}

/// One entry of a postfix expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Clause(Clause),
    And,
    Or,
}

/// Postfix sequence of clauses and logical markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression {
    terms: Vec<Term>,
}

impl Expression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw terms. Well-formedness is checked at compile time.
    pub fn from_terms(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
        self.terms.iter().filter_map(|t| match t {
            Term::Clause(c) => Some(c),
            _ => None,
        })
    }

    /// Category of the first clause, if any.
    pub fn category(&self) -> Option<Category> {
        self.clauses().next().map(|c| c.operator.category())
    }

    /// Whether every clause shares the first clause's category.
    pub fn is_uniform(&self) -> bool {
        let mut categories = self.clauses().map(|c| c.operator.category());
        match categories.next() {
            Some(first) => categories.all(|c| c == first),
            None => true,
        }
    }

    fn combine(self, other: Expression, marker: Term) -> Expression {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let mut terms = self.terms;
        terms.extend(other.terms);
        terms.push(marker);
        Expression { terms }
    }
}

impl From<Clause> for Expression {
    fn from(clause: Clause) -> Self {
        Expression {
            terms: vec![Term::Clause(clause)],
        }
    }
}

impl BitAnd for Expression {
    type Output = Expression;

    fn bitand(self, rhs: Expression) -> Expression {
        self.combine(rhs, Term::And)
    }
}

impl BitOr for Expression {
    type Output = Expression;

    fn bitor(self, rhs: Expression) -> Expression {
        self.combine(rhs, Term::Or)
    }
}

/// Single-clause expression: `clause("title", Operator::ilike("go"))`.
pub fn clause(column: impl Into<String>, operator: Operator) -> Expression {
    Clause::new(column, operator).into()
}
