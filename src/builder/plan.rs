//! Plan fragments produced while walking a bucket.

use crate::notation::{Beacon, Row};
use crate::sql::expr::{Expr, ExprExt};
use crate::sql::query::{Join, OrderByExpr, Query, SelectExpr, TableRef};

/// What one level of a bucket walk contributes. Each recursion level owns
/// its fragment and hands it back to the caller for merging.
#[derive(Debug, Clone, Default)]
pub(crate) struct Fragment {
    pub columns: Vec<SelectExpr>,
    /// Joins keyed by link identity, in discovery order.
    pub joins: Vec<(String, Join)>,
    pub filters: Vec<Expr>,
    /// Whether any filter clause was given, even one compiling to nothing.
    pub has_filter: bool,
    pub order: Vec<OrderByExpr>,
    pub rows: Vec<Row>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub total: bool,
    pub beacons: Vec<Beacon>,
}

impl Fragment {
    /// Fold a nested level into this one. Pagination, totals and beacons
    /// only count at the level that declared them.
    pub fn absorb(&mut self, child: Fragment) {
        self.columns.extend(child.columns);
        for (identity, join) in child.joins {
            self.add_join(identity, join);
        }
        self.filters.extend(child.filters);
        self.has_filter |= child.has_filter;
        self.order.extend(child.order);
        self.rows.extend(child.rows);
    }

    pub fn add_join(&mut self, identity: String, join: Join) -> bool {
        if self.joins.iter().any(|(seen, _)| *seen == identity) {
            return false;
        }
        self.joins.push((identity, join));
        true
    }

    pub fn filter(&self) -> Option<Expr> {
        self.filters.iter().cloned().reduce(|acc, f| acc.and(f))
    }
}

/// The pieces of a SELECT before it is finalised. Read extensions receive
/// and return this.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectParts {
    pub table: TableRef,
    pub columns: Vec<SelectExpr>,
    pub joins: Vec<Join>,
    pub filter: Option<Expr>,
    pub order: Vec<OrderByExpr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectParts {
    pub fn into_query(self) -> Query {
        let mut query = Query::new().select(self.columns).from(self.table);
        query.joins = self.joins;
        if let Some(filter) = self.filter {
            query = query.filter(filter);
        }
        query = query.order_by(self.order);
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        query
    }
}
