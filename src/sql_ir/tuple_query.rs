//! Fluent builder for the most common emitted shape: a filtered SELECT
//! over the tuple table.
//!
//! The builder accumulates conditions locally and finalises into an
//! immutable [`SelectStmt`] via [`TupleQuery::build`]; downstream code
//! only ever sees finished IR.

use super::expr::SqlExpr;
use super::stmt::{JoinClause, SelectStmt};
use super::table_expr::TableExpr;
use super::TUPLES_TABLE;

#[derive(Debug, Clone)]
pub struct TupleQuery {
    alias: String,
    distinct: bool,
    columns: Vec<SqlExpr>,
    joins: Vec<JoinClause>,
    conditions: Vec<SqlExpr>,
}

impl TupleQuery {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            distinct: false,
            columns: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Column reference qualified by this query's tuple-table alias.
    pub fn col(&self, name: &str) -> SqlExpr {
        SqlExpr::column(self.alias.clone(), name)
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn select(mut self, column: SqlExpr) -> Self {
        self.columns.push(column);
        self
    }

    pub fn object_type(mut self, object_type: &str) -> Self {
        let cond = self.col("object_type").eq(SqlExpr::string(object_type));
        self.conditions.push(cond);
        self
    }

    /// `relation IN (..)` over an already-sorted relation list.
    pub fn relations<S: AsRef<str>>(mut self, relations: &[S]) -> Self {
        let cond = self
            .col("relation")
            .in_strings(relations.iter().map(|r| r.as_ref().to_string()));
        self.conditions.push(cond);
        self
    }

    pub fn object_id(mut self, value: SqlExpr) -> Self {
        let cond = self.col("object_id").eq(value);
        self.conditions.push(cond);
        self
    }

    pub fn subject_type(mut self, value: SqlExpr) -> Self {
        let cond = self.col("subject_type").eq(value);
        self.conditions.push(cond);
        self
    }

    /// Subject-id match, optionally admitting the wildcard grant.
    pub fn subject_id_matches(mut self, value: SqlExpr, allow_wildcard: bool) -> Self {
        let direct = self.col("subject_id").eq(value);
        let cond = if allow_wildcard {
            SqlExpr::or(vec![direct, self.col("subject_id").is_wildcard()])
        } else {
            direct
        };
        self.conditions.push(cond);
        self
    }

    pub fn filter(mut self, condition: SqlExpr) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn join(mut self, join: JoinClause) -> Self {
        self.joins.push(join);
        self
    }

    /// Finalise into an immutable SELECT.
    pub fn build(self) -> SelectStmt {
        SelectStmt {
            distinct: self.distinct,
            columns: self.columns,
            from: Some(TableExpr::named_as(TUPLES_TABLE, self.alias)),
            joins: self.joins,
            where_clause: if self.conditions.is_empty() {
                None
            } else {
                Some(SqlExpr::and(self.conditions))
            },
            order_by: Vec::new(),
            limit: None,
        }
    }
}
