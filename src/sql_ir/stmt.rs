//! Query-level statements: SELECT, joins, set operations and CTEs.

use serde::{Deserialize, Serialize};

use super::expr::SqlExpr;
use super::table_expr::TableExpr;
use super::SqlIrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Cross,
    CrossLateral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: TableExpr,
    /// `None` for CROSS joins; rendering omits the ON clause.
    pub on: Option<SqlExpr>,
}

impl JoinClause {
    pub fn inner(table: TableExpr, on: SqlExpr) -> Self {
        Self {
            join_type: JoinType::Inner,
            table,
            on: Some(on),
        }
    }

    pub fn left(table: TableExpr, on: SqlExpr) -> Self {
        Self {
            join_type: JoinType::Left,
            table,
            on: Some(on),
        }
    }

    pub fn cross(table: TableExpr) -> Self {
        Self {
            join_type: JoinType::Cross,
            table,
            on: None,
        }
    }

    pub fn cross_lateral(table: TableExpr) -> Self {
        Self {
            join_type: JoinType::CrossLateral,
            table,
            on: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub expr: SqlExpr,
    pub direction: OrderDirection,
}

impl OrderByExpr {
    pub fn asc(expr: SqlExpr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(expr: SqlExpr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Desc,
        }
    }
}

/// A single SELECT. Zero columns render `SELECT 1`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectStmt {
    pub distinct: bool,
    pub columns: Vec<SqlExpr>,
    pub from: Option<TableExpr>,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<SqlExpr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<SqlExpr>,
}

impl SelectStmt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_query(self) -> SqlQuery {
        SqlQuery::Select(self)
    }
}

/// Queries combined with `UNION ALL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionAll(pub Vec<SqlQuery>);

impl UnionAll {
    pub fn try_new(queries: Vec<SqlQuery>) -> Result<Self, SqlIrError> {
        if queries.is_empty() {
            return Err(SqlIrError::EmptyUnion);
        }
        Ok(Self(queries))
    }
}

/// Queries combined with `INTERSECT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectSubquery(pub Vec<SqlQuery>);

impl IntersectSubquery {
    pub fn try_new(queries: Vec<SqlQuery>) -> Result<Self, SqlIrError> {
        if queries.is_empty() {
            return Err(SqlIrError::EmptyIntersection);
        }
        Ok(Self(queries))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CteDefinition {
    pub name: String,
    /// Explicit column list; empty renders no list.
    pub columns: Vec<String>,
    pub body: SqlQuery,
}

impl CteDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<String>, body: SqlQuery) -> Self {
        Self {
            name: name.into(),
            columns,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithCte {
    pub recursive: bool,
    pub ctes: Vec<CteDefinition>,
    pub body: Box<SqlQuery>,
}

impl WithCte {
    pub fn try_new(
        recursive: bool,
        ctes: Vec<CteDefinition>,
        body: SqlQuery,
    ) -> Result<Self, SqlIrError> {
        if ctes.is_empty() {
            return Err(SqlIrError::EmptyWith);
        }
        Ok(Self {
            recursive,
            ctes,
            body: Box::new(body),
        })
    }
}

/// The closed family of query statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlQuery {
    Select(SelectStmt),
    Union(UnionAll),
    Intersect(IntersectSubquery),
    With(WithCte),
}
