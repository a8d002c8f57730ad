//! Procedural (PL/pgSQL) statement variants and the function wrapper.

use serde::{Deserialize, Serialize};

use super::expr::SqlExpr;
use super::stmt::SqlQuery;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionArg {
    pub name: String,
    pub sql_type: String,
    pub default: Option<SqlExpr>,
}

impl FunctionArg {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            default: None,
        }
    }

    pub fn with_default(
        name: impl Into<String>,
        sql_type: impl Into<String>,
        default: SqlExpr,
    ) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            default: Some(default),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDeclaration {
    pub name: String,
    pub sql_type: String,
    pub initial: Option<SqlExpr>,
}

impl LocalDeclaration {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            initial: None,
        }
    }

    pub fn with_initial(
        name: impl Into<String>,
        sql_type: impl Into<String>,
        initial: SqlExpr,
    ) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            initial: Some(initial),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlpgsqlStmt {
    /// `RETURN expr;`
    Return(SqlExpr),
    /// `RETURN QUERY` followed by the query.
    ReturnQuery(SqlQuery),
    /// Bare `RETURN;` ending a set-returning function.
    ReturnNothing,
    /// `name := expr;`
    Assign { name: String, value: SqlExpr },
    If {
        cond: SqlExpr,
        then_body: Vec<PlpgsqlStmt>,
        else_body: Vec<PlpgsqlStmt>,
    },
    /// `RAISE EXCEPTION 'message' USING ERRCODE = 'code';`
    Raise { message: String, errcode: String },
    /// Raw statement text. Escape hatch: never fed with schema-derived text.
    Raw(String),
    /// `-- text`
    Comment(String),
}

impl PlpgsqlStmt {
    pub fn if_then(cond: SqlExpr, then_body: Vec<PlpgsqlStmt>) -> Self {
        PlpgsqlStmt::If {
            cond,
            then_body,
            else_body: Vec::new(),
        }
    }

    pub fn if_then_else(
        cond: SqlExpr,
        then_body: Vec<PlpgsqlStmt>,
        else_body: Vec<PlpgsqlStmt>,
    ) -> Self {
        PlpgsqlStmt::If {
            cond,
            then_body,
            else_body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Volatility {
    Stable,
    Immutable,
    Volatile,
}

impl Volatility {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            Volatility::Stable => "STABLE",
            Volatility::Immutable => "IMMUTABLE",
            Volatility::Volatile => "VOLATILE",
        }
    }
}

/// A complete `CREATE OR REPLACE FUNCTION` definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlpgsqlFunction {
    pub name: String,
    pub args: Vec<FunctionArg>,
    pub returns: String,
    pub header_comments: Vec<String>,
    pub declarations: Vec<LocalDeclaration>,
    pub body: Vec<PlpgsqlStmt>,
    pub volatility: Volatility,
    /// Planner row estimate for set-returning functions (`ROWS n`).
    pub rows_estimate: Option<u32>,
}

impl PlpgsqlFunction {
    pub fn new(name: impl Into<String>, returns: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            returns: returns.into(),
            header_comments: Vec::new(),
            declarations: Vec::new(),
            body: Vec::new(),
            volatility: Volatility::Stable,
            rows_estimate: None,
        }
    }
}
