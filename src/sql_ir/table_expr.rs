//! Table expression variants: named tables, inline `VALUES`, function
//! invocations and subquery aliases.

use serde::{Deserialize, Serialize};

use super::expr::SqlExpr;
use super::stmt::SqlQuery;
use super::SqlIrError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableExpr {
    Named {
        name: String,
        alias: Option<String>,
    },
    /// Inline `VALUES` rows with declared column names.
    ///
    /// Zero rows render a single all-`NULL` tuple of the declared arity so
    /// the enclosing query keeps stable column types.
    Values {
        alias: String,
        columns: Vec<String>,
        rows: Vec<Vec<SqlExpr>>,
    },
    /// Set-returning function in FROM position: `fn(args) AS alias`.
    Function {
        call: SqlExpr,
        alias: String,
    },
    Subquery {
        query: Box<SqlQuery>,
        alias: String,
    },
}

impl TableExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TableExpr::Named {
            name: name.into(),
            alias: None,
        }
    }

    pub fn named_as(name: impl Into<String>, alias: impl Into<String>) -> Self {
        TableExpr::Named {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    pub fn values(
        alias: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<SqlExpr>>,
    ) -> Result<Self, SqlIrError> {
        if columns.is_empty() {
            return Err(SqlIrError::EmptyValuesColumns);
        }
        Ok(TableExpr::Values {
            alias: alias.into(),
            columns,
            rows,
        })
    }

    pub fn function(call: SqlExpr, alias: impl Into<String>) -> Self {
        TableExpr::Function {
            call,
            alias: alias.into(),
        }
    }

    pub fn subquery(query: SqlQuery, alias: impl Into<String>) -> Self {
        TableExpr::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        }
    }

    /// The alias downstream clauses refer to, when one exists.
    pub fn alias(&self) -> Option<&str> {
        match self {
            TableExpr::Named { alias, .. } => alias.as_deref(),
            TableExpr::Values { alias, .. }
            | TableExpr::Function { alias, .. }
            | TableExpr::Subquery { alias, .. } => Some(alias.as_str()),
        }
    }
}
