//! The UNION-combined block collection every list strategy produces.

use crate::sql_ir::{SqlExpr, SqlIrError, SqlQuery, UnionAll};

use super::errors::ListGeneratorError;
use super::plan::ListDirection;

#[derive(Debug, Clone, PartialEq)]
pub struct BlockSet {
    pub direction: ListDirection,
    /// One-column blocks, each projecting the direction's id column.
    pub primary: Vec<SqlQuery>,
}

impl BlockSet {
    pub fn new(direction: ListDirection) -> Self {
        Self {
            direction,
            primary: Vec::new(),
        }
    }

    pub fn push(&mut self, block: SqlQuery) {
        self.primary.push(block);
    }

    /// Every block must project exactly one column carrying the id
    /// column's name; anything else would corrupt the UNION arity.
    pub fn validate(&self) -> Result<(), ListGeneratorError> {
        for block in &self.primary {
            validate_query(block, self.direction.id_column())?;
        }
        Ok(())
    }

    /// Validate and combine into one UNION query.
    pub fn into_union(self) -> Result<SqlQuery, ListGeneratorError> {
        self.validate()?;
        if self.primary.len() == 1 {
            let mut blocks = self.primary;
            return Ok(blocks.remove(0));
        }
        Ok(SqlQuery::Union(UnionAll::try_new(self.primary)?))
    }
}

fn validate_query(query: &SqlQuery, id_column: &str) -> Result<(), ListGeneratorError> {
    match query {
        SqlQuery::Select(select) => {
            if select.columns.len() != 1 {
                return Err(SqlIrError::ProjectionArity {
                    expected: id_column_static(id_column),
                    found: select.columns.len(),
                }
                .into());
            }
            let found = projected_name(&select.columns[0]);
            if found.as_deref() != Some(id_column) {
                return Err(SqlIrError::ProjectionName {
                    expected: id_column_static(id_column),
                    found: found.unwrap_or_else(|| "<expression>".to_string()),
                }
                .into());
            }
            Ok(())
        }
        SqlQuery::Union(union) => {
            for sub in &union.0 {
                validate_query(sub, id_column)?;
            }
            Ok(())
        }
        SqlQuery::Intersect(intersect) => {
            for sub in &intersect.0 {
                validate_query(sub, id_column)?;
            }
            Ok(())
        }
        SqlQuery::With(with) => validate_query(&with.body, id_column),
    }
}

fn id_column_static(id_column: &str) -> &'static str {
    if id_column == "object_id" {
        "object_id"
    } else {
        "subject_id"
    }
}

/// The output name of a projected expression, when determinable.
fn projected_name(expr: &SqlExpr) -> Option<String> {
    match expr {
        SqlExpr::Alias { alias, .. } => Some(alias.clone()),
        SqlExpr::Column { name, .. } => Some(name.clone()),
        _ => None,
    }
}
